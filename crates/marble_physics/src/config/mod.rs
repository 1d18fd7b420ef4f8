//! Configuration system
//!
//! Tunables for the simulation loop, the contact solver and the broadphase.
//! Any config implementing [`Config`] can be loaded from or saved to TOML or RON.

pub use serde::{Serialize, Deserialize};

use crate::foundation::math::Vec3;

/// Configuration trait
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Load configuration from file
    fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(ConfigError::Io)?;

        Self::from_str_with_format(&contents, path)
    }

    /// Parse configuration text, choosing the format from the file extension
    fn from_str_with_format(contents: &str, path: &str) -> Result<Self, ConfigError> {
        if path.ends_with(".toml") {
            toml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else if path.ends_with(".ron") {
            ron::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else {
            Err(ConfigError::UnsupportedFormat(path.to_string()))
        }
    }

    /// Save configuration to file
    fn save_to_file(&self, path: &str) -> Result<(), ConfigError> {
        let contents = if path.ends_with(".toml") {
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else if path.ends_with(".ron") {
            ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
                .map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else {
            return Err(ConfigError::UnsupportedFormat(path.to_string()));
        };

        std::fs::write(path, contents).map_err(ConfigError::Io)
    }
}

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Unsupported format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

/// Configuration for octree behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OctreeConfig {
    /// Directly stored objects a node may hold before it splits into octants
    pub max_objects_per_node: usize,

    /// Deepest level (relative to the unit cube) a split may create
    pub max_split_level: i32,

    /// How many times the root may double in size to fit a single object
    pub max_grow_steps: u32,
}

impl Default for OctreeConfig {
    fn default() -> Self {
        Self {
            max_objects_per_node: 8,
            max_split_level: 16,
            max_grow_steps: 32,
        }
    }
}

/// Impulse solver constants
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Normal relative velocity at or above which a contact counts as separating
    pub separating_velocity: f32,

    /// Closing speed below which restitution is ignored (resting contact)
    pub restitution_cutoff_speed: f32,

    /// Penetration depth left uncorrected by the position solve
    pub penetration_slop: f32,

    /// Fraction of the excess penetration removed per position solve
    pub position_correction: f32,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            separating_velocity: 1.0e-4,
            restitution_cutoff_speed: 0.5,
            penetration_slop: 0.005,
            position_correction: 0.8,
        }
    }
}

/// World stepping configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    /// Global gravity acceleration
    pub gravity: Vec3,

    /// Deepest recursive sub-step; the last level consumes all remaining time
    pub max_substep_depth: u32,

    /// Sub-steps shorter than this are dropped
    pub min_substep_time: f32,

    /// Distance added past the exact time of impact so the contact registers
    pub ccd_margin: f32,

    /// Contact points closer than this on one probing shape are checked for
    /// internal-edge artifacts
    pub internal_edge_distance: f32,

    /// Minimum cosine between a directional material override and the
    /// surface normal for the override to apply
    pub material_override_cosine: f32,

    /// Contact solver constants
    pub solver: SolverConfig,

    /// Broadphase constants
    pub octree: OctreeConfig,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: Vec3::new(0.0, -9.81, 0.0),
            max_substep_depth: 10,
            min_substep_time: 1.0e-6,
            ccd_margin: 1.0e-3,
            internal_edge_distance: 0.1,
            material_override_cosine: 0.9,
            solver: SolverConfig::default(),
            octree: OctreeConfig::default(),
        }
    }
}

impl Config for PhysicsConfig {}
