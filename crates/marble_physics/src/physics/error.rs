//! Physics error types

use crate::foundation::collections::{BodyHandle, ShapeKey};

/// Errors raised by misuse of the physics API
///
/// Degenerate geometry never produces an error; detection routines fall back
/// to "no collision" or "no hit" instead.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum PhysicsError {
    /// The shape already belongs to a rigid body
    #[error("Collision shape is already attached to a body")]
    ShapeAlreadyAttached,

    /// Operation requires a dynamic body
    #[error("Body {0:?} is not dynamic")]
    NotDynamic(BodyHandle),

    /// Handle does not name a body in this world
    #[error("Unknown body {0:?}")]
    UnknownBody(BodyHandle),

    /// Key does not name a shape in this world
    #[error("Unknown shape {0:?}")]
    UnknownShape(ShapeKey),

    /// Convex hull built from no points
    #[error("Convex hull requires at least one point")]
    EmptyConvexHull,

    /// Mass must be finite and non-negative
    #[error("Invalid mass: {0}")]
    InvalidMass(f32),
}

/// Result type for physics operations
pub type PhysicsResult<T> = Result<T, PhysicsError>;
