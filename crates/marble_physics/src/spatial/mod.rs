//! Spatial partitioning data structures
//!
//! Provides the bounding-box type and the loose octree used for broad-phase
//! collision detection, ray casting and shape casting.

mod aabb;
mod octree;

pub use aabb::Aabb;
pub use octree::{Octree, NodeKey};
