//! Physics module for rigid-body simulation
//!
//! Bodies own convex collision shapes, the world indexes them in a loose
//! octree and advances them with continuous collision detection and impulse
//! based response.

pub mod body;
pub mod collision_groups;
pub mod contact;
pub mod error;
pub mod narrowphase;
pub mod response;
pub mod shape;
mod world;

#[cfg(test)]
mod tests;

pub use body::{BodyHooks, BodyState, BodyType, RigidBody};
pub use collision_groups::CollisionGroups;
pub use contact::Collision;
pub use error::{PhysicsError, PhysicsResult};
pub use response::{solve_position, solve_velocity};
pub use shape::{
    CollisionShape,
    ConvexHull,
    MaterialOverride,
    PosedShape,
    ShapeKind,
    ShapeView,
    SupportMap,
};
pub use world::{RayHit, World};
