//! # Marble Physics
//!
//! A real-time rigid-body physics core for games.
//!
//! ## Features
//!
//! - **Convex Shapes**: Balls, convex hulls, two-part unions and points
//! - **Loose Octree Broadphase**: Grows and shrinks with the scene
//! - **GJK / EPA Narrowphase**: Overlap, penetration and ray casting
//! - **Continuous Collision Detection**: Sub-stepping to the earliest impact
//! - **Impulse Response**: Restitution and Coulomb friction
//! - **Game Hooks**: Per-body callbacks around integration and response
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use marble_physics::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut world = World::new(PhysicsConfig::default());
//!
//!     world.add(
//!         RigidBody::fixed()
//!             .with_position(Vec3::new(0.0, -0.5, 0.0))
//!             .with_shape(CollisionShape::cuboid(Vec3::new(10.0, 0.5, 10.0)))?,
//!     );
//!     let marble = world.add(
//!         RigidBody::dynamic()
//!             .with_position(Vec3::new(0.0, 5.0, 0.0))
//!             .with_shape(CollisionShape::ball(0.25))?,
//!     );
//!
//!     for _ in 0..120 {
//!         world.step(1.0 / 60.0);
//!     }
//!
//!     if let Some(body) = world.body(marble) {
//!         println!("marble rests at {}", body.position);
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod foundation;
pub mod config;
pub mod spatial;
pub mod physics;

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        config::{Config, PhysicsConfig, SolverConfig, OctreeConfig},
        foundation::{
            collections::{BodyHandle, ShapeId, ShapeKey},
            math::{Vec3, Quat, Pose},
        },
        physics::{
            World, RayHit, RigidBody, BodyHooks, BodyType,
            CollisionShape, ShapeKind, PosedShape, MaterialOverride,
            Collision, CollisionGroups, PhysicsError, PhysicsResult,
        },
        spatial::Aabb,
    };
}
