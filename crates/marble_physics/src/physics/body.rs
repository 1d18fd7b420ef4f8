//! Rigid bodies
//!
//! A body owns its collision shapes by value and keeps a snapshot of its
//! previous state, which both the time-of-impact search and render
//! interpolation read.

use std::fmt;

use crate::foundation::collections::ShapeId;
use crate::foundation::math::{utils, Mat3, Pose, Quat, Vec3};
use super::contact::Collision;
use super::error::PhysicsResult;
use super::shape::CollisionShape;

/// Motion type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyType {
    /// Moved by integration and contact response
    Dynamic,
    /// Infinite mass; never displaced by the simulation
    Static,
}

/// Kinematic state captured at the start of a sub-step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyState {
    /// Position in world space
    pub position: Vec3,
    /// Orientation
    pub orientation: Quat,
    /// Linear velocity
    pub linear_velocity: Vec3,
    /// Angular velocity (axis times radians per second)
    pub angular_velocity: Vec3,
}

/// Game-logic callbacks the world invokes around integration and response
///
/// The hooks are taken out of the body while they run, so a hook may freely
/// mutate the body it is handed.
pub trait BodyHooks {
    /// Before the body is integrated over `dt`
    fn on_before_integrate(&mut self, _body: &mut RigidBody, _dt: f32) {}

    /// After the body is integrated over `dt`
    fn on_after_integrate(&mut self, _body: &mut RigidBody, _dt: f32) {}

    /// Before contacts found at `time` are resolved; [`RigidBody::collisions`]
    /// already holds them
    fn on_before_collision_response(&mut self, _body: &mut RigidBody, _time: f64, _dt: f32) {}

    /// After contacts found at `time` are resolved
    fn on_after_collision_response(&mut self, _body: &mut RigidBody, _time: f64, _dt: f32) {}
}

/// Rigid body with owned collision shapes
pub struct RigidBody {
    body_type: BodyType,

    /// Position in world space
    pub position: Vec3,

    /// Orientation
    pub orientation: Quat,

    /// Linear velocity
    pub linear_velocity: Vec3,

    /// Angular velocity (axis times radians per second)
    pub angular_velocity: Vec3,

    /// Disabled bodies are skipped by integration, detection and queries
    pub enabled: bool,

    /// Lower values get their response hooks called first
    pub evaluation_order: i32,

    /// Opaque value for mapping back to a game object
    pub user_data: u64,

    previous: Option<BodyState>,
    shapes: Vec<CollisionShape>,
    next_shape_id: u32,
    collisions: Vec<Collision>,
    hooks: Option<Box<dyn BodyHooks>>,
    mass: f32,
    inverse_mass: f32,
    inverse_inertia: Mat3,

    /// Insertion sequence assigned by the world
    pub(crate) sequence: u64,
}

impl fmt::Debug for RigidBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RigidBody")
            .field("body_type", &self.body_type)
            .field("position", &self.position)
            .field("orientation", &self.orientation)
            .field("linear_velocity", &self.linear_velocity)
            .field("angular_velocity", &self.angular_velocity)
            .field("enabled", &self.enabled)
            .field("shapes", &self.shapes.len())
            .field("collisions", &self.collisions.len())
            .finish_non_exhaustive()
    }
}

impl RigidBody {
    /// Create a new body of the given type at the origin
    pub fn new(body_type: BodyType) -> Self {
        Self {
            body_type,
            position: Vec3::zeros(),
            orientation: Quat::identity(),
            linear_velocity: Vec3::zeros(),
            angular_velocity: Vec3::zeros(),
            enabled: true,
            evaluation_order: 0,
            user_data: 0,
            previous: None,
            shapes: Vec::new(),
            next_shape_id: 0,
            collisions: Vec::new(),
            hooks: None,
            mass: 0.0,
            inverse_mass: 0.0,
            inverse_inertia: Mat3::zeros(),
            sequence: 0,
        }
    }

    /// Create a dynamic body
    pub fn dynamic() -> Self {
        Self::new(BodyType::Dynamic)
    }

    /// Create a static body
    pub fn fixed() -> Self {
        Self::new(BodyType::Static)
    }

    /// Set the position
    pub fn with_position(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    /// Set the orientation
    pub fn with_orientation(mut self, orientation: Quat) -> Self {
        self.orientation = orientation;
        self
    }

    /// Set the linear velocity
    pub fn with_linear_velocity(mut self, velocity: Vec3) -> Self {
        self.linear_velocity = velocity;
        self
    }

    /// Set the angular velocity
    pub fn with_angular_velocity(mut self, velocity: Vec3) -> Self {
        self.angular_velocity = velocity;
        self
    }

    /// Set the evaluation order
    pub fn with_evaluation_order(mut self, order: i32) -> Self {
        self.evaluation_order = order;
        self
    }

    /// Set the user data
    pub fn with_user_data(mut self, user_data: u64) -> Self {
        self.user_data = user_data;
        self
    }

    /// Attach a shape, builder style
    pub fn with_shape(mut self, shape: CollisionShape) -> PhysicsResult<Self> {
        self.add_collision_shape(shape)?;
        Ok(self)
    }

    /// Motion type
    pub fn body_type(&self) -> BodyType {
        self.body_type
    }

    /// Whether the body is dynamic
    pub fn is_dynamic(&self) -> bool {
        self.body_type == BodyType::Dynamic
    }

    /// Whether the body is static
    pub fn is_static(&self) -> bool {
        self.body_type == BodyType::Static
    }

    /// Current pose
    pub fn pose(&self) -> Pose {
        Pose::new(self.position, self.orientation)
    }

    /// Current kinematic state
    pub fn state(&self) -> BodyState {
        BodyState {
            position: self.position,
            orientation: self.orientation,
            linear_velocity: self.linear_velocity,
            angular_velocity: self.angular_velocity,
        }
    }

    /// Snapshot taken at the start of the last sub-step
    pub fn previous_state(&self) -> Option<BodyState> {
        self.previous
    }

    /// Pose at the start of the last sub-step, or the current pose
    pub fn previous_pose(&self) -> Pose {
        self.previous
            .map_or_else(|| self.pose(), |s| Pose::new(s.position, s.orientation))
    }

    /// Remember the current state as the previous one
    pub fn snapshot(&mut self) {
        self.previous = Some(self.state());
    }

    /// Attach a shape; fails if the shape already belongs to a body
    pub fn add_collision_shape(&mut self, mut shape: CollisionShape) -> PhysicsResult<ShapeId> {
        let id = ShapeId(self.next_shape_id);
        shape.attach(id)?;
        self.next_shape_id += 1;
        shape.update_aabb(&self.pose());
        self.shapes.push(shape);
        self.update_mass_properties();
        Ok(id)
    }

    /// Detach a shape, handing it back to the caller
    pub fn remove_collision_shape(&mut self, id: ShapeId) -> Option<CollisionShape> {
        let index = self.shapes.iter().position(|s| s.id() == Some(id))?;
        let mut shape = self.shapes.remove(index);
        shape.detach();
        self.update_mass_properties();
        Some(shape)
    }

    /// Owned shapes in attachment order
    pub fn shapes(&self) -> &[CollisionShape] {
        &self.shapes
    }

    /// Look up an owned shape
    pub fn shape(&self, id: ShapeId) -> Option<&CollisionShape> {
        self.shapes.iter().find(|s| s.id() == Some(id))
    }

    /// Ids of the owned shapes in attachment order
    pub fn shape_ids(&self) -> impl Iterator<Item = ShapeId> + '_ {
        self.shapes.iter().filter_map(CollisionShape::id)
    }

    /// Contacts from the current sub-step
    pub fn collisions(&self) -> &[Collision] {
        &self.collisions
    }

    pub(crate) fn clear_collisions(&mut self) {
        self.collisions.clear();
    }

    pub(crate) fn push_collision(&mut self, collision: Collision) {
        self.collisions.push(collision);
    }

    /// Install the lifecycle hooks
    pub fn set_hooks(&mut self, hooks: Box<dyn BodyHooks>) {
        self.hooks = Some(hooks);
    }

    /// Remove and return the lifecycle hooks
    pub fn take_hooks(&mut self) -> Option<Box<dyn BodyHooks>> {
        self.hooks.take()
    }

    /// Run `f` with the hooks temporarily taken out of the body
    pub(crate) fn with_hooks(&mut self, f: impl FnOnce(&mut dyn BodyHooks, &mut RigidBody)) {
        if let Some(mut hooks) = self.hooks.take() {
            f(hooks.as_mut(), self);
            // A hook may have installed replacements
            if self.hooks.is_none() {
                self.hooks = Some(hooks);
            }
        }
    }

    /// Total mass of the shapes (infinite for static bodies)
    pub fn mass(&self) -> f32 {
        if self.is_static() { f32::INFINITY } else { self.mass }
    }

    /// Inverse mass; zero for static or massless bodies
    pub fn inverse_mass(&self) -> f32 {
        self.inverse_mass
    }

    /// Inverse inertia tensor in world space; zero for static bodies
    pub fn world_inverse_inertia(&self) -> Mat3 {
        let rotation = self.orientation.to_rotation_matrix();
        rotation.matrix() * self.inverse_inertia * rotation.matrix().transpose()
    }

    fn update_mass_properties(&mut self) {
        self.mass = self.shapes.iter().map(CollisionShape::mass).sum();
        if self.is_static() || self.mass <= 0.0 {
            self.inverse_mass = 0.0;
            self.inverse_inertia = Mat3::zeros();
            return;
        }
        self.inverse_mass = 1.0 / self.mass;
        let inertia: Mat3 = self.shapes.iter().map(CollisionShape::inertia).sum();
        self.inverse_inertia = inertia.try_inverse().unwrap_or_else(Mat3::zeros);
    }

    /// Apply an impulse at `offset` from the body origin
    pub fn apply_impulse(&mut self, impulse: &Vec3, offset: &Vec3) {
        if !self.is_dynamic() {
            return;
        }
        self.linear_velocity += impulse * self.inverse_mass;
        self.angular_velocity += self.world_inverse_inertia() * offset.cross(impulse);
    }

    /// Advance position and orientation by the current velocities
    ///
    /// Velocities are left untouched; external forces are applied by the world.
    pub fn integrate(&mut self, dt: f32) {
        if !self.is_dynamic() {
            return;
        }

        self.position += self.linear_velocity * dt;

        let angle = self.angular_velocity.norm() * dt;
        if angle > 0.0 {
            let rotation = Quat::from_scaled_axis(self.angular_velocity * dt);
            self.orientation = Quat::new_normalize((rotation * self.orientation).into_inner());
        }
    }

    /// Roll back to fraction `t` of the way from the previous snapshot
    ///
    /// Position is interpolated linearly and orientation spherically. No-op
    /// without a snapshot or for static bodies.
    pub fn revert(&mut self, t: f32) {
        if !self.is_dynamic() {
            return;
        }
        if let Some(previous) = self.previous {
            self.position = previous.position.lerp(&self.position, t);
            self.orientation = utils::slerp(&previous.orientation, &self.orientation, t);
        }
    }

    /// Pose blended between the previous snapshot and now, for rendering
    /// between fixed ticks
    pub fn interpolated_pose(&self, alpha: f32) -> Pose {
        self.previous_pose().interpolate(&self.pose(), alpha.clamp(0.0, 1.0))
    }

    /// Refresh the cached bounding boxes of every owned shape
    pub(crate) fn update_shape_aabbs(&mut self) {
        let pose = self.pose();
        for shape in &mut self.shapes {
            shape.update_aabb(&pose);
        }
    }
}
