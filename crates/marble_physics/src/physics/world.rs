//! Physics world and the recursive sub-step state machine
//!
//! Each call to [`World::step`] runs a chain of sub-steps. A sub-step
//! integrates every body over its remaining time, finds the earliest time of
//! impact among pairs that were not already touching, rewinds everyone to that
//! moment, resolves the contacts found there and recurses on what is left.
//! The durations consumed by the chain always add up to the requested `dt`.

use std::collections::{HashMap, HashSet};

use crate::config::PhysicsConfig;
use crate::foundation::collections::{BodyHandle, ShapeKey, ShapePair, SlotMap};
use crate::foundation::math::{utils, Pose, Vec3};
use crate::spatial::{Aabb, Octree};
use super::body::RigidBody;
use super::collision_groups::CollisionGroups;
use super::contact::Collision;
use super::error::{PhysicsError, PhysicsResult};
use super::narrowphase::{self, determine_time_of_impact, SweptShape};
use super::response::{solve_position, solve_velocity};
use super::shape::{CollisionShape, PosedShape, ShapeKind, ShapeView, SupportMap};

/// Slack when comparing normal cosines in the internal-edge test
const INTERNAL_EDGE_COSINE_SLACK: f32 = 1.0e-4;

/// Distance below a supporting plane, relative to the ray reach, still counted as on it
const INTERNAL_EDGE_PLANE_TOLERANCE: f32 = 5.0e-2;

/// Result of a world ray or shape cast
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    /// Shape that was hit
    pub shape: ShapeKey,
    /// Distance along the (normalized) cast direction
    pub distance: f32,
    /// Hit point in world space
    pub point: Vec3,
    /// Surface normal of the hit shape
    pub normal: Vec3,
}

/// Collection of rigid bodies stepped together
pub struct World {
    config: PhysicsConfig,
    bodies: SlotMap<BodyHandle, RigidBody>,

    /// Handles in insertion order; fixes iteration order for determinism
    order: Vec<BodyHandle>,
    next_sequence: u64,

    octree: Octree<ShapeKey>,

    /// Broadphase results per probing shape, valid until boxes change
    candidate_cache: HashMap<ShapeKey, Vec<ShapeKey>>,

    /// Pairs the last time-of-impact pass found in contact
    ccd_contacts: HashSet<ShapePair>,

    /// Pairs the last regular narrow-phase pass found in contact
    regular_contacts: HashSet<ShapePair>,

    /// Bodies handed out mutably whose boxes may be stale
    dirty: Vec<BodyHandle>,

    time: f64,
    last_substeps: Vec<f32>,
}

impl Default for World {
    fn default() -> Self {
        Self::new(PhysicsConfig::default())
    }
}

impl World {
    /// Create an empty world
    pub fn new(config: PhysicsConfig) -> Self {
        let octree = Octree::new(config.octree.clone());
        Self {
            config,
            bodies: SlotMap::with_key(),
            order: Vec::new(),
            next_sequence: 0,
            octree,
            candidate_cache: HashMap::new(),
            ccd_contacts: HashSet::new(),
            regular_contacts: HashSet::new(),
            dirty: Vec::new(),
            time: 0.0,
            last_substeps: Vec::new(),
        }
    }

    /// Active configuration
    pub fn config(&self) -> &PhysicsConfig {
        &self.config
    }

    /// Global gravity
    pub fn gravity(&self) -> Vec3 {
        self.config.gravity
    }

    /// Replace the global gravity
    pub fn set_gravity(&mut self, gravity: Vec3) {
        self.config.gravity = gravity;
    }

    /// Simulated time in seconds
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Durations consumed by each sub-step of the last [`Self::step`]
    pub fn last_substeps(&self) -> &[f32] {
        &self.last_substeps
    }

    /// The broadphase index
    pub fn broadphase(&self) -> &Octree<ShapeKey> {
        &self.octree
    }

    /// Register a body and its shapes
    ///
    /// The world takes ownership, so a body can never be registered twice.
    pub fn add(&mut self, mut body: RigidBody) -> BodyHandle {
        body.sequence = self.next_sequence;
        self.next_sequence += 1;
        body.update_shape_aabbs();

        let handle = self.bodies.insert(body);
        self.order.push(handle);
        for key in self.shape_keys(handle) {
            if let Some((_, shape)) = self.shape_entry(key) {
                let aabb = shape.aabb();
                self.octree.insert(key, aabb);
            }
        }
        self.candidate_cache.clear();
        handle
    }

    /// Unregister a body, handing it back
    pub fn remove(&mut self, handle: BodyHandle) -> Option<RigidBody> {
        let keys = self.shape_keys(handle);
        let body = self.bodies.remove(handle)?;
        for key in keys {
            self.octree.remove(&key);
        }
        self.order.retain(|h| *h != handle);
        self.dirty.retain(|h| *h != handle);
        self.ccd_contacts.retain(|p| p.first.body != handle && p.second.body != handle);
        self.regular_contacts.retain(|p| p.first.body != handle && p.second.body != handle);
        self.candidate_cache.clear();
        Some(body)
    }

    /// Attach a shape to a registered body
    pub fn attach_shape(&mut self, handle: BodyHandle, shape: CollisionShape) -> PhysicsResult<ShapeKey> {
        let body = self.bodies.get_mut(handle).ok_or(PhysicsError::UnknownBody(handle))?;
        let id = body.add_collision_shape(shape)?;
        let key = ShapeKey::new(handle, id);
        if let Some(shape) = body.shape(id) {
            self.octree.insert(key, shape.aabb());
        }
        self.candidate_cache.clear();
        Ok(key)
    }

    /// Detach a shape from its body, handing it back
    pub fn detach_shape(&mut self, key: ShapeKey) -> PhysicsResult<CollisionShape> {
        let body = self.bodies.get_mut(key.body).ok_or(PhysicsError::UnknownBody(key.body))?;
        let shape = body.remove_collision_shape(key.shape).ok_or(PhysicsError::UnknownShape(key))?;
        self.octree.remove(&key);
        self.candidate_cache.clear();
        Ok(shape)
    }

    /// Look up a body
    pub fn body(&self, handle: BodyHandle) -> Option<&RigidBody> {
        self.bodies.get(handle)
    }

    /// Look up a body for modification; its shapes are resynced before the
    /// next step
    pub fn body_mut(&mut self, handle: BodyHandle) -> Option<&mut RigidBody> {
        let body = self.bodies.get_mut(handle)?;
        if !self.dirty.contains(&handle) {
            self.dirty.push(handle);
        }
        Some(body)
    }

    /// Bodies in insertion order
    pub fn bodies(&self) -> impl Iterator<Item = (BodyHandle, &RigidBody)> + '_ {
        self.order
            .iter()
            .filter_map(|&handle| self.bodies.get(handle).map(|body| (handle, body)))
    }

    /// Number of registered bodies
    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    /// Whether no bodies are registered
    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    /// Advance the simulation by `dt` seconds
    pub fn step(&mut self, dt: f32) {
        self.sync_dirty();
        self.last_substeps.clear();
        self.substep(dt, self.time, 0);
        self.time += f64::from(dt);
    }

    /// Recompute the contacts of one body without resolving them
    ///
    /// The body's collision list is replaced; other bodies are untouched.
    pub fn update_collisions(&mut self, handle: BodyHandle) -> PhysicsResult<&[Collision]> {
        let body = self.bodies.get(handle).ok_or(PhysicsError::UnknownBody(handle))?;
        if !body.is_dynamic() {
            return Err(PhysicsError::NotDynamic(handle));
        }

        self.sync_dirty();
        let mut found = Vec::new();
        for key in self.shape_keys(handle) {
            let Some((_, shape)) = self.shape_entry(key) else {
                continue;
            };
            let query = shape.aabb();
            for other in self.candidates(key, &query) {
                if let Some(mut collision) = self.narrowphase(key, other) {
                    collision.is_new = !self.regular_contacts.contains(&ShapePair::new(key, other));
                    found.push(collision);
                }
            }
        }
        self.correct_internal_edges(&mut found);

        let body = self.bodies.get_mut(handle).ok_or(PhysicsError::UnknownBody(handle))?;
        body.clear_collisions();
        for collision in found {
            body.push_collision(collision);
        }
        Ok(body.collisions())
    }

    /// Cast a ray against every enabled shape whose detection mask overlaps
    /// `mask`; hits are sorted by distance
    pub fn cast_ray(
        &self,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
        mask: CollisionGroups,
    ) -> Vec<RayHit> {
        let Some(direction) = utils::try_normalize(&direction) else {
            return Vec::new();
        };

        let query = Aabb::from_segment(origin, direction, max_distance);
        let mut hits: Vec<RayHit> = self
            .query_candidates(&query)
            .into_iter()
            .filter_map(|key| {
                let (body, shape) = self.shape_entry(key)?;
                if !body.enabled || !shape.detection_mask.overlaps(mask) {
                    return None;
                }
                let hit = narrowphase::cast_ray(&shape.view(&body.pose()), &origin, &direction, max_distance)?;
                Some(RayHit {
                    shape: key,
                    distance: hit.lambda,
                    point: hit.point,
                    normal: hit.normal,
                })
            })
            .collect();

        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits
    }

    /// Sweep a registered shape along `direction` against every other body
    ///
    /// Hits are sorted by distance; the shape's own body is ignored.
    pub fn cast_shape(&self, key: ShapeKey, direction: Vec3, max_distance: f32) -> PhysicsResult<Vec<RayHit>> {
        let (body, shape) = self.shape_entry(key).ok_or(PhysicsError::UnknownShape(key))?;
        let Some(direction) = utils::try_normalize(&direction) else {
            return Ok(Vec::new());
        };

        let moving = shape.view(&body.pose());
        let start = moving.aabb();
        let travel = direction * max_distance;
        let query = start.union(&Aabb::new(start.min + travel, start.max + travel));

        let mut hits: Vec<RayHit> = self
            .query_candidates(&query)
            .into_iter()
            .filter(|other| other.body != key.body)
            .filter_map(|other| {
                let (other_body, other_shape) = self.shape_entry(other)?;
                if !other_body.enabled || !shape.detection_mask.overlaps(other_shape.detection_mask) {
                    return None;
                }
                let target = other_shape.view(&other_body.pose());
                let hit = narrowphase::cast_shape(&moving, &target, &direction, max_distance)?;
                Some(RayHit {
                    shape: other,
                    distance: hit.lambda,
                    point: hit.point,
                    normal: hit.normal,
                })
            })
            .collect();

        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        Ok(hits)
    }

    fn substep(&mut self, dt: f32, start_time: f64, depth: u32) {
        if dt <= self.config.min_substep_time {
            return;
        }
        if depth > self.config.max_substep_depth {
            log::debug!("Sub-step depth {} exceeded, dropping {:.6}s", depth, dt);
            return;
        }

        self.integrate_bodies(dt);

        let (t, ccd_contacts) = if depth >= self.config.max_substep_depth {
            (1.0, None)
        } else {
            let (t, contacts) = self.find_time_of_impact();
            (t, Some(contacts))
        };

        self.rewind_to(t, dt);

        let (collisions, regular_contacts) = self.detect_collisions(t);
        let consumed = dt * t;
        let time = start_time + f64::from(consumed);
        self.respond(&collisions, time, dt);

        log::debug!(
            "Sub-step depth {}: dt {:.6}, time of impact {:.4}, {} collisions",
            depth,
            dt,
            t,
            collisions.len()
        );

        if let Some(contacts) = ccd_contacts {
            self.ccd_contacts = contacts;
        }
        self.regular_contacts = regular_contacts;
        self.last_substeps.push(consumed);

        self.substep(dt - consumed, time, depth + 1);
    }

    /// Snapshot and integrate every enabled body, then resync swept boxes
    fn integrate_bodies(&mut self, dt: f32) {
        let mut moved = Vec::new();
        for &handle in &self.order {
            let Some(body) = self.bodies.get_mut(handle) else {
                continue;
            };
            if !body.enabled {
                continue;
            }

            body.snapshot();
            body.with_hooks(|hooks, body| hooks.on_before_integrate(body, dt));
            body.integrate(dt);
            body.with_hooks(|hooks, body| hooks.on_after_integrate(body, dt));

            if body.is_dynamic() {
                moved.push(handle);
            }
        }

        for handle in moved {
            self.sync_body(handle, true);
        }
        self.candidate_cache.clear();
    }

    /// Earliest time of impact among newly touching pairs, plus every pair
    /// found touching
    fn find_time_of_impact(&mut self) -> (f32, HashSet<ShapePair>) {
        let mut contacts = HashSet::new();
        let mut tested = HashSet::new();
        let mut earliest: f32 = 1.0;

        for key in self.probe_shapes() {
            let Some(query) = self.swept_aabb(key) else {
                continue;
            };
            for other in self.candidates(key, &query) {
                let pair = ShapePair::new(key, other);
                if !tested.insert(pair) {
                    continue;
                }
                let Some(t) = self.pair_time_of_impact(key, other) else {
                    continue;
                };
                contacts.insert(pair);
                if !self.ccd_contacts.contains(&pair) {
                    log::trace!("Time of impact {:.4} for {:?}", t, pair);
                    earliest = earliest.min(t);
                }
            }
        }

        (earliest, contacts)
    }

    /// Roll dynamic bodies back to fraction `t` and apply gravity for the
    /// time actually consumed
    fn rewind_to(&mut self, t: f32, dt: f32) {
        let gravity_impulse = self.config.gravity * (dt * t);
        let mut moved = Vec::new();
        for &handle in &self.order {
            let Some(body) = self.bodies.get_mut(handle) else {
                continue;
            };
            if !body.enabled || !body.is_dynamic() {
                continue;
            }
            if t < 1.0 {
                body.revert(t);
                moved.push(handle);
            }
            body.linear_velocity += gravity_impulse;
        }

        for handle in moved {
            self.sync_body(handle, false);
        }
        self.candidate_cache.clear();
    }

    /// Regular narrow-phase at the current poses
    ///
    /// Clears every body's collision list, then stores each primary record
    /// in the first body's list and its mirror in the second body's.
    fn detect_collisions(&mut self, t: f32) -> (Vec<Collision>, HashSet<ShapePair>) {
        for body in self.bodies.values_mut() {
            body.clear_collisions();
        }

        let mut contacts = HashSet::new();
        let mut collisions = Vec::new();
        for key in self.probe_shapes() {
            let Some((_, shape)) = self.shape_entry(key) else {
                continue;
            };
            let query = shape.aabb();
            for other in self.candidates(key, &query) {
                let pair = ShapePair::new(key, other);
                if contacts.contains(&pair) {
                    continue;
                }
                let Some(mut collision) = self.narrowphase(key, other) else {
                    continue;
                };
                collision.time_of_impact = t;
                collision.is_new = !self.regular_contacts.contains(&pair);
                contacts.insert(pair);
                collisions.push(collision);
            }
        }

        self.correct_internal_edges(&mut collisions);

        for collision in &collisions {
            if let Some(body) = self.bodies.get_mut(collision.body1()) {
                body.push_collision(collision.clone());
            }
            if let Some(body) = self.bodies.get_mut(collision.body2()) {
                body.push_collision(collision.mirrored());
            }
        }

        (collisions, contacts)
    }

    /// Run response hooks in evaluation order and resolve every collision
    /// whose response masks overlap
    fn respond(&mut self, collisions: &[Collision], time: f64, dt: f32) {
        if collisions.is_empty() {
            return;
        }

        let mut affected: Vec<BodyHandle> = collisions
            .iter()
            .flat_map(|c| [c.body1(), c.body2()])
            .collect();
        affected.sort_by_key(|handle| {
            self.bodies
                .get(*handle)
                .map(|body| (body.evaluation_order, body.sequence))
        });
        affected.dedup();

        for &handle in &affected {
            if let Some(body) = self.bodies.get_mut(handle) {
                body.with_hooks(|hooks, body| hooks.on_before_collision_response(body, time, dt));
            }
        }

        for collision in collisions {
            let responds = match (self.shape_entry(collision.shape1), self.shape_entry(collision.shape2)) {
                (Some((_, a)), Some((_, b))) => a.response_mask.overlaps(b.response_mask),
                _ => false,
            };
            if !responds {
                continue;
            }
            let Some([body1, body2]) = self.bodies.get_disjoint_mut([collision.body1(), collision.body2()]) else {
                continue;
            };
            solve_position(collision, body1, &self.config.solver);
            solve_velocity(collision, body1, body2, &self.config.solver);
        }

        for &handle in &affected {
            if let Some(body) = self.bodies.get_mut(handle) {
                body.with_hooks(|hooks, body| hooks.on_after_collision_response(body, time, dt));
            }
        }

        for handle in affected {
            if self.bodies.get(handle).is_some_and(RigidBody::is_dynamic) {
                self.sync_body(handle, false);
            }
        }
        self.candidate_cache.clear();
    }

    /// Replace ghost normals at the seam between two flush shapes
    ///
    /// Two contacts on one probing shape with nearby contact points are
    /// re-tested against the union of both touched shapes. If the union's
    /// normal lies between the two individual normals, each contact takes the
    /// normal of the face a ray along the union normal actually sees, when
    /// that face agrees better with the union.
    fn correct_internal_edges(&self, collisions: &mut [Collision]) {
        let threshold = self.config.internal_edge_distance;
        for i in 0..collisions.len() {
            for j in (i + 1)..collisions.len() {
                let (a, b) = (&collisions[i], &collisions[j]);
                if a.shape1 != b.shape1 || a.shape2 == b.shape2 {
                    continue;
                }
                if (a.point1 - b.point1).norm() > threshold {
                    continue;
                }
                if let Some((normal_a, normal_b)) = self.corrected_normals(a, b) {
                    self.realign(&mut collisions[i], normal_a);
                    self.realign(&mut collisions[j], normal_b);
                }
            }
        }
    }

    /// Move the support-derived contact points onto a replaced normal
    fn realign(&self, collision: &mut Collision, normal: Vec3) {
        if normal == collision.normal {
            return;
        }
        collision.normal = normal;
        if let Some((body, shape)) = self.shape_entry(collision.shape1) {
            collision.point1 = shape.view(&body.pose()).support(&-normal);
        }
        if let Some((body, shape)) = self.shape_entry(collision.shape2) {
            collision.point2 = shape.view(&body.pose()).support(&normal);
        }
    }

    fn corrected_normals(&self, a: &Collision, b: &Collision) -> Option<(Vec3, Vec3)> {
        let (probe_body, probe_shape) = self.shape_entry(a.shape1)?;
        let (body_a, shape_a) = self.shape_entry(a.shape2)?;
        let (body_b, shape_b) = self.shape_entry(b.shape2)?;

        let combined = ShapeKind::Combined(Box::new([
            PosedShape::new(shape_a.kind().clone(), body_a.pose()).with_margin(shape_a.margin()),
            PosedShape::new(shape_b.kind().clone(), body_b.pose()).with_margin(shape_b.margin()),
        ]));
        let combined_view = ShapeView::new(&combined, Pose::identity(), 0.0);
        let probe_view = probe_shape.view(&probe_body.pose());
        let combined_normal = narrowphase::collide(&probe_view, &combined_view)?.normal;

        // An outlier union normal means the heuristic does not apply
        let spread = a.normal.dot(&b.normal) - INTERNAL_EDGE_COSINE_SLACK;
        if combined_normal.dot(&a.normal) < spread || combined_normal.dot(&b.normal) < spread {
            return None;
        }

        // Rays start above the probe's deepest point, clear of both surfaces
        let reach = self.config.internal_edge_distance.max(2.0 * a.depth.max(b.depth));
        let pick = |collision: &Collision, view: ShapeView| {
            let origin = collision.point1 + combined_normal * reach;
            narrowphase::cast_ray(&view, &origin, &-combined_normal, 2.0 * reach)
                .map(|hit| {
                    // A hit on the supporting plane along the union normal lies on a face with that normal
                    let plane = view.support(&combined_normal).dot(&combined_normal);
                    if plane - hit.point.dot(&combined_normal) <= INTERNAL_EDGE_PLANE_TOLERANCE * reach {
                        combined_normal
                    } else {
                        hit.normal
                    }
                })
                .filter(|normal| normal.dot(&combined_normal) > collision.normal.dot(&combined_normal))
                .unwrap_or(collision.normal)
        };

        Some((
            pick(a, shape_a.view(&body_a.pose())),
            pick(b, shape_b.view(&body_b.pose())),
        ))
    }

    /// Contact between two shapes at their current poses
    fn narrowphase(&self, key: ShapeKey, other: ShapeKey) -> Option<Collision> {
        let (body_a, shape_a) = self.shape_entry(key)?;
        let (body_b, shape_b) = self.shape_entry(other)?;
        if !body_a.enabled || !body_b.enabled || !shape_a.detection_mask.overlaps(shape_b.detection_mask) {
            return None;
        }

        let geometry = narrowphase::collide(&shape_a.view(&body_a.pose()), &shape_b.view(&body_b.pose()))?;

        // Outward normals of each surface in its body's frame
        let cosine = self.config.material_override_cosine;
        let local_a = body_a.orientation.inverse_transform_vector(&-geometry.normal);
        let local_b = body_b.orientation.inverse_transform_vector(&geometry.normal);

        Some(Collision::new(
            key,
            other,
            &geometry,
            shape_a.resolve_material(&local_a, cosine),
            shape_b.resolve_material(&local_b, cosine),
        ))
    }

    fn pair_time_of_impact(&self, key: ShapeKey, other: ShapeKey) -> Option<f32> {
        let (body_a, shape_a) = self.shape_entry(key)?;
        let (body_b, shape_b) = self.shape_entry(other)?;
        if !body_a.enabled || !body_b.enabled || !shape_a.detection_mask.overlaps(shape_b.detection_mask) {
            return None;
        }

        fn swept<'s>(body: &RigidBody, shape: &'s CollisionShape) -> SweptShape<'s> {
            SweptShape {
                kind: shape.broadphase_shape().unwrap_or_else(|| shape.kind()),
                margin: shape.margin(),
                previous: body.previous_pose(),
                current: body.pose(),
            }
        }

        determine_time_of_impact(&swept(body_a, shape_a), &swept(body_b, shape_b), self.config.ccd_margin)
    }

    fn shape_entry(&self, key: ShapeKey) -> Option<(&RigidBody, &CollisionShape)> {
        let body = self.bodies.get(key.body)?;
        let shape = body.shape(key.shape)?;
        Some((body, shape))
    }

    fn shape_keys(&self, handle: BodyHandle) -> Vec<ShapeKey> {
        self.bodies
            .get(handle)
            .map(|body| body.shape_ids().map(|id| ShapeKey::new(handle, id)).collect())
            .unwrap_or_default()
    }

    /// Shapes of enabled dynamic bodies, in insertion order
    fn probe_shapes(&self) -> Vec<ShapeKey> {
        self.bodies()
            .filter(|(_, body)| body.enabled && body.is_dynamic())
            .flat_map(|(handle, body)| body.shape_ids().map(move |id| ShapeKey::new(handle, id)))
            .collect()
    }

    /// Bounding box covering a shape at its previous and current pose
    fn swept_aabb(&self, key: ShapeKey) -> Option<Aabb> {
        let (body, shape) = self.shape_entry(key)?;
        let previous = shape.kind().aabb(&body.previous_pose(), shape.margin());
        let mut swept = shape.aabb().union(&previous);
        if let Some(substitute) = shape.broadphase_shape() {
            swept = swept
                .union(&substitute.aabb(&body.previous_pose(), shape.margin()))
                .union(&substitute.aabb(&body.pose(), shape.margin()));
        }
        Some(swept)
    }

    /// Broadphase candidates for a probing shape, cached until boxes change
    ///
    /// Sorted by body insertion order then shape id; the probing body itself
    /// is excluded.
    fn candidates(&mut self, key: ShapeKey, query: &Aabb) -> Vec<ShapeKey> {
        if let Some(cached) = self.candidate_cache.get(&key) {
            return cached.clone();
        }

        let mut found = self.octree.intersect_aabb(query);
        found.retain(|other| other.body != key.body);
        found.sort_by_key(|other| {
            let sequence = self.bodies.get(other.body).map_or(u64::MAX, |body| body.sequence);
            (sequence, other.shape)
        });

        self.candidate_cache.insert(key, found.clone());
        found
    }

    /// Octree hits plus every shape of a body whose box may be stale
    fn query_candidates(&self, query: &Aabb) -> Vec<ShapeKey> {
        let mut found = self.octree.intersect_aabb(query);
        for &handle in &self.dirty {
            for key in self.shape_keys(handle) {
                if !found.contains(&key) {
                    found.push(key);
                }
            }
        }
        found
    }

    /// Refresh a body's shape boxes in the octree
    ///
    /// A swept box also covers the shape at the body's previous pose.
    fn sync_body(&mut self, handle: BodyHandle, swept: bool) {
        let Some(body) = self.bodies.get_mut(handle) else {
            return;
        };
        body.update_shape_aabbs();

        let previous = body.previous_pose();
        for shape in body.shapes() {
            let Some(id) = shape.id() else {
                continue;
            };
            let mut aabb = shape.aabb();
            if swept {
                aabb = aabb.union(&shape.kind().aabb(&previous, shape.margin()));
            }
            self.octree.update(ShapeKey::new(handle, id), aabb);
        }
    }

    fn sync_dirty(&mut self) {
        for handle in std::mem::take(&mut self.dirty) {
            self.sync_body(handle, false);
        }
        self.candidate_cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn zero_gravity() -> World {
        World::new(PhysicsConfig {
            gravity: Vec3::zeros(),
            ..PhysicsConfig::default()
        })
    }

    fn ball_at(position: Vec3) -> RigidBody {
        RigidBody::dynamic()
            .with_position(position)
            .with_shape(CollisionShape::ball(1.0))
            .unwrap()
    }

    #[test]
    fn test_add_and_remove_bodies() {
        let mut world = zero_gravity();
        let a = world.add(ball_at(Vec3::zeros()));
        let b = world.add(ball_at(Vec3::new(10.0, 0.0, 0.0)));
        assert_eq!(world.len(), 2);
        assert_eq!(world.broadphase().len(), 2);
        assert_eq!(world.bodies().map(|(h, _)| h).collect::<Vec<_>>(), vec![a, b]);

        assert!(world.remove(a).is_some());
        assert!(world.remove(a).is_none());
        assert_eq!(world.broadphase().len(), 1);
    }

    #[test]
    fn test_attach_and_detach_shapes() {
        let mut world = zero_gravity();
        let handle = world.add(RigidBody::dynamic());
        let key = world.attach_shape(handle, CollisionShape::ball(0.5)).unwrap();
        assert_eq!(world.broadphase().len(), 1);

        let shape = world.detach_shape(key).unwrap();
        assert!(shape.id().is_none());
        assert_eq!(world.broadphase().len(), 0);
        assert_eq!(world.detach_shape(key).err(), Some(PhysicsError::UnknownShape(key)));
    }

    #[test]
    fn test_update_collisions_requires_dynamic_body() {
        let mut world = zero_gravity();
        let floor = world.add(
            RigidBody::fixed()
                .with_shape(CollisionShape::cuboid(Vec3::new(5.0, 0.5, 5.0)))
                .unwrap(),
        );
        let ball = world.add(ball_at(Vec3::new(0.0, 1.4, 0.0)));

        assert_eq!(world.update_collisions(floor).err(), Some(PhysicsError::NotDynamic(floor)));

        let collisions = world.update_collisions(ball).unwrap();
        assert_eq!(collisions.len(), 1);
        assert_eq!(collisions[0].body2(), floor);
        assert_relative_eq!(collisions[0].normal, Vec3::y(), epsilon = 1e-3);
        assert_relative_eq!(collisions[0].depth, 0.1, epsilon = 1e-3);
    }

    #[test]
    fn test_cast_ray_sorted_and_filtered() {
        let mut world = zero_gravity();
        let near = world.add(ball_at(Vec3::new(5.0, 0.0, 0.0)));
        let far = world.add(ball_at(Vec3::new(10.0, 0.0, 0.0)));
        let camera_only = world.add(
            RigidBody::fixed()
                .with_position(Vec3::new(2.0, 0.0, 0.0))
                .with_shape(
                    CollisionShape::ball(0.5)
                        .with_masks(CollisionGroups::CAMERA, CollisionGroups::CAMERA),
                )
                .unwrap(),
        );

        let hits = world.cast_ray(Vec3::zeros(), Vec3::new(2.0, 0.0, 0.0), 100.0, CollisionGroups::DYNAMIC);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].shape.body, near);
        assert_eq!(hits[1].shape.body, far);
        assert_relative_eq!(hits[0].distance, 4.0, epsilon = 1e-4);
        assert_relative_eq!(hits[1].distance, 9.0, epsilon = 1e-4);

        let all = world.cast_ray(Vec3::zeros(), Vec3::x(), 100.0, CollisionGroups::ALL);
        assert_eq!(all[0].shape.body, camera_only);

        // Disabled bodies are invisible to queries
        world.body_mut(near).unwrap().enabled = false;
        let hits = world.cast_ray(Vec3::zeros(), Vec3::x(), 100.0, CollisionGroups::DYNAMIC);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].shape.body, far);
    }

    #[test]
    fn test_cast_shape_ignores_own_body() {
        let mut world = zero_gravity();
        let mover = world.add(ball_at(Vec3::zeros()));
        let target = world.add(ball_at(Vec3::new(0.0, 0.0, 6.0)));
        let key = world.body(mover).unwrap().shape_ids().next().map(|id| ShapeKey::new(mover, id)).unwrap();

        let hits = world.cast_shape(key, Vec3::z(), 10.0).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].shape.body, target);
        assert_relative_eq!(hits[0].distance, 4.0, epsilon = 1e-4);
        assert_relative_eq!(hits[0].normal, -Vec3::z(), epsilon = 1e-4);
        assert_relative_eq!(hits[0].point, Vec3::new(0.0, 0.0, 5.0), epsilon = 1e-4);
    }

    #[test]
    fn test_moved_body_is_visible_to_queries_before_step() {
        let mut world = zero_gravity();
        let handle = world.add(ball_at(Vec3::zeros()));
        world.body_mut(handle).unwrap().position = Vec3::new(50.0, 0.0, 0.0);

        let hits = world.cast_ray(Vec3::new(40.0, 0.0, 0.0), Vec3::x(), 20.0, CollisionGroups::ALL);
        assert_eq!(hits.len(), 1);
        assert_relative_eq!(hits[0].distance, 9.0, epsilon = 1e-4);
    }

    #[test]
    fn test_free_flight_uses_single_substep() {
        let mut world = World::default();
        let handle = world.add(ball_at(Vec3::new(0.0, 10.0, 0.0)));
        world.step(0.5);

        assert_eq!(world.last_substeps(), &[0.5]);
        let body = world.body(handle).unwrap();
        // Gravity is applied after integration
        assert_relative_eq!(body.position.y, 10.0, epsilon = 1e-6);
        assert_relative_eq!(body.linear_velocity.y, -9.81 * 0.5, epsilon = 1e-5);
        assert_relative_eq!(world.time(), 0.5, epsilon = 1e-9);
    }
}
