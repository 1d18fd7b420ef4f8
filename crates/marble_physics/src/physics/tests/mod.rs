//! End-to-end scenarios driving the world through full steps

use std::cell::RefCell;
use std::rc::Rc;

use approx::assert_relative_eq;

use crate::config::PhysicsConfig;
use crate::foundation::math::Vec3;
use super::{BodyHooks, CollisionGroups, CollisionShape, RigidBody, ShapeKind, World};

fn zero_gravity() -> World {
    World::new(PhysicsConfig {
        gravity: Vec3::zeros(),
        ..PhysicsConfig::default()
    })
}

fn ball(radius: f32, position: Vec3, velocity: Vec3) -> RigidBody {
    RigidBody::dynamic()
        .with_position(position)
        .with_linear_velocity(velocity)
        .with_shape(CollisionShape::ball(radius))
        .unwrap()
}

/// Two fixed boxes meeting flush along the plane x = 0, top faces at y = 0
fn add_split_floor(world: &mut World) {
    for x in [-1.0, 1.0] {
        world.add(
            RigidBody::fixed()
                .with_position(Vec3::new(x, -0.5, 0.0))
                .with_shape(CollisionShape::cuboid(Vec3::new(1.0, 0.5, 1.0)))
                .unwrap(),
        );
    }
}

/// Records the time and contact-began flag of every response round
struct ImpactLog {
    name: &'static str,
    entries: Rc<RefCell<Vec<(&'static str, f64, bool)>>>,
}

impl BodyHooks for ImpactLog {
    fn on_before_collision_response(&mut self, body: &mut RigidBody, time: f64, _dt: f32) {
        if let Some(collision) = body.collisions().first() {
            self.entries.borrow_mut().push((self.name, time, collision.is_new));
        }
    }
}

#[test]
fn test_head_on_balls_collide_halfway() {
    let mut world = zero_gravity();
    let entries = Rc::new(RefCell::new(Vec::new()));

    let mut left = ball(1.0, Vec3::zeros(), Vec3::new(1.0, 0.0, 0.0));
    left.set_hooks(Box::new(ImpactLog { name: "left", entries: Rc::clone(&entries) }));
    let left = world.add(left);
    let right = world.add(ball(1.0, Vec3::new(3.0, 0.0, 0.0), Vec3::new(-1.0, 0.0, 0.0)));

    world.step(1.0);

    let entries = entries.borrow();
    assert_eq!(entries.len(), 1);
    let (_, time, is_new) = entries[0];
    assert_relative_eq!(time, 0.5, epsilon = 2e-3);
    assert!(is_new);

    assert!(world.body(left).unwrap().linear_velocity.x < 0.0);
    assert!(world.body(right).unwrap().linear_velocity.x > 0.0);

    // Momentum is conserved between equal masses
    let total = world.body(left).unwrap().linear_velocity + world.body(right).unwrap().linear_velocity;
    assert_relative_eq!(total, Vec3::zeros(), epsilon = 1e-5);
}

#[test]
fn test_substeps_sum_to_step() {
    let mut world = zero_gravity();
    world.add(ball(1.0, Vec3::zeros(), Vec3::new(1.0, 0.0, 0.0)));
    world.add(ball(1.0, Vec3::new(3.0, 0.0, 0.0), Vec3::new(-1.0, 0.0, 0.0)));

    world.step(1.0);

    assert!(world.last_substeps().len() >= 2);
    let total: f32 = world.last_substeps().iter().sum();
    assert_relative_eq!(total, 1.0, epsilon = 1e-5);
}

#[test]
fn test_fast_ball_does_not_tunnel_through_wall() {
    let mut world = zero_gravity();
    world.add(
        RigidBody::fixed()
            .with_shape(CollisionShape::cuboid(Vec3::new(0.05, 2.0, 2.0)))
            .unwrap(),
    );
    let bullet = world.add(ball(0.1, Vec3::new(-1.0, 0.0, 0.0), Vec3::new(100.0, 0.0, 0.0)));

    world.step(1.0 / 60.0);

    let body = world.body(bullet).unwrap();
    assert!(body.position.x < 0.0, "ball passed the wall: {}", body.position.x);
    assert!(body.linear_velocity.x < 0.0);
}

#[test]
fn test_ball_comes_to_rest_on_floor() {
    let mut world = World::default();
    world.add(
        RigidBody::fixed()
            .with_position(Vec3::new(0.0, -0.5, 0.0))
            .with_shape(CollisionShape::cuboid(Vec3::new(3.0, 0.5, 3.0)))
            .unwrap(),
    );
    let marble = world.add(ball(0.5, Vec3::new(0.0, 2.0, 0.0), Vec3::zeros()));

    let mut heights = Vec::new();
    for _ in 0..300 {
        world.step(1.0 / 60.0);
        heights.push(world.body(marble).unwrap().position.y);
    }

    let body = world.body(marble).unwrap();
    assert!(body.linear_velocity.y.abs() < 0.05, "still moving: {}", body.linear_velocity.y);

    // Settled just above the floor with no residual bouncing
    let tail = &heights[heights.len() - 60..];
    for &y in tail {
        assert!(y > 0.45 && y < 0.52, "height {y}");
    }
    let spread = tail.iter().copied().fold(f32::MIN, f32::max) - tail.iter().copied().fold(f32::MAX, f32::min);
    assert!(spread < 1e-2);
}

#[test]
fn test_contact_began_flag() {
    let mut world = zero_gravity();
    let entries = Rc::new(RefCell::new(Vec::new()));

    let mut first = ball(1.0, Vec3::zeros(), Vec3::zeros());
    first.set_hooks(Box::new(ImpactLog { name: "first", entries: Rc::clone(&entries) }));
    world.add(first);
    world.add(ball(1.0, Vec3::new(1.9, 0.0, 0.0), Vec3::zeros()));

    world.step(0.1);
    let first_step: Vec<bool> = entries.borrow_mut().drain(..).map(|(_, _, is_new)| is_new).collect();
    assert_eq!(first_step.first(), Some(&true));

    world.step(0.1);
    let second_step: Vec<bool> = entries.borrow().iter().map(|(_, _, is_new)| *is_new).collect();
    assert!(!second_step.is_empty());
    assert!(second_step.iter().all(|is_new| !is_new));
}

#[test]
fn test_response_hooks_follow_evaluation_order() {
    let mut world = zero_gravity();
    let entries = Rc::new(RefCell::new(Vec::new()));

    let mut late = ball(1.0, Vec3::zeros(), Vec3::zeros()).with_evaluation_order(5);
    late.set_hooks(Box::new(ImpactLog { name: "late", entries: Rc::clone(&entries) }));
    let mut early = ball(1.0, Vec3::new(1.9, 0.0, 0.0), Vec3::zeros()).with_evaluation_order(-1);
    early.set_hooks(Box::new(ImpactLog { name: "early", entries: Rc::clone(&entries) }));
    world.add(late);
    world.add(early);

    world.step(0.1);

    let names: Vec<&str> = entries.borrow().iter().map(|(name, _, _)| *name).collect();
    assert!(names.len() >= 2);
    assert_eq!(&names[..2], &["early", "late"]);
}

#[test]
fn test_disabled_body_is_ignored() {
    let mut world = zero_gravity();
    let awake = world.add(ball(1.0, Vec3::zeros(), Vec3::zeros()));
    let mut sleeping = ball(1.0, Vec3::new(1.5, 0.0, 0.0), Vec3::new(3.0, 0.0, 0.0));
    sleeping.enabled = false;
    let sleeping = world.add(sleeping);

    world.step(0.1);

    assert!(world.body(awake).unwrap().collisions().is_empty());
    assert_eq!(world.body(awake).unwrap().position, Vec3::zeros());
    assert_eq!(world.body(sleeping).unwrap().position, Vec3::new(1.5, 0.0, 0.0));
}

#[test]
fn test_response_mask_suppresses_impulse() {
    let mut world = zero_gravity();
    let ghost_shape = CollisionShape::ball(1.0).with_masks(CollisionGroups::ALL, CollisionGroups::TRIGGER);
    let ghost = world.add(
        RigidBody::dynamic()
            .with_linear_velocity(Vec3::new(1.0, 0.0, 0.0))
            .with_shape(ghost_shape)
            .unwrap(),
    );
    let solid = world.add(
        RigidBody::dynamic()
            .with_position(Vec3::new(3.0, 0.0, 0.0))
            .with_linear_velocity(Vec3::new(-1.0, 0.0, 0.0))
            .with_shape(CollisionShape::ball(1.0).with_masks(CollisionGroups::ALL, CollisionGroups::DYNAMIC))
            .unwrap(),
    );

    world.step(1.0);

    // Detected but not resolved: both keep moving through each other
    assert_eq!(world.body(ghost).unwrap().linear_velocity, Vec3::new(1.0, 0.0, 0.0));
    assert_eq!(world.body(solid).unwrap().linear_velocity, Vec3::new(-1.0, 0.0, 0.0));
    assert!(!world.body(ghost).unwrap().collisions().is_empty());
}

#[test]
fn test_world_ray_hits_ball() {
    let mut world = zero_gravity();
    world.add(
        RigidBody::fixed()
            .with_position(Vec3::new(5.0, 0.0, 0.0))
            .with_shape(CollisionShape::ball(1.0))
            .unwrap(),
    );

    let hits = world.cast_ray(Vec3::zeros(), Vec3::x(), 10.0, CollisionGroups::ALL);
    assert_eq!(hits.len(), 1);
    assert_relative_eq!(hits[0].distance, 4.0, epsilon = 1e-4);
    assert_relative_eq!(hits[0].normal, -Vec3::x(), epsilon = 1e-4);
    assert_relative_eq!(hits[0].point, Vec3::new(4.0, 0.0, 0.0), epsilon = 1e-4);
}

#[test]
fn test_seam_contacts_use_face_normal() {
    for x in [0.05, 0.02, -0.03] {
        let mut world = World::default();
        add_split_floor(&mut world);
        let marble = world.add(ball(0.5, Vec3::new(x, 0.43, 0.0), Vec3::zeros()));

        let collisions = world.update_collisions(marble).unwrap();
        assert_eq!(collisions.len(), 2, "x = {x}");
        for collision in collisions {
            assert_relative_eq!(collision.normal, Vec3::y(), epsilon = 1e-3);
            // Contact point sits under the ball, not on the box edge
            assert_relative_eq!(collision.point1.x, x, epsilon = 1e-3);
        }
    }
}

#[test]
fn test_ball_crosses_seam_without_hop() {
    let mut world = World::default();
    add_split_floor(&mut world);
    let marble = world.add(ball(0.5, Vec3::new(-0.25, 0.495, 0.0), Vec3::new(0.5, 0.0, 0.0)));

    for frame in 0..90 {
        world.step(1.0 / 60.0);
        let body = world.body(marble).unwrap();
        assert!(body.linear_velocity.y < 1e-3, "frame {frame}: upward velocity {}", body.linear_velocity.y);
        assert!(body.position.y < 0.5, "frame {frame}: lifted to {}", body.position.y);
    }

    assert!(world.body(marble).unwrap().position.x > 0.1);
}

#[test]
fn test_broadphase_substitute_stops_sweep_early() {
    let first_substep = |shape: CollisionShape| {
        let mut world = zero_gravity();
        world.add(
            RigidBody::fixed()
                .with_position(Vec3::new(4.0, 0.0, 0.0))
                .with_shape(CollisionShape::cuboid(Vec3::new(0.5, 2.0, 2.0)))
                .unwrap(),
        );
        world.add(
            RigidBody::dynamic()
                .with_linear_velocity(Vec3::new(6.0, 0.0, 0.0))
                .with_shape(shape)
                .unwrap(),
        );
        world.step(1.0);
        world.last_substeps()[0]
    };

    // Real ball touches the wall after 3 units of travel, the substitute after 2.5
    let real = first_substep(CollisionShape::ball(0.5));
    let padded = first_substep(CollisionShape::ball(0.5).with_broadphase_shape(ShapeKind::Ball { radius: 1.0 }));

    assert_relative_eq!(real, 0.5, epsilon = 2e-3);
    assert_relative_eq!(padded, 2.5 / 6.0, epsilon = 2e-3);
}
