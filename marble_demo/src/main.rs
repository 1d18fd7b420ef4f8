//! Marble drop demo
//!
//! Drops a handful of marbles onto a tilted ramp and a floor, stepping the
//! world at a fixed rate and logging every impact from the body hooks.
//!
//! Usage: `marble_drop [physics.toml|physics.ron]`

use marble_physics::prelude::*;
use rand::Rng;

const TICK: f32 = 1.0 / 60.0;
const SECONDS: u32 = 6;
const MARBLES: u64 = 12;

/// Logs hard impacts and keeps a tally per marble
struct MarbleHooks {
    id: u64,
    impacts: u32,
}

impl BodyHooks for MarbleHooks {
    fn on_before_collision_response(&mut self, body: &mut RigidBody, time: f64, _dt: f32) {
        for collision in body.collisions().iter().filter(|c| c.is_new) {
            self.impacts += 1;
            let speed = -body.linear_velocity.dot(&collision.normal);
            if speed > 1.0 {
                log::info!(
                    "marble {} hit at t={:.3}s, speed {:.2} m/s (impact #{})",
                    self.id,
                    time,
                    speed,
                    self.impacts
                );
            }
        }
    }
}

fn build_scene(world: &mut World) -> Result<Vec<BodyHandle>, PhysicsError> {
    world.add(
        RigidBody::fixed()
            .with_position(Vec3::new(0.0, -0.5, 0.0))
            .with_shape(
                CollisionShape::cuboid(Vec3::new(8.0, 0.5, 8.0))
                    .with_masks(CollisionGroups::ENVIRONMENT | CollisionGroups::DYNAMIC, CollisionGroups::ALL)
                    .with_friction(0.6)
                    .with_restitution(0.4),
            )?,
    );

    // Slippery ramp top, grippy sides
    let ramp = CollisionShape::cuboid(Vec3::new(3.0, 0.1, 1.5))
        .with_material_override(MaterialOverride::new(Vec3::y(), 0.05, 0.2));
    world.add(
        RigidBody::fixed()
            .with_position(Vec3::new(0.0, 2.0, 0.0))
            .with_orientation(Quat::from_axis_angle(&Vec3::z_axis(), -0.3))
            .with_shape(ramp)?,
    );

    let mut rng = rand::thread_rng();
    let mut marbles = Vec::new();
    for id in 0..MARBLES {
        let position = Vec3::new(
            rng.gen_range(-2.5..2.5),
            rng.gen_range(4.0..8.0),
            rng.gen_range(-1.0..1.0),
        );
        let mut marble = RigidBody::dynamic()
            .with_position(position)
            .with_user_data(id)
            .with_shape(
                CollisionShape::ball(0.2)
                    .with_mass(0.05)?
                    .with_restitution(0.7)
                    .with_user_data(id),
            )?;
        marble.set_hooks(Box::new(MarbleHooks { id, impacts: 0 }));
        marbles.push(world.add(marble));
    }

    Ok(marbles)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    marble_physics::foundation::logging::init();

    let config = match std::env::args().nth(1) {
        Some(path) => {
            log::info!("Loading physics config from {}", path);
            PhysicsConfig::load_from_file(&path)?
        }
        None => PhysicsConfig::default(),
    };

    let mut world = World::new(config);
    let marbles = build_scene(&mut world)?;
    log::info!("Scene ready: {} bodies, {} marbles", world.len(), marbles.len());

    let mut max_substeps = 0;
    for _ in 0..SECONDS * 60 {
        world.step(TICK);
        max_substeps = max_substeps.max(world.last_substeps().len());
    }

    for handle in &marbles {
        if let Some(body) = world.body(*handle) {
            log::info!(
                "marble {} rests at ({:.2}, {:.2}, {:.2})",
                body.user_data,
                body.position.x,
                body.position.y,
                body.position.z
            );
        }
    }

    // Probe straight down from above the ramp
    let hits = world.cast_ray(Vec3::new(0.0, 10.0, 0.0), -Vec3::y(), 20.0, CollisionGroups::ALL);
    if let Some(hit) = hits.first() {
        log::info!("Ray from above first hits at distance {:.2}, normal {:?}", hit.distance, hit.normal);
    }

    log::info!(
        "Simulated {:.1}s, at most {} sub-steps per tick",
        world.time(),
        max_substeps
    );
    Ok(())
}
