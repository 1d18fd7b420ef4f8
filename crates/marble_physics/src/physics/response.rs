//! Impulse-based collision response
//!
//! Velocity is resolved in contact space: the first basis axis is the contact
//! normal, the other two span the tangent plane. Coulomb friction clamps the
//! tangential impulse to the friction cone. Position correction is a separate
//! Baumgarte-style nudge of the first body along the normal.

use crate::config::SolverConfig;
use crate::foundation::math::{utils, Mat3, Vec3};
use super::body::RigidBody;
use super::contact::Collision;

/// Resolve the relative velocity of a contact with a single impulse
///
/// `body1` and `body2` own `collision.shape1` and `collision.shape2`. Returns
/// whether an impulse was applied; separating contacts are left alone.
pub fn solve_velocity(
    collision: &Collision,
    body1: &mut RigidBody,
    body2: &mut RigidBody,
    config: &SolverConfig,
) -> bool {
    let r1 = collision.point1 - body1.position;
    let r2 = collision.point2 - body2.position;

    let velocity1 = body1.linear_velocity + body1.angular_velocity.cross(&r1);
    let velocity2 = body2.linear_velocity + body2.angular_velocity.cross(&r2);
    let relative_velocity = velocity1 - velocity2;

    // Velocity change per unit impulse, for body1 pushed along +P and body2 along -P
    let skew1 = utils::skew(&r1);
    let skew2 = utils::skew(&r2);
    let world_compliance = Mat3::from_diagonal_element(body1.inverse_mass() + body2.inverse_mass())
        - skew1 * body1.world_inverse_inertia() * skew1
        - skew2 * body2.world_inverse_inertia() * skew2;

    let basis = utils::contact_basis(&collision.normal);
    let compliance = basis.transpose() * world_compliance * basis;
    let contact_velocity = basis.transpose() * relative_velocity;

    if contact_velocity.x >= config.separating_velocity {
        return false;
    }

    let Some(inverse_compliance) = compliance.try_inverse() else {
        return false;
    };

    let restitution = if -contact_velocity.x < config.restitution_cutoff_speed {
        0.0
    } else {
        collision.restitution
    };

    let desired = Vec3::new(
        -(1.0 + restitution) * contact_velocity.x,
        -contact_velocity.y,
        -contact_velocity.z,
    );
    let mut impulse = inverse_compliance * desired;

    // Coulomb cone
    let planar = impulse.y.hypot(impulse.z);
    if planar > collision.friction * impulse.x {
        let direction = Vec3::new(
            1.0,
            collision.friction * impulse.y / planar,
            collision.friction * impulse.z / planar,
        );
        let normal_response = compliance.row(0).transpose().dot(&direction);
        if normal_response.abs() <= f32::EPSILON {
            return false;
        }
        impulse = direction * (desired.x / normal_response);
    }

    if !impulse.iter().all(|c| c.is_finite()) {
        return false;
    }

    let world_impulse = basis * impulse;
    body1.apply_impulse(&world_impulse, &r1);
    body2.apply_impulse(&-world_impulse, &r2);
    true
}

/// Push the first body out along the normal by part of the excess penetration
///
/// Returns the applied translation.
pub fn solve_position(collision: &Collision, body1: &mut RigidBody, config: &SolverConfig) -> Vec3 {
    if !body1.is_dynamic() || collision.depth <= config.penetration_slop {
        return Vec3::zeros();
    }

    let correction = collision.normal * ((collision.depth - config.penetration_slop) * config.position_correction);
    body1.position += correction;
    correction
}
