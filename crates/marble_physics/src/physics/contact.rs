//! Collision records
//!
//! A [`Collision`] lives for a single sub-step. The world stores the primary
//! record in the first body's list and its mirror in the second body's list,
//! so game hooks always see themselves as `shape1`.

use crate::foundation::collections::{BodyHandle, ShapeKey};
use crate::foundation::math::Vec3;
use super::narrowphase::ContactGeometry;

/// One pairwise contact found during a sub-step
#[derive(Debug, Clone, PartialEq)]
pub struct Collision {
    /// Shape of the body whose list holds this record
    pub shape1: ShapeKey,
    /// The other shape
    pub shape2: ShapeKey,
    /// Unit normal pointing toward `shape1`
    pub normal: Vec3,
    /// Penetration depth along the normal
    pub depth: f32,
    /// Contact point on `shape1` (support-derived)
    pub point1: Vec3,
    /// Contact point on `shape2` (support-derived)
    pub point2: Vec3,
    /// Combined friction coefficient
    pub friction: f32,
    /// Combined restitution coefficient
    pub restitution: f32,
    /// Friction of `shape1` after material overrides
    pub friction1: f32,
    /// Restitution of `shape1` after material overrides
    pub restitution1: f32,
    /// Friction of `shape2` after material overrides
    pub friction2: f32,
    /// Restitution of `shape2` after material overrides
    pub restitution2: f32,
    /// Sub-step fraction at which the contact was found
    pub time_of_impact: f32,
    /// The pair was not in contact during the previous sub-step
    pub is_new: bool,
}

impl Collision {
    /// Build a record from contact geometry and per-shape materials
    ///
    /// Combined coefficients are the products of the per-shape ones.
    pub fn new(
        shape1: ShapeKey,
        shape2: ShapeKey,
        geometry: &ContactGeometry,
        (friction1, restitution1): (f32, f32),
        (friction2, restitution2): (f32, f32),
    ) -> Self {
        Self {
            shape1,
            shape2,
            normal: geometry.normal,
            depth: geometry.depth,
            point1: geometry.point1,
            point2: geometry.point2,
            friction: friction1 * friction2,
            restitution: restitution1 * restitution2,
            friction1,
            restitution1,
            friction2,
            restitution2,
            time_of_impact: 1.0,
            is_new: true,
        }
    }

    /// Body owning `shape1`
    pub fn body1(&self) -> BodyHandle {
        self.shape1.body
    }

    /// Body owning `shape2`
    pub fn body2(&self) -> BodyHandle {
        self.shape2.body
    }

    /// The same contact seen from `shape2`
    pub fn mirrored(&self) -> Self {
        Self {
            shape1: self.shape2,
            shape2: self.shape1,
            normal: -self.normal,
            point1: self.point2,
            point2: self.point1,
            friction1: self.friction2,
            restitution1: self.restitution2,
            friction2: self.friction1,
            restitution2: self.restitution1,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::collections::{BodyHandle, ShapeId, SlotMap};

    #[test]
    fn test_mirrored_swaps_sides() {
        let mut bodies: SlotMap<BodyHandle, ()> = SlotMap::with_key();
        let a = ShapeKey::new(bodies.insert(()), ShapeId(0));
        let b = ShapeKey::new(bodies.insert(()), ShapeId(1));
        let geometry = ContactGeometry {
            normal: Vec3::y(),
            depth: 0.1,
            point1: Vec3::new(0.0, -0.1, 0.0),
            point2: Vec3::zeros(),
        };

        let collision = Collision::new(a, b, &geometry, (0.5, 0.2), (0.8, 0.5));
        assert_eq!(collision.friction, 0.4);
        assert_eq!(collision.restitution, 0.1);

        let mirrored = collision.mirrored();
        assert_eq!(mirrored.shape1, b);
        assert_eq!(mirrored.body2(), a.body);
        assert_eq!(mirrored.normal, -Vec3::y());
        assert_eq!(mirrored.point1, Vec3::zeros());
        assert_eq!(mirrored.friction1, 0.8);
        assert_eq!(mirrored.depth, 0.1);
        assert_eq!(mirrored.mirrored(), collision);
    }
}
