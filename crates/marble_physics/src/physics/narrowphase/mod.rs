//! Narrow-phase collision detection
//!
//! Stateless algorithms over support functions:
//! - [`check_intersection`]: boolean overlap test (GJK, closed form for balls)
//! - [`determine_minimum_separating_vector`]: penetration vector (EPA)
//! - [`collide`]: contact normal, depth and points for an overlapping pair
//! - [`cast_ray`] / [`cast_shape`]: GJK ray casting
//! - [`determine_time_of_impact`]: CCD sweep test
//!
//! All scratch state lives on the stack of each call, so the routines are
//! re-entrant.

mod simplex;
mod gjk;
mod epa;
mod raycast;
mod toi;

pub use simplex::Simplex;
pub use gjk::{gjk, GjkResult, GJK_MAX_ITERATIONS};
pub use epa::{epa, EPA_MAX_ITERATIONS};
pub use raycast::{cast_ray, cast_shape, CastHit, RAYCAST_MAX_ITERATIONS};
pub use toi::{determine_time_of_impact, SweptShape};

use crate::foundation::math::{utils, Vec3};
use super::shape::{ShapeView, SupportMap};

/// Minkowski difference `first - second` of two support-mapped shapes
#[derive(Debug, Clone, Copy)]
pub struct MinkowskiDifference<'a, A, B> {
    /// Minuend
    pub first: &'a A,
    /// Subtrahend
    pub second: &'a B,
}

impl<'a, A, B> MinkowskiDifference<'a, A, B> {
    /// Create a new difference
    pub fn new(first: &'a A, second: &'a B) -> Self {
        Self { first, second }
    }
}

impl<A: SupportMap, B: SupportMap> SupportMap for MinkowskiDifference<'_, A, B> {
    fn support(&self, direction: &Vec3) -> Vec3 {
        self.first.support(direction) - self.second.support(&-direction)
    }
}

/// Geometric description of one overlapping pair
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactGeometry {
    /// Unit normal pointing from the second shape toward the first
    pub normal: Vec3,
    /// Penetration depth along the normal
    pub depth: f32,
    /// Deepest point of the first shape
    pub point1: Vec3,
    /// Deepest point of the second shape
    pub point2: Vec3,
}

/// Whether two shapes overlap (touching counts)
pub fn check_intersection(a: &ShapeView, b: &ShapeView) -> bool {
    if let (Some((ca, ra)), Some((cb, rb))) = (a.as_ball(), b.as_ball()) {
        return (ca - cb).norm() <= ra + rb;
    }
    gjk(&MinkowskiDifference::new(a, b)).is_intersecting()
}

/// Vector whose subtraction from `a`'s position resolves the overlap
///
/// `None` when the shapes are separated or the penetration solver gives up.
pub fn determine_minimum_separating_vector(a: &ShapeView, b: &ShapeView) -> Option<Vec3> {
    if let (Some((ca, ra)), Some((cb, rb))) = (a.as_ball(), b.as_ball()) {
        let offset = ca - cb;
        let distance = offset.norm();
        if distance > ra + rb {
            return None;
        }
        let normal = utils::try_normalize(&offset).unwrap_or_else(Vec3::y);
        return Some(-normal * (ra + rb - distance));
    }

    let difference = MinkowskiDifference::new(a, b);
    match gjk(&difference) {
        GjkResult::Intersecting(simplex) => epa(&difference, &simplex),
        GjkResult::Separated { .. } => None,
    }
}

/// Contact normal, depth and points for two overlapping shapes
///
/// Contact points come from the support functions, so they are exact only for
/// balls. Exactly touching pairs (zero depth) report no contact.
pub fn collide(a: &ShapeView, b: &ShapeView) -> Option<ContactGeometry> {
    let msv = determine_minimum_separating_vector(a, b)?;
    let depth = msv.norm();
    let normal = -utils::try_normalize(&msv)?;

    Some(ContactGeometry {
        normal,
        depth,
        point1: a.support(&-normal),
        point2: b.support(&normal),
    })
}
