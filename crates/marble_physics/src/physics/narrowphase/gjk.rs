//! Gilbert–Johnson–Keerthi intersection test
//!
//! Works on any [`SupportMap`], normally the Minkowski difference of two
//! shapes. The simplex is reduced to the feature closest to the origin every
//! iteration and the next search direction is the negated closest point.

use crate::foundation::math::Vec3;
use crate::physics::shape::SupportMap;
use super::simplex::Simplex;

/// Iteration cap guarding against numerical non-termination
pub const GJK_MAX_ITERATIONS: usize = 64;

/// Closest-point length (squared) treated as touching the origin
const GJK_ABS_EPSILON: f32 = 1.0e-10;

/// Relative progress below which the search stops
const GJK_REL_EPSILON: f32 = 1.0e-6;

/// Outcome of a GJK run
#[derive(Debug, Clone, Copy)]
pub enum GjkResult {
    /// The origin is enclosed; the terminal simplex seeds EPA
    Intersecting(Simplex),

    /// The origin is outside. For `closest = v` no point `x` of the shape has
    /// `x·v < 0`, so `-v` witnesses the separation.
    Separated {
        /// Last closest point on the simplex
        closest: Vec3,
    },
}

impl GjkResult {
    /// Whether the run ended enclosing the origin
    pub fn is_intersecting(&self) -> bool {
        matches!(self, Self::Intersecting(_))
    }
}

/// Run GJK against the origin
pub fn gjk<S: SupportMap>(shape: &S) -> GjkResult {
    let mut simplex = Simplex::from_point(shape.support(&Vec3::x()));
    let mut v = simplex.points()[0];

    for _ in 0..GJK_MAX_ITERATIONS {
        v = simplex.reduce();
        let v_len_sq = v.norm_squared();
        if simplex.len() == 4 || v_len_sq <= GJK_ABS_EPSILON {
            return GjkResult::Intersecting(simplex);
        }

        let direction = -v;
        let w = shape.support(&direction);
        let progress = w.dot(&direction);

        // Support point fails to pass the origin
        if progress < 0.0 {
            return GjkResult::Separated { closest: v };
        }

        // No meaningful improvement on the closest distance
        if v_len_sq + progress <= GJK_REL_EPSILON * v_len_sq {
            return GjkResult::Separated { closest: v };
        }

        if simplex.contains(&w, 1.0e-7) {
            return GjkResult::Separated { closest: v };
        }

        simplex.push(w);
    }

    log::trace!("GJK hit its iteration cap; reporting no intersection");
    GjkResult::Separated { closest: v }
}
