//! Time-of-impact search for continuous collision detection

use crate::foundation::math::{Pose, Vec3};
use crate::physics::shape::{ShapeKind, ShapeView};
use super::raycast::cast_ray;
use super::MinkowskiDifference;

/// Relative motion below which a pair is treated as static
const TOI_MIN_MOTION: f32 = 1.0e-6;

/// A shape swept between its previous and current pose within one sub-step
#[derive(Debug, Clone, Copy)]
pub struct SweptShape<'a> {
    /// Geometry (the broadphase substitute when one is set)
    pub kind: &'a ShapeKind,
    /// Extra radius around the geometry
    pub margin: f32,
    /// Pose at the start of the sub-step
    pub previous: Pose,
    /// Pose at the end of the sub-step
    pub current: Pose,
}

impl<'a> SweptShape<'a> {
    /// View at the previous position with the current orientation
    ///
    /// The sweep is purely translational; rotation over the step is ignored.
    fn rewound(&self) -> ShapeView<'a> {
        ShapeView::new(
            self.kind,
            Pose::new(self.previous.position, self.current.orientation),
            self.margin,
        )
    }

    fn translation(&self) -> Vec3 {
        self.current.position - self.previous.position
    }
}

/// Fraction of the sub-step at which two swept shapes first touch
///
/// Both shapes are rewound to their previous positions and a ray is cast from
/// the origin along the negated relative translation against their Minkowski
/// difference. `margin` (a distance) is added past the exact contact so the
/// following narrow-phase sees a small overlap. Returns `None` when the
/// shapes do not meet within the sub-step; the result is clamped to `[0, 1]`.
pub fn determine_time_of_impact(a: &SweptShape, b: &SweptShape, margin: f32) -> Option<f32> {
    let relative = a.translation() - b.translation();
    let speed = relative.norm();

    let view_a = a.rewound();
    let view_b = b.rewound();
    let difference = MinkowskiDifference::new(&view_a, &view_b);
    let hit = cast_ray(&difference, &Vec3::zeros(), &-relative, 1.0)?;

    let slack = if speed > TOI_MIN_MOTION { margin / speed } else { 0.0 };
    Some((hit.lambda + slack).clamp(0.0, 1.0))
}
