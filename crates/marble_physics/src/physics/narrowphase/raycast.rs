//! GJK ray and shape casting
//!
//! Follows van den Bergen, "Ray Casting against General Convex Objects with
//! Application to Continuous Collision Detection": the ray point `x` only ever
//! advances, and the simplex is rebuilt around it from stored support points
//! each iteration.

use crate::foundation::math::{utils, Vec3};
use crate::physics::shape::SupportMap;
use super::simplex::{closest_point, compact};
use super::MinkowskiDifference;

/// Iteration cap guarding against numerical non-termination
pub const RAYCAST_MAX_ITERATIONS: usize = 64;

/// Termination threshold relative to the simplex extent
const RAYCAST_REL_EPSILON: f32 = 1.0e-6;

/// Absolute floor for the termination threshold
const RAYCAST_ABS_EPSILON: f32 = 1.0e-10;

/// Result of a successful cast
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CastHit {
    /// Distance along the cast direction, in units of its length
    pub lambda: f32,
    /// Hit point in world space
    pub point: Vec3,
    /// Outward surface normal at the hit point
    pub normal: Vec3,
}

/// Cast a ray `origin + lambda * direction` against a convex shape
///
/// A ray starting inside the shape hits at `lambda = 0` with the normal
/// opposing the direction.
pub fn cast_ray<S: SupportMap>(
    shape: &S,
    origin: &Vec3,
    direction: &Vec3,
    max_lambda: f32,
) -> Option<CastHit> {
    let mut lambda = 0.0;
    let mut x = *origin;
    let mut normal = Vec3::zeros();

    let mut v = x - shape.support(direction);
    let mut supports = [Vec3::zeros(); 4];
    let mut len = 0;

    for _ in 0..RAYCAST_MAX_ITERATIONS {
        let p = shape.support(&v);
        let w = x - p;

        let mut advanced = false;
        let vw = v.dot(&w);
        if vw > 0.0 {
            let vr = v.dot(direction);
            if vr >= 0.0 {
                return None;
            }
            lambda -= vw / vr;
            if lambda > max_lambda {
                return None;
            }
            x = origin + direction * lambda;
            normal = v;
            advanced = true;
        }

        let duplicate = supports[..len].iter().any(|s| (s - p).norm_squared() <= RAYCAST_ABS_EPSILON);
        if duplicate && !advanced {
            break;
        }
        if !duplicate {
            supports[len] = p;
            len += 1;
        }

        // Simplex around the current ray point
        let mut points = [Vec3::zeros(); 4];
        let mut max_extent: f32 = 0.0;
        for (point, support) in points.iter_mut().zip(&supports[..len]) {
            *point = x - support;
            max_extent = max_extent.max(point.norm_squared());
        }
        let (closest, mask) = closest_point(&points[..len]);
        len = compact(&mut supports, len, mask);
        v = closest;

        let threshold = (RAYCAST_REL_EPSILON * max_extent).max(RAYCAST_ABS_EPSILON);
        if len == 4 || v.norm_squared() <= threshold {
            return Some(hit(lambda, x, &normal, direction));
        }
    }

    log::trace!("Ray cast hit its iteration cap; reporting no hit");
    None
}

fn hit(lambda: f32, point: Vec3, normal: &Vec3, direction: &Vec3) -> CastHit {
    let normal = utils::try_normalize(normal)
        .or_else(|| utils::try_normalize(&-direction))
        .unwrap_or_else(Vec3::y);
    CastHit { lambda, point, normal }
}

/// Sweep `moving` along `direction` against `target`
///
/// The returned point is where `moving` first touches `target`, after being
/// moved by `lambda * direction`; the normal is the target's surface normal.
pub fn cast_shape<A: SupportMap, B: SupportMap>(
    moving: &A,
    target: &B,
    direction: &Vec3,
    max_lambda: f32,
) -> Option<CastHit> {
    let difference = MinkowskiDifference::new(target, moving);
    let result = cast_ray(&difference, &Vec3::zeros(), direction, max_lambda)?;
    Some(CastHit {
        point: moving.support(&-result.normal) + direction * result.lambda,
        ..result
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Pose;
    use crate::physics::shape::{ConvexHull, ShapeKind, ShapeView};
    use approx::assert_relative_eq;

    #[test]
    fn test_ray_against_ball() {
        let ball = ShapeKind::Ball { radius: 1.0 };
        let view = ShapeView::new(&ball, Pose::from_position(Vec3::new(5.0, 0.0, 0.0)), 0.0);

        let hit = cast_ray(&view, &Vec3::zeros(), &Vec3::x(), 100.0).unwrap();
        assert_relative_eq!(hit.lambda, 4.0, epsilon = 1e-4);
        assert_relative_eq!(hit.normal, Vec3::new(-1.0, 0.0, 0.0), epsilon = 1e-4);
        assert_relative_eq!(hit.point, Vec3::new(4.0, 0.0, 0.0), epsilon = 1e-4);
    }

    #[test]
    fn test_ray_misses() {
        let ball = ShapeKind::Ball { radius: 1.0 };
        let view = ShapeView::new(&ball, Pose::from_position(Vec3::new(5.0, 3.0, 0.0)), 0.0);

        assert!(cast_ray(&view, &Vec3::zeros(), &Vec3::x(), 100.0).is_none());
        // Pointing away
        assert!(cast_ray(&view, &Vec3::zeros(), &-Vec3::x(), 100.0).is_none());
        // Too short
        let ahead = ShapeView::new(&ball, Pose::from_position(Vec3::new(5.0, 0.0, 0.0)), 0.0);
        assert!(cast_ray(&ahead, &Vec3::zeros(), &Vec3::x(), 3.5).is_none());
    }

    #[test]
    fn test_ray_against_box_face() {
        let cube = ShapeKind::ConvexHull(ConvexHull::cuboid(Vec3::repeat(1.0)));
        let view = ShapeView::new(&cube, Pose::identity(), 0.0);
        let origin = Vec3::new(0.3, 10.0, -0.2);

        let hit = cast_ray(&view, &origin, &-Vec3::y(), 50.0).unwrap();
        assert_relative_eq!(hit.lambda, 9.0, epsilon = 1e-3);
        assert_relative_eq!(hit.normal, Vec3::y(), epsilon = 1e-3);
    }

    #[test]
    fn test_ray_starting_inside() {
        let cube = ShapeKind::ConvexHull(ConvexHull::cuboid(Vec3::repeat(1.0)));
        let view = ShapeView::new(&cube, Pose::identity(), 0.0);

        let hit = cast_ray(&view, &Vec3::new(0.1, 0.2, 0.0), &Vec3::x(), 5.0).unwrap();
        assert_eq!(hit.lambda, 0.0);
        assert_relative_eq!(hit.normal, -Vec3::x(), epsilon = 1e-6);
    }

    #[test]
    fn test_shape_cast_ball_onto_box() {
        let cube = ShapeKind::ConvexHull(ConvexHull::cuboid(Vec3::repeat(1.0)));
        let ball = ShapeKind::Ball { radius: 0.5 };
        let target = ShapeView::new(&cube, Pose::identity(), 0.0);
        let moving = ShapeView::new(&ball, Pose::from_position(Vec3::new(0.0, 5.0, 0.0)), 0.0);

        let hit = cast_shape(&moving, &target, &-Vec3::y(), 10.0).unwrap();
        assert_relative_eq!(hit.lambda, 3.5, epsilon = 1e-3);
        assert_relative_eq!(hit.normal, Vec3::y(), epsilon = 1e-3);
        assert_relative_eq!(hit.point, Vec3::new(0.0, 1.0, 0.0), epsilon = 1e-3);
    }
}
