//! Expanding Polytope Algorithm
//!
//! Grows a closed triangle polytope inside the Minkowski difference, starting
//! from the terminal GJK simplex, until the face nearest the origin stops
//! moving. That face's normal scaled by its distance is the minimum
//! translation that resolves the overlap.

use crate::foundation::math::{utils, Vec3};
use crate::physics::shape::SupportMap;
use super::simplex::Simplex;

/// Iteration cap guarding against numerical non-termination
pub const EPA_MAX_ITERATIONS: usize = 64;

/// Distance improvement below which the nearest face is accepted
const EPA_TOLERANCE: f32 = 1.0e-4;

/// Minimum spread for a point to count as a new tetrahedron vertex
const EPA_SEED_EPSILON: f32 = 1.0e-5;

/// Polytope face with its outward unit normal and distance from the origin
#[derive(Debug, Clone, Copy)]
struct Face {
    indices: [usize; 3],
    normal: Vec3,
    distance: f32,
}

impl Face {
    /// Face with its normal oriented away from `interior`; `None` for slivers
    fn new(vertices: &[Vec3], indices: [usize; 3], interior: &Vec3) -> Option<Self> {
        let [a, b, c] = indices.map(|i| vertices[i]);
        let normal = utils::try_normalize(&(b - a).cross(&(c - a)))?;

        // Winding correction
        let (indices, normal) = if normal.dot(&(a - interior)) < 0.0 {
            ([indices[0], indices[2], indices[1]], -normal)
        } else {
            (indices, normal)
        };

        Some(Self {
            indices,
            normal,
            distance: normal.dot(&a),
        })
    }

    fn edges(&self) -> [[usize; 2]; 3] {
        let [a, b, c] = self.indices;
        [[a, b], [b, c], [c, a]]
    }
}

/// Record an edge of a removed face; an edge shared by two removed faces
/// cancels out, leaving only the silhouette
fn add_loose_edge(edges: &mut Vec<[usize; 2]>, [a, b]: [usize; 2]) {
    if let Some(position) = edges.iter().position(|e| *e == [b, a]) {
        edges.swap_remove(position);
    } else {
        edges.push([a, b]);
    }
}

/// Minimum separating vector for an intersecting pair
///
/// Returns `None` when the polytope degenerates or the iteration cap is hit.
pub fn epa<S: SupportMap>(shape: &S, simplex: &Simplex) -> Option<Vec3> {
    let mut vertices: Vec<Vec3> = simplex.points().to_vec();
    if !complete_tetrahedron(shape, &mut vertices) {
        log::trace!("EPA could not build a starting tetrahedron");
        return None;
    }

    let interior = vertices.iter().sum::<Vec3>() / 4.0;
    let mut faces = Vec::with_capacity(32);
    for indices in [[0, 1, 2], [0, 3, 1], [0, 2, 3], [1, 3, 2]] {
        faces.push(Face::new(&vertices, indices, &interior)?);
    }

    let mut loose_edges: Vec<[usize; 2]> = Vec::new();
    for _ in 0..EPA_MAX_ITERATIONS {
        let nearest = *faces
            .iter()
            .min_by(|a, b| a.distance.total_cmp(&b.distance))?;

        let support = shape.support(&nearest.normal);
        if support.dot(&nearest.normal) - nearest.distance < EPA_TOLERANCE {
            return Some(nearest.normal * nearest.distance);
        }

        let new_index = vertices.len();
        vertices.push(support);

        loose_edges.clear();
        faces.retain(|face| {
            let visible = face.normal.dot(&(support - vertices[face.indices[0]])) > 0.0;
            if visible {
                for edge in face.edges() {
                    add_loose_edge(&mut loose_edges, edge);
                }
            }
            !visible
        });

        for &[a, b] in &loose_edges {
            faces.push(Face::new(&vertices, [a, b, new_index], &interior)?);
        }
    }

    log::trace!("EPA hit its iteration cap; reporting no collision");
    None
}

/// Grow a 1-3 point simplex into a non-degenerate tetrahedron
fn complete_tetrahedron<S: SupportMap>(shape: &S, vertices: &mut Vec<Vec3>) -> bool {
    if vertices.len() == 1 {
        let axes = [Vec3::x(), -Vec3::x(), Vec3::y(), -Vec3::y(), Vec3::z(), -Vec3::z()];
        if let Some(w) = axes
            .iter()
            .map(|d| shape.support(d))
            .find(|w| (w - vertices[0]).norm() > EPA_SEED_EPSILON)
        {
            vertices.push(w);
        }
    }

    if vertices.len() == 2 {
        let Some(line) = utils::try_normalize(&(vertices[1] - vertices[0])) else {
            return false;
        };
        let perp = utils::any_perpendicular(&line);
        let other = line.cross(&perp);
        let origin = vertices[0];
        if let Some(w) = [perp, -perp, other, -other]
            .iter()
            .map(|d| shape.support(d))
            .find(|w| {
                let offset = w - origin;
                (offset - line * offset.dot(&line)).norm() > EPA_SEED_EPSILON
            })
        {
            vertices.push(w);
        }
    }

    if vertices.len() == 3 {
        let Some(normal) = utils::try_normalize(&(vertices[1] - vertices[0]).cross(&(vertices[2] - vertices[0]))) else {
            return false;
        };
        let origin = vertices[0];
        if let Some(w) = [normal, -normal]
            .iter()
            .map(|d| shape.support(d))
            .find(|w| (w - origin).dot(&normal).abs() > EPA_SEED_EPSILON)
        {
            vertices.push(w);
        }
    }

    if vertices.len() != 4 {
        return false;
    }

    let [a, b, c, d] = [vertices[0], vertices[1], vertices[2], vertices[3]];
    let volume = (b - a).cross(&(c - a)).dot(&(d - a)).abs();
    volume > EPA_SEED_EPSILON * EPA_SEED_EPSILON
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Pose;
    use crate::physics::narrowphase::{gjk, GjkResult, MinkowskiDifference};
    use crate::physics::shape::{ConvexHull, ShapeKind, ShapeView};
    use approx::assert_relative_eq;

    fn cube(half: f32) -> ShapeKind {
        ShapeKind::ConvexHull(ConvexHull::cuboid(Vec3::repeat(half)))
    }

    fn separating_vector(a: &ShapeView, b: &ShapeView) -> Vec3 {
        let md = MinkowskiDifference::new(a, b);
        match gjk(&md) {
            GjkResult::Intersecting(simplex) => epa(&md, &simplex).unwrap(),
            GjkResult::Separated { .. } => panic!("expected overlap"),
        }
    }

    #[test]
    fn test_epa_axis_aligned_boxes() {
        let kind = cube(1.0);
        let cases = [
            Vec3::new(1.5, 0.0, 0.0),
            Vec3::new(0.0, -1.8, 0.0),
            Vec3::new(0.2, 0.1, 1.9),
        ];

        for offset in cases {
            let mut pose_a = Pose::identity();
            let pose_b = Pose::from_position(offset);
            let msv = separating_vector(
                &ShapeView::new(&kind, pose_a, 0.0),
                &ShapeView::new(&kind, pose_b, 0.0),
            );

            // Depth along the dominant axis is 2 - |offset|
            let axis = offset.iamax();
            assert_relative_eq!(msv.abs()[axis], 2.0 - offset[axis].abs(), epsilon = 1e-3);
            assert!(msv.dot(&offset) > 0.0);

            pose_a.position -= msv * 1.01;
            let moved = ShapeView::new(&kind, pose_a, 0.0);
            let fixed = ShapeView::new(&kind, pose_b, 0.0);
            let md = MinkowskiDifference::new(&moved, &fixed);
            assert!(!gjk(&md).is_intersecting(), "still overlapping for {offset:?}");
        }
    }

    #[test]
    fn test_epa_seeds_from_touching_simplex() {
        // A single-point simplex still expands into a valid polytope
        let kind = cube(1.0);
        let a = ShapeView::new(&kind, Pose::identity(), 0.0);
        let b = ShapeView::new(&kind, Pose::from_position(Vec3::new(0.0, 0.0, 1.0)), 0.0);
        let md = MinkowskiDifference::new(&a, &b);
        let seed = Simplex::from_point(md.support(&Vec3::new(0.3, 0.2, 1.0)));
        let msv = epa(&md, &seed).unwrap();
        assert_relative_eq!(msv, Vec3::new(0.0, 0.0, 1.0), epsilon = 1e-3);
    }
}
