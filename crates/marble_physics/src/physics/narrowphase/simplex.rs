//! Simplex bookkeeping and closest-point sub-routines
//!
//! Each routine returns the point of the simplex closest to the origin along
//! with a bit mask of the vertices spanning the Voronoi feature it lies on.
//! Callers keep only those vertices.

use crate::foundation::math::{utils::DEGENERATE_EPSILON, Vec3};

/// Up to four Minkowski-difference points, stack allocated
#[derive(Debug, Clone, Copy, Default)]
pub struct Simplex {
    points: [Vec3; 4],
    len: usize,
}

impl Simplex {
    /// Simplex holding a single point
    pub fn from_point(point: Vec3) -> Self {
        let mut simplex = Self::default();
        simplex.push(point);
        simplex
    }

    /// Number of vertices
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the simplex has no vertices
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Vertices
    pub fn points(&self) -> &[Vec3] {
        &self.points[..self.len]
    }

    /// Append a vertex; ignored once the simplex is a tetrahedron
    pub fn push(&mut self, point: Vec3) {
        if self.len < 4 {
            self.points[self.len] = point;
            self.len += 1;
        }
    }

    /// Whether a vertex lies within `tolerance` of `point`
    pub fn contains(&self, point: &Vec3, tolerance: f32) -> bool {
        self.points()
            .iter()
            .any(|p| (p - point).norm_squared() <= tolerance * tolerance)
    }

    /// Shrink to the sub-simplex nearest the origin and return the closest point
    pub fn reduce(&mut self) -> Vec3 {
        let (closest, mask) = closest_point(self.points());
        self.retain(mask);
        closest
    }

    /// Keep the vertices selected by `mask`, preserving order
    pub fn retain(&mut self, mask: u8) {
        self.len = compact(&mut self.points, self.len, mask);
    }
}

/// Keep the entries of `items[..len]` selected by `mask`; returns the new length
pub(crate) fn compact<T: Copy>(items: &mut [T; 4], len: usize, mask: u8) -> usize {
    let mut kept = 0;
    for i in 0..len {
        if mask & (1 << i) != 0 {
            items[kept] = items[i];
            kept += 1;
        }
    }
    kept
}

/// Closest point to the origin on the convex hull of 1 to 4 points
pub(crate) fn closest_point(points: &[Vec3]) -> (Vec3, u8) {
    match *points {
        [a] => (a, 0b1),
        [a, b] => closest_on_segment(a, b),
        [a, b, c] => closest_on_triangle(a, b, c),
        [a, b, c, d] => closest_on_tetrahedron(a, b, c, d),
        _ => (Vec3::zeros(), 0),
    }
}

fn closest_on_segment(a: Vec3, b: Vec3) -> (Vec3, u8) {
    let ab = b - a;
    let denom = ab.norm_squared();
    if denom <= DEGENERATE_EPSILON {
        return (a, 0b01);
    }

    let t = -a.dot(&ab) / denom;
    if t <= 0.0 {
        (a, 0b01)
    } else if t >= 1.0 {
        (b, 0b10)
    } else {
        (a + ab * t, 0b11)
    }
}

/// Ericson, Real-Time Collision Detection 5.1.5, with the query point at the origin
fn closest_on_triangle(a: Vec3, b: Vec3, c: Vec3) -> (Vec3, u8) {
    let ab = b - a;
    let ac = c - a;

    let scale = ab.norm_squared().max(ac.norm_squared());
    if ab.cross(&ac).norm_squared() <= DEGENERATE_EPSILON * scale.max(1.0) {
        return closest_on_degenerate_triangle(a, b, c);
    }

    // Vertex region A
    let d1 = -ab.dot(&a);
    let d2 = -ac.dot(&a);
    if d1 <= 0.0 && d2 <= 0.0 {
        return (a, 0b001);
    }

    // Vertex region B
    let d3 = -ab.dot(&b);
    let d4 = -ac.dot(&b);
    if d3 >= 0.0 && d4 <= d3 {
        return (b, 0b010);
    }

    // Edge region AB
    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let v = d1 / (d1 - d3);
        return (a + ab * v, 0b011);
    }

    // Vertex region C
    let d5 = -ab.dot(&c);
    let d6 = -ac.dot(&c);
    if d6 >= 0.0 && d5 <= d6 {
        return (c, 0b100);
    }

    // Edge region AC
    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let w = d2 / (d2 - d6);
        return (a + ac * w, 0b101);
    }

    // Edge region BC
    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return (b + (c - b) * w, 0b110);
    }

    // Face region
    let denom = 1.0 / (va + vb + vc);
    let v = vb * denom;
    let w = vc * denom;
    (a + ab * v + ac * w, 0b111)
}

/// Collinear triangle: best of its three edges
fn closest_on_degenerate_triangle(a: Vec3, b: Vec3, c: Vec3) -> (Vec3, u8) {
    let candidates = [
        (closest_on_segment(a, b), [0, 1]),
        (closest_on_segment(a, c), [0, 2]),
        (closest_on_segment(b, c), [1, 2]),
    ];

    let mut best = (a, 0b001);
    let mut best_dist = f32::INFINITY;
    for ((point, local_mask), indices) in candidates {
        let dist = point.norm_squared();
        if dist < best_dist {
            best_dist = dist;
            best = (point, remap(local_mask, &indices));
        }
    }
    best
}

/// Ericson 5.1.6: test each face the origin lies outside of
fn closest_on_tetrahedron(a: Vec3, b: Vec3, c: Vec3, d: Vec3) -> (Vec3, u8) {
    let faces = [
        ([a, b, c], d, [0, 1, 2]),
        ([a, c, d], b, [0, 2, 3]),
        ([a, d, b], c, [0, 3, 1]),
        ([b, d, c], a, [1, 3, 2]),
    ];

    let mut best: Option<(Vec3, u8)> = None;
    let mut best_dist = f32::INFINITY;
    for ([p, q, r], opposite, indices) in faces {
        if !origin_outside_plane(p, q, r, opposite) {
            continue;
        }
        let (point, local_mask) = closest_on_triangle(p, q, r);
        let dist = point.norm_squared();
        if dist < best_dist {
            best_dist = dist;
            best = Some((point, remap(local_mask, &indices)));
        }
    }

    best.unwrap_or((Vec3::zeros(), 0b1111))
}

/// Origin and `opposite` lie on different sides of plane `pqr`
///
/// A flat tetrahedron reports every face as outside so the caller falls back
/// to the boundary triangles.
fn origin_outside_plane(p: Vec3, q: Vec3, r: Vec3, opposite: Vec3) -> bool {
    let n = (q - p).cross(&(r - p));
    let sign_origin = -p.dot(&n);
    let sign_opposite = (opposite - p).dot(&n);
    if sign_opposite * sign_opposite <= DEGENERATE_EPSILON * n.norm_squared().max(1.0) {
        return true;
    }
    sign_origin * sign_opposite < 0.0
}

/// Translate a mask over a sub-simplex into a mask over the parent simplex
fn remap<const N: usize>(local_mask: u8, indices: &[usize; N]) -> u8 {
    indices
        .iter()
        .enumerate()
        .filter(|(i, _)| local_mask & (1 << i) != 0)
        .fold(0, |mask, (_, index)| mask | (1 << index))
}
