//! Math utilities and types
//!
//! Provides fundamental math types for rigid-body simulation.

pub use nalgebra::{
    Vector3,
    Matrix3,
    Quaternion,
    Unit,
    UnitQuaternion,
};

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 3x3 matrix type
pub type Mat3 = Matrix3<f32>;

/// Quaternion type for rotations
pub type Quat = UnitQuaternion<f32>;

/// Rigid transform: position and orientation, no scale
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    /// Position in world space
    pub position: Vec3,

    /// Orientation quaternion
    pub orientation: Quat,
}

impl Default for Pose {
    fn default() -> Self {
        Self {
            position: Vec3::zeros(),
            orientation: Quat::identity(),
        }
    }
}

impl Pose {
    /// Create a new identity pose
    pub fn identity() -> Self {
        Self::default()
    }

    /// Create a pose with only position
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    /// Create a pose with position and orientation
    pub fn new(position: Vec3, orientation: Quat) -> Self {
        Self { position, orientation }
    }

    /// Map a body-local point to world space
    pub fn transform_point(&self, point: &Vec3) -> Vec3 {
        self.orientation * point + self.position
    }

    /// Rotate a body-local vector into world space
    pub fn transform_vector(&self, vector: &Vec3) -> Vec3 {
        self.orientation * vector
    }

    /// Rotate a world-space vector into body-local space
    pub fn inverse_transform_vector(&self, vector: &Vec3) -> Vec3 {
        self.orientation.inverse_transform_vector(vector)
    }

    /// Pose of a child given in this pose's local frame
    pub fn compose(&self, local: &Pose) -> Pose {
        Pose {
            position: self.transform_point(&local.position),
            orientation: self.orientation * local.orientation,
        }
    }

    /// Blend two poses: linear for position, spherical for orientation
    pub fn interpolate(&self, other: &Pose, t: f32) -> Pose {
        Pose {
            position: self.position.lerp(&other.position, t),
            orientation: utils::slerp(&self.orientation, &other.orientation, t),
        }
    }
}

/// Math utility functions
pub mod utils {
    use super::*;

    /// Squared length below which a vector is treated as zero
    pub const DEGENERATE_EPSILON: f32 = 1e-12;

    /// Linear interpolation
    pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
        a + (b - a) * t
    }

    /// Spherical interpolation that falls back to nlerp near antipodal inputs
    pub fn slerp(from: &Quat, to: &Quat, t: f32) -> Quat {
        from.try_slerp(to, t, 1.0e-6)
            .unwrap_or_else(|| from.nlerp(to, t))
    }

    /// Normalize a vector, returning `None` for (near) zero length
    pub fn try_normalize(v: &Vec3) -> Option<Vec3> {
        let len_sq = v.norm_squared();
        if len_sq <= DEGENERATE_EPSILON {
            None
        } else {
            Some(v / len_sq.sqrt())
        }
    }

    /// Unit vector perpendicular to `v` (which should be normalized)
    pub fn any_perpendicular(v: &Vec3) -> Vec3 {
        let t = if v.x.abs() > 0.57735 {
            Vec3::new(v.y, -v.x, 0.0)
        } else {
            Vec3::new(0.0, v.z, -v.y)
        };
        try_normalize(&t).unwrap_or_else(Vec3::x)
    }

    /// Cross-product matrix: `skew(a) * b == a.cross(&b)`
    pub fn skew(v: &Vec3) -> Mat3 {
        Mat3::new(
            0.0, -v.z, v.y,
            v.z, 0.0, -v.x,
            -v.y, v.x, 0.0,
        )
    }

    /// Orthonormal basis whose first column is `normal`
    pub fn contact_basis(normal: &Vec3) -> Mat3 {
        let tangent = any_perpendicular(normal);
        let bitangent = normal.cross(&tangent);
        Mat3::from_columns(&[*normal, tangent, bitangent])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const EPSILON: f32 = 1e-5;

    #[test]
    fn test_pose_round_trip_vector() {
        let pose = Pose::new(
            Vec3::new(1.0, 2.0, 3.0),
            Quat::from_axis_angle(&Vec3::y_axis(), 0.7),
        );
        let v = Vec3::new(0.3, -1.0, 2.0);
        let back = pose.inverse_transform_vector(&pose.transform_vector(&v));
        assert_relative_eq!(back, v, epsilon = EPSILON);
    }

    #[test]
    fn test_pose_interpolate_midpoint() {
        let a = Pose::from_position(Vec3::zeros());
        let b = Pose::new(
            Vec3::new(2.0, 0.0, 0.0),
            Quat::from_axis_angle(&Vec3::z_axis(), 1.0),
        );
        let mid = a.interpolate(&b, 0.5);
        assert_relative_eq!(mid.position, Vec3::new(1.0, 0.0, 0.0), epsilon = EPSILON);
        assert_relative_eq!(mid.orientation.angle(), 0.5, epsilon = EPSILON);
    }

    #[test]
    fn test_contact_basis_is_orthonormal() {
        let n = Vec3::new(0.2, -0.9, 0.4).normalize();
        let basis = utils::contact_basis(&n);
        assert_relative_eq!(basis.column(0).into_owned(), n, epsilon = EPSILON);
        assert_relative_eq!(basis.transpose() * basis, Mat3::identity(), epsilon = EPSILON);
    }

    #[test]
    fn test_skew_matches_cross() {
        let a = Vec3::new(1.0, -2.0, 0.5);
        let b = Vec3::new(0.3, 4.0, -1.0);
        assert_relative_eq!(utils::skew(&a) * b, a.cross(&b), epsilon = EPSILON);
    }
}
