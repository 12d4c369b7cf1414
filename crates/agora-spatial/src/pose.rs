//! 3D vectors, poses and direction conversions
//!
//! World frame is right-handed, in metres: `+x` forward, `+y` left, `+z` up.
//! That is the ambisonic frame, so azimuth is counter-clockwise from `+x`
//! (positive = left) and elevation is measured up from the horizontal plane.

use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

/// World-space vector (metres)
pub type Vec3 = Vector3<f64>;

/// Vectors shorter than this are treated as zero
pub const VECTOR_EPSILON: f64 = 1e-10;

/// Unit forward axis (`+x`)
pub fn forward_axis() -> Vec3 {
    Vec3::new(1.0, 0.0, 0.0)
}

/// Unit up axis (`+z`)
pub fn up_axis() -> Vec3 {
    Vec3::new(0.0, 0.0, 1.0)
}

/// Direction in degrees
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Direction {
    /// Azimuth in degrees (-180 to 180, positive = left)
    pub azimuth: f64,
    /// Elevation in degrees (-90 to 90, positive = up)
    pub elevation: f64,
}

impl Direction {
    /// Create new direction
    pub fn new(azimuth: f64, elevation: f64) -> Self {
        Self { azimuth, elevation }
    }

    /// Direction of a vector; a zero vector maps to straight ahead
    pub fn from_vector(v: &Vec3) -> Self {
        let horizontal = v.x.hypot(v.y);
        if horizontal < VECTOR_EPSILON && v.z.abs() < VECTOR_EPSILON {
            return Self::default();
        }
        Self {
            azimuth: v.y.atan2(v.x).to_degrees(),
            elevation: v.z.atan2(horizontal).to_degrees(),
        }
    }

    /// Unit vector pointing in this direction
    pub fn to_unit_vector(&self) -> Vec3 {
        let az = self.azimuth.to_radians();
        let el = self.elevation.to_radians();
        Vec3::new(el.cos() * az.cos(), el.cos() * az.sin(), el.sin())
    }
}

/// Normalize, or `None` for a (near) zero vector
pub fn try_normalize(v: &Vec3) -> Option<Vec3> {
    let norm = v.norm();
    if norm < VECTOR_EPSILON || !norm.is_finite() {
        None
    } else {
        Some(v / norm)
    }
}

/// Position plus forward/up orientation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    /// Position in world space
    pub position: Vec3,
    /// Unit forward vector
    pub forward: Vec3,
    /// Unit up vector, orthogonal to `forward`
    pub up: Vec3,
}

impl Pose {
    /// Pose at the origin facing `+x`
    pub fn identity() -> Self {
        Self {
            position: Vec3::zeros(),
            forward: forward_axis(),
            up: up_axis(),
        }
    }

    /// Replace the orientation; returns `false` (leaving it untouched) when
    /// the vectors are zero, non-finite or parallel
    pub fn set_orientation(&mut self, forward: &Vec3, up: &Vec3) -> bool {
        match orthonormal_basis(forward, up) {
            Some(basis) => {
                self.forward = basis.column(0).into_owned();
                self.up = basis.column(2).into_owned();
                true
            }
            None => false,
        }
    }

    /// Local-to-world rotation: columns are forward, left, up
    pub fn basis(&self) -> Matrix3<f64> {
        let left = self.up.cross(&self.forward);
        Matrix3::from_columns(&[self.forward, left, self.up])
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}

/// Build forward/left/up columns from a forward and an approximate up vector
pub fn orthonormal_basis(forward: &Vec3, up: &Vec3) -> Option<Matrix3<f64>> {
    let f = try_normalize(forward)?;
    let left = try_normalize(&up.cross(&f))?;
    let u = f.cross(&left);
    Some(Matrix3::from_columns(&[f, left, u]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_conversion() {
        let front = Direction::from_vector(&Vec3::new(2.0, 0.0, 0.0));
        assert!(front.azimuth.abs() < 1e-9);
        assert!(front.elevation.abs() < 1e-9);

        let left = Direction::from_vector(&Vec3::new(0.0, 3.0, 0.0));
        assert!((left.azimuth - 90.0).abs() < 1e-9);

        let above = Direction::from_vector(&Vec3::new(0.0, 0.0, 1.0));
        assert!((above.elevation - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_round_trip() {
        let original = Direction::new(-37.0, 21.0);
        let back = Direction::from_vector(&original.to_unit_vector());
        assert!((original.azimuth - back.azimuth).abs() < 1e-9);
        assert!((original.elevation - back.elevation).abs() < 1e-9);
    }

    #[test]
    fn test_zero_vector_is_front() {
        assert_eq!(Direction::from_vector(&Vec3::zeros()), Direction::default());
    }

    #[test]
    fn test_orientation_rejects_parallel() {
        let mut pose = Pose::identity();
        assert!(!pose.set_orientation(&Vec3::new(0.0, 0.0, 1.0), &Vec3::new(0.0, 0.0, 2.0)));
        assert_eq!(pose.forward, forward_axis());

        assert!(pose.set_orientation(&Vec3::new(0.0, 1.0, 0.0), &Vec3::new(0.3, 0.0, 1.0)));
        assert!((pose.forward - Vec3::new(0.0, 1.0, 0.0)).norm() < 1e-12);
        assert!(pose.forward.dot(&pose.up).abs() < 1e-12);
    }

    #[test]
    fn test_basis_is_right_handed() {
        let basis = Pose::identity().basis();
        assert!((basis - Matrix3::identity()).norm() < 1e-12);
        assert!((basis.determinant() - 1.0).abs() < 1e-12);
    }
}
