//! Listener pose

use nalgebra::Matrix3;

use crate::pose::{Pose, Vec3};

/// The single listener of a scene
#[derive(Debug, Clone, Default)]
pub struct Listener {
    pose: Pose,
}

impl Listener {
    /// Listener at the origin facing `+x`
    pub fn new() -> Self {
        Self::default()
    }

    /// Current pose
    pub fn pose(&self) -> &Pose {
        &self.pose
    }

    /// Position in world space
    pub fn position(&self) -> Vec3 {
        self.pose.position
    }

    /// Unit forward vector
    pub fn forward(&self) -> Vec3 {
        self.pose.forward
    }

    /// Unit up vector
    pub fn up(&self) -> Vec3 {
        self.pose.up
    }

    /// Move the listener; non-finite positions are ignored
    pub fn set_position(&mut self, position: Vec3) {
        if position.iter().all(|v| v.is_finite()) {
            self.pose.position = position;
        } else {
            log::warn!("ignoring non-finite listener position {position:?}");
        }
    }

    /// Turn the listener; returns whether the orientation changed
    ///
    /// Degenerate input (zero or parallel vectors) keeps the previous
    /// orientation.
    pub fn set_orientation(&mut self, forward: &Vec3, up: &Vec3) -> bool {
        let previous = (self.pose.forward, self.pose.up);
        if !self.pose.set_orientation(forward, up) {
            log::warn!("degenerate listener orientation (forward {forward:?}, up {up:?}), keeping previous");
            return false;
        }
        previous != (self.pose.forward, self.pose.up)
    }

    /// Set pose from a column-major 4x4 matrix
    ///
    /// Column 0 is forward, column 2 is up, column 3 is the position.
    /// Returns whether the orientation changed.
    pub fn set_from_matrix(&mut self, matrix: &[f64; 16]) -> bool {
        let forward = Vec3::new(matrix[0], matrix[1], matrix[2]);
        let up = Vec3::new(matrix[8], matrix[9], matrix[10]);
        self.set_position(Vec3::new(matrix[12], matrix[13], matrix[14]));
        self.set_orientation(&forward, &up)
    }

    /// Express a world-space vector in the listener's frame
    pub fn world_to_listener(&self, v: &Vec3) -> Vec3 {
        self.pose.basis().transpose() * v
    }

    /// Rotation applied to the sound field (world -> listener)
    pub fn field_rotation(&self) -> Matrix3<f64> {
        self.pose.basis().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turning_left_puts_front_on_the_right() {
        let mut listener = Listener::new();
        assert!(listener.set_orientation(&Vec3::new(0.0, 1.0, 0.0), &Vec3::new(0.0, 0.0, 1.0)));

        let local = listener.world_to_listener(&Vec3::new(1.0, 0.0, 0.0));
        assert!((local - Vec3::new(0.0, -1.0, 0.0)).norm() < 1e-12);
    }

    #[test]
    fn test_degenerate_orientation_is_ignored() {
        let mut listener = Listener::new();
        assert!(!listener.set_orientation(&Vec3::zeros(), &Vec3::new(0.0, 0.0, 1.0)));
        assert_eq!(listener.forward(), Vec3::new(1.0, 0.0, 0.0));
        // Same orientation again is not a change
        assert!(!listener.set_orientation(&Vec3::new(2.0, 0.0, 0.0), &Vec3::new(0.0, 0.0, 3.0)));
    }

    #[test]
    fn test_from_matrix() {
        let mut listener = Listener::new();
        #[rustfmt::skip]
        let matrix = [
            0.0, 1.0, 0.0, 0.0, // forward = +y
            -1.0, 0.0, 0.0, 0.0,
            0.0, 0.0, 1.0, 0.0, // up = +z
            2.0, 3.0, 4.0, 1.0, // position
        ];
        assert!(listener.set_from_matrix(&matrix));
        assert_eq!(listener.position(), Vec3::new(2.0, 3.0, 4.0));
        assert!((listener.forward() - Vec3::new(0.0, 1.0, 0.0)).norm() < 1e-12);

        let rotation = listener.field_rotation();
        assert!((rotation * listener.forward() - Vec3::new(1.0, 0.0, 0.0)).norm() < 1e-12);
    }

    #[test]
    fn test_non_finite_position_ignored() {
        let mut listener = Listener::new();
        listener.set_position(Vec3::new(1.0, 2.0, 3.0));
        listener.set_position(Vec3::new(f64::NAN, 0.0, 0.0));
        assert_eq!(listener.position(), Vec3::new(1.0, 2.0, 3.0));
    }
}
