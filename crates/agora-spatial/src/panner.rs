//! Non-ambisonic fallback spatialization
//!
//! Sources that cannot use the binaural path are either panned between the
//! two output channels (equal power) or only attenuated. The same values are
//! exported as [`FallbackParams`] for hosts that play the stream themselves.

use std::f32::consts::FRAC_PI_4;

use serde::{Deserialize, Serialize};

use crate::pose::{Vec3, try_normalize};

/// Scalar gain/pan of a fallback source
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FallbackParams {
    /// Linear gain (input gain x attenuation)
    ///
    /// Directivity is not folded in; it acts through the source's lowpass.
    pub gain: f64,
    /// Stereo position, `-1` = hard left, `+1` = hard right
    pub pan: f64,
}

impl Default for FallbackParams {
    fn default() -> Self {
        Self { gain: 1.0, pan: 0.0 }
    }
}

/// Pan position for a listener-relative vector (`+y` is left)
pub fn pan_from_relative(relative: &Vec3) -> f64 {
    match try_normalize(relative) {
        Some(dir) => (-dir.y).clamp(-1.0, 1.0),
        None => 0.0,
    }
}

/// Equal-power gains `(left, right)` for a pan position
#[inline]
pub fn equal_power_gains(pan: f64) -> (f32, f32) {
    let pan = if pan.is_nan() { 0.0 } else { pan.clamp(-1.0, 1.0) } as f32;
    let angle = (pan + 1.0) * FRAC_PI_4;
    (angle.cos(), angle.sin())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_center_is_equal_power() {
        let (l, r) = equal_power_gains(0.0);
        assert!((l - r).abs() < 1e-6);
        assert!((l * l + r * r - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_hard_pans() {
        let (l, r) = equal_power_gains(-1.0);
        assert!((l - 1.0).abs() < 1e-6 && r.abs() < 1e-6);
        let (l, r) = equal_power_gains(1.0);
        assert!(l.abs() < 1e-6 && (r - 1.0).abs() < 1e-6);
        assert_eq!(equal_power_gains(f64::NAN), equal_power_gains(0.0));
    }

    #[test]
    fn test_pan_from_relative() {
        assert!((pan_from_relative(&Vec3::new(0.0, 2.0, 0.0)) + 1.0).abs() < 1e-12);
        assert!((pan_from_relative(&Vec3::new(0.0, -2.0, 0.0)) - 1.0).abs() < 1e-12);
        assert!(pan_from_relative(&Vec3::new(3.0, 0.0, 0.0)).abs() < 1e-12);
        assert_eq!(pan_from_relative(&Vec3::zeros()), 0.0);
    }
}
