//! Source directivity
//!
//! A polar pattern `|(1 - alpha) + alpha cos θ|^sharpness` evaluated between
//! the source's forward vector and the direction towards the listener. The
//! result drives a one-pole lowpass on the source signal: off-axis listeners
//! hear a darker voice.

use std::f64::consts::PI;

use crate::EPSILON;
use crate::pose::{Vec3, try_normalize};

/// Default pattern blend (omnidirectional)
pub const DEFAULT_ALPHA: f64 = 0.0;

/// Default pattern exponent
pub const DEFAULT_SHARPNESS: f64 = 1.0;

/// Pattern coefficient for `cos_theta`; exactly 1 for an omni pattern
pub fn pattern_coefficient(alpha: f64, sharpness: f64, cos_theta: f64) -> f64 {
    if alpha < EPSILON {
        return 1.0;
    }
    ((1.0 - alpha) + alpha * cos_theta).abs().powf(sharpness).min(1.0)
}

/// Directivity state of one source
#[derive(Debug, Clone)]
pub struct Directivity {
    alpha: f64,
    sharpness: f64,
    cos_theta: f64,
    coefficient: f64,
}

impl Directivity {
    /// Create with a pattern (values are sanitised as in [`Self::set_pattern`])
    pub fn new(alpha: f64, sharpness: f64) -> Self {
        let mut directivity = Self::default();
        directivity.set_pattern(alpha, sharpness);
        directivity
    }

    /// `cos θ` between `forward` and `direction_to_listener`
    ///
    /// Either vector being zero counts as on-axis. Updates the coefficient.
    pub fn compute_angle(&mut self, forward: &Vec3, direction_to_listener: &Vec3) -> f64 {
        self.cos_theta = match (try_normalize(forward), try_normalize(direction_to_listener)) {
            (Some(f), Some(d)) => f.dot(&d).clamp(-1.0, 1.0),
            _ => 1.0,
        };
        self.recompute();
        self.cos_theta
    }

    /// Set pattern blend (`[0, 1]`) and exponent (`>= 1`)
    pub fn set_pattern(&mut self, alpha: f64, sharpness: f64) {
        self.alpha = if alpha.is_nan() {
            log::warn!("directivity alpha is NaN, using {DEFAULT_ALPHA}");
            DEFAULT_ALPHA
        } else {
            if !(0.0..=1.0).contains(&alpha) {
                log::warn!("directivity alpha {alpha} out of range, clamping");
            }
            alpha.clamp(0.0, 1.0)
        };
        self.sharpness = if sharpness.is_nan() {
            log::warn!("directivity sharpness is NaN, using {DEFAULT_SHARPNESS}");
            DEFAULT_SHARPNESS
        } else {
            if sharpness < 1.0 {
                log::warn!("directivity sharpness {sharpness} below 1, clamping");
            }
            sharpness.max(1.0)
        };
        self.recompute();
    }

    /// Current coefficient in `[0, 1]`
    pub fn coefficient(&self) -> f64 {
        self.coefficient
    }

    /// Last computed `cos θ`
    pub fn cos_theta(&self) -> f64 {
        self.cos_theta
    }

    /// Pattern blend
    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Pattern exponent
    pub fn sharpness(&self) -> f64 {
        self.sharpness
    }

    fn recompute(&mut self) {
        self.coefficient = pattern_coefficient(self.alpha, self.sharpness, self.cos_theta);
    }
}

impl Default for Directivity {
    fn default() -> Self {
        Self {
            alpha: DEFAULT_ALPHA,
            sharpness: DEFAULT_SHARPNESS,
            cos_theta: 1.0,
            coefficient: 1.0,
        }
    }
}

// ============ One-Pole Lowpass ============

/// `y[n] = y[n-1] + a (x[n] - y[n-1])` with the cutoff set from a
/// directivity coefficient (`cutoff = nyquist * coefficient`)
///
/// Coefficient 0 (a pattern null) closes the filter: output and state are
/// zero until the cutoff opens again.
#[derive(Debug, Clone)]
pub struct OnePoleLowpass {
    a: f32,
    state: f32,
}

impl OnePoleLowpass {
    /// Pass-through filter
    pub fn new() -> Self {
        Self { a: 1.0, state: 0.0 }
    }

    /// Map a coefficient in `[0, 1]` to the smoothing factor
    ///
    /// The pole `exp(-2π fc / fs)` is rescaled so that `fc = nyquist` gives
    /// exactly `a = 1`.
    pub fn smoothing_factor(coefficient: f64) -> f32 {
        let c = coefficient.clamp(0.0, 1.0);
        let floor = (-PI).exp();
        let pole = ((-PI * c).exp() - floor) / (1.0 - floor);
        (1.0 - pole).clamp(0.0, 1.0) as f32
    }

    /// Update cutoff
    pub fn set_coefficient(&mut self, coefficient: f64) {
        self.a = Self::smoothing_factor(coefficient);
    }

    /// Check if filter is transparent
    pub fn is_bypassed(&self) -> bool {
        self.a >= 1.0
    }

    /// Check if the cutoff is at 0 Hz
    pub fn is_closed(&self) -> bool {
        self.a <= 0.0
    }

    /// Filter in place
    pub fn process(&mut self, buffer: &mut [f32]) {
        if self.is_closed() {
            buffer.fill(0.0);
            self.state = 0.0;
            return;
        }
        if self.is_bypassed() {
            if let Some(&last) = buffer.last() {
                self.state = last;
            }
            return;
        }
        let a = self.a;
        let mut y = self.state;
        for sample in buffer.iter_mut() {
            y += a * (*sample - y);
            *sample = y;
        }
        self.state = y;
    }

    /// Clear state
    pub fn reset(&mut self) {
        self.state = 0.0;
    }
}

impl Default for OnePoleLowpass {
    fn default() -> Self {
        Self::new()
    }
}
