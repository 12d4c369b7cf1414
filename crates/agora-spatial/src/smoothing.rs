//! Linear parameter ramps
//!
//! Targets arrive from the control path (through the scene command ring) and
//! are reached at a constant rate inside the audio callback:
//! - fixed ramp length in samples, derived from the transition time
//! - retargeting mid-ramp restarts from the current value
//! - zero allocation, one add per sample while ramping

// ============ Linear Ramp ============

/// Gain that moves linearly towards its target
#[derive(Debug, Clone)]
pub struct LinearRamp {
    /// Current value
    current: f32,
    /// Value being approached
    target: f32,
    /// Per-sample increment
    step: f32,
    /// Samples left in the current ramp
    remaining: usize,
    /// Ramp length in samples
    ramp_samples: usize,
}

impl LinearRamp {
    /// Create a settled ramp
    pub fn new(initial: f32, ramp_samples: usize) -> Self {
        Self {
            current: initial,
            target: initial,
            step: 0.0,
            remaining: 0,
            ramp_samples,
        }
    }

    /// Ramp length for a transition time in seconds
    pub fn samples_for(transition_time: f64, sample_rate: f64) -> usize {
        if transition_time.is_finite() && transition_time > 0.0 {
            (transition_time * sample_rate).round() as usize
        } else {
            0
        }
    }

    /// Change ramp length; an active ramp keeps its old step
    pub fn set_ramp_samples(&mut self, ramp_samples: usize) {
        self.ramp_samples = ramp_samples;
    }

    /// Start ramping towards `target`
    #[inline]
    pub fn set_target(&mut self, target: f32) {
        if target == self.target {
            return;
        }
        self.target = target;
        if self.ramp_samples == 0 {
            self.set_immediate(target);
        } else {
            self.remaining = self.ramp_samples;
            self.step = (target - self.current) / self.ramp_samples as f32;
        }
    }

    /// Jump to `value` with no ramp
    pub fn set_immediate(&mut self, value: f32) {
        self.current = value;
        self.target = value;
        self.step = 0.0;
        self.remaining = 0;
    }

    /// Current value
    #[inline]
    pub fn current(&self) -> f32 {
        self.current
    }

    /// Target value
    #[inline]
    pub fn target(&self) -> f32 {
        self.target
    }

    /// Check if ramp is active
    #[inline]
    pub fn is_ramping(&self) -> bool {
        self.remaining > 0
    }

    /// Advance one sample
    #[inline]
    pub fn next(&mut self) -> f32 {
        if self.remaining > 0 {
            self.remaining -= 1;
            if self.remaining == 0 {
                self.current = self.target;
            } else {
                self.current += self.step;
            }
        }
        self.current
    }

    /// Multiply `buffer` by the ramp, sample by sample
    pub fn apply(&mut self, buffer: &mut [f32]) {
        if !self.is_ramping() {
            let gain = self.current;
            if gain != 1.0 {
                buffer.iter_mut().for_each(|s| *s *= gain);
            }
            return;
        }
        for sample in buffer.iter_mut() {
            *sample *= self.next();
        }
    }
}

// ============ Tests ============
