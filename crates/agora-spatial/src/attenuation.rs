//! Distance attenuation
//!
//! Maps listener-source distance to a linear gain in `[0, 1]`: full gain up
//! to `min_distance`, silence beyond `max_distance`, and a logarithmic or
//! linear curve in between.

use serde::{Deserialize, Serialize};

use crate::EPSILON;

/// Default minimum distance (metres)
pub const DEFAULT_MIN_DISTANCE: f64 = 1.0;

/// Default maximum distance (metres)
pub const DEFAULT_MAX_DISTANCE: f64 = 1000.0;

/// Distance rolloff curve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RolloffModel {
    /// `1 / (d - min + 1)` rescaled to reach zero at `max`
    #[default]
    Logarithmic,
    /// Straight line from `min` to `max`
    Linear,
}

impl RolloffModel {
    /// Parse a model name; anything unrecognised falls back to logarithmic
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "logarithmic" => Self::Logarithmic,
            "linear" => Self::Linear,
            other => {
                log::warn!("unknown rolloff model {other:?}, using logarithmic");
                Self::Logarithmic
            }
        }
    }

    /// Model name as used in configuration
    pub fn name(&self) -> &'static str {
        match self {
            Self::Logarithmic => "logarithmic",
            Self::Linear => "linear",
        }
    }
}

impl From<String> for RolloffModel {
    fn from(name: String) -> Self {
        Self::from_name(&name)
    }
}

impl From<RolloffModel> for String {
    fn from(model: RolloffModel) -> Self {
        model.name().to_string()
    }
}

/// Gain for `distance` under `model`
///
/// Ranges narrower than [`EPSILON`](crate::EPSILON) skip the curve and keep
/// full gain.
pub fn distance_gain(model: RolloffModel, min_distance: f64, max_distance: f64, distance: f64) -> f64 {
    if distance <= min_distance {
        return 1.0;
    }
    if distance > max_distance {
        return 0.0;
    }

    let range = max_distance - min_distance;
    if range < EPSILON {
        return 1.0;
    }

    let gain = match model {
        RolloffModel::Logarithmic => {
            let floor = 1.0 / (range + 1.0);
            (1.0 / (distance - min_distance + 1.0) - floor) / (1.0 - floor)
        }
        RolloffModel::Linear => (max_distance - distance) / range,
    };
    gain.clamp(0.0, 1.0)
}

/// Per-source distance attenuation state
#[derive(Debug, Clone)]
pub struct Attenuation {
    min_distance: f64,
    max_distance: f64,
    rolloff: RolloffModel,
    distance: f64,
    gain: f64,
}

impl Attenuation {
    /// Create with the given limits; `max` below `min` is raised to `min`
    pub fn new(min_distance: f64, max_distance: f64, rolloff: RolloffModel) -> Self {
        let mut attenuation = Self {
            rolloff,
            ..Self::default()
        };
        attenuation.set_min_distance(min_distance);
        attenuation.set_max_distance(max_distance);
        attenuation
    }

    /// Update distance and return the new gain
    pub fn set_distance(&mut self, distance: f64) -> f64 {
        if distance.is_nan() {
            log::warn!("distance is NaN, keeping gain {}", self.gain);
            return self.gain;
        }
        self.distance = distance.max(0.0);
        self.recompute();
        self.gain
    }

    /// Set the full-gain radius
    pub fn set_min_distance(&mut self, min_distance: f64) {
        if min_distance.is_nan() || min_distance < 0.0 {
            log::warn!("invalid min distance {min_distance}, keeping {}", self.min_distance);
            return;
        }
        if min_distance > self.max_distance {
            log::warn!(
                "min distance {min_distance} above max distance {}, clamping",
                self.max_distance
            );
        }
        self.min_distance = min_distance.min(self.max_distance);
        self.recompute();
    }

    /// Set the silence radius
    pub fn set_max_distance(&mut self, max_distance: f64) {
        if max_distance.is_nan() || max_distance < 0.0 {
            log::warn!("invalid max distance {max_distance}, keeping {}", self.max_distance);
            return;
        }
        if max_distance < self.min_distance {
            log::warn!(
                "max distance {max_distance} below min distance {}, clamping",
                self.min_distance
            );
        }
        self.max_distance = max_distance.max(self.min_distance);
        self.recompute();
    }

    /// Set rolloff model
    pub fn set_rolloff(&mut self, rolloff: RolloffModel) {
        self.rolloff = rolloff;
        self.recompute();
    }

    /// Current gain
    pub fn gain(&self) -> f64 {
        self.gain
    }

    /// Last distance
    pub fn distance(&self) -> f64 {
        self.distance
    }

    /// Full-gain radius
    pub fn min_distance(&self) -> f64 {
        self.min_distance
    }

    /// Silence radius
    pub fn max_distance(&self) -> f64 {
        self.max_distance
    }

    /// Rolloff model
    pub fn rolloff(&self) -> RolloffModel {
        self.rolloff
    }

    fn recompute(&mut self) {
        self.gain = distance_gain(self.rolloff, self.min_distance, self.max_distance, self.distance);
    }
}

impl Default for Attenuation {
    fn default() -> Self {
        Self {
            min_distance: DEFAULT_MIN_DISTANCE,
            max_distance: DEFAULT_MAX_DISTANCE,
            rolloff: RolloffModel::Logarithmic,
            distance: 0.0,
            gain: 1.0,
        }
    }
}
