//! Scene configuration
//!
//! Every field has a default, so a JSON document only needs to name what it
//! changes. Out-of-range values are corrected where they are used (with a
//! warning); only values that make the scene impossible to build are errors.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::DEFAULT_TRANSITION_TIME;
use crate::attenuation::{DEFAULT_MAX_DISTANCE, DEFAULT_MIN_DISTANCE, RolloffModel};
use crate::binaural::RenderingMode;
use crate::directivity::{DEFAULT_ALPHA, DEFAULT_SHARPNESS};
use crate::error::{SpatialError, SpatialResult};
use crate::hoa::AmbisonicOrder;
use crate::smoothing::LinearRamp;
use crate::source::PlatformCapabilities;

/// Initial parameters of every new source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceDefaults {
    /// Linear input gain
    pub gain: f64,
    /// Full-gain radius (metres)
    pub min_distance: f64,
    /// Silence radius (metres)
    pub max_distance: f64,
    /// Distance curve
    pub rolloff: RolloffModel,
    /// Directivity blend, 0 = omni
    pub alpha: f64,
    /// Directivity exponent
    pub sharpness: f64,
    /// Source width (degrees)
    pub width: f64,
}

impl Default for SourceDefaults {
    fn default() -> Self {
        Self {
            gain: 1.0,
            min_distance: DEFAULT_MIN_DISTANCE,
            max_distance: DEFAULT_MAX_DISTANCE,
            rolloff: RolloffModel::Logarithmic,
            alpha: DEFAULT_ALPHA,
            sharpness: DEFAULT_SHARPNESS,
            width: 0.0,
        }
    }
}

/// Scene-wide configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// Sample rate (Hz)
    pub sample_rate: u32,
    /// Frames per audio block
    pub block_size: usize,
    /// Ambisonic order; clamped into `[1, 3]`
    pub ambisonic_order: f64,
    /// Ramp time for gain and rotation changes (seconds)
    pub transition_time: f64,
    /// Maximum simultaneous sources
    pub max_sources: usize,
    /// Slots in the control -> audio command ring
    pub command_capacity: usize,
    /// Samples buffered per source input
    pub input_capacity: usize,
    /// Initial rendering mode
    pub rendering_mode: RenderingMode,
    /// What the host platform can play
    pub capabilities: PlatformCapabilities,
    /// Initial source parameters
    pub source: SourceDefaults,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            block_size: 128,
            ambisonic_order: 1.0,
            transition_time: DEFAULT_TRANSITION_TIME,
            max_sources: 64,
            command_capacity: 1024,
            input_capacity: 8192,
            rendering_mode: RenderingMode::Ambisonic,
            capabilities: PlatformCapabilities::default(),
            source: SourceDefaults::default(),
        }
    }
}

impl SceneConfig {
    /// Parse from JSON
    pub fn from_json(json: &str) -> SpatialResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load JSON from disk
    pub fn from_file(path: impl AsRef<Path>) -> SpatialResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> SpatialResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reject values no scene can be built with
    pub fn validate(&self) -> SpatialResult<()> {
        if self.sample_rate == 0 {
            return Err(SpatialError::InvalidConfig("sample rate must be positive".into()));
        }
        if self.block_size == 0 {
            return Err(SpatialError::InvalidConfig("block size must be positive".into()));
        }
        if self.command_capacity == 0 {
            return Err(SpatialError::InvalidConfig("command capacity must be positive".into()));
        }
        if self.input_capacity < self.block_size {
            return Err(SpatialError::InvalidConfig(format!(
                "input capacity {} is smaller than one block ({})",
                self.input_capacity, self.block_size
            )));
        }
        Ok(())
    }

    /// Effective ambisonic order
    pub fn order(&self) -> AmbisonicOrder {
        AmbisonicOrder::clamped(self.ambisonic_order)
    }

    /// Ramp length in samples
    pub fn ramp_samples(&self) -> usize {
        LinearRamp::samples_for(self.transition_time, self.sample_rate as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SceneConfig::default();
        assert_eq!(config.sample_rate, 48000);
        assert_eq!(config.order(), AmbisonicOrder::First);
        assert_eq!(config.ramp_samples(), 6000);
        assert_eq!(config.source.rolloff, RolloffModel::Logarithmic);
        assert_eq!(config.source.max_distance, 1000.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json() {
        let config = SceneConfig::from_json(
            r#"{ "ambisonic_order": 3, "block_size": 256, "source": { "rolloff": "linear", "width": 45 } }"#,
        )
        .unwrap();
        assert_eq!(config.order(), AmbisonicOrder::Third);
        assert_eq!(config.block_size, 256);
        assert_eq!(config.source.rolloff, RolloffModel::Linear);
        assert_eq!(config.source.width, 45.0);
        assert_eq!(config.source.gain, 1.0);
        assert_eq!(config.sample_rate, 48000);
    }

    #[test]
    fn test_lenient_values() {
        let config = SceneConfig::from_json(r#"{ "ambisonic_order": 9, "source": { "rolloff": "cubic" } }"#).unwrap();
        assert_eq!(config.order(), AmbisonicOrder::Third);
        assert_eq!(config.source.rolloff, RolloffModel::Logarithmic);
    }

    #[test]
    fn test_invalid() {
        assert!(matches!(SceneConfig::from_json("{ not json"), Err(SpatialError::Config(_))));

        let config = SceneConfig {
            block_size: 0,
            ..SceneConfig::default()
        };
        assert!(matches!(config.validate(), Err(SpatialError::InvalidConfig(_))));

        let config = SceneConfig {
            input_capacity: 16,
            ..SceneConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_json_round_trip() {
        let config = SceneConfig {
            ambisonic_order: 2.0,
            rendering_mode: RenderingMode::Direct,
            ..SceneConfig::default()
        };
        let back = SceneConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(back, config);
    }
}
