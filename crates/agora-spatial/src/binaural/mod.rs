//! Binaural rendering of the ambisonic bus
//!
//! Headphone output from the rotated HOA field:
//! - SH-domain HRIR filters, one per ACN channel (`HrirBuffer`)
//! - Uniformly partitioned FFT convolution (`PartitionedConvolver`)
//! - Left/right symmetric ear summation (`HoaConvolver`)
//! - Rendering modes for degraded and CPU-saving paths

mod convolver;
mod hrir;
mod renderer;

pub use convolver::{HoaConvolver, PartitionedConvolver};
pub use hrir::{HrirBuffer, right_ear_sign};
pub use renderer::BinauralRenderer;

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SpatialError;

/// How the bus reaches the two output channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderingMode {
    /// Rotate to the listener, then convolve
    #[default]
    Ambisonic,
    /// Convolve without rotation
    Direct,
    /// W channel straight to both ears
    Bypass,
    /// Silence
    Off,
}

impl FromStr for RenderingMode {
    type Err = SpatialError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ambisonic" => Ok(Self::Ambisonic),
            "direct" => Ok(Self::Direct),
            "bypass" => Ok(Self::Bypass),
            "off" => Ok(Self::Off),
            other => Err(SpatialError::InvalidConfig(format!("unknown rendering mode {other:?}"))),
        }
    }
}
