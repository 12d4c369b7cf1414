//! Higher-Order Ambisonics (HOA) processing
//!
//! Orders 1 to 3 (4 to 16 channels), ACN ordering, SN3D normalization:
//! - Encoding: mono source to ambisonic channel gains (`Encoder`)
//! - Rotation: band matrices from a 3x3 rotation (`RotationMatrixEngine`)
//! - Applying rotation to audio blocks (`Rotator`)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use agora_spatial::hoa::{AmbisonicOrder, Encoder, RotationMatrixEngine};
//!
//! let mut encoder = Encoder::new(AmbisonicOrder::Third);
//! encoder.set_direction(45.0, 10.0);
//!
//! let mut rotation = RotationMatrixEngine::new(AmbisonicOrder::Third);
//! rotation.set_base_rotation(&listener.field_rotation());
//! ```

mod encoder;
mod rotation;
mod rotator;

pub use encoder::Encoder;
pub use rotation::{RotationMatrixEngine, band_offset, band_index, BAND_STORAGE};
pub use rotator::Rotator;

use serde::{Deserialize, Serialize};

use crate::error::{SpatialError, SpatialResult};
use crate::{MAX_CHANNELS, MAX_ORDER};

/// Ambisonic order (determines spatial resolution)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "usize", into = "usize")]
pub enum AmbisonicOrder {
    /// First order (4 channels)
    First = 1,
    /// Second order (9 channels)
    Second = 2,
    /// Third order (16 channels)
    Third = 3,
}

impl AmbisonicOrder {
    /// Get channel count for this order
    pub fn channel_count(&self) -> usize {
        let n = *self as usize;
        (n + 1) * (n + 1)
    }

    /// Create from order number
    pub fn from_order(order: usize) -> SpatialResult<Self> {
        match order {
            1 => Ok(AmbisonicOrder::First),
            2 => Ok(AmbisonicOrder::Second),
            3 => Ok(AmbisonicOrder::Third),
            _ => Err(SpatialError::InvalidConfig(format!(
                "ambisonic order {order} (supported: 1..={MAX_ORDER})"
            ))),
        }
    }

    /// Lenient conversion: clamp into `[1, 3]`, logging a warning when the
    /// value had to be corrected (NaN counts as the lower bound)
    pub fn clamped(order: f64) -> Self {
        if order.is_nan() {
            log::warn!("ambisonic order is NaN, using {}", Self::First.as_usize());
            return Self::First;
        }

        let rounded = order.round();
        let clamped = rounded.clamp(1.0, MAX_ORDER as f64);
        if clamped != order {
            log::warn!("ambisonic order {order} out of range, using {clamped}");
        }
        match clamped as usize {
            1 => Self::First,
            2 => Self::Second,
            _ => Self::Third,
        }
    }

    /// Get order number
    pub fn as_usize(&self) -> usize {
        *self as usize
    }
}

impl Default for AmbisonicOrder {
    fn default() -> Self {
        Self::First
    }
}

impl TryFrom<usize> for AmbisonicOrder {
    type Error = SpatialError;

    fn try_from(order: usize) -> SpatialResult<Self> {
        Self::from_order(order)
    }
}

impl From<AmbisonicOrder> for usize {
    fn from(order: AmbisonicOrder) -> usize {
        order.as_usize()
    }
}

/// ACN channel index from (degree, order index)
#[inline]
pub fn acn_index(degree: i32, index: i32) -> usize {
    (degree * degree + degree + index) as usize
}

/// Get (degree, order index) from ACN channel
pub fn acn_to_degree_index(acn: usize) -> (i32, i32) {
    let degree = (acn as f64).sqrt().floor() as i32;
    let index = acn as i32 - degree * degree - degree;
    (degree, index)
}

/// Pre-sized multichannel block for the ambisonic bus
#[derive(Debug, Clone)]
pub struct AmbisonicBuffer {
    channels: Vec<Vec<f32>>,
    frames: usize,
}

impl AmbisonicBuffer {
    /// Allocate `order.channel_count()` channels of `frames` samples
    pub fn new(order: AmbisonicOrder, frames: usize) -> Self {
        Self {
            channels: vec![vec![0.0; frames]; order.channel_count()],
            frames,
        }
    }

    /// Number of channels
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Samples per channel
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// One channel
    pub fn channel(&self, acn: usize) -> &[f32] {
        &self.channels[acn]
    }

    /// One channel, mutable
    pub fn channel_mut(&mut self, acn: usize) -> &mut [f32] {
        &mut self.channels[acn]
    }

    /// All channels
    pub fn channels(&self) -> &[Vec<f32>] {
        &self.channels
    }

    /// All channels, mutable
    pub fn channels_mut(&mut self) -> &mut [Vec<f32>] {
        &mut self.channels
    }

    /// Zero every channel
    pub fn clear(&mut self) {
        for ch in &mut self.channels {
            ch.fill(0.0);
        }
    }

    /// Copy another buffer of the same shape
    pub fn copy_from(&mut self, other: &AmbisonicBuffer) {
        for (dst, src) in self.channels.iter_mut().zip(&other.channels) {
            dst.copy_from_slice(src);
        }
    }
}

const _: () = assert!(MAX_CHANNELS == (MAX_ORDER + 1) * (MAX_ORDER + 1));
