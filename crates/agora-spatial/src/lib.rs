//! Agora Spatial Audio Engine
//!
//! Places mono participant streams of a shared virtual space around a
//! single listener and renders the mix to two ears.
//!
//! ## Higher-Order Ambisonics (HOA)
//! - Orders 1 to 3 (4 to 16 channels)
//! - ACN channel ordering, SN3D normalization
//! - Table-driven encoding with source width
//! - Listener rotation through per-band rotation matrices
//!
//! ## Binaural Processing
//! - Per-channel HRIR convolution (uniformly partitioned FFT)
//! - Left/right ear symmetry from one filter set
//!
//! ## Sources
//! - Distance attenuation (logarithmic / linear)
//! - Directivity with cone-style lowpass
//! - Stereo-pan and volume-only fallbacks
//!
//! ## Threading
//! `Scene` lives on the audio thread; `SceneController` sends it commands
//! through a lock-free ring and collects what it frees.
//!
//! Coordinates: `+x` forward, `+y` left, `+z` up. Angles in degrees,
//! azimuth counter-clockwise from `+x`.

pub mod attenuation;
pub mod binaural;
pub mod config;
pub mod directivity;
pub mod hoa;
pub mod listener;
pub mod panner;
pub mod pose;
pub mod scene;
pub mod smoothing;
pub mod source;
pub mod tables;

mod error;

pub use attenuation::{Attenuation, RolloffModel};
pub use binaural::{BinauralRenderer, HoaConvolver, HrirBuffer, RenderingMode};
pub use config::{SceneConfig, SourceDefaults};
pub use directivity::Directivity;
pub use error::{SpatialError, SpatialResult};
pub use hoa::{AmbisonicBuffer, AmbisonicOrder, Encoder, RotationMatrixEngine, Rotator};
pub use listener::Listener;
pub use panner::FallbackParams;
pub use pose::{Direction, Pose, Vec3};
pub use scene::{Garbage, Scene, SceneCommand, SceneController};
pub use source::{
    Lifecycle, PlatformCapabilities, Source, SourceId, SourceInput, SpatializerKind, StreamInfo,
};

/// Highest supported ambisonic order
pub const MAX_ORDER: usize = 3;

/// Channels at `MAX_ORDER`
pub const MAX_CHANNELS: usize = (MAX_ORDER + 1) * (MAX_ORDER + 1);

/// Threshold below which a value counts as zero
pub const EPSILON: f64 = 1e-8;

/// Default ramp time for parameter changes (seconds)
pub const DEFAULT_TRANSITION_TIME: f64 = 0.125;
