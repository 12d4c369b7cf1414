//! Participant sources
//!
//! One `Source` per remote participant: its mono input stream passes
//! through directivity (lowpass), attenuation and the encoder into the
//! scene's ambisonic bus, or into the stereo mix for the fallback kinds.
//!
//! Lifecycle: `Created -> Active -> Disposed`. All gains move through
//! linear ramps; every buffer is sized when the source is created.

use std::fmt;

use dasp_sample::Sample;
use rtrb::{Consumer, Producer, RingBuffer};
use serde::{Deserialize, Serialize};

use crate::attenuation::{Attenuation, RolloffModel};
use crate::config::SceneConfig;
use crate::directivity::{Directivity, OnePoleLowpass};
use crate::error::{SpatialError, SpatialResult};
use crate::hoa::{AmbisonicBuffer, Encoder};
use crate::listener::Listener;
use crate::panner::{FallbackParams, equal_power_gains, pan_from_relative};
use crate::pose::{Direction, Pose, Vec3};
use crate::smoothing::LinearRamp;
use crate::MAX_CHANNELS;

// ============ Identity and Kind ============

/// Source identifier, unique within a scene
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceId(pub u64);

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "source#{}", self.0)
    }
}

/// How a source reaches the output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpatializerKind {
    /// Ambisonic bus, rotated and rendered binaurally
    #[default]
    Binaural,
    /// Equal-power pan plus attenuation, straight to the stereo mix
    StereoPan,
    /// Attenuation only
    VolumeOnly,
}

impl SpatializerKind {
    /// Best kind the platform supports
    pub fn select(capabilities: &PlatformCapabilities) -> Self {
        if capabilities.ambisonic {
            Self::Binaural
        } else if capabilities.stereo_panning {
            Self::StereoPan
        } else {
            Self::VolumeOnly
        }
    }
}

/// Output features of the host platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformCapabilities {
    /// Multichannel ambisonic rendering is possible
    pub ambisonic: bool,
    /// Stereo panning is possible
    pub stereo_panning: bool,
}

impl Default for PlatformCapabilities {
    fn default() -> Self {
        Self {
            ambisonic: true,
            stereo_panning: true,
        }
    }
}

/// Source lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Built, not yet in a scene
    Created,
    /// Rendering
    Active,
    /// Torn down; ignores every update
    Disposed,
}

// ============ Input Stream ============

/// Format of a participant stream offered to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamInfo {
    /// Interleaved channel count
    pub channels: u16,
    /// Sample rate (Hz)
    pub sample_rate: u32,
}

impl StreamInfo {
    /// Mono stream
    pub fn mono(sample_rate: u32) -> Self {
        Self {
            channels: 1,
            sample_rate,
        }
    }

    /// Check the stream can feed a scene running at `sample_rate`
    pub fn validate(&self, sample_rate: u32) -> SpatialResult<()> {
        if self.channels != 1 {
            return Err(SpatialError::UnsupportedStream(format!(
                "{} channels (sources are mono)",
                self.channels
            )));
        }
        if self.sample_rate != sample_rate {
            return Err(SpatialError::UnsupportedStream(format!(
                "{} Hz stream in a {sample_rate} Hz scene",
                self.sample_rate
            )));
        }
        Ok(())
    }
}

/// Transport-side handle that feeds a source
pub struct SourceInput {
    id: SourceId,
    producer: Producer<f32>,
}

impl SourceInput {
    /// Source this input feeds
    pub fn id(&self) -> SourceId {
        self.id
    }

    /// Free space in samples
    pub fn free_slots(&self) -> usize {
        self.producer.slots()
    }

    /// Check if the source side has been dropped
    pub fn is_closed(&self) -> bool {
        self.producer.is_abandoned()
    }

    /// Queue float samples; returns how many fit
    pub fn push(&mut self, samples: &[f32]) -> usize {
        let n = samples.len().min(self.producer.slots());
        if n == 0 {
            return 0;
        }
        match self.producer.write_chunk(n) {
            Ok(mut chunk) => {
                let (first, second) = chunk.as_mut_slices();
                let split = first.len();
                first.copy_from_slice(&samples[..split]);
                second.copy_from_slice(&samples[split..n]);
                chunk.commit_all();
                n
            }
            Err(_) => 0,
        }
    }

    /// Queue 16-bit samples; returns how many fit
    pub fn push_i16(&mut self, samples: &[i16]) -> usize {
        let mut converted = [0.0f32; 256];
        let mut written = 0;
        for block in samples.chunks(converted.len()) {
            for (dst, &s) in converted.iter_mut().zip(block) {
                *dst = s.to_sample::<f32>();
            }
            let n = self.push(&converted[..block.len()]);
            written += n;
            if n < block.len() {
                break;
            }
        }
        written
    }
}

impl fmt::Debug for SourceInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceInput")
            .field("id", &self.id)
            .field("free_slots", &self.producer.slots())
            .finish()
    }
}

// ============ Source ============

/// One spatialized participant
pub struct Source {
    id: SourceId,
    kind: SpatializerKind,
    lifecycle: Lifecycle,

    pose: Pose,
    gain: f64,
    /// Listener pose of the last update
    listener: Pose,

    encoder: Encoder,
    attenuation: Attenuation,
    directivity: Directivity,
    lowpass: OnePoleLowpass,

    input: Consumer<f32>,
    block: Vec<f32>,

    /// Encoded gain per ACN channel (binaural kind)
    channel_gains: [LinearRamp; MAX_CHANNELS],
    /// Left/right gains (fallback kinds)
    stereo_gains: [LinearRamp; 2],
    fallback: FallbackParams,
    /// Set once a block has been rendered; until then gains snap
    primed: bool,
}

impl Source {
    /// Create a source and the input handle that feeds it
    ///
    /// Fails with [`SpatialError::UnsupportedStream`] when the stream is not
    /// mono at the scene rate.
    pub fn new(
        id: SourceId,
        stream: &StreamInfo,
        kind: SpatializerKind,
        config: &SceneConfig,
    ) -> SpatialResult<(Self, SourceInput)> {
        stream.validate(config.sample_rate)?;

        let defaults = &config.source;
        let order = config.order();
        let ramp_samples = config.ramp_samples();
        let (producer, consumer) = RingBuffer::new(config.input_capacity.max(config.block_size));

        let mut encoder = Encoder::new(order);
        encoder.set_source_width(defaults.width);

        let mut source = Self {
            id,
            kind,
            lifecycle: Lifecycle::Created,
            pose: Pose::identity(),
            gain: 1.0,
            listener: Pose::identity(),
            encoder,
            attenuation: Attenuation::new(defaults.min_distance, defaults.max_distance, defaults.rolloff),
            directivity: Directivity::new(defaults.alpha, defaults.sharpness),
            lowpass: OnePoleLowpass::new(),
            input: consumer,
            block: vec![0.0; config.block_size],
            channel_gains: std::array::from_fn(|_| LinearRamp::new(0.0, ramp_samples)),
            stereo_gains: std::array::from_fn(|_| LinearRamp::new(0.0, ramp_samples)),
            fallback: FallbackParams::default(),
            primed: false,
        };
        source.set_gain_value(defaults.gain);
        source.refresh();

        Ok((source, SourceInput { id, producer }))
    }

    /// Identifier
    pub fn id(&self) -> SourceId {
        self.id
    }

    /// Spatializer kind chosen at creation
    pub fn kind(&self) -> SpatializerKind {
        self.kind
    }

    /// Lifecycle state
    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    /// Check if the source has been disposed
    pub fn is_disposed(&self) -> bool {
        self.lifecycle == Lifecycle::Disposed
    }

    /// Start rendering (scene insertion)
    pub fn activate(&mut self) {
        if self.lifecycle == Lifecycle::Created {
            self.lifecycle = Lifecycle::Active;
        }
    }

    /// Stop rendering and silence the source; safe to call repeatedly
    ///
    /// The input ring is no longer read. Its storage is released when the
    /// source is dropped.
    pub fn dispose(&mut self) {
        if self.lifecycle == Lifecycle::Disposed {
            return;
        }
        self.lifecycle = Lifecycle::Disposed;
        for ramp in self.channel_gains.iter_mut().chain(self.stereo_gains.iter_mut()) {
            ramp.set_immediate(0.0);
        }
        self.lowpass.reset();
        self.fallback.gain = 0.0;
    }

    // ======== Derived state ========

    /// Re-derive distance, direction, directivity and pan from a listener
    pub fn update(&mut self, listener: &Listener) {
        self.listener = *listener.pose();
        self.refresh();
    }

    fn refresh(&mut self) {
        if self.is_disposed() {
            return;
        }

        let offset = self.pose.position - self.listener.position;
        let attenuation = self.attenuation.set_distance(offset.norm());

        let direction = Direction::from_vector(&offset);
        self.encoder.set_direction(direction.azimuth, direction.elevation);

        let to_listener = -offset;
        self.directivity.compute_angle(&self.pose.forward, &to_listener);
        self.lowpass.set_coefficient(self.directivity.coefficient());

        let local = self.listener.basis().transpose() * offset;
        let total = self.gain * attenuation;
        self.fallback = FallbackParams {
            gain: total,
            pan: pan_from_relative(&local),
        };

        let immediate = !self.primed;

        let set = |ramp: &mut LinearRamp, value: f32| {
            if immediate {
                ramp.set_immediate(value);
            } else {
                ramp.set_target(value);
            }
        };

        match self.kind {
            SpatializerKind::Binaural => {
                for (ramp, &g) in self.channel_gains.iter_mut().zip(self.encoder.gains()) {
                    set(ramp, g * total as f32);
                }
            }
            SpatializerKind::StereoPan => {
                let (l, r) = equal_power_gains(self.fallback.pan);
                set(&mut self.stereo_gains[0], l * total as f32);
                set(&mut self.stereo_gains[1], r * total as f32);
            }
            SpatializerKind::VolumeOnly => {
                for ramp in &mut self.stereo_gains {
                    set(ramp, total as f32);
                }
            }
        }
    }

    // ======== Setters ========

    /// Move the source; non-finite positions are ignored
    pub fn set_position(&mut self, position: Vec3) {
        if position.iter().all(|v| v.is_finite()) {
            self.pose.position = position;
            self.refresh();
        } else {
            log::warn!("{}: ignoring non-finite position {position:?}", self.id);
        }
    }

    /// Turn the source; degenerate input keeps the previous orientation
    pub fn set_orientation(&mut self, forward: &Vec3, up: &Vec3) {
        if self.pose.set_orientation(forward, up) {
            self.refresh();
        } else {
            log::warn!("{}: degenerate orientation, keeping previous", self.id);
        }
    }

    /// Set linear input gain (negative and NaN become 0)
    pub fn set_gain(&mut self, gain: f64) {
        self.set_gain_value(gain);
        self.refresh();
    }

    fn set_gain_value(&mut self, gain: f64) {
        if gain.is_nan() || gain < 0.0 {
            log::warn!("{}: invalid gain {gain}, using 0", self.id);
            self.gain = 0.0;
        } else {
            self.gain = gain;
        }
    }

    /// Set full-gain radius
    pub fn set_min_distance(&mut self, min_distance: f64) {
        self.attenuation.set_min_distance(min_distance);
        self.refresh();
    }

    /// Set silence radius
    pub fn set_max_distance(&mut self, max_distance: f64) {
        self.attenuation.set_max_distance(max_distance);
        self.refresh();
    }

    /// Set rolloff model
    pub fn set_rolloff(&mut self, rolloff: RolloffModel) {
        self.attenuation.set_rolloff(rolloff);
        self.refresh();
    }

    /// Set source width in degrees
    pub fn set_source_width(&mut self, width: f64) {
        self.encoder.set_source_width(width);
        self.refresh();
    }

    /// Set directivity pattern
    pub fn set_directivity_pattern(&mut self, alpha: f64, sharpness: f64) {
        self.directivity.set_pattern(alpha, sharpness);
        self.refresh();
    }

    // ======== Getters ========

    /// Current pose
    pub fn pose(&self) -> &Pose {
        &self.pose
    }

    /// Linear input gain
    pub fn gain(&self) -> f64 {
        self.gain
    }

    /// Encoder state
    pub fn encoder(&self) -> &Encoder {
        &self.encoder
    }

    /// Attenuation state
    pub fn attenuation(&self) -> &Attenuation {
        &self.attenuation
    }

    /// Directivity state
    pub fn directivity(&self) -> &Directivity {
        &self.directivity
    }

    /// Gain and pan for hosts that play the stream themselves
    pub fn fallback_params(&self) -> FallbackParams {
        self.fallback
    }

    /// Current (ramped) gain of ACN channel `acn`
    pub fn channel_gain(&self, acn: usize) -> f32 {
        self.channel_gains.get(acn).map_or(0.0, LinearRamp::current)
    }

    /// Target gain of ACN channel `acn`
    pub fn channel_gain_target(&self, acn: usize) -> f32 {
        self.channel_gains.get(acn).map_or(0.0, LinearRamp::target)
    }

    // ======== Audio ========

    /// Pull one block from the input ring and mix it
    ///
    /// Binaural sources add into `bus`; fallback kinds add into `left` /
    /// `right`. Missing input is rendered as silence.
    pub fn render(&mut self, bus: &mut AmbisonicBuffer, left: &mut [f32], right: &mut [f32]) {
        if self.lifecycle != Lifecycle::Active {
            return;
        }

        self.read_input();
        self.lowpass.process(&mut self.block);
        self.primed = true;

        match self.kind {
            SpatializerKind::Binaural => {
                let channels = self.encoder.channel_count().min(bus.channel_count());
                for (ramp, out) in self.channel_gains[..channels].iter_mut().zip(bus.channels_mut()) {
                    if !ramp.is_ramping() && ramp.current() == 0.0 {
                        continue;
                    }
                    for (o, &x) in out.iter_mut().zip(&self.block) {
                        *o += ramp.next() * x;
                    }
                }
            }
            SpatializerKind::StereoPan | SpatializerKind::VolumeOnly => {
                let [gl, gr] = &mut self.stereo_gains;
                for ((l, r), &x) in left.iter_mut().zip(right.iter_mut()).zip(&self.block) {
                    *l += gl.next() * x;
                    *r += gr.next() * x;
                }
            }
        }
    }

    fn read_input(&mut self) {
        let wanted = self.block.len();
        let available = self.input.slots().min(wanted);
        let mut filled = 0;
        if available > 0 {
            if let Ok(chunk) = self.input.read_chunk(available) {
                let (first, second) = chunk.as_slices();
                self.block[..first.len()].copy_from_slice(first);
                self.block[first.len()..available].copy_from_slice(second);
                chunk.commit_all();
                filled = available;
            }
        }
        self.block[filled..].fill(0.0);
    }
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Source")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("lifecycle", &self.lifecycle)
            .field("position", &self.pose.position)
            .field("gain", &self.gain)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SceneConfig {
        SceneConfig {
            block_size: 64,
            transition_time: 0.0,
            ..SceneConfig::default()
        }
    }

    fn source(kind: SpatializerKind) -> (Source, SourceInput) {
        Source::new(SourceId(1), &StreamInfo::mono(48000), kind, &config()).unwrap()
    }

    #[test]
    fn test_unsupported_streams() {
        let stereo = StreamInfo {
            channels: 2,
            sample_rate: 48000,
        };
        assert!(matches!(
            Source::new(SourceId(1), &stereo, SpatializerKind::Binaural, &config()),
            Err(SpatialError::UnsupportedStream(_))
        ));
        assert!(Source::new(SourceId(1), &StreamInfo::mono(44100), SpatializerKind::Binaural, &config()).is_err());
    }

    #[test]
    fn test_kind_selection() {
        let all = PlatformCapabilities::default();
        assert_eq!(SpatializerKind::select(&all), SpatializerKind::Binaural);
        let pan_only = PlatformCapabilities {
            ambisonic: false,
            stereo_panning: true,
        };
        assert_eq!(SpatializerKind::select(&pan_only), SpatializerKind::StereoPan);
        let none = PlatformCapabilities {
            ambisonic: false,
            stereo_panning: false,
        };
        assert_eq!(SpatializerKind::select(&none), SpatializerKind::VolumeOnly);
    }

    #[test]
    fn test_update_tracks_geometry() {
        let (mut src, _input) = source(SpatializerKind::Binaural);
        src.set_position(Vec3::new(0.0, 5.0, 0.0));
        assert!((src.encoder().azimuth() - 90.0).abs() < 1e-9);
        let expected = crate::attenuation::distance_gain(RolloffModel::Logarithmic, 1.0, 1000.0, 5.0);
        assert!((src.attenuation().gain() - expected).abs() < 1e-12);
        assert!(src.fallback_params().pan < -0.99);

        let mut listener = Listener::new();
        listener.set_position(Vec3::new(0.0, 5.0, -1.0));
        src.update(&listener);
        assert!((src.encoder().elevation() - 90.0).abs() < 1e-9);
        assert_eq!(src.attenuation().gain(), 1.0);
    }

    #[test]
    fn test_input_is_zero_filled() {
        let (mut src, mut input) = source(SpatializerKind::VolumeOnly);
        src.activate();
        src.set_position(Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(input.push(&[0.5; 10]), 10);

        let mut bus = AmbisonicBuffer::new(crate::hoa::AmbisonicOrder::First, 64);
        let mut left = vec![0.0; 64];
        let mut right = vec![0.0; 64];
        src.render(&mut bus, &mut left, &mut right);
        assert!((left[0] - 0.5).abs() < 1e-6);
        assert!((right[9] - 0.5).abs() < 1e-6);
        assert!(left[10..].iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_push_i16() {
        let (_src, mut input) = source(SpatializerKind::Binaural);
        let samples = vec![i16::MAX / 2; 600];
        assert_eq!(input.push_i16(&samples), 600);
        assert_eq!(input.free_slots(), 8192 - 600);
    }

    #[test]
    fn test_dispose_is_idempotent() {
        let (mut src, _input) = source(SpatializerKind::Binaural);
        src.activate();
        assert_eq!(src.lifecycle(), Lifecycle::Active);
        src.dispose();
        src.dispose();
        assert!(src.is_disposed());
        assert_eq!(src.channel_gain(0), 0.0);

        // Updates after disposal are ignored
        src.set_gain(2.0);
        assert_eq!(src.channel_gain_target(0), 0.0);
        src.activate();
        assert!(src.is_disposed());
    }

    #[test]
    fn test_fallback_gain_leaves_directivity_to_the_filter() {
        let (mut src, _input) =
            Source::new(SourceId(4), &StreamInfo::mono(48000), SpatializerKind::StereoPan, &config()).unwrap();
        src.set_position(Vec3::new(3.0, 0.0, 0.0));
        src.set_directivity_pattern(1.0, 2.0);
        src.set_orientation(&Vec3::new(0.0, 1.0, 0.0), &Vec3::new(0.0, 0.0, 1.0));

        assert!(src.directivity().coefficient() < 1e-9);
        let params = src.fallback_params();
        assert!((params.gain - src.attenuation().gain()).abs() < 1e-12);
        assert!(params.gain > 0.0);
    }

    #[test]
    fn test_gains_snap_until_first_render() {
        let config = SceneConfig {
            block_size: 64,
            transition_time: 0.01,
            ..SceneConfig::default()
        };
        let (mut src, _input) =
            Source::new(SourceId(3), &StreamInfo::mono(48000), SpatializerKind::Binaural, &config).unwrap();
        assert_eq!(src.channel_gain(0), 1.0);

        // Nothing rendered yet: placement snaps
        src.set_position(Vec3::new(0.0, 0.0, 500.0));
        let placed = src.attenuation().gain() as f32;
        assert!(placed < 0.01);
        assert_eq!(src.channel_gain(0), placed);

        let mut bus = AmbisonicBuffer::new(config.order(), 64);
        let mut left = vec![0.0; 64];
        let mut right = vec![0.0; 64];
        src.activate();
        src.render(&mut bus, &mut left, &mut right);

        src.set_position(Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(src.channel_gain(0), placed);
        assert_eq!(src.channel_gain_target(0), 1.0);
    }
}
