//! Scene: listener, shared rotation/rendering, active sources
//!
//! The `Scene` runs on the audio thread; a `SceneController` on the control
//! thread talks to it through two SPSC rings:
//! - commands (control -> audio), drained at the top of every block
//! - garbage (audio -> control), carrying removed sources and replaced
//!   convolvers back so they are freed off the audio thread
//!
//! A scene can also be driven directly from one thread (tests, offline
//! rendering) through its own methods.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use rtrb::{Consumer, Producer, RingBuffer};

use crate::attenuation::RolloffModel;
use crate::binaural::{BinauralRenderer, HoaConvolver, HrirBuffer, RenderingMode};
use crate::config::SceneConfig;
use crate::error::{SpatialError, SpatialResult};
use crate::hoa::{AmbisonicBuffer, AmbisonicOrder, RotationMatrixEngine, Rotator};
use crate::listener::Listener;
use crate::panner::FallbackParams;
use crate::pose::Vec3;
use crate::source::{Source, SourceId, SourceInput, SpatializerKind, StreamInfo};

// ============ Commands ============

/// Control -> audio messages
#[derive(Debug)]
pub enum SceneCommand {
    AddSource(Box<Source>),
    RemoveSource(SourceId),
    SetListenerPose { position: Vec3, forward: Vec3, up: Vec3 },
    SetListenerMatrix([f64; 16]),
    SetSourcePosition(SourceId, Vec3),
    SetSourceOrientation { id: SourceId, forward: Vec3, up: Vec3 },
    SetSourceGain(SourceId, f64),
    SetSourceMinDistance(SourceId, f64),
    SetSourceMaxDistance(SourceId, f64),
    SetSourceRolloff(SourceId, RolloffModel),
    SetSourceWidth(SourceId, f64),
    SetSourceDirectivity { id: SourceId, alpha: f64, sharpness: f64 },
    SetRenderingMode(RenderingMode),
    EnableConvolution,
    DisableConvolution,
    ReplaceConvolver(Box<HoaConvolver>),
}

/// Audio -> control: objects to drop
#[derive(Debug)]
pub enum Garbage {
    Source(Box<Source>),
    Convolver(Box<HoaConvolver>),
}

// ============ Scene ============

/// Audio-thread side of a spatial scene
pub struct Scene {
    config: SceneConfig,
    order: AmbisonicOrder,
    ramp_samples: usize,
    listener: Listener,
    /// Orientation changed since the bands were last built
    rotation_dirty: bool,
    /// Position or orientation changed since sources were last updated
    listener_moved: bool,
    rotation: RotationMatrixEngine,
    rotator: Rotator,
    renderer: BinauralRenderer,
    sources: Vec<Box<Source>>,
    bus: AmbisonicBuffer,
    direct_left: Vec<f32>,
    direct_right: Vec<f32>,
    commands: Consumer<SceneCommand>,
    garbage: Producer<Garbage>,
    next_id: Arc<AtomicU64>,
}

impl Scene {
    /// Build a scene and its controller
    pub fn new(config: SceneConfig) -> SpatialResult<(Self, SceneController)> {
        config.validate()?;

        let order = config.order();
        let block_size = config.block_size;
        let (command_tx, command_rx) = RingBuffer::new(config.command_capacity);
        // Every removal can produce one garbage item, plus convolver swaps
        let (garbage_tx, garbage_rx) = RingBuffer::new(config.command_capacity + config.max_sources);
        let next_id = Arc::new(AtomicU64::new(1));

        let rotation = RotationMatrixEngine::new(order);
        let rotator = Rotator::new(&rotation);
        let mut renderer = BinauralRenderer::new(order, block_size);
        renderer.set_mode(config.rendering_mode);

        log::info!(
            "spatial scene: order {} ({} channels), {} Hz, block {}, up to {} sources",
            order.as_usize(),
            order.channel_count(),
            config.sample_rate,
            block_size,
            config.max_sources
        );

        let controller = SceneController {
            config: config.clone(),
            commands: command_tx,
            garbage: garbage_rx,
            next_id: Arc::clone(&next_id),
            live: HashSet::new(),
        };

        let scene = Self {
            ramp_samples: config.ramp_samples(),
            order,
            listener: Listener::new(),
            rotation_dirty: false,
            listener_moved: false,
            rotation,
            rotator,
            renderer,
            sources: Vec::with_capacity(config.max_sources),
            bus: AmbisonicBuffer::new(order, block_size),
            direct_left: vec![0.0; block_size],
            direct_right: vec![0.0; block_size],
            commands: command_rx,
            garbage: garbage_tx,
            next_id,
            config,
        };

        Ok((scene, controller))
    }

    /// Configuration the scene was built with
    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    /// Frames per block
    pub fn block_size(&self) -> usize {
        self.config.block_size
    }

    /// Ambisonic order
    pub fn ambisonic_order(&self) -> AmbisonicOrder {
        self.order
    }

    /// Current world -> listener rotation, column-major 3x3
    pub fn rotation_matrix3(&self) -> [f64; 9] {
        self.rotation.rotation_matrix3()
    }

    /// Current world -> listener rotation, column-major 4x4
    pub fn rotation_matrix4(&self) -> [f64; 16] {
        self.rotation.rotation_matrix4()
    }

    /// Rotation bands
    pub fn rotation(&self) -> &RotationMatrixEngine {
        &self.rotation
    }

    /// Listener
    pub fn listener(&self) -> &Listener {
        &self.listener
    }

    /// Rotated ambisonic bus of the last block
    pub fn ambisonic_output(&self) -> &AmbisonicBuffer {
        self.renderer.rotated_output()
    }

    /// Number of sources in the scene
    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Look up a source
    pub fn source(&self, id: SourceId) -> Option<&Source> {
        self.sources.iter().find(|s| s.id() == id).map(|s| &**s)
    }

    /// Look up a source for modification
    pub fn source_mut(&mut self, id: SourceId) -> SpatialResult<&mut Source> {
        self.sources
            .iter_mut()
            .find(|s| s.id() == id)
            .map(|s| &mut **s)
            .ok_or(SpatialError::SourceNotFound(id))
    }

    /// Gain and pan of a source for host-side playback
    pub fn fallback_params(&self, id: SourceId) -> Option<FallbackParams> {
        self.source(id).map(Source::fallback_params)
    }

    // ======== Direct control ========

    /// Create a source with the platform's preferred kind
    pub fn add_source(&mut self, stream: &StreamInfo) -> SpatialResult<(SourceId, SourceInput)> {
        let kind = SpatializerKind::select(&self.config.capabilities);
        self.add_source_with_kind(stream, kind)
    }

    /// Create a source of a given kind
    pub fn add_source_with_kind(
        &mut self,
        stream: &StreamInfo,
        kind: SpatializerKind,
    ) -> SpatialResult<(SourceId, SourceInput)> {
        if self.sources.len() >= self.config.max_sources {
            return Err(SpatialError::MaxSourcesExceeded {
                max: self.config.max_sources,
            });
        }
        let id = SourceId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (source, input) = Source::new(id, stream, kind, &self.config)?;
        self.insert_source(Box::new(source));
        Ok((id, input))
    }

    /// Dispose and drop a source
    pub fn remove_source(&mut self, id: SourceId) -> SpatialResult<()> {
        match self.take_source(id) {
            Some(source) => {
                drop(source);
                Ok(())
            }
            None => Err(SpatialError::SourceNotFound(id)),
        }
    }

    /// Set listener position and orientation
    pub fn set_listener_pose(&mut self, position: Vec3, forward: &Vec3, up: &Vec3) {
        self.listener.set_position(position);
        if self.listener.set_orientation(forward, up) {
            self.rotation_dirty = true;
        }
        self.listener_moved = true;
    }

    /// Set listener pose from a column-major 4x4 matrix
    pub fn set_listener_matrix(&mut self, matrix: &[f64; 16]) {
        if self.listener.set_from_matrix(matrix) {
            self.rotation_dirty = true;
        }
        self.listener_moved = true;
    }

    /// Load an HRIR set (allocates)
    pub fn set_hrir_buffer_list(&mut self, buffers: &[HrirBuffer]) {
        self.renderer.set_hrir_buffer_list(buffers);
    }

    /// Set rendering mode
    pub fn set_rendering_mode(&mut self, mode: RenderingMode) {
        self.renderer.set_mode(mode);
    }

    /// Current rendering mode
    pub fn rendering_mode(&self) -> RenderingMode {
        self.renderer.mode()
    }

    /// Resume convolution
    pub fn enable_convolution(&mut self) {
        self.renderer.enable();
    }

    /// Stop convolution work
    pub fn disable_convolution(&mut self) {
        self.renderer.disable();
    }

    /// Check if convolution runs
    pub fn is_convolution_enabled(&self) -> bool {
        self.renderer.is_enabled()
    }

    // ======== Audio ========

    /// Render one block into `left` / `right`
    ///
    /// Both slices must hold exactly `block_size` frames.
    pub fn process(&mut self, left: &mut [f32], right: &mut [f32]) -> SpatialResult<()> {
        let block_size = self.config.block_size;
        for len in [left.len(), right.len()] {
            if len != block_size {
                return Err(SpatialError::BufferSizeMismatch {
                    expected: block_size,
                    got: len,
                });
            }
        }

        self.process_commands();

        // Bands 1..order are final before the rotator reads them
        if self.rotation_dirty {
            self.rotation.set_base_rotation(&self.listener.field_rotation());
            self.rotator.set_target(&self.rotation, self.ramp_samples);
            self.rotation_dirty = false;
        }
        if self.listener_moved {
            for source in &mut self.sources {
                source.update(&self.listener);
            }
            self.listener_moved = false;
        }

        self.bus.clear();
        self.direct_left.fill(0.0);
        self.direct_right.fill(0.0);
        for source in &mut self.sources {
            source.render(&mut self.bus, &mut self.direct_left, &mut self.direct_right);
        }

        self.renderer.process(&self.bus, &mut self.rotator, left, right);
        for (out, &v) in left.iter_mut().zip(&self.direct_left) {
            *out += v;
        }
        for (out, &v) in right.iter_mut().zip(&self.direct_right) {
            *out += v;
        }
        Ok(())
    }

    fn process_commands(&mut self) {
        while let Ok(cmd) = self.commands.pop() {
            match cmd {
                SceneCommand::AddSource(source) => {
                    if self.sources.len() >= self.config.max_sources
                        || self.sources.iter().any(|s| s.id() == source.id())
                    {
                        log::debug!("dropping {}: scene full or duplicate id", source.id());
                        self.discard(Garbage::Source(source));
                    } else {
                        self.insert_source(source);
                    }
                }
                SceneCommand::RemoveSource(id) => match self.take_source(id) {
                    Some(source) => self.discard(Garbage::Source(source)),
                    None => log::debug!("remove for unknown {id}"),
                },
                SceneCommand::SetListenerPose { position, forward, up } => {
                    self.set_listener_pose(position, &forward, &up);
                }
                SceneCommand::SetListenerMatrix(matrix) => self.set_listener_matrix(&matrix),
                SceneCommand::SetSourcePosition(id, position) => {
                    self.with_source(id, |s| s.set_position(position));
                }
                SceneCommand::SetSourceOrientation { id, forward, up } => {
                    self.with_source(id, |s| s.set_orientation(&forward, &up));
                }
                SceneCommand::SetSourceGain(id, gain) => self.with_source(id, |s| s.set_gain(gain)),
                SceneCommand::SetSourceMinDistance(id, d) => self.with_source(id, |s| s.set_min_distance(d)),
                SceneCommand::SetSourceMaxDistance(id, d) => self.with_source(id, |s| s.set_max_distance(d)),
                SceneCommand::SetSourceRolloff(id, model) => self.with_source(id, |s| s.set_rolloff(model)),
                SceneCommand::SetSourceWidth(id, width) => self.with_source(id, |s| s.set_source_width(width)),
                SceneCommand::SetSourceDirectivity { id, alpha, sharpness } => {
                    self.with_source(id, |s| s.set_directivity_pattern(alpha, sharpness));
                }
                SceneCommand::SetRenderingMode(mode) => self.renderer.set_mode(mode),
                SceneCommand::EnableConvolution => self.renderer.enable(),
                SceneCommand::DisableConvolution => self.renderer.disable(),
                SceneCommand::ReplaceConvolver(mut convolver) => {
                    // Same box goes back: the old convolver, or the rejected one
                    self.renderer.swap_convolver(&mut convolver);
                    self.discard(Garbage::Convolver(convolver));
                }
            }
        }
    }

    fn with_source(&mut self, id: SourceId, f: impl FnOnce(&mut Source)) {
        match self.sources.iter_mut().find(|s| s.id() == id) {
            Some(source) => f(source),
            None => log::debug!("command for unknown {id} dropped"),
        }
    }

    fn insert_source(&mut self, mut source: Box<Source>) {
        source.update(&self.listener);
        source.activate();
        log::debug!("added {} ({:?})", source.id(), source.kind());
        self.sources.push(source);
    }

    fn take_source(&mut self, id: SourceId) -> Option<Box<Source>> {
        let index = self.sources.iter().position(|s| s.id() == id)?;
        let mut source = self.sources.swap_remove(index);
        source.dispose();
        log::debug!("removed {id}");
        Some(source)
    }

    fn discard(&mut self, item: Garbage) {
        if let Err(err) = self.garbage.push(item) {
            log::warn!("garbage ring full, dropping on the audio thread");
            drop(err);
        }
    }
}

// ============ Controller ============

/// Control-thread handle of a scene
pub struct SceneController {
    config: SceneConfig,
    commands: Producer<SceneCommand>,
    garbage: Consumer<Garbage>,
    next_id: Arc<AtomicU64>,
    /// Sources this controller added and has not removed
    live: HashSet<SourceId>,
}

impl SceneController {
    /// Configuration of the scene
    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    /// Create a source with the platform's preferred kind and send it to
    /// the scene
    pub fn add_source(&mut self, stream: &StreamInfo) -> SpatialResult<(SourceId, SourceInput)> {
        let kind = SpatializerKind::select(&self.config.capabilities);
        self.add_source_with_kind(stream, kind)
    }

    /// Create a source of a given kind and send it to the scene
    pub fn add_source_with_kind(
        &mut self,
        stream: &StreamInfo,
        kind: SpatializerKind,
    ) -> SpatialResult<(SourceId, SourceInput)> {
        self.collect_garbage();
        if self.live.len() >= self.config.max_sources {
            return Err(SpatialError::MaxSourcesExceeded {
                max: self.config.max_sources,
            });
        }

        let id = SourceId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (source, input) = Source::new(id, stream, kind, &self.config)?;
        self.send(SceneCommand::AddSource(Box::new(source)))?;
        self.live.insert(id);
        Ok((id, input))
    }

    /// Remove a source; removing twice is a no-op
    pub fn remove_source(&mut self, id: SourceId) -> SpatialResult<()> {
        if !self.live.contains(&id) {
            log::debug!("{id} already removed");
            return Ok(());
        }
        self.send(SceneCommand::RemoveSource(id))?;
        self.live.remove(&id);
        Ok(())
    }

    /// Number of sources added and not yet removed
    pub fn source_count(&self) -> usize {
        self.live.len()
    }

    /// Set listener position and orientation
    pub fn set_listener_pose(&mut self, position: Vec3, forward: Vec3, up: Vec3) -> SpatialResult<()> {
        self.send(SceneCommand::SetListenerPose { position, forward, up })
    }

    /// Set listener pose from a column-major 4x4 matrix
    pub fn set_listener_matrix(&mut self, matrix: [f64; 16]) -> SpatialResult<()> {
        self.send(SceneCommand::SetListenerMatrix(matrix))
    }

    /// Move a source
    pub fn set_source_position(&mut self, id: SourceId, position: Vec3) -> SpatialResult<()> {
        self.send(SceneCommand::SetSourcePosition(id, position))
    }

    /// Turn a source
    pub fn set_source_orientation(&mut self, id: SourceId, forward: Vec3, up: Vec3) -> SpatialResult<()> {
        self.send(SceneCommand::SetSourceOrientation { id, forward, up })
    }

    /// Set source input gain
    pub fn set_source_gain(&mut self, id: SourceId, gain: f64) -> SpatialResult<()> {
        self.send(SceneCommand::SetSourceGain(id, gain))
    }

    /// Set source full-gain radius
    pub fn set_source_min_distance(&mut self, id: SourceId, distance: f64) -> SpatialResult<()> {
        self.send(SceneCommand::SetSourceMinDistance(id, distance))
    }

    /// Set source silence radius
    pub fn set_source_max_distance(&mut self, id: SourceId, distance: f64) -> SpatialResult<()> {
        self.send(SceneCommand::SetSourceMaxDistance(id, distance))
    }

    /// Set source rolloff by name (unknown names fall back to logarithmic)
    pub fn set_source_rolloff(&mut self, id: SourceId, name: &str) -> SpatialResult<()> {
        self.send(SceneCommand::SetSourceRolloff(id, RolloffModel::from_name(name)))
    }

    /// Set source width (degrees)
    pub fn set_source_width(&mut self, id: SourceId, width: f64) -> SpatialResult<()> {
        self.send(SceneCommand::SetSourceWidth(id, width))
    }

    /// Set source directivity pattern
    pub fn set_source_directivity(&mut self, id: SourceId, alpha: f64, sharpness: f64) -> SpatialResult<()> {
        self.send(SceneCommand::SetSourceDirectivity { id, alpha, sharpness })
    }

    /// Switch rendering mode
    pub fn set_rendering_mode(&mut self, mode: RenderingMode) -> SpatialResult<()> {
        self.send(SceneCommand::SetRenderingMode(mode))
    }

    /// Resume convolution
    pub fn enable_convolution(&mut self) -> SpatialResult<()> {
        self.send(SceneCommand::EnableConvolution)
    }

    /// Stop convolution work
    pub fn disable_convolution(&mut self) -> SpatialResult<()> {
        self.send(SceneCommand::DisableConvolution)
    }

    /// Build a convolver from `buffers` here and swap it in at the next block
    pub fn set_hrir_buffer_list(&mut self, buffers: &[HrirBuffer]) -> SpatialResult<()> {
        let convolver = HoaConvolver::from_hrir_buffers(self.config.order(), buffers, self.config.block_size);
        self.send(SceneCommand::ReplaceConvolver(Box::new(convolver)))
    }

    /// Drop everything the audio thread handed back; returns the count
    pub fn collect_garbage(&mut self) -> usize {
        let mut count = 0;
        while let Ok(item) = self.garbage.pop() {
            if let Garbage::Source(source) = &item {
                self.live.remove(&source.id());
            }
            drop(item);
            count += 1;
        }
        count
    }

    fn send(&mut self, command: SceneCommand) -> SpatialResult<()> {
        self.commands.push(command).map_err(|_| SpatialError::CommandQueueFull {
            capacity: self.config.command_capacity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> SceneConfig {
        SceneConfig {
            block_size: 32,
            transition_time: 0.0,
            max_sources: 2,
            command_capacity: 4,
            ..SceneConfig::default()
        }
    }

    #[test]
    fn test_buffer_size_mismatch() {
        let (mut scene, _ctl) = Scene::new(small_config()).unwrap();
        let mut left = vec![0.0; 16];
        let mut right = vec![0.0; 32];
        assert!(matches!(
            scene.process(&mut left, &mut right),
            Err(SpatialError::BufferSizeMismatch { expected: 32, got: 16 })
        ));
    }

    #[test]
    fn test_max_sources() {
        let (mut scene, mut ctl) = Scene::new(small_config()).unwrap();
        let stream = StreamInfo::mono(48000);
        scene.add_source(&stream).unwrap();
        scene.add_source(&stream).unwrap();
        assert!(matches!(
            scene.add_source(&stream),
            Err(SpatialError::MaxSourcesExceeded { max: 2 })
        ));

        ctl.add_source(&stream).unwrap();
        ctl.add_source(&stream).unwrap();
        assert!(ctl.add_source(&stream).is_err());
    }

    #[test]
    fn test_command_queue_full() {
        let (_scene, mut ctl) = Scene::new(small_config()).unwrap();
        for _ in 0..4 {
            ctl.enable_convolution().unwrap();
        }
        assert!(matches!(
            ctl.disable_convolution(),
            Err(SpatialError::CommandQueueFull { capacity: 4 })
        ));
    }

    #[test]
    fn test_listener_orientation_updates_bands() {
        let (mut scene, mut ctl) = Scene::new(small_config()).unwrap();
        ctl.set_listener_pose(Vec3::zeros(), Vec3::new(0.0, 1.0, 0.0), Vec3::new(0.0, 0.0, 1.0))
            .unwrap();
        let mut left = vec![0.0; 32];
        let mut right = vec![0.0; 32];
        scene.process(&mut left, &mut right).unwrap();

        // Field rotation maps the listener's forward (+y) to +x
        let rotation = scene.rotation().base_rotation();
        assert!((rotation * Vec3::new(0.0, 1.0, 0.0) - Vec3::new(1.0, 0.0, 0.0)).norm() < 1e-12);
    }

    #[test]
    fn test_removed_source_comes_back_as_garbage() {
        let (mut scene, mut ctl) = Scene::new(small_config()).unwrap();
        let (id, _input) = ctl.add_source(&StreamInfo::mono(48000)).unwrap();
        let mut left = vec![0.0; 32];
        let mut right = vec![0.0; 32];
        scene.process(&mut left, &mut right).unwrap();
        assert_eq!(scene.source_count(), 1);

        ctl.remove_source(id).unwrap();
        ctl.remove_source(id).unwrap();
        scene.process(&mut left, &mut right).unwrap();
        assert_eq!(scene.source_count(), 0);
        assert_eq!(ctl.collect_garbage(), 1);
        assert_eq!(ctl.source_count(), 0);
    }

    #[test]
    fn test_convolver_swap_returns_previous_in_same_box() {
        let (mut scene, mut ctl) = Scene::new(small_config()).unwrap();
        let order = scene.ambisonic_order();
        let hrirs = HrirBuffer::synthetic_set(order, 48000, 32);
        let mut left = vec![0.0; 32];
        let mut right = vec![0.0; 32];

        let incoming = Box::new(HoaConvolver::from_hrir_buffers(order, &hrirs, 32));
        let sent: *const HoaConvolver = &*incoming;
        ctl.commands.push(SceneCommand::ReplaceConvolver(incoming)).unwrap();
        scene.process(&mut left, &mut right).unwrap();

        match ctl.garbage.pop() {
            Ok(Garbage::Convolver(old)) => {
                assert!(std::ptr::eq(&*old, sent));
                assert_eq!(old.active_stages(), 0);
            }
            other => panic!("expected the previous convolver, got {other:?}"),
        }

        // Mismatched block size comes back untouched
        ctl.commands
            .push(SceneCommand::ReplaceConvolver(Box::new(HoaConvolver::silent(order, 64))))
            .unwrap();
        scene.process(&mut left, &mut right).unwrap();
        match ctl.garbage.pop() {
            Ok(Garbage::Convolver(rejected)) => assert_eq!(rejected.block_size(), 64),
            other => panic!("expected the rejected convolver, got {other:?}"),
        }
    }
}
