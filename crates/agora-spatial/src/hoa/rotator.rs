//! Block rotation of the ambisonic bus
//!
//! Applies the band matrices of a [`RotationMatrixEngine`] as a
//! block-diagonal transform: W passes through, band `l` mixes its `2l + 1`
//! channels. A new target is approached by interpolating every band element
//! linearly, one step per sample.

use super::rotation::{BAND_STORAGE, band_index, band_offset};
use super::{AmbisonicBuffer, AmbisonicOrder, RotationMatrixEngine};

/// Applies (and ramps) rotation bands over audio blocks
#[derive(Debug, Clone)]
pub struct Rotator {
    order: AmbisonicOrder,
    /// Bands applied to the next sample
    current: [f64; BAND_STORAGE],
    /// Bands at the end of the ramp
    target: [f64; BAND_STORAGE],
    /// Per-sample increment of every element
    step: [f64; BAND_STORAGE],
    /// Samples left in the ramp
    remaining: usize,
}

impl Rotator {
    /// Create with the engine's current bands and no ramp
    pub fn new(engine: &RotationMatrixEngine) -> Self {
        let mut rotator = Self {
            order: engine.order(),
            current: [0.0; BAND_STORAGE],
            target: [0.0; BAND_STORAGE],
            step: [0.0; BAND_STORAGE],
            remaining: 0,
        };
        rotator.set_immediate(engine);
        rotator
    }

    /// Current order
    pub fn order(&self) -> AmbisonicOrder {
        self.order
    }

    /// Check if a ramp is in progress
    pub fn is_ramping(&self) -> bool {
        self.remaining > 0
    }

    /// Bands that will be applied to the next sample
    pub fn current_bands(&self) -> &[f64] {
        &self.current[..band_offset(self.order.as_usize() + 1)]
    }

    /// Jump to the engine's bands
    pub fn set_immediate(&mut self, engine: &RotationMatrixEngine) {
        self.order = engine.order();
        let live = engine.bands();
        self.target = [0.0; BAND_STORAGE];
        self.target[..live.len()].copy_from_slice(live);
        self.current = self.target;
        self.step = [0.0; BAND_STORAGE];
        self.remaining = 0;
    }

    /// Ramp towards the engine's bands over `ramp_frames` samples
    ///
    /// An order change cannot be interpolated and snaps immediately.
    pub fn set_target(&mut self, engine: &RotationMatrixEngine, ramp_frames: usize) {
        if ramp_frames == 0 || engine.order() != self.order {
            self.set_immediate(engine);
            return;
        }

        let live = engine.bands();
        self.target[..live.len()].copy_from_slice(live);
        let inv = 1.0 / ramp_frames as f64;
        for i in 0..live.len() {
            self.step[i] = (self.target[i] - self.current[i]) * inv;
        }
        self.remaining = ramp_frames;
    }

    /// Rotate `input` into `output`
    ///
    /// Both buffers must hold at least `order.channel_count()` channels;
    /// the shorter frame count is processed.
    pub fn process(&mut self, input: &AmbisonicBuffer, output: &mut AmbisonicBuffer) {
        let frames = input.frames().min(output.frames());
        output.channel_mut(0)[..frames].copy_from_slice(&input.channel(0)[..frames]);

        if self.remaining == 0 {
            self.process_static(input, output, 0, frames);
            return;
        }

        let live = band_offset(self.order.as_usize() + 1);
        let mut frame = 0;
        while frame < frames && self.remaining > 0 {
            self.remaining -= 1;
            if self.remaining == 0 {
                self.current = self.target;
            } else {
                for i in 0..live {
                    self.current[i] += self.step[i];
                }
            }
            self.process_frame(input, output, frame);
            frame += 1;
        }

        if frame < frames {
            self.process_static(input, output, frame, frames);
        }
    }

    fn process_frame(&self, input: &AmbisonicBuffer, output: &mut AmbisonicBuffer, frame: usize) {
        for l in 1..=self.order.as_usize() {
            let li = l as i32;
            let start = l * l;
            for m in -li..=li {
                let mut sum = 0.0f64;
                for n in -li..=li {
                    let x = input.channel(start + (n + li) as usize)[frame] as f64;
                    sum += self.current[band_index(l, m, n)] * x;
                }
                output.channel_mut(start + (m + li) as usize)[frame] = sum as f32;
            }
        }
    }

    fn process_static(&self, input: &AmbisonicBuffer, output: &mut AmbisonicBuffer, from: usize, to: usize) {
        for l in 1..=self.order.as_usize() {
            let li = l as i32;
            let start = l * l;
            for m in -li..=li {
                let out = &mut output.channel_mut(start + (m + li) as usize)[from..to];
                out.fill(0.0);
                for n in -li..=li {
                    let coeff = self.current[band_index(l, m, n)] as f32;
                    if coeff == 0.0 {
                        continue;
                    }
                    let x = &input.channel(start + (n + li) as usize)[from..to];
                    for (o, &s) in out.iter_mut().zip(x) {
                        *o += coeff * s;
                    }
                }
            }
        }
    }
}
