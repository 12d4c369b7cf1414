//! Binaural renderer - rotated bus to stereo

use super::{HoaConvolver, HrirBuffer, RenderingMode};
use crate::hoa::{AmbisonicBuffer, AmbisonicOrder, Rotator};

/// Renders the scene's ambisonic bus to two ears
///
/// Owns the HRIR convolver and the rotated copy of the bus, which is kept
/// after each block as the pre-render output.
#[derive(Debug)]
pub struct BinauralRenderer {
    order: AmbisonicOrder,
    block_size: usize,
    mode: RenderingMode,
    convolver: HoaConvolver,
    rotated: AmbisonicBuffer,
}

impl BinauralRenderer {
    /// Create with silent stages (no HRIRs yet)
    pub fn new(order: AmbisonicOrder, block_size: usize) -> Self {
        Self {
            order,
            block_size,
            mode: RenderingMode::default(),
            convolver: HoaConvolver::silent(order, block_size),
            rotated: AmbisonicBuffer::new(order, block_size),
        }
    }

    /// Create and load an HRIR set
    pub fn with_hrirs(order: AmbisonicOrder, block_size: usize, buffers: &[HrirBuffer]) -> Self {
        let mut renderer = Self::new(order, block_size);
        renderer.set_hrir_buffer_list(buffers);
        renderer
    }

    /// Rebuild every convolution stage from `buffers`
    ///
    /// Allocates; on a real-time host build the convolver with
    /// [`HoaConvolver::from_hrir_buffers`] elsewhere and pass it to
    /// [`Self::replace_convolver`].
    pub fn set_hrir_buffer_list(&mut self, buffers: &[HrirBuffer]) {
        let convolver = HoaConvolver::from_hrir_buffers(self.order, buffers, self.block_size);
        drop(self.replace_convolver(convolver));
    }

    /// Swap in a prebuilt convolver, returning the one to drop
    ///
    /// A convolver built for another order or block size is rejected and
    /// handed back unchanged.
    pub fn replace_convolver(&mut self, mut convolver: HoaConvolver) -> HoaConvolver {
        self.swap_convolver(&mut convolver);
        convolver
    }

    /// Exchange the active convolver with `convolver` in place
    ///
    /// On success `convolver` holds the previous one; returns `false` and
    /// leaves it untouched when order or block size differ. Moves no heap
    /// storage, so it can run inside the audio callback.
    pub fn swap_convolver(&mut self, convolver: &mut HoaConvolver) -> bool {
        if convolver.order() != self.order || convolver.block_size() != self.block_size {
            log::warn!(
                "rejecting HRIR convolver for order {} / block {} (renderer: order {} / block {})",
                convolver.order().as_usize(),
                convolver.block_size(),
                self.order.as_usize(),
                self.block_size
            );
            return false;
        }
        if self.convolver.is_enabled() {
            convolver.enable();
        } else {
            convolver.disable();
        }
        std::mem::swap(&mut self.convolver, convolver);
        true
    }

    /// Resume convolution
    pub fn enable(&mut self) {
        self.convolver.enable();
    }

    /// Stop convolution work; convolution output is silent
    pub fn disable(&mut self) {
        self.convolver.disable();
    }

    /// Check if convolution runs
    pub fn is_enabled(&self) -> bool {
        self.convolver.is_enabled()
    }

    /// Current rendering mode
    pub fn mode(&self) -> RenderingMode {
        self.mode
    }

    /// Set rendering mode
    pub fn set_mode(&mut self, mode: RenderingMode) {
        if mode != self.mode {
            log::debug!("rendering mode {:?} -> {mode:?}", self.mode);
            self.mode = mode;
        }
    }

    /// Order
    pub fn order(&self) -> AmbisonicOrder {
        self.order
    }

    /// Number of stages with HRIR data
    pub fn active_stages(&self) -> usize {
        self.convolver.active_stages()
    }

    /// Bus after rotation in the last block
    pub fn rotated_output(&self) -> &AmbisonicBuffer {
        &self.rotated
    }

    /// Render one block of `bus` into `left` / `right`
    pub fn process(&mut self, bus: &AmbisonicBuffer, rotator: &mut Rotator, left: &mut [f32], right: &mut [f32]) {
        match self.mode {
            RenderingMode::Ambisonic => {
                rotator.process(bus, &mut self.rotated);
                self.convolver.process(&self.rotated, left, right);
            }
            RenderingMode::Direct => {
                self.rotated.copy_from(bus);
                self.convolver.process(&self.rotated, left, right);
            }
            RenderingMode::Bypass => {
                self.rotated.copy_from(bus);
                let w = self.rotated.channel(0);
                left.copy_from_slice(&w[..left.len()]);
                right.copy_from_slice(&w[..right.len()]);
            }
            RenderingMode::Off => {
                self.rotated.clear();
                left.fill(0.0);
                right.fill(0.0);
            }
        }
    }
}
