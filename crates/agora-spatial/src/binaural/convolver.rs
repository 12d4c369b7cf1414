//! Uniformly partitioned FFT convolution
//!
//! - Partition size equals the audio block size (no added latency)
//! - RealFFT of size `2 * block`, overlap-save
//! - Frequency-domain delay line holds one input spectrum per partition
//! - All buffers sized at construction; `process` never allocates

use std::sync::Arc;

use num_complex::Complex32;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};

use super::hrir::{HrirBuffer, right_ear_sign};
use crate::hoa::{AmbisonicBuffer, AmbisonicOrder};

// ============ Partitioned Convolver ============

/// Mono FIR convolver with block-sized partitions
pub struct PartitionedConvolver {
    block_size: usize,
    /// Filter spectra, one per partition
    partitions: Vec<Vec<Complex32>>,
    /// Input spectra, ring indexed by `fdl_pos`
    fdl: Vec<Vec<Complex32>>,
    fdl_pos: usize,
    /// Previous and current input block
    input: Vec<f32>,
    /// Time-domain FFT work buffer
    time: Vec<f32>,
    /// Accumulated output spectrum
    accum: Vec<Complex32>,
    fft_forward: Arc<dyn RealToComplex<f32>>,
    fft_inverse: Arc<dyn ComplexToReal<f32>>,
    scratch_forward: Vec<Complex32>,
    scratch_inverse: Vec<Complex32>,
}

impl PartitionedConvolver {
    /// Build for impulse response `ir` and block size `block_size`
    pub fn new(ir: &[f32], block_size: usize, planner: &mut RealFftPlanner<f32>) -> Self {
        let block_size = block_size.max(1);
        let fft_size = block_size * 2;
        let bins = block_size + 1;
        let fft_forward = planner.plan_fft_forward(fft_size);
        let fft_inverse = planner.plan_fft_inverse(fft_size);
        let mut scratch_forward = fft_forward.make_scratch_vec();

        let mut time = vec![0.0f32; fft_size];
        let partitions: Vec<Vec<Complex32>> = ir
            .chunks(block_size)
            .map(|segment| {
                time.fill(0.0);
                time[..segment.len()].copy_from_slice(segment);
                let mut spectrum = vec![Complex32::new(0.0, 0.0); bins];
                if fft_forward
                    .process_with_scratch(&mut time, &mut spectrum, &mut scratch_forward)
                    .is_err()
                {
                    spectrum.fill(Complex32::new(0.0, 0.0));
                }
                spectrum
            })
            .collect();

        let fdl = vec![vec![Complex32::new(0.0, 0.0); bins]; partitions.len()];

        Self {
            block_size,
            partitions,
            fdl,
            fdl_pos: 0,
            input: vec![0.0; fft_size],
            time,
            accum: vec![Complex32::new(0.0, 0.0); bins],
            scratch_inverse: fft_inverse.make_scratch_vec(),
            fft_forward,
            fft_inverse,
            scratch_forward,
        }
    }

    /// Block size (partition length)
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Number of filter partitions
    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    /// Convolve one block; `input` and `output` hold `block_size` samples
    pub fn process(&mut self, input: &[f32], output: &mut [f32]) {
        debug_assert_eq!(input.len(), self.block_size);
        debug_assert_eq!(output.len(), self.block_size);
        let b = self.block_size;

        if self.partitions.is_empty() {
            output.fill(0.0);
            return;
        }

        // Slide input window: [previous block | current block]
        self.input.copy_within(b.., 0);
        let n = input.len().min(b);
        self.input[b..b + n].copy_from_slice(&input[..n]);
        self.input[b + n..].fill(0.0);

        let count = self.partitions.len();
        self.fdl_pos = (self.fdl_pos + count - 1) % count;
        self.time.copy_from_slice(&self.input);
        if self
            .fft_forward
            .process_with_scratch(&mut self.time, &mut self.fdl[self.fdl_pos], &mut self.scratch_forward)
            .is_err()
        {
            output.fill(0.0);
            return;
        }

        // Y = sum_p X[n - p] H[p]
        self.accum.fill(Complex32::new(0.0, 0.0));
        for (p, spectrum) in self.partitions.iter().enumerate() {
            let x = &self.fdl[(self.fdl_pos + p) % count];
            for ((acc, &xv), &hv) in self.accum.iter_mut().zip(x).zip(spectrum) {
                *acc += xv * hv;
            }
        }

        // DC and Nyquist bins of a real signal are real
        self.accum[0].im = 0.0;
        self.accum[b].im = 0.0;

        if self
            .fft_inverse
            .process_with_scratch(&mut self.accum, &mut self.time, &mut self.scratch_inverse)
            .is_err()
        {
            output.fill(0.0);
            return;
        }

        let norm = 1.0 / (2 * b) as f32;
        for (out, &v) in output.iter_mut().zip(&self.time[b..]) {
            *out = v * norm;
        }
    }

    /// Clear input history
    pub fn reset(&mut self) {
        self.input.fill(0.0);
        for slot in &mut self.fdl {
            slot.fill(Complex32::new(0.0, 0.0));
        }
        self.fdl_pos = 0;
    }
}

impl std::fmt::Debug for PartitionedConvolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartitionedConvolver")
            .field("block_size", &self.block_size)
            .field("partitions", &self.partitions.len())
            .finish()
    }
}

// ============ HOA Convolver ============

/// One SH-domain filter per ACN channel, summed into two ears
#[derive(Debug)]
pub struct HoaConvolver {
    order: AmbisonicOrder,
    block_size: usize,
    /// `None` marks a silent stage (missing HRIR data)
    stages: Vec<Option<PartitionedConvolver>>,
    enabled: bool,
    scratch: Vec<f32>,
}

impl HoaConvolver {
    /// Convolver with every stage silent
    pub fn silent(order: AmbisonicOrder, block_size: usize) -> Self {
        Self {
            order,
            block_size,
            stages: (0..order.channel_count()).map(|_| None).collect(),
            enabled: true,
            scratch: vec![0.0; block_size],
        }
    }

    /// Build every stage from an HRIR buffer list
    ///
    /// Missing buffers or channels leave their stages silent (logged);
    /// surplus buffers are ignored.
    pub fn from_hrir_buffers(order: AmbisonicOrder, buffers: &[HrirBuffer], block_size: usize) -> Self {
        let mut convolver = Self::silent(order, block_size);
        let mut planner = RealFftPlanner::<f32>::new();
        let required = HrirBuffer::required_buffers(order);

        if buffers.len() < required {
            log::warn!(
                "HRIR list has {} buffers, order {} needs {required}; missing stages stay silent",
                buffers.len(),
                order.as_usize()
            );
        } else if buffers.len() > required {
            log::debug!("ignoring {} surplus HRIR buffers", buffers.len() - required);
        }

        for acn in 0..order.channel_count() {
            let Some(buffer) = buffers.get(acn / 2) else {
                continue;
            };
            match buffer.channel(acn % 2) {
                Some(ir) if !ir.is_empty() => {
                    convolver.stages[acn] = Some(PartitionedConvolver::new(ir, block_size, &mut planner));
                }
                _ => log::warn!("HRIR buffer {} lacks channel {}; ACN {acn} is silent", acn / 2, acn % 2),
            }
        }

        log::debug!(
            "built HRIR convolver: order {}, {} of {} stages active",
            order.as_usize(),
            convolver.active_stages(),
            order.channel_count()
        );
        convolver
    }

    /// Order the stages were built for
    pub fn order(&self) -> AmbisonicOrder {
        self.order
    }

    /// Block size
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Number of stages with a filter
    pub fn active_stages(&self) -> usize {
        self.stages.iter().filter(|s| s.is_some()).count()
    }

    /// Check if convolution runs
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Resume convolution from cleared state
    pub fn enable(&mut self) {
        if !self.enabled {
            self.reset();
            self.enabled = true;
        }
    }

    /// Stop convolution; output is silent until re-enabled
    pub fn disable(&mut self) {
        self.enabled = false;
    }

    /// Clear every stage's history
    pub fn reset(&mut self) {
        for stage in self.stages.iter_mut().flatten() {
            stage.reset();
        }
    }

    /// Render `input` to the two ears, overwriting `left` and `right`
    pub fn process(&mut self, input: &AmbisonicBuffer, left: &mut [f32], right: &mut [f32]) {
        left.fill(0.0);
        right.fill(0.0);
        if !self.enabled {
            return;
        }

        let channels = input.channel_count().min(self.stages.len());
        for acn in 0..channels {
            let Some(stage) = self.stages[acn].as_mut() else {
                continue;
            };
            stage.process(input.channel(acn), &mut self.scratch);
            let sign = right_ear_sign(acn);
            for ((l, r), &v) in left.iter_mut().zip(right.iter_mut()).zip(&self.scratch) {
                *l += v;
                *r += sign * v;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn direct_convolution(x: &[f32], h: &[f32]) -> Vec<f32> {
        let mut y = vec![0.0; x.len()];
        for n in 0..x.len() {
            for (k, &hk) in h.iter().enumerate() {
                if n >= k {
                    y[n] += hk * x[n - k];
                }
            }
        }
        y
    }

    #[test]
    fn test_matches_direct_convolution() {
        let block = 32;
        let ir: Vec<f32> = (0..75).map(|i| ((i as f32) * 0.37).cos() * (-(i as f32) / 30.0).exp()).collect();
        let signal: Vec<f32> = (0..block * 8).map(|i| ((i * 13 % 29) as f32 / 29.0) - 0.5).collect();

        let mut planner = RealFftPlanner::<f32>::new();
        let mut conv = PartitionedConvolver::new(&ir, block, &mut planner);
        assert_eq!(conv.partition_count(), 3);

        let mut output = vec![0.0; signal.len()];
        for (x, y) in signal.chunks(block).zip(output.chunks_mut(block)) {
            conv.process(x, y);
        }

        let expected = direct_convolution(&signal, &ir);
        for (i, (a, b)) in output.iter().zip(&expected).enumerate() {
            assert!((a - b).abs() < 1e-4, "sample {i}: {a} vs {b}");
        }
    }

    #[test]
    fn test_unit_impulse_is_identity() {
        let mut planner = RealFftPlanner::<f32>::new();
        let mut conv = PartitionedConvolver::new(&[1.0], 16, &mut planner);
        let input: Vec<f32> = (0..16).map(|i| i as f32).collect();
        let mut output = vec![0.0; 16];
        conv.process(&input, &mut output);
        for (a, b) in output.iter().zip(&input) {
            assert!((a - b).abs() < 1e-4);
        }
    }

    #[test]
    fn test_reset_clears_tail() {
        let mut planner = RealFftPlanner::<f32>::new();
        let mut ir = [0.0f32; 20];
        ir[12] = 1.0;
        let mut conv = PartitionedConvolver::new(&ir, 8, &mut planner);
        let mut out = vec![0.0; 8];
        conv.process(&[1.0; 8], &mut out);
        conv.reset();
        conv.process(&[0.0; 8], &mut out);
        assert!(out.iter().all(|v| v.abs() < 1e-6));
    }

    #[test]
    fn test_incomplete_hrir_list_is_tolerated() {
        let buffers = vec![HrirBuffer::stereo(vec![1.0], vec![0.5]), HrirBuffer::new(vec![vec![0.25]])];
        let mut conv = HoaConvolver::from_hrir_buffers(AmbisonicOrder::Third, &buffers, 16);
        assert_eq!(conv.active_stages(), 3);

        let mut input = AmbisonicBuffer::new(AmbisonicOrder::Third, 16);
        for ch in input.channels_mut() {
            ch.fill(1.0);
        }
        let mut left = vec![0.0; 16];
        let mut right = vec![0.0; 16];
        conv.process(&input, &mut left, &mut right);
        // W + Y + Z on the left; W - Y + Z on the right
        assert!((left[5] - 1.75).abs() < 1e-4);
        assert!((right[5] - 0.75).abs() < 1e-4);
    }

    #[test]
    fn test_disable_silences_output() {
        let buffers = HrirBuffer::synthetic_set(AmbisonicOrder::First, 48000, 32);
        let mut conv = HoaConvolver::from_hrir_buffers(AmbisonicOrder::First, &buffers, 16);
        let mut input = AmbisonicBuffer::new(AmbisonicOrder::First, 16);
        input.channel_mut(0).fill(1.0);
        let mut left = vec![1.0; 16];
        let mut right = vec![1.0; 16];

        conv.disable();
        conv.process(&input, &mut left, &mut right);
        assert!(left.iter().chain(&right).all(|&v| v == 0.0));

        conv.enable();
        assert!(conv.is_enabled());
        conv.process(&input, &mut left, &mut right);
        assert!(left.iter().any(|&v| v != 0.0));
    }
}
