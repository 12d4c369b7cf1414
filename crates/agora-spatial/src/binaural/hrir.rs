//! SH-domain HRIR buffers
//!
//! The renderer takes its filters as a list of opaque two-channel buffers.
//! Channel `c` of buffer `k` is the left-ear filter of ACN channel `2k + c`;
//! the right ear reuses it with the sign of every `m < 0` channel flipped.

use std::f64::consts::PI;

use crate::hoa::AmbisonicOrder;
use crate::pose::Direction;
use crate::tables::spherical_harmonics;
use crate::MAX_CHANNELS;

/// One HRIR buffer (up to two impulse responses)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HrirBuffer {
    channels: Vec<Vec<f32>>,
}

impl HrirBuffer {
    /// Wrap impulse responses; only the first two are used
    pub fn new(channels: Vec<Vec<f32>>) -> Self {
        Self { channels }
    }

    /// Two-channel buffer
    pub fn stereo(first: Vec<f32>, second: Vec<f32>) -> Self {
        Self::new(vec![first, second])
    }

    /// Number of impulse responses
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Impulse response `index`, if present
    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    /// Longest impulse response
    pub fn length(&self) -> usize {
        self.channels.iter().map(Vec::len).max().unwrap_or(0)
    }

    /// Number of buffers a complete set needs for `order`
    pub fn required_buffers(order: AmbisonicOrder) -> usize {
        order.channel_count().div_ceil(2)
    }

    /// Synthetic SH-domain HRIR set for a spherical head
    ///
    /// Per-direction left-ear responses (interaural delay, head shadow and a
    /// small elevation-dependent pinna echo) are taken on a Fibonacci
    /// sphere and projected onto the SN3D basis with a sampling decoder.
    pub fn synthetic_set(order: AmbisonicOrder, sample_rate: u32, length: usize) -> Vec<HrirBuffer> {
        let channel_count = order.channel_count();
        let mut filters = vec![vec![0.0f64; length]; channel_count];
        let mut sh = [0.0f64; MAX_CHANNELS];
        let mut response = vec![0.0f64; length];

        let weight = 1.0 / SYNTHETIC_DIRECTIONS as f64;
        for k in 0..SYNTHETIC_DIRECTIONS {
            let direction = fibonacci_direction(k, SYNTHETIC_DIRECTIONS);
            spherical_harmonics(direction.azimuth, direction.elevation, order.as_usize(), &mut sh);
            left_ear_response(&direction, sample_rate as f64, &mut response);

            for (acn, filter) in filters.iter_mut().enumerate() {
                let degree = (acn as f64).sqrt().floor();
                let gain = weight * (2.0 * degree + 1.0) * sh[acn];
                for (dst, &r) in filter.iter_mut().zip(&response) {
                    *dst += gain * r;
                }
            }
        }

        let mut filters: Vec<Vec<f32>> = filters
            .into_iter()
            .map(|f| f.into_iter().map(|v| v as f32).collect())
            .collect();
        if filters.len() % 2 == 1 {
            filters.push(vec![0.0; length]);
        }

        let mut buffers = Vec::with_capacity(filters.len() / 2);
        let mut iter = filters.into_iter();
        while let (Some(first), Some(second)) = (iter.next(), iter.next()) {
            buffers.push(HrirBuffer::stereo(first, second));
        }
        buffers
    }
}

/// Sign applied to ACN channel `acn` for the right ear
#[inline]
pub fn right_ear_sign(acn: usize) -> f32 {
    let degree = (acn as f64).sqrt().floor() as usize;
    if acn < degree * degree + degree { -1.0 } else { 1.0 }
}

// ============ Spherical Head Model ============

const SYNTHETIC_DIRECTIONS: usize = 128;
const HEAD_RADIUS: f64 = 0.0875; // metres
const SPEED_OF_SOUND: f64 = 343.0; // m/s
const ONSET_SAMPLES: f64 = 8.0;

fn fibonacci_direction(index: usize, count: usize) -> Direction {
    let golden = PI * (3.0 - 5.0f64.sqrt());
    let z = 1.0 - 2.0 * (index as f64 + 0.5) / count as f64;
    let azimuth = (golden * index as f64).to_degrees();
    Direction::new(azimuth.rem_euclid(360.0), z.asin().to_degrees())
}

/// Left-ear impulse response for a source direction
fn left_ear_response(direction: &Direction, sample_rate: f64, out: &mut [f64]) {
    // Left ear sits on +y
    let lateral = direction.to_unit_vector().y;
    let delay = ONSET_SAMPLES + HEAD_RADIUS / SPEED_OF_SOUND * (1.0 - lateral) * sample_rate;
    let gain = 0.35 + 0.65 * (1.0 + lateral) * 0.5;
    // Shadowed side gets a wider (duller) pulse
    let sigma = 0.6 + 1.4 * (1.0 - lateral) * 0.5;
    let pinna_delay = delay + 4.0 + 6.0 * (0.5 - direction.elevation / 180.0);
    let pinna_gain = 0.15 * gain * direction.elevation.to_radians().cos();

    for (i, sample) in out.iter_mut().enumerate() {
        let t = i as f64;
        let direct = (t - delay) / sigma;
        let echo = (t - pinna_delay) / (sigma * 2.0);
        *sample = gain * (-0.5 * direct * direct).exp() + pinna_gain * (-0.5 * echo * echo).exp();
    }

    let sum: f64 = out.iter().sum();
    if sum > 0.0 {
        let scale = gain / sum;
        out.iter_mut().for_each(|s| *s *= scale);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_buffers() {
        assert_eq!(HrirBuffer::required_buffers(AmbisonicOrder::First), 2);
        assert_eq!(HrirBuffer::required_buffers(AmbisonicOrder::Second), 5);
        assert_eq!(HrirBuffer::required_buffers(AmbisonicOrder::Third), 8);
    }

    #[test]
    fn test_right_ear_sign() {
        let signs: Vec<f32> = (0..9).map(right_ear_sign).collect();
        assert_eq!(signs, vec![1.0, -1.0, 1.0, 1.0, -1.0, -1.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_synthetic_set_shape() {
        for order in [AmbisonicOrder::First, AmbisonicOrder::Second, AmbisonicOrder::Third] {
            let set = HrirBuffer::synthetic_set(order, 48000, 64);
            assert_eq!(set.len(), HrirBuffer::required_buffers(order));
            for buffer in &set {
                assert_eq!(buffer.channel_count(), 2);
                assert_eq!(buffer.length(), 64);
                assert!(buffer.channels.iter().flatten().all(|v| v.is_finite()));
            }
        }
    }

    #[test]
    fn test_synthetic_left_source_is_louder_left() {
        // First-order filters: W + Y for a source on the left
        let set = HrirBuffer::synthetic_set(AmbisonicOrder::First, 48000, 64);
        let w = set[0].channel(0).unwrap();
        let y = set[0].channel(1).unwrap();
        let left: f32 = w.iter().zip(y).map(|(a, b)| (a + b).abs()).sum();
        let right: f32 = w.iter().zip(y).map(|(a, b)| (a - b).abs()).sum();
        assert!(left > right);
    }

    #[test]
    fn test_fibonacci_covers_sphere() {
        let mut sum = crate::pose::Vec3::zeros();
        for k in 0..SYNTHETIC_DIRECTIONS {
            sum += fibonacci_direction(k, SYNTHETIC_DIRECTIONS).to_unit_vector();
        }
        assert!(sum.norm() / (SYNTHETIC_DIRECTIONS as f64) < 0.05);
    }
}
