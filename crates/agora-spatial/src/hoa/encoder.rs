//! Ambisonic encoder - mono source to ACN channel gains

use super::{AmbisonicOrder, acn_index};
use crate::MAX_CHANNELS;
use crate::tables::{SphericalHarmonicsTables, azimuth_index, elevation_index};

/// Default azimuth when the input is not a number
pub const DEFAULT_AZIMUTH: f64 = 0.0;

/// Default elevation when the input is not a number
pub const DEFAULT_ELEVATION: f64 = 0.0;

/// Largest source width with its own weight row
pub const MAX_SOURCE_WIDTH: f64 = 359.0;

/// Table-driven point/wide source encoder
///
/// Holds the current direction and width and the resulting per-channel
/// gains. The gain array is sized for the maximum order; only the first
/// `order.channel_count()` entries are live.
#[derive(Debug, Clone)]
pub struct Encoder {
    /// Ambisonic order
    order: AmbisonicOrder,
    /// Azimuth in degrees, `[0, 360)`
    azimuth: f64,
    /// Elevation in degrees, `[-90, 90]`
    elevation: f64,
    /// Row of the width weight table
    spread_index: usize,
    /// ACN gains
    gains: [f32; MAX_CHANNELS],
}

impl Encoder {
    /// Create new encoder facing front with zero width
    pub fn new(order: AmbisonicOrder) -> Self {
        let mut encoder = Self {
            order,
            azimuth: DEFAULT_AZIMUTH,
            elevation: DEFAULT_ELEVATION,
            spread_index: 0,
            gains: [0.0; MAX_CHANNELS],
        };
        encoder.update_gains();
        encoder
    }

    /// Set order, clamping invalid values into the supported range
    pub fn set_ambisonic_order(&mut self, order: f64) {
        self.set_order(AmbisonicOrder::clamped(order));
    }

    /// Set order from a validated value
    pub fn set_order(&mut self, order: AmbisonicOrder) {
        self.order = order;
        self.gains = [0.0; MAX_CHANNELS];
        self.update_gains();
    }

    /// Set source direction in degrees
    pub fn set_direction(&mut self, azimuth: f64, elevation: f64) {
        let azimuth = if azimuth.is_finite() {
            azimuth
        } else {
            log::warn!("invalid azimuth {azimuth}, using {DEFAULT_AZIMUTH}");
            DEFAULT_AZIMUTH
        };
        let elevation = if elevation.is_nan() {
            log::warn!("invalid elevation {elevation}, using {DEFAULT_ELEVATION}");
            DEFAULT_ELEVATION
        } else {
            elevation
        };

        self.azimuth = azimuth.rem_euclid(360.0);
        if self.azimuth >= 360.0 {
            self.azimuth = 0.0;
        }
        self.elevation = elevation.clamp(-90.0, 90.0);
        self.update_gains();
    }

    /// Set source width in degrees; wider sources blend towards omni
    pub fn set_source_width(&mut self, width: f64) {
        let width = if width.is_nan() {
            log::warn!("invalid source width {width}, using 0");
            0.0
        } else {
            width
        };
        self.spread_index = width.clamp(0.0, MAX_SOURCE_WIDTH).round() as usize;
        self.set_direction(self.azimuth, self.elevation);
    }

    /// Current order
    pub fn order(&self) -> AmbisonicOrder {
        self.order
    }

    /// Number of live channels
    pub fn channel_count(&self) -> usize {
        self.order.channel_count()
    }

    /// Current azimuth (degrees, `[0, 360)`)
    pub fn azimuth(&self) -> f64 {
        self.azimuth
    }

    /// Current elevation (degrees, `[-90, 90]`)
    pub fn elevation(&self) -> f64 {
        self.elevation
    }

    /// Current width row
    pub fn spread_index(&self) -> usize {
        self.spread_index
    }

    /// Live ACN gains
    pub fn gains(&self) -> &[f32] {
        &self.gains[..self.channel_count()]
    }

    fn update_gains(&mut self) {
        let tables = SphericalHarmonicsTables::get();
        let weights = tables.width_weights(self.spread_index);
        let az_row = tables.azimuth_row(self.azimuth.round() as usize);
        let el_row = tables.elevation_row((self.elevation + 90.0).round() as usize);

        self.gains[0] = weights[0];

        let order = self.order.as_usize() as i32;
        for i in 1..=order {
            let degree_weight = weights[i as usize];
            for j in -i..=i {
                let mut value = el_row[elevation_index(i as usize, j)];
                if j != 0 {
                    value *= az_row[azimuth_index(j)];
                }
                self.gains[acn_index(i, j)] = value * degree_weight;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::spherical_harmonics;

    #[test]
    fn test_encoder_creation() {
        let encoder = Encoder::new(AmbisonicOrder::First);
        assert_eq!(encoder.channel_count(), 4);
        assert_eq!(encoder.gains().len(), 4);

        let encoder = Encoder::new(AmbisonicOrder::Third);
        assert_eq!(encoder.gains().len(), 16);
    }

    #[test]
    fn test_encode_front() {
        let encoder = Encoder::new(AmbisonicOrder::First);
        let g = encoder.gains();

        assert!((g[0] - 1.0).abs() < 1e-6); // W
        assert!(g[1].abs() < 1e-6); // Y
        assert!(g[2].abs() < 1e-6); // Z
        assert!((g[3] - 1.0).abs() < 1e-6); // X
    }

    #[test]
    fn test_encode_left() {
        let mut encoder = Encoder::new(AmbisonicOrder::First);
        encoder.set_direction(90.0, 0.0);
        let g = encoder.gains();

        assert!((g[1] - 1.0).abs() < 1e-6);
        assert!(g[3].abs() < 1e-6);
    }

    #[test]
    fn test_matches_exact_harmonics_on_grid() {
        let mut encoder = Encoder::new(AmbisonicOrder::Third);
        let mut exact = [0.0; 16];
        for &(az, el) in &[(0.0, 0.0), (17.0, 40.0), (200.0, -33.0), (359.0, 89.0), (90.0, -90.0)] {
            encoder.set_direction(az, el);
            spherical_harmonics(az, el, 3, &mut exact);
            for (ch, (&g, &e)) in encoder.gains().iter().zip(&exact).enumerate() {
                assert!((g as f64 - e).abs() < 1e-5, "ch {ch} at ({az}, {el}): {g} vs {e}");
            }
        }
    }

    #[test]
    fn test_direction_normalization() {
        let mut encoder = Encoder::new(AmbisonicOrder::Second);
        encoder.set_direction(-90.0, 120.0);
        assert_eq!(encoder.azimuth(), 270.0);
        assert_eq!(encoder.elevation(), 90.0);

        encoder.set_direction(725.0, -95.0);
        assert!((encoder.azimuth() - 5.0).abs() < 1e-9);
        assert_eq!(encoder.elevation(), -90.0);

        encoder.set_direction(f64::NAN, f64::NAN);
        assert_eq!(encoder.azimuth(), DEFAULT_AZIMUTH);
        assert_eq!(encoder.elevation(), DEFAULT_ELEVATION);
    }

    #[test]
    fn test_w_independent_of_direction() {
        let mut encoder = Encoder::new(AmbisonicOrder::Third);
        for width in [0.0, 45.0, 200.0] {
            encoder.set_source_width(width);
            let w = encoder.gains()[0];
            for az in (0..360).step_by(30) {
                for el in (-90..=90).step_by(30) {
                    encoder.set_direction(az as f64, el as f64);
                    assert_eq!(encoder.gains()[0], w);
                }
            }
        }
    }

    #[test]
    fn test_width_keeps_direction() {
        let mut encoder = Encoder::new(AmbisonicOrder::Second);
        encoder.set_direction(123.0, 12.0);
        encoder.set_source_width(90.0);
        assert!((encoder.azimuth() - 123.0).abs() < 1e-9);
        assert!((encoder.elevation() - 12.0).abs() < 1e-9);
        assert_eq!(encoder.spread_index(), 90);

        encoder.set_source_width(1000.0);
        assert_eq!(encoder.spread_index(), 359);
        encoder.set_source_width(-3.0);
        assert_eq!(encoder.spread_index(), 0);
        encoder.set_source_width(f64::NAN);
        assert_eq!(encoder.spread_index(), 0);
    }

    #[test]
    fn test_directional_energy_shrinks_with_width() {
        let mut encoder = Encoder::new(AmbisonicOrder::Third);
        let directions = [(0.0, 0.0), (75.0, 20.0), (180.0, -45.0), (300.0, 60.0)];

        let mut previous = f32::INFINITY;
        for width in (0..360).step_by(5) {
            encoder.set_source_width(width as f64);
            let mut spread = 0.0f32;
            for &(az, el) in &directions {
                encoder.set_direction(az, el);
                let g = encoder.gains();
                spread += g[1..].iter().map(|v| v * v).sum::<f32>() / (g[0] * g[0]);
            }
            spread /= directions.len() as f32;
            assert!(spread <= previous + 1e-4, "width {width}: {spread} > {previous}");
            previous = spread;
        }
        assert!(previous < 0.01);
    }

    #[test]
    fn test_order_change_rebuilds_gains() {
        let mut encoder = Encoder::new(AmbisonicOrder::Third);
        encoder.set_direction(30.0, 0.0);
        encoder.set_ambisonic_order(1.0);
        assert_eq!(encoder.gains().len(), 4);

        encoder.set_ambisonic_order(f64::NAN);
        assert_eq!(encoder.order(), AmbisonicOrder::First);
        encoder.set_ambisonic_order(12.0);
        assert_eq!(encoder.order(), AmbisonicOrder::Third);
        assert!((encoder.azimuth() - 30.0).abs() < 1e-9);
    }
}
