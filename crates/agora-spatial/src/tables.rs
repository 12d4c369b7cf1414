//! Precomputed spherical-harmonic tables
//!
//! Real spherical harmonics in ACN order with SN3D normalization and no
//! Condon-Shortley phase (AmbiX). The encoder reads three read-only tables,
//! built once on first use:
//! - azimuth terms `sin/cos(j φ)` for every integer degree
//! - SN3D associated Legendre terms for every integer elevation
//! - per-degree weights for every integer source width

use std::sync::OnceLock;

use crate::MAX_ORDER;

/// Azimuth table rows (one per degree, 0..360)
pub const AZIMUTH_ROWS: usize = 360;

/// Elevation table rows (one per degree, -90..=90)
pub const ELEVATION_ROWS: usize = 181;

/// Width table rows (one per degree of source width, 0..360)
pub const WIDTH_ROWS: usize = 360;

/// Entries per azimuth row: `[sin 3φ, sin 2φ, sin φ, cos φ, cos 2φ, cos 3φ]`
pub const AZIMUTH_TERMS: usize = 2 * MAX_ORDER;

/// Entries per elevation row: one per `(degree, |index|)` with degree >= 1
pub const ELEVATION_TERMS: usize = MAX_ORDER * (MAX_ORDER + 3) / 2;

/// Read-only harmonic and weighting tables
pub struct SphericalHarmonicsTables {
    azimuth: Vec<[f32; AZIMUTH_TERMS]>,
    elevation: Vec<[f32; ELEVATION_TERMS]>,
    width_weights: Vec<[f32; MAX_ORDER + 1]>,
}

static TABLES: OnceLock<SphericalHarmonicsTables> = OnceLock::new();

impl SphericalHarmonicsTables {
    /// Shared tables (built on first call)
    pub fn get() -> &'static Self {
        TABLES.get_or_init(Self::build)
    }

    fn build() -> Self {
        let azimuth = (0..AZIMUTH_ROWS)
            .map(|deg| {
                let phi = (deg as f64).to_radians();
                let mut row = [0.0f32; AZIMUTH_TERMS];
                for j in 1..=MAX_ORDER as i32 {
                    row[azimuth_index(-j)] = (j as f64 * phi).sin() as f32;
                    row[azimuth_index(j)] = (j as f64 * phi).cos() as f32;
                }
                row
            })
            .collect();

        let elevation = (0..ELEVATION_ROWS)
            .map(|row_idx| {
                let theta = (row_idx as f64 - 90.0).to_radians();
                let x = theta.sin();
                let mut row = [0.0f32; ELEVATION_TERMS];
                for i in 1..=MAX_ORDER {
                    for j in 0..=i {
                        row[elevation_index(i, j as i32)] =
                            (sn3d_norm(i, j) * associated_legendre(i, j, x)) as f32;
                    }
                }
                row
            })
            .collect();

        let width_weights = (0..WIDTH_ROWS).map(|w| width_row(w as f64)).collect();

        Self {
            azimuth,
            elevation,
            width_weights,
        }
    }

    /// Azimuth row for an integer degree in `[0, 360)`
    #[inline]
    pub fn azimuth_row(&self, degree: usize) -> &[f32; AZIMUTH_TERMS] {
        &self.azimuth[degree % AZIMUTH_ROWS]
    }

    /// Elevation row; `row` is the elevation in degrees offset by +90
    #[inline]
    pub fn elevation_row(&self, row: usize) -> &[f32; ELEVATION_TERMS] {
        &self.elevation[row.min(ELEVATION_ROWS - 1)]
    }

    /// Per-degree weights for a spread index in `[0, 360)`
    #[inline]
    pub fn width_weights(&self, spread_index: usize) -> &[f32; MAX_ORDER + 1] {
        &self.width_weights[spread_index.min(WIDTH_ROWS - 1)]
    }
}

/// Azimuth-table column for order index `j != 0`
#[inline]
pub fn azimuth_index(j: i32) -> usize {
    debug_assert!(j != 0 && j.unsigned_abs() as usize <= MAX_ORDER);
    if j > 0 {
        (MAX_ORDER as i32 + j - 1) as usize
    } else {
        (MAX_ORDER as i32 + j) as usize
    }
}

/// Elevation-table column for degree `i >= 1` and order index `j`
#[inline]
pub fn elevation_index(i: usize, j: i32) -> usize {
    debug_assert!(i >= 1 && i <= MAX_ORDER && j.unsigned_abs() as usize <= i);
    i * (i + 1) / 2 + j.unsigned_abs() as usize - 1
}

/// Associated Legendre function `P_l^m(x)` without the Condon-Shortley phase
pub fn associated_legendre(l: usize, m: usize, x: f64) -> f64 {
    debug_assert!(m <= l);
    let s = (1.0 - x * x).max(0.0).sqrt();

    let mut pmm = 1.0;
    for k in 1..=m {
        pmm *= (2 * k - 1) as f64 * s;
    }
    if l == m {
        return pmm;
    }

    let mut pm1 = x * (2 * m + 1) as f64 * pmm;
    if l == m + 1 {
        return pm1;
    }

    let mut pll = 0.0;
    for ll in (m + 2)..=l {
        pll = ((2 * ll - 1) as f64 * x * pm1 - (ll + m - 1) as f64 * pmm) / (ll - m) as f64;
        pmm = pm1;
        pm1 = pll;
    }
    pll
}

/// SN3D normalization factor for degree `l`, order `|m|`
pub fn sn3d_norm(l: usize, m: usize) -> f64 {
    let ratio: f64 = ((l - m + 1)..=(l + m)).map(|k| 1.0 / k as f64).product();
    let delta = if m == 0 { 1.0 } else { 2.0 };
    (delta * ratio).sqrt()
}

/// Evaluate the ACN/SN3D basis exactly for a direction in degrees
///
/// Writes `(order + 1)^2` values into `out`.
pub fn spherical_harmonics(azimuth: f64, elevation: f64, order: usize, out: &mut [f64]) {
    let phi = azimuth.to_radians();
    let x = elevation.to_radians().sin();
    for l in 0..=order {
        for m in -(l as i32)..=(l as i32) {
            let am = m.unsigned_abs() as usize;
            let mut value = sn3d_norm(l, am) * associated_legendre(l, am, x);
            if m > 0 {
                value *= (m as f64 * phi).cos();
            } else if m < 0 {
                value *= (am as f64 * phi).sin();
            }
            out[((l * l + l) as i32 + m) as usize] = value;
        }
    }
}

/// Legendre polynomial `P_l(x)`
fn legendre(l: usize, x: f64) -> f64 {
    associated_legendre(l, 0, x)
}

/// Weights of one width row
///
/// Degree `l` gets the zonal coefficient of a spherical cap with half-angle
/// `width / 2`, `(P_{l-1}(c) - P_{l+1}(c)) / ((2l + 1)(1 - c))`. The row is
/// then scaled so that `sum_l w_l^2` equals that of a point source
/// (`MAX_ORDER + 1`): a wide source keeps its loudness as it turns diffuse.
fn width_row(width_degrees: f64) -> [f32; MAX_ORDER + 1] {
    let c = (width_degrees * 0.5).to_radians().cos();
    let mut cap = [1.0f64; MAX_ORDER + 1];
    if 1.0 - c > 1e-9 {
        for (l, w) in cap.iter_mut().enumerate().skip(1) {
            *w = (legendre(l - 1, c) - legendre(l + 1, c)) / ((2 * l + 1) as f64 * (1.0 - c));
        }
    }

    let energy: f64 = cap.iter().map(|w| w * w).sum();
    let scale = ((MAX_ORDER + 1) as f64 / energy).sqrt();

    let mut row = [0.0f32; MAX_ORDER + 1];
    for (dst, w) in row.iter_mut().zip(cap) {
        *dst = (w * scale) as f32;
    }
    row
}
