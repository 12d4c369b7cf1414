//! Spherical-harmonic rotation matrices (Ivanic-Ruedenberg recurrence)
//!
//! Band 1 is the 3x3 rotation itself, permuted into ACN order `(y, z, x)`.
//! Band `l >= 2` follows from band 1 and band `l - 1`, so bands are rebuilt
//! in strictly increasing order whenever band 1 changes. All maths is `f64`
//! and closed-form: the result is exact up to rounding and depends only on
//! the current band 1.

use nalgebra::Matrix3;

use super::AmbisonicOrder;
use crate::MAX_ORDER;

/// Total number of band elements for bands `1..=MAX_ORDER`
pub const BAND_STORAGE: usize = band_offset(MAX_ORDER + 1);

/// Start of band `l` in the flat storage
pub const fn band_offset(l: usize) -> usize {
    // sum_{k=1}^{l-1} (2k+1)^2
    let mut offset = 0;
    let mut k = 1;
    while k < l {
        offset += (2 * k + 1) * (2 * k + 1);
        k += 1;
    }
    offset
}

/// Flat index of the centred element `(m, n)` of band `l`
///
/// Row `m` and column `n` run over `[-l, l]`; rows are contiguous.
#[inline]
pub fn band_index(l: usize, m: i32, n: i32) -> usize {
    debug_assert!((1..=MAX_ORDER).contains(&l), "band {l} out of range");
    let li = l as i32;
    debug_assert!(m.abs() <= li && n.abs() <= li, "({m}, {n}) outside band {l}");
    let size = 2 * l + 1;
    band_offset(l) + (m + li) as usize * size + (n + li) as usize
}

/// World-to-listener rotation for the ambisonic field
#[derive(Debug, Clone)]
pub struct RotationMatrixEngine {
    /// Highest band that is kept current
    order: AmbisonicOrder,
    /// Source rotation (world -> listener), kept for diagnostics
    base: Matrix3<f64>,
    /// Band matrices 1..=MAX_ORDER, flat
    bands: [f64; BAND_STORAGE],
}

/// ACN position (within band 1) of each Cartesian axis index m = -1, 0, 1
const BAND1_AXES: [usize; 3] = [1, 2, 0]; // y, z, x

impl RotationMatrixEngine {
    /// Create with the identity rotation
    pub fn new(order: AmbisonicOrder) -> Self {
        let mut engine = Self {
            order,
            base: Matrix3::identity(),
            bands: [0.0; BAND_STORAGE],
        };
        engine.set_base_rotation(&Matrix3::identity());
        engine
    }

    /// Current order
    pub fn order(&self) -> AmbisonicOrder {
        self.order
    }

    /// Change order and rebuild the bands it needs
    pub fn set_order(&mut self, order: AmbisonicOrder) {
        self.order = order;
        self.recompute_higher_bands();
    }

    /// Store band 1 from a 3x3 rotation and rebuild higher bands
    pub fn set_base_rotation(&mut self, rotation: &Matrix3<f64>) {
        self.base = *rotation;
        for m in -1..=1i32 {
            for n in -1..=1i32 {
                let row = BAND1_AXES[(m + 1) as usize];
                let col = BAND1_AXES[(n + 1) as usize];
                self.bands[band_index(1, m, n)] = rotation[(row, col)];
            }
        }
        self.recompute_higher_bands();
    }

    /// Set rotation from a column-major 3x3 matrix
    pub fn set_rotation_matrix3(&mut self, matrix: &[f64; 9]) {
        self.set_base_rotation(&Matrix3::from_column_slice(matrix));
    }

    /// Set rotation from the upper-left block of a column-major 4x4 matrix
    pub fn set_rotation_matrix4(&mut self, matrix: &[f64; 16]) {
        let rotation = Matrix3::new(
            matrix[0], matrix[4], matrix[8], //
            matrix[1], matrix[5], matrix[9], //
            matrix[2], matrix[6], matrix[10],
        );
        self.set_base_rotation(&rotation);
    }

    /// Current rotation, column-major 3x3
    pub fn rotation_matrix3(&self) -> [f64; 9] {
        let mut out = [0.0; 9];
        out.copy_from_slice(self.base.as_slice());
        out
    }

    /// Current rotation, column-major 4x4 with no translation
    pub fn rotation_matrix4(&self) -> [f64; 16] {
        let mut out = [0.0; 16];
        for col in 0..3 {
            for row in 0..3 {
                out[col * 4 + row] = self.base[(row, col)];
            }
        }
        out[15] = 1.0;
        out
    }

    /// Current rotation as a matrix
    pub fn base_rotation(&self) -> &Matrix3<f64> {
        &self.base
    }

    /// Rebuild bands `2..=order` from band 1
    pub fn recompute_higher_bands(&mut self) {
        for l in 2..=self.order.as_usize() {
            self.compute_band(l);
        }
    }

    /// Element `(m, n)` of band `l`
    #[inline]
    pub fn element(&self, l: usize, m: i32, n: i32) -> f64 {
        self.bands[band_index(l, m, n)]
    }

    /// Band `l` as a row-major `(2l+1)^2` slice
    pub fn band(&self, l: usize) -> &[f64] {
        let size = 2 * l + 1;
        &self.bands[band_offset(l)..band_offset(l) + size * size]
    }

    /// All live band elements (bands `1..=order`), flat
    pub fn bands(&self) -> &[f64] {
        &self.bands[..band_offset(self.order.as_usize() + 1)]
    }

    /// Rotate one frame of ACN channels (`input.len() >= channel_count`)
    pub fn apply(&self, input: &[f64], output: &mut [f64]) {
        output[0] = input[0];
        for l in 1..=self.order.as_usize() {
            let li = l as i32;
            let start = l * l;
            for m in -li..=li {
                let mut sum = 0.0;
                for n in -li..=li {
                    sum += self.element(l, m, n) * input[start + (n + li) as usize];
                }
                output[start + (m + li) as usize] = sum;
            }
        }
    }

    fn compute_band(&mut self, l: usize) {
        let li = l as i32;
        for m in -li..=li {
            for n in -li..=li {
                let (u, v, w) = uvw_coefficients(l, m, n);
                let mut value = 0.0;
                // U and W index outside band l-1 exactly when their
                // coefficient vanishes
                if u != 0.0 {
                    value += u * self.u(l, m, n);
                }
                if v != 0.0 {
                    value += v * self.v(l, m, n);
                }
                if w != 0.0 {
                    value += w * self.w(l, m, n);
                }
                self.bands[band_index(l, m, n)] = value;
            }
        }
    }

    fn p(&self, i: i32, a: i32, b: i32, l: usize) -> f64 {
        let li = l as i32;
        let prev = l - 1;
        if b == li {
            self.element(1, i, 1) * self.element(prev, a, li - 1)
                - self.element(1, i, -1) * self.element(prev, a, -li + 1)
        } else if b == -li {
            self.element(1, i, 1) * self.element(prev, a, -li + 1)
                + self.element(1, i, -1) * self.element(prev, a, li - 1)
        } else {
            self.element(1, i, 0) * self.element(prev, a, b)
        }
    }

    fn u(&self, l: usize, m: i32, n: i32) -> f64 {
        self.p(0, m, n, l)
    }

    fn v(&self, l: usize, m: i32, n: i32) -> f64 {
        if m == 0 {
            self.p(1, 1, n, l) + self.p(-1, -1, n, l)
        } else if m > 0 {
            let d: f64 = if m == 1 { 1.0 } else { 0.0 };
            let mut value = self.p(1, m - 1, n, l) * (1.0 + d).sqrt();
            if d == 0.0 {
                value -= self.p(-1, -m + 1, n, l);
            }
            value
        } else {
            let d: f64 = if m == -1 { 1.0 } else { 0.0 };
            let mut value = self.p(-1, -m - 1, n, l) * (1.0 + d).sqrt();
            if d == 0.0 {
                value += self.p(1, m + 1, n, l);
            }
            value
        }
    }

    fn w(&self, l: usize, m: i32, n: i32) -> f64 {
        debug_assert!(m != 0);
        if m > 0 {
            self.p(1, m + 1, n, l) + self.p(-1, -m - 1, n, l)
        } else {
            self.p(1, m - 1, n, l) - self.p(-1, -m + 1, n, l)
        }
    }
}

/// Closed-form `(u, v, w)` weights of element `(m, n)` in band `l`
fn uvw_coefficients(l: usize, m: i32, n: i32) -> (f64, f64, f64) {
    let l = l as f64;
    let m_abs = m.abs() as f64;
    let m = m as f64;
    let n = n as f64;
    let d: f64 = if m == 0.0 { 1.0 } else { 0.0 };

    let denominator = if n.abs() == l {
        2.0 * l * (2.0 * l - 1.0)
    } else {
        (l + n) * (l - n)
    };

    let u = ((l + m) * (l - m) / denominator).sqrt();
    let v = 0.5 * ((1.0 + d) * (l + m_abs - 1.0) * (l + m_abs) / denominator).sqrt() * (1.0 - 2.0 * d);
    let w = -0.5 * ((l - m_abs - 1.0) * (l - m_abs) / denominator).sqrt() * (1.0 - d);
    (u, v, w)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::spherical_harmonics;
    use nalgebra::Rotation3;

    fn random_rotation(seed: u32) -> Matrix3<f64> {
        let s = seed as f64;
        Rotation3::from_euler_angles(0.37 * s + 0.1, -0.21 * s + 0.4, 1.13 * s - 0.2).into_inner()
    }

    #[test]
    fn test_storage_layout() {
        assert_eq!(band_offset(1), 0);
        assert_eq!(band_offset(2), 9);
        assert_eq!(band_offset(3), 34);
        assert_eq!(BAND_STORAGE, 83);
        assert_eq!(band_index(1, -1, -1), 0);
        assert_eq!(band_index(1, 1, 1), 8);
        assert_eq!(band_index(2, -2, -2), 9);
        assert_eq!(band_index(3, 3, 3), 82);
    }

    #[test]
    fn test_identity_bands() {
        for order in [AmbisonicOrder::First, AmbisonicOrder::Second, AmbisonicOrder::Third] {
            let engine = RotationMatrixEngine::new(order);
            for l in 1..=order.as_usize() {
                let li = l as i32;
                for m in -li..=li {
                    for n in -li..=li {
                        let expected = if m == n { 1.0 } else { 0.0 };
                        assert!((engine.element(l, m, n) - expected).abs() < 1e-12);
                    }
                }
            }
        }
    }

    #[test]
    fn test_rotation_moves_harmonics() {
        // D(R) Y(u) == Y(R u)
        let mut engine = RotationMatrixEngine::new(AmbisonicOrder::Third);
        let mut before = [0.0; 16];
        let mut rotated = [0.0; 16];
        let mut expected = [0.0; 16];

        for seed in 1..6 {
            let rotation = random_rotation(seed);
            engine.set_base_rotation(&rotation);

            let dir = crate::pose::Direction::new(20.0 * seed as f64, 10.0 - 7.0 * seed as f64);
            spherical_harmonics(dir.azimuth, dir.elevation, 3, &mut before);
            engine.apply(&before, &mut rotated);

            let moved = crate::pose::Direction::from_vector(&(rotation * dir.to_unit_vector()));
            spherical_harmonics(moved.azimuth, moved.elevation, 3, &mut expected);

            for ch in 0..16 {
                assert!((rotated[ch] - expected[ch]).abs() < 1e-9, "seed {seed} ch {ch}");
            }
        }
    }

    #[test]
    fn test_composition() {
        let r1 = random_rotation(2);
        let r2 = random_rotation(5);
        let input: Vec<f64> = (0..16).map(|i| (i as f64 * 0.7).sin()).collect();

        let mut engine = RotationMatrixEngine::new(AmbisonicOrder::Third);
        let mut step1 = [0.0; 16];
        let mut step2 = [0.0; 16];
        engine.set_base_rotation(&r1);
        engine.apply(&input, &mut step1);
        engine.set_base_rotation(&r2);
        engine.apply(&step1, &mut step2);

        let mut direct = [0.0; 16];
        engine.set_base_rotation(&(r2 * r1));
        engine.apply(&input, &mut direct);

        for ch in 0..16 {
            assert!((step2[ch] - direct[ch]).abs() < 1e-6);
        }
    }

    #[test]
    fn test_bands_are_orthogonal() {
        let mut engine = RotationMatrixEngine::new(AmbisonicOrder::Third);
        engine.set_base_rotation(&random_rotation(3));
        for l in 1..=3usize {
            let size = 2 * l + 1;
            let band = engine.band(l);
            for a in 0..size {
                for b in 0..size {
                    let dot: f64 = (0..size).map(|k| band[a * size + k] * band[b * size + k]).sum();
                    let expected = if a == b { 1.0 } else { 0.0 };
                    assert!((dot - expected).abs() < 1e-9);
                }
            }
        }
    }

    #[test]
    fn test_recompute_is_idempotent() {
        let mut engine = RotationMatrixEngine::new(AmbisonicOrder::Third);
        engine.set_base_rotation(&random_rotation(4));
        let first = engine.bands().to_vec();
        engine.recompute_higher_bands();
        engine.recompute_higher_bands();
        assert_eq!(first, engine.bands());
    }

    #[test]
    fn test_matrix_getters() {
        let rotation = random_rotation(1);
        let mut engine = RotationMatrixEngine::new(AmbisonicOrder::Second);
        engine.set_base_rotation(&rotation);

        let m3 = engine.rotation_matrix3();
        let m4 = engine.rotation_matrix4();
        let mut other = RotationMatrixEngine::new(AmbisonicOrder::Second);
        other.set_rotation_matrix3(&m3);
        assert_eq!(other.bands(), engine.bands());
        other.set_rotation_matrix4(&m4);
        assert_eq!(other.bands(), engine.bands());
        assert_eq!(m4[15], 1.0);
        assert_eq!(m4[3], 0.0);
    }

    #[test]
    fn test_order_change() {
        let mut engine = RotationMatrixEngine::new(AmbisonicOrder::First);
        engine.set_base_rotation(&random_rotation(2));
        assert_eq!(engine.bands().len(), 9);
        engine.set_order(AmbisonicOrder::Third);
        assert_eq!(engine.bands().len(), BAND_STORAGE);

        let mut full = RotationMatrixEngine::new(AmbisonicOrder::Third);
        full.set_base_rotation(&random_rotation(2));
        assert_eq!(full.bands(), engine.bands());
    }
}
