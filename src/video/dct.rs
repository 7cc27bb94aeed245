use std::f64::consts::PI;

use crate::config::{BLOCK_SIZE, COEFFS_PER_BLOCK};

/// Precomputed orthonormal 8-point DCT-II basis.
///
/// The 2D transform is separable: columns (axis 0) first, then rows (axis 1).
/// Coefficients are flattened row-major, so index `u * 8 + v` holds vertical
/// frequency `u` and horizontal frequency `v`.
#[derive(Debug, Clone)]
pub struct DctTables {
    /// `basis[k][n] = c(k) * cos((2n + 1) k pi / 16)`
    basis: [[f64; BLOCK_SIZE]; BLOCK_SIZE],
}

impl Default for DctTables {
    fn default() -> Self {
        Self::new()
    }
}

impl DctTables {
    pub fn new() -> Self {
        let mut basis = [[0.0f64; BLOCK_SIZE]; BLOCK_SIZE];
        let n = BLOCK_SIZE as f64;
        for (k, row) in basis.iter_mut().enumerate() {
            let scale = if k == 0 { (1.0 / n).sqrt() } else { (2.0 / n).sqrt() };
            for (i, value) in row.iter_mut().enumerate() {
                *value = scale * ((2 * i + 1) as f64 * k as f64 * PI / (2.0 * n)).cos();
            }
        }
        Self { basis }
    }

    /// Forward 2D DCT-II of a row-major 8x8 block.
    pub fn forward(&self, block: &[f64; COEFFS_PER_BLOCK]) -> [f64; COEFFS_PER_BLOCK] {
        // tmp = B * X
        let mut tmp = [0.0f64; COEFFS_PER_BLOCK];
        for u in 0..BLOCK_SIZE {
            for x in 0..BLOCK_SIZE {
                tmp[u * BLOCK_SIZE + x] = (0..BLOCK_SIZE)
                    .map(|y| self.basis[u][y] * block[y * BLOCK_SIZE + x])
                    .sum();
            }
        }
        // out = tmp * B^T
        let mut out = [0.0f64; COEFFS_PER_BLOCK];
        for u in 0..BLOCK_SIZE {
            for v in 0..BLOCK_SIZE {
                out[u * BLOCK_SIZE + v] = (0..BLOCK_SIZE)
                    .map(|x| tmp[u * BLOCK_SIZE + x] * self.basis[v][x])
                    .sum();
            }
        }
        out
    }

    /// Inverse 2D DCT (DCT-III) of a row-major 8x8 coefficient block.
    pub fn inverse(&self, coeffs: &[f64; COEFFS_PER_BLOCK]) -> [f64; COEFFS_PER_BLOCK] {
        // tmp = B^T * C
        let mut tmp = [0.0f64; COEFFS_PER_BLOCK];
        for y in 0..BLOCK_SIZE {
            for v in 0..BLOCK_SIZE {
                tmp[y * BLOCK_SIZE + v] = (0..BLOCK_SIZE)
                    .map(|u| self.basis[u][y] * coeffs[u * BLOCK_SIZE + v])
                    .sum();
            }
        }
        // out = tmp * B
        let mut out = [0.0f64; COEFFS_PER_BLOCK];
        for y in 0..BLOCK_SIZE {
            for x in 0..BLOCK_SIZE {
                out[y * BLOCK_SIZE + x] = (0..BLOCK_SIZE)
                    .map(|v| tmp[y * BLOCK_SIZE + v] * self.basis[v][x])
                    .sum();
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_block() -> [f64; COEFFS_PER_BLOCK] {
        let mut block = [0.0f64; COEFFS_PER_BLOCK];
        for (i, v) in block.iter_mut().enumerate() {
            *v = ((i * 37 + 11) % 256) as f64;
        }
        block
    }

    #[test]
    fn test_forward_inverse_roundtrip() {
        let tables = DctTables::new();
        let block = sample_block();
        let restored = tables.inverse(&tables.forward(&block));
        for (a, b) in block.iter().zip(restored.iter()) {
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn test_dc_of_flat_block() {
        // Orthonormal DC of a constant block is 8 * value; every AC term vanishes.
        let tables = DctTables::new();
        let coeffs = tables.forward(&[100.0; COEFFS_PER_BLOCK]);
        assert!((coeffs[0] - 800.0).abs() < 1e-9);
        for &ac in &coeffs[1..] {
            assert!(ac.abs() < 1e-9);
        }
    }

    #[test]
    fn test_energy_preserved() {
        let tables = DctTables::new();
        let block = sample_block();
        let coeffs = tables.forward(&block);
        let e_pixels: f64 = block.iter().map(|v| v * v).sum();
        let e_coeffs: f64 = coeffs.iter().map(|v| v * v).sum();
        assert!((e_pixels - e_coeffs).abs() / e_pixels < 1e-12);
    }

    #[test]
    fn test_flattened_index_one_is_horizontal() {
        // A block varying only along x has energy in row 0 of the coefficient grid.
        let tables = DctTables::new();
        let mut block = [0.0f64; COEFFS_PER_BLOCK];
        for y in 0..BLOCK_SIZE {
            for x in 0..BLOCK_SIZE {
                block[y * BLOCK_SIZE + x] = tables.basis[1][x];
            }
        }
        let coeffs = tables.forward(&block);
        assert!(coeffs[1].abs() > 1.0);
        assert!(coeffs[BLOCK_SIZE].abs() < 1e-9);
    }
}
