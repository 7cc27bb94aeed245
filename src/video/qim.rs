//! Quantization index modulation on block-DCT AC coefficients.
//!
//! Each 8x8 block carries one bit in each of its first `ac_coeffs_per_block`
//! AC coefficients, taken in flattened row-major order starting at index 1.
//! A coefficient `c` carries bit `round(c / delta) mod 2`.

use log::debug;
use rayon::prelude::*;

use crate::config::{self, QimParameters, BLOCK_SIZE, COEFFS_PER_BLOCK};
use crate::video::dct::DctTables;
use crate::video::frame::Frame;

/// Quantize `coeff` so that its quantization index has parity `bit`.
///
/// The index moves up by one to reach an odd parity and down by one to reach
/// an even parity, never towards the nearer lattice point.
pub fn qim_embed(coeff: f64, delta: f64, bit: bool) -> f64 {
    let mut q = (coeff / delta).round() as i64;
    if (q.rem_euclid(2) == 1) != bit {
        q += if bit { 1 } else { -1 };
    }
    q as f64 * delta
}

/// Read the bit carried by `coeff`.
pub fn qim_extract(coeff: f64, delta: f64) -> bool {
    ((coeff / delta).round() as i64).rem_euclid(2) == 1
}

/// Output of [`QimCodec::embed_frame`].
#[derive(Debug, Clone)]
pub struct FrameEmbedding {
    pub frame: Frame,
    /// Payload bits written into the frame.
    pub embedded: usize,
    /// Payload-carrying blocks with at least one pixel saturated on write-back.
    /// Bits in such blocks may not survive extraction.
    pub clipped_blocks: usize,
}

/// Per-block and per-frame QIM embedding and extraction.
#[derive(Debug, Clone)]
pub struct QimCodec {
    params: QimParameters,
    dct: DctTables,
}

impl QimCodec {
    pub fn new(params: QimParameters) -> Self {
        Self {
            params,
            dct: DctTables::new(),
        }
    }

    pub fn params(&self) -> &QimParameters {
        &self.params
    }

    /// Payload bits one block can carry.
    pub fn bits_per_block(&self) -> usize {
        self.params.ac_coeffs_per_block().min(config::MAX_AC_COEFFS)
    }

    /// Payload bits a frame of the given size can carry.
    pub fn frame_capacity(&self, width: usize, height: usize) -> usize {
        config::frame_capacity_bits(width, height, &self.params)
    }

    /// Embed up to `bits_per_block` leading bits of `bits` into `block` in place.
    /// Returns how many bits were consumed.
    pub fn embed_block(&self, block: &mut [f64; COEFFS_PER_BLOCK], bits: &[bool]) -> usize {
        let n = self.bits_per_block().min(bits.len());
        if n == 0 {
            return 0;
        }
        let delta = self.params.delta();
        let mut coeffs = self.dct.forward(block);
        for (slot, &bit) in bits[..n].iter().enumerate() {
            let idx = slot + 1;
            coeffs[idx] = qim_embed(coeffs[idx], delta, bit);
        }
        *block = self.dct.inverse(&coeffs);
        n
    }

    /// Read all `bits_per_block` bits carried by `block`, appending them to `out`.
    pub fn extract_block(&self, block: &[f64; COEFFS_PER_BLOCK], out: &mut Vec<bool>) {
        let delta = self.params.delta();
        let coeffs = self.dct.forward(block);
        out.extend(
            coeffs[1..=self.bits_per_block()]
                .iter()
                .map(|&c| qim_extract(c, delta)),
        );
    }

    /// Embed a prefix of `bits` into `frame`, visiting blocks in raster order.
    ///
    /// Blocks past the end of `bits` are left untouched. The number of bits
    /// embedded is `min(bits.len(), frame capacity)`.
    pub fn embed_frame(&self, frame: &Frame, bits: &[bool]) -> FrameEmbedding {
        let width = frame.width();
        let blocks_x = frame.blocks_x();
        let per_block = self.bits_per_block();
        let embedded = bits.len().min(self.frame_capacity(width, frame.height()));
        let bits = &bits[..embedded];

        let mut stego = frame.clone();
        let clipped_blocks: usize = stego
            .pixels_mut()
            .par_chunks_mut(width * BLOCK_SIZE)
            .enumerate()
            .map(|(by, band)| {
                let mut clipped = 0;
                for bx in 0..blocks_x {
                    let start = (by * blocks_x + bx) * per_block;
                    if start >= bits.len() {
                        break;
                    }
                    let end = (start + per_block).min(bits.len());
                    let mut block = read_block(band, width, bx);
                    self.embed_block(&mut block, &bits[start..end]);
                    if write_block(band, width, bx, &block) {
                        clipped += 1;
                    }
                }
                clipped
            })
            .sum();

        if clipped_blocks > 0 {
            debug!(
                "{} payload block(s) clipped at 0 or 255 during write-back",
                clipped_blocks
            );
        }

        FrameEmbedding {
            frame: stego,
            embedded,
            clipped_blocks,
        }
    }

    /// Extract every bit slot of every block in raster order.
    pub fn extract_frame(&self, frame: &Frame) -> Vec<bool> {
        let width = frame.width();
        let blocks_x = frame.blocks_x();
        let per_band = blocks_x * self.bits_per_block();

        let bands: Vec<Vec<bool>> = frame
            .pixels()
            .par_chunks(width * BLOCK_SIZE)
            .map(|band| {
                let mut out = Vec::with_capacity(per_band);
                for bx in 0..blocks_x {
                    self.extract_block(&read_block(band, width, bx), &mut out);
                }
                out
            })
            .collect();

        bands.concat()
    }
}

fn read_block(band: &[u8], width: usize, bx: usize) -> [f64; COEFFS_PER_BLOCK] {
    let mut block = [0.0f64; COEFFS_PER_BLOCK];
    let px = bx * BLOCK_SIZE;
    for row in 0..BLOCK_SIZE {
        let src = &band[row * width + px..row * width + px + BLOCK_SIZE];
        for (dst, &p) in block[row * BLOCK_SIZE..(row + 1) * BLOCK_SIZE]
            .iter_mut()
            .zip(src)
        {
            *dst = p as f64;
        }
    }
    block
}

/// Round to the nearest integer and saturate to 0..=255.
/// Returns whether any pixel had to be saturated.
fn write_block(band: &mut [u8], width: usize, bx: usize, block: &[f64; COEFFS_PER_BLOCK]) -> bool {
    let px = bx * BLOCK_SIZE;
    let mut clipped = false;
    for row in 0..BLOCK_SIZE {
        let dst = &mut band[row * width + px..row * width + px + BLOCK_SIZE];
        for (d, &v) in dst
            .iter_mut()
            .zip(&block[row * BLOCK_SIZE..(row + 1) * BLOCK_SIZE])
        {
            let rounded = v.round();
            clipped |= !(0.0..=255.0).contains(&rounded);
            *d = rounded.clamp(0.0, 255.0) as u8;
        }
    }
    clipped
}
