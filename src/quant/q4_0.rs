//! Q4_0: symmetric 4-bit signed nibbles, one `f32` scale per block of 64.
//! Two values packed per byte — low nibble is the even index, high nibble
//! the odd index.

use super::{block_count, DEFAULT_BLOCK_SIZE};

#[derive(Debug, Clone)]
pub struct Q4_0Tensor {
    pub rows: usize,
    pub cols: usize,
    pub block_size: usize,
    pub element_count: usize,
    /// Packed nibbles, two elements per byte.
    pub quants: Vec<u8>,
    pub scales: Vec<f32>,
}

#[inline]
fn decode_nibble(nibble: u8) -> i32 {
    // 0..7 -> 0..7, 8..15 -> -8..-1
    if nibble < 8 {
        nibble as i32
    } else {
        nibble as i32 - 16
    }
}

#[inline]
fn encode_nibble(v: i32) -> u8 {
    // v in -8..=7
    (v & 0x0f) as u8
}

impl Q4_0Tensor {
    pub fn quantize(data: &[f32], rows: usize, cols: usize) -> Self {
        let block_size = DEFAULT_BLOCK_SIZE;
        let n_blocks = block_count(data.len(), block_size);
        let mut quants = Vec::with_capacity(data.len().div_ceil(2));
        let mut scales = Vec::with_capacity(n_blocks);

        for block in data.chunks(block_size) {
            let max_abs = block.iter().fold(0.0_f32, |m, &x| m.max(x.abs()));
            let scale = if max_abs > 0.0 { max_abs / 7.0 } else { 0.0 };
            scales.push(scale);

            let mut pending: Option<u8> = None;
            for &x in block {
                let nibble_val = if scale > 0.0 {
                    (x / scale).round().clamp(-8.0, 7.0) as i32
                } else {
                    0
                };
                let nibble = encode_nibble(nibble_val);
                match pending.take() {
                    None => pending = Some(nibble),
                    Some(low) => quants.push(low | (nibble << 4)),
                }
            }
            if let Some(low) = pending {
                quants.push(low);
            }
        }

        Self {
            rows,
            cols,
            block_size,
            element_count: data.len(),
            quants,
            scales,
        }
    }

    pub fn dequantize(&self) -> Vec<f32> {
        let mut out = vec![0.0; self.element_count];
        for block_idx in 0..self.scales.len() {
            let start = block_idx * self.block_size;
            let len = self.block_size.min(self.element_count - start);
            self.decode_into(block_idx, &mut out[start..start + len]);
        }
        out
    }

    pub fn native_block_size(&self) -> usize {
        self.block_size
    }

    pub fn num_blocks(&self) -> usize {
        self.scales.len()
    }

    /// Decode one native block into `buf`. `block_size` is always even, so
    /// every block starts on a byte boundary (`start_byte = block_idx *
    /// block_size / 2`) and this never needs to straddle a half-consumed byte.
    pub fn decode_into(&self, block_idx: usize, buf: &mut [f32]) {
        let scale = self.scales[block_idx];
        let start_byte = block_idx * self.block_size / 2;
        for (pair, byte) in buf.chunks_mut(2).zip(self.quants[start_byte..].iter()) {
            pair[0] = decode_nibble(byte & 0x0f) as f32 * scale;
            if pair.len() > 1 {
                pair[1] = decode_nibble((byte >> 4) & 0x0f) as f32 * scale;
            }
        }
    }
}
