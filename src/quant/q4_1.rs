//! Q4_1: asymmetric 4-bit, one `f32` scale and one `f32` minimum per block.

use super::{block_count, DEFAULT_BLOCK_SIZE};

#[derive(Debug, Clone)]
pub struct Q4_1Tensor {
    pub rows: usize,
    pub cols: usize,
    pub block_size: usize,
    pub element_count: usize,
    pub quants: Vec<u8>,
    pub scales: Vec<f32>,
    pub mins: Vec<f32>,
}

impl Q4_1Tensor {
    pub fn quantize(data: &[f32], rows: usize, cols: usize) -> Self {
        let block_size = DEFAULT_BLOCK_SIZE;
        let n_blocks = block_count(data.len(), block_size);
        let mut quants = Vec::with_capacity(data.len().div_ceil(2));
        let mut scales = Vec::with_capacity(n_blocks);
        let mut mins = Vec::with_capacity(n_blocks);

        for block in data.chunks(block_size) {
            let min_v = block.iter().copied().fold(f32::INFINITY, f32::min);
            let max_v = block.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            let scale = if max_v > min_v {
                (max_v - min_v) / 15.0
            } else {
                0.0
            };
            scales.push(scale);
            mins.push(min_v);

            let mut pending: Option<u8> = None;
            for &x in block {
                let u = if scale > 0.0 {
                    ((x - min_v) / scale).round().clamp(0.0, 15.0) as u8
                } else {
                    0
                };
                match pending.take() {
                    None => pending = Some(u),
                    Some(low) => quants.push(low | (u << 4)),
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
            mins,
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

    pub fn decode_into(&self, block_idx: usize, buf: &mut [f32]) {
        let scale = self.scales[block_idx];
        let min_v = self.mins[block_idx];
        let start_byte = block_idx * self.block_size / 2;
        for (pair, byte) in buf.chunks_mut(2).zip(self.quants[start_byte..].iter()) {
            pair[0] = (byte & 0x0f) as f32 * scale + min_v;
            if pair.len() > 1 {
                pair[1] = ((byte >> 4) & 0x0f) as f32 * scale + min_v;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_within_tolerance() {
        let data: Vec<f32> = (0..64).map(|i| i as f32 * 0.3 - 5.0).collect();
        let t = Q4_1Tensor::quantize(&data, 64, 1);
        let back = t.dequantize();
        for (orig, got) in data.iter().zip(back.iter()) {
            assert!((orig - got).abs() <= orig.abs().max(1.0) * 0.12, "{orig} vs {got}");
        }
    }

    #[test]
    fn constant_block_has_zero_scale() {
        let data = vec![2.5_f32; 64];
        let t = Q4_1Tensor::quantize(&data, 64, 1);
        assert_eq!(t.scales[0], 0.0);
        assert_eq!(t.dequantize(), data);
    }
}
