//! Q8_0: symmetric, one `f32` scale per block of 64 elements.

use super::{block_count, DEFAULT_BLOCK_SIZE};

#[derive(Debug, Clone)]
pub struct Q8_0Tensor {
    pub rows: usize,
    pub cols: usize,
    pub block_size: usize,
    /// Packed signed bytes, one per source element, block by block.
    pub quants: Vec<i8>,
    /// One scale per block.
    pub scales: Vec<f32>,
}

impl Q8_0Tensor {
    pub fn quantize(data: &[f32], rows: usize, cols: usize) -> Self {
        let block_size = DEFAULT_BLOCK_SIZE;
        let n_blocks = block_count(data.len(), block_size);
        let mut quants = Vec::with_capacity(data.len());
        let mut scales = Vec::with_capacity(n_blocks);

        for block in data.chunks(block_size) {
            let max_abs = block.iter().fold(0.0_f32, |m, &x| m.max(x.abs()));
            let scale = if max_abs > 0.0 { max_abs / 127.0 } else { 0.0 };
            scales.push(scale);
            for &x in block {
                let q = if scale > 0.0 {
                    (x / scale).round().clamp(-127.0, 127.0) as i8
                } else {
                    0
                };
                quants.push(q);
            }
        }

        Self {
            rows,
            cols,
            block_size,
            quants,
            scales,
        }
    }

    pub fn dequantize(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.quants.len());
        for (block_idx, block) in self.quants.chunks(self.block_size).enumerate() {
            let scale = self.scales[block_idx];
            for &q in block {
                out.push(q as f32 * scale);
            }
        }
        out
    }

    /// Decode a single element without materializing the whole tensor —
    /// used by the fused matmul kernel's inner loop.
    #[inline]
    pub fn decode_at(&self, index: usize) -> f32 {
        let block_idx = index / self.block_size;
        self.quants[index] as f32 * self.scales[block_idx]
    }

    pub fn native_block_size(&self) -> usize {
        self.block_size
    }

    pub fn num_blocks(&self) -> usize {
        self.scales.len()
    }

    /// Decode one native block into `buf` (sized to that block's length)
    /// without touching the rest of the tensor.
    pub fn decode_into(&self, block_idx: usize, buf: &mut [f32]) {
        let start = block_idx * self.block_size;
        let scale = self.scales[block_idx];
        for (i, slot) in buf.iter_mut().enumerate() {
            *slot = self.quants[start + i] as f32 * scale;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_within_tolerance() {
        let data: Vec<f32> = (0..64).map(|i| (0.1 * i as f32).sin()).collect();
        let t = Q8_0Tensor::quantize(&data, 64, 1);
        let back = t.dequantize();
        for (orig, got) in data.iter().zip(back.iter()) {
            assert!((orig - got).abs() <= orig.abs() * 0.03 + 1e-6, "{orig} vs {got}");
        }
    }

    #[test]
    fn all_zero_block_round_trips_exactly() {
        let data = vec![0.0_f32; 64];
        let t = Q8_0Tensor::quantize(&data, 64, 1);
        assert_eq!(t.dequantize(), data);
    }

    #[test]
    fn partial_trailing_block() {
        let data: Vec<f32> = (0..70).map(|i| i as f32 * 0.01).collect();
        let t = Q8_0Tensor::quantize(&data, 70, 1);
        assert_eq!(t.scales.len(), 2);
        let back = t.dequantize();
        assert_eq!(back.len(), 70);
    }
}
