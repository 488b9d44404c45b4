//! Q6_K: 256-element super-blocks of 8 sub-blocks of 32, each sub-block
//! symmetric 6-bit (range -32..31), the per-sub-block scale itself
//! quantized to a 6-bit range against one shared `f32` scale per super-block.

use super::{block_count, SUB_BLOCKS_PER_SUPER};

const SUB_BLOCK_SIZE: usize = 32;

#[derive(Debug, Clone)]
pub struct Q6KTensor {
    pub rows: usize,
    pub cols: usize,
    pub element_count: usize,
    /// One signed 6-bit quant per element, stored one-per-byte.
    pub quants: Vec<i8>,
    /// 6-bit (0..63) quantized per-sub-block scale.
    pub sub_scale_q: Vec<u8>,
    /// Per super-block scale that `sub_scale_q` is a multiple of.
    pub super_scale: Vec<f32>,
}

impl Q6KTensor {
    pub fn quantize(data: &[f32], rows: usize, cols: usize) -> Self {
        let n_sub = block_count(data.len(), SUB_BLOCK_SIZE);
        let n_super = block_count(n_sub, SUB_BLOCKS_PER_SUPER);

        let mut sub_scale_actual = Vec::with_capacity(n_sub);
        for sub in data.chunks(SUB_BLOCK_SIZE) {
            let max_abs = sub.iter().fold(0.0_f32, |m, &x| m.max(x.abs()));
            sub_scale_actual.push(if max_abs > 0.0 { max_abs / 31.0 } else { 0.0 });
        }

        let mut super_scale = Vec::with_capacity(n_super);
        let mut sub_scale_q = Vec::with_capacity(n_sub);

        for super_idx in 0..n_super {
            let start = super_idx * SUB_BLOCKS_PER_SUPER;
            let end = (start + SUB_BLOCKS_PER_SUPER).min(n_sub);
            let group_scale = sub_scale_actual[start..end]
                .iter()
                .copied()
                .fold(0.0_f32, f32::max);
            let scale_step = if group_scale > 0.0 { group_scale / 63.0 } else { 0.0 };
            super_scale.push(scale_step);

            for sb in start..end {
                let sq = if scale_step > 0.0 {
                    (sub_scale_actual[sb] / scale_step).round().clamp(0.0, 63.0) as u8
                } else {
                    0
                };
                sub_scale_q.push(sq);
            }
        }

        let mut quants = Vec::with_capacity(data.len());
        for (sb, sub) in data.chunks(SUB_BLOCK_SIZE).enumerate() {
            let super_idx = sb / SUB_BLOCKS_PER_SUPER;
            let scale = sub_scale_q[sb] as f32 * super_scale[super_idx];
            for &x in sub {
                let q = if scale > 0.0 {
                    (x / scale).round().clamp(-32.0, 31.0) as i8
                } else {
                    0
                };
                quants.push(q);
            }
        }

        Self {
            rows,
            cols,
            element_count: data.len(),
            quants,
            sub_scale_q,
            super_scale,
        }
    }

    pub fn dequantize(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.element_count);
        for (idx, &q) in self.quants.iter().enumerate() {
            let sb = idx / SUB_BLOCK_SIZE;
            let super_idx = sb / SUB_BLOCKS_PER_SUPER;
            let scale = self.sub_scale_q[sb] as f32 * self.super_scale[super_idx];
            out.push(q as f32 * scale);
        }
        out
    }

    pub fn native_block_size(&self) -> usize {
        SUB_BLOCK_SIZE
    }

    pub fn num_blocks(&self) -> usize {
        self.sub_scale_q.len()
    }

    pub fn decode_into(&self, sub_block_idx: usize, buf: &mut [f32]) {
        let super_idx = sub_block_idx / SUB_BLOCKS_PER_SUPER;
        let scale = self.sub_scale_q[sub_block_idx] as f32 * self.super_scale[super_idx];
        let start = sub_block_idx * SUB_BLOCK_SIZE;
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
        let data: Vec<f32> = (0..256).map(|i| (0.05 * i as f32).cos() * 2.0).collect();
        let t = Q6KTensor::quantize(&data, 256, 1);
        let back = t.dequantize();
        let max_err = data
            .iter()
            .zip(back.iter())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0_f32, f32::max);
        assert!(max_err < 0.2, "max_err={max_err}");
    }

    #[test]
    fn all_zero_round_trips_exactly() {
        let data = vec![0.0_f32; 256];
        let t = Q6KTensor::quantize(&data, 256, 1);
        assert_eq!(t.dequantize(), data);
    }
}
