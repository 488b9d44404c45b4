//! Q4_K: 256-element super-blocks of 8 sub-blocks of 32, each sub-block
//! asymmetric 4-bit (as in Q4_1) with its own scale and minimum, themselves
//! quantized to a 6-bit range against one shared `f32` scale/minimum per
//! super-block.

use super::{block_count, SUB_BLOCKS_PER_SUPER, SUPER_BLOCK_SIZE};

const SUB_BLOCK_SIZE: usize = 32;

#[derive(Debug, Clone)]
pub struct Q4KTensor {
    pub rows: usize,
    pub cols: usize,
    pub element_count: usize,
    /// Packed nibbles, two elements per byte, sub-block by sub-block.
    pub quants: Vec<u8>,
    /// 6-bit (0..63) quantized per-sub-block scale, indexed by sub-block.
    pub sub_scale_q: Vec<u8>,
    /// 6-bit (0..63) quantized per-sub-block minimum, indexed by sub-block.
    pub sub_min_q: Vec<u8>,
    /// Per super-block scale that `sub_scale_q` is a multiple of.
    pub super_scale: Vec<f32>,
    /// Per super-block minimum baseline that `sub_min_q` offsets from.
    pub super_min_base: Vec<f32>,
    /// Per super-block step that `sub_min_q` is a multiple of.
    pub super_min_scale: Vec<f32>,
}

impl Q4KTensor {
    pub fn quantize(data: &[f32], rows: usize, cols: usize) -> Self {
        let n_sub = block_count(data.len(), SUB_BLOCK_SIZE);
        let n_super = block_count(n_sub, SUB_BLOCKS_PER_SUPER);

        let mut sub_min_actual = Vec::with_capacity(n_sub);
        let mut sub_scale_actual = Vec::with_capacity(n_sub);
        for sub in data.chunks(SUB_BLOCK_SIZE) {
            let min_v = sub.iter().copied().fold(f32::INFINITY, f32::min);
            let max_v = sub.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            sub_min_actual.push(min_v);
            sub_scale_actual.push(if max_v > min_v { (max_v - min_v) / 15.0 } else { 0.0 });
        }

        let mut super_scale = Vec::with_capacity(n_super);
        let mut super_min_base = Vec::with_capacity(n_super);
        let mut super_min_scale = Vec::with_capacity(n_super);
        let mut sub_scale_q = Vec::with_capacity(n_sub);
        let mut sub_min_q = Vec::with_capacity(n_sub);

        for super_idx in 0..n_super {
            let start = super_idx * SUB_BLOCKS_PER_SUPER;
            let end = (start + SUB_BLOCKS_PER_SUPER).min(n_sub);
            let group_scale = sub_scale_actual[start..end]
                .iter()
                .copied()
                .fold(0.0_f32, f32::max);
            let group_min_min = sub_min_actual[start..end]
                .iter()
                .copied()
                .fold(f32::INFINITY, f32::min);
            let group_min_max = sub_min_actual[start..end]
                .iter()
                .copied()
                .fold(f32::NEG_INFINITY, f32::max);

            let scale_step = if group_scale > 0.0 { group_scale / 63.0 } else { 0.0 };
            let min_step = if group_min_max > group_min_min {
                (group_min_max - group_min_min) / 63.0
            } else {
                0.0
            };

            super_scale.push(scale_step);
            super_min_base.push(group_min_min);
            super_min_scale.push(min_step);

            for sb in start..end {
                let sq = if scale_step > 0.0 {
                    (sub_scale_actual[sb] / scale_step).round().clamp(0.0, 63.0) as u8
                } else {
                    0
                };
                let mq = if min_step > 0.0 {
                    ((sub_min_actual[sb] - group_min_min) / min_step)
                        .round()
                        .clamp(0.0, 63.0) as u8
                } else {
                    0
                };
                sub_scale_q.push(sq);
                sub_min_q.push(mq);
            }
        }

        let mut quants = Vec::with_capacity(data.len().div_ceil(2));
        for (sb, sub) in data.chunks(SUB_BLOCK_SIZE).enumerate() {
            let super_idx = sb / SUB_BLOCKS_PER_SUPER;
            let scale = sub_scale_q[sb] as f32 * super_scale[super_idx];
            let min_v = super_min_base[super_idx] + sub_min_q[sb] as f32 * super_min_scale[super_idx];

            let mut pending: Option<u8> = None;
            for &x in sub {
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
            element_count: data.len(),
            quants,
            sub_scale_q,
            sub_min_q,
            super_scale,
            super_min_base,
            super_min_scale,
        }
    }

    pub fn dequantize(&self) -> Vec<f32> {
        let mut out = vec![0.0; self.element_count];
        for sb in 0..self.sub_scale_q.len() {
            let start = sb * SUB_BLOCK_SIZE;
            let len = SUB_BLOCK_SIZE.min(self.element_count - start);
            self.decode_into(sb, &mut out[start..start + len]);
        }
        out
    }

    /// Native block granularity is the 32-element sub-block; the fused
    /// kernel decodes one sub-block at a time.
    pub fn native_block_size(&self) -> usize {
        SUB_BLOCK_SIZE
    }

    pub fn num_blocks(&self) -> usize {
        self.sub_scale_q.len()
    }

    pub fn decode_into(&self, sub_block_idx: usize, buf: &mut [f32]) {
        let super_idx = sub_block_idx / SUB_BLOCKS_PER_SUPER;
        let scale = self.sub_scale_q[sub_block_idx] as f32 * self.super_scale[super_idx];
        let min_v = self.super_min_base[super_idx]
            + self.sub_min_q[sub_block_idx] as f32 * self.super_min_scale[super_idx];
        let start_byte = sub_block_idx * SUB_BLOCK_SIZE / 2;
        for (pair, byte) in buf.chunks_mut(2).zip(self.quants[start_byte..].iter()) {
            pair[0] = (byte & 0x0f) as f32 * scale + min_v;
            if pair.len() > 1 {
                pair[1] = ((byte >> 4) & 0x0f) as f32 * scale + min_v;
            }
        }
    }
}

#[allow(dead_code)]
pub(crate) const _SUPER_BLOCK_SIZE_CHECK: usize = SUPER_BLOCK_SIZE;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_within_tolerance_single_super_block() {
        let data: Vec<f32> = (0..256).map(|i| (0.05 * i as f32).sin() * 3.0).collect();
        let t = Q4KTensor::quantize(&data, 256, 1);
        let back = t.dequantize();
        assert_eq!(back.len(), data.len());
        let max_err = data
            .iter()
            .zip(back.iter())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0_f32, f32::max);
        assert!(max_err < 0.5, "max_err={max_err}");
    }

    #[test]
    fn handles_partial_final_super_block() {
        let data: Vec<f32> = (0..300).map(|i| i as f32 * 0.01).collect();
        let t = Q4KTensor::quantize(&data, 300, 1);
        let back = t.dequantize();
        assert_eq!(back.len(), 300);
    }
}
