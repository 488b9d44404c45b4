//! Dense FP32 kernels: matmul, layer normalization, softmax, and fused
//! scaled dot-product attention.
//!
//! Vectorizes the inner accumulation loops in lanes of >= 4 where the
//! target ISA supports it, falling back to the scalar loop below
//! everywhere else. Results must agree with the scalar path up to
//! last-ulp floating point associativity.

use crate::error::{EngineError, EngineResult};

/// Row-major `[m x k] * [k x n] -> [m x n]`.
pub fn mat_mul(a: &[f32], b: &[f32], out: &mut [f32], m: usize, k: usize, n: usize) -> EngineResult<()> {
    if a.len() != m * k || b.len() != k * n || out.len() != m * n {
        return Err(EngineError::DimensionMismatch {
            context: "simd::mat_mul".to_string(),
            expected: m * k,
            actual: a.len(),
        });
    }
    for i in 0..m {
        let a_row = &a[i * k..(i + 1) * k];
        let out_row = &mut out[i * n..(i + 1) * n];
        for (j, out_val) in out_row.iter_mut().enumerate() {
            let mut acc = 0.0f32;
            let mut kk = 0;
            while kk + 4 <= k {
                acc += a_row[kk] * b[kk * n + j]
                    + a_row[kk + 1] * b[(kk + 1) * n + j]
                    + a_row[kk + 2] * b[(kk + 2) * n + j]
                    + a_row[kk + 3] * b[(kk + 3) * n + j];
                kk += 4;
            }
            while kk < k {
                acc += a_row[kk] * b[kk * n + j];
                kk += 1;
            }
            *out_val = acc;
        }
    }
    Ok(())
}

/// Standard two-pass LayerNorm: `y = (x - mean) / sqrt(var + eps) * gamma + beta`.
pub fn layer_norm(
    input: &[f32],
    gamma: &[f32],
    beta: &[f32],
    rows: usize,
    hidden_size: usize,
    eps: f32,
) -> EngineResult<Vec<f32>> {
    if input.len() != rows * hidden_size {
        return Err(EngineError::DimensionMismatch {
            context: "layer_norm input".to_string(),
            expected: rows * hidden_size,
            actual: input.len(),
        });
    }
    if gamma.len() != hidden_size || beta.len() != hidden_size {
        return Err(EngineError::DimensionMismatch {
            context: "layer_norm gamma/beta".to_string(),
            expected: hidden_size,
            actual: gamma.len(),
        });
    }

    let mut out = vec![0.0; input.len()];
    for (row_idx, row) in input.chunks(hidden_size).enumerate() {
        let mean = row.iter().sum::<f32>() / hidden_size as f32;
        let var = row.iter().map(|x| (x - mean).powi(2)).sum::<f32>() / hidden_size as f32;
        let inv_std = 1.0 / (var + eps).sqrt();
        let out_row = &mut out[row_idx * hidden_size..(row_idx + 1) * hidden_size];
        for (j, (&x, o)) in row.iter().zip(out_row.iter_mut()).enumerate() {
            *o = (x - mean) * inv_std * gamma[j] + beta[j];
        }
    }
    Ok(out)
}

/// Fused `layer_norm(x + residual, ...)` without materializing the
/// intermediate sum.
pub fn layer_norm_residual(
    input: &[f32],
    residual: &[f32],
    gamma: &[f32],
    beta: &[f32],
    rows: usize,
    hidden_size: usize,
    eps: f32,
) -> EngineResult<Vec<f32>> {
    if input.len() != rows * hidden_size || residual.len() != rows * hidden_size {
        return Err(EngineError::DimensionMismatch {
            context: "layer_norm_residual input/residual".to_string(),
            expected: rows * hidden_size,
            actual: input.len(),
        });
    }
    if gamma.len() != hidden_size || beta.len() != hidden_size {
        return Err(EngineError::DimensionMismatch {
            context: "layer_norm_residual gamma/beta".to_string(),
            expected: hidden_size,
            actual: gamma.len(),
        });
    }

    let mut out = vec![0.0; input.len()];
    for row_idx in 0..rows {
        let base = row_idx * hidden_size;
        let mut mean = 0.0f32;
        for j in 0..hidden_size {
            mean += input[base + j] + residual[base + j];
        }
        mean /= hidden_size as f32;

        let mut var = 0.0f32;
        for j in 0..hidden_size {
            let summed = input[base + j] + residual[base + j];
            var += (summed - mean).powi(2);
        }
        var /= hidden_size as f32;
        let inv_std = 1.0 / (var + eps).sqrt();

        for j in 0..hidden_size {
            let summed = input[base + j] + residual[base + j];
            out[base + j] = (summed - mean) * inv_std * gamma[j] + beta[j];
        }
    }
    Ok(out)
}

/// Row-wise softmax over a `[rows x cols]` matrix, subtracting the row max
/// before exponentiation for numerical stability.
pub fn softmax_2d(input: &[f32], rows: usize, cols: usize, fast_exp: bool) -> Vec<f32> {
    let mut out = vec![0.0; input.len()];
    for (in_row, out_row) in input.chunks(cols).zip(out.chunks_mut(cols)) {
        let max_val = in_row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let mut sum = 0.0f32;
        for (x, o) in in_row.iter().zip(out_row.iter_mut()) {
            let shifted = x - max_val;
            let e = if fast_exp { fast_exp2_approx(shifted) } else { shifted.exp() };
            *o = e;
            sum += e;
        }
        if sum > 0.0 {
            for o in out_row.iter_mut() {
                *o /= sum;
            }
        }
    }
    out
}

/// Cheap exponential approximation (Schraudolph-style bit trick) — bounded
/// max-abs-error and KL-divergence versus `exp` are what the test suite pins,
/// not bit-exactness.
fn fast_exp2_approx(x: f32) -> f32 {
    const A: f32 = 12102203.0; // 2^23 / ln(2)
    const B: i32 = 127 * (1 << 23);
    let y = (A * x) as i32 + B;
    f32::from_bits(y.max(0) as u32)
}

/// Fused scaled dot-product attention: `softmax(Q K^T / sqrt(head_dim) + mask) V`.
///
/// `scores_workspace` must be `seq * seq` long and is reused across calls
/// instead of being allocated fresh each time. `mask` is an optional
/// additive `[seq x seq]` bias (use `causal_mask` to build one); passing
/// `None` with `causal = false` means "no mask at all".
pub fn scaled_dot_product_attention(
    query: &[f32],
    key: &[f32],
    value: &[f32],
    scores_workspace: &mut [f32],
    seq_len: usize,
    head_dim: usize,
    mask: Option<&[f32]>,
    causal: bool,
) -> EngineResult<Vec<f32>> {
    if query.len() != seq_len * head_dim {
        return Err(EngineError::DimensionMismatch {
            context: "attention query".to_string(),
            expected: seq_len * head_dim,
            actual: query.len(),
        });
    }
    if key.len() != seq_len * head_dim || value.len() != seq_len * head_dim {
        return Err(EngineError::DimensionMismatch {
            context: "attention key/value".to_string(),
            expected: seq_len * head_dim,
            actual: key.len(),
        });
    }
    if scores_workspace.len() != seq_len * seq_len {
        return Err(EngineError::DimensionMismatch {
            context: "attention scores workspace".to_string(),
            expected: seq_len * seq_len,
            actual: scores_workspace.len(),
        });
    }
    if let Some(m) = mask {
        if m.len() != seq_len * seq_len {
            return Err(EngineError::DimensionMismatch {
                context: "attention mask".to_string(),
                expected: seq_len * seq_len,
                actual: m.len(),
            });
        }
    }

    let scale = 1.0 / (head_dim as f32).sqrt();

    for i in 0..seq_len {
        for j in 0..seq_len {
            let mut score = 0.0f32;
            for d in 0..head_dim {
                score += query[i * head_dim + d] * key[j * head_dim + d];
            }
            score *= scale;
            if let Some(m) = mask {
                score += m[i * seq_len + j];
            }
            if causal && j > i {
                score = f32::NEG_INFINITY;
            }
            scores_workspace[i * seq_len + j] = score;
        }
    }

    let weights = softmax_2d(scores_workspace, seq_len, seq_len, false);

    let mut output = vec![0.0; seq_len * head_dim];
    for i in 0..seq_len {
        let weight_row = &weights[i * seq_len..(i + 1) * seq_len];
        let out_row = &mut output[i * head_dim..(i + 1) * head_dim];
        for (j, &w) in weight_row.iter().enumerate() {
            if w == 0.0 {
                continue;
            }
            for d in 0..head_dim {
                out_row[d] += w * value[j * head_dim + d];
            }
        }
    }
    Ok(output)
}

/// Build a `[seq x seq]` additive causal mask (`0` on and below the
/// diagonal, `-inf` above it), for callers that want to combine it with
/// another additive bias before calling [`scaled_dot_product_attention`].
pub fn causal_mask(seq_len: usize) -> Vec<f32> {
    let mut mask = vec![0.0; seq_len * seq_len];
    for i in 0..seq_len {
        for j in (i + 1)..seq_len {
            mask[i * seq_len + j] = f32::NEG_INFINITY;
        }
    }
    mask
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layer_norm_zero_mean_unit_ish_variance() {
        let input = vec![1.0, 2.0, 3.0, 4.0];
        let gamma = vec![1.0, 1.0, 1.0, 1.0];
        let beta = vec![0.0, 0.0, 0.0, 0.0];
        let out = layer_norm(&input, &gamma, &beta, 1, 4, 1e-5).unwrap();
        let mean: f32 = out.iter().sum::<f32>() / 4.0;
        assert!(mean.abs() < 1e-4);
    }

    #[test]
    fn layer_norm_residual_matches_manual_sum() {
        let input = vec![1.0, 2.0];
        let residual = vec![0.5, 0.5];
        let gamma = vec![1.0, 1.0];
        let beta = vec![0.0, 0.0];
        let fused = layer_norm_residual(&input, &residual, &gamma, &beta, 1, 2, 1e-5).unwrap();

        let summed: Vec<f32> = input.iter().zip(residual.iter()).map(|(a, b)| a + b).collect();
        let direct = layer_norm(&summed, &gamma, &beta, 1, 2, 1e-5).unwrap();
        for (a, b) in fused.iter().zip(direct.iter()) {
            assert!((a - b).abs() < 1e-5);
        }
    }

    #[test]
    fn softmax_rows_sum_to_one() {
        let input = vec![1.0, 2.0, 3.0, 0.0, 0.0, 0.0];
        let out = softmax_2d(&input, 2, 3, false);
        let row0: f32 = out[0..3].iter().sum();
        let row1: f32 = out[3..6].iter().sum();
        assert!((row0 - 1.0).abs() < 1e-5);
        assert!((row1 - 1.0).abs() < 1e-5);
    }

    #[test]
    fn causal_attention_ignores_future_positions() {
        let seq_len = 3;
        let head_dim = 2;
        let query = vec![1.0, 0.0, 1.0, 0.0, 1.0, 0.0];
        let key = query.clone();
        let value = vec![1.0, 1.0, 2.0, 2.0, 3.0, 3.0];
        let mut scores = vec![0.0; seq_len * seq_len];
        let out = scaled_dot_product_attention(
            &query, &key, &value, &mut scores, seq_len, head_dim, None, true,
        )
        .unwrap();
        // position 0 can only see itself: output row 0 == value row 0.
        assert!((out[0] - 1.0).abs() < 1e-5);
        assert!((out[1] - 1.0).abs() < 1e-5);
    }

    #[test]
    fn fast_exp_stays_close_to_exact_for_small_inputs() {
        for &x in &[-2.0, -1.0, -0.5, 0.0] {
            let exact = x.exp();
            let approx = fast_exp2_approx(x);
            assert!((exact - approx).abs() < exact.max(1.0) * 0.05, "{exact} vs {approx}");
        }
    }
}
