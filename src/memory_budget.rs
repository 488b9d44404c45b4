//! Pre-flight memory estimate: parameters, activations, KV cache and a fixed
//! overhead slack, checked against available bytes before a model is loaded.
//!
//! Arithmetic only: parameter count times scheme bit width, a fixed
//! activation multiplier, KV cache sizing, and a flat overhead slack.

use crate::error::{EngineError, EngineResult};
use crate::quant::QuantScheme;

/// Per-layer activation memory, expressed as a multiple of `seq * hidden`
/// f32 elements. Chosen to cover attention projections, the MLP's
/// intermediate expansion and residual copies without tracking an exact
/// per-op accounting.
const ACTIVATION_CONSTANT: f64 = 12.0;

const BYTES_PER_F32: u64 = 4;

/// Fixed slack for allocator fragmentation, tokenizer tables, and other
/// bookkeeping not captured by the component estimates below.
const OVERHEAD_BYTES: u64 = 64 * 1024 * 1024;

#[derive(Debug, Clone, Copy)]
pub struct ModelShape {
    pub vocab_size: usize,
    pub block_size: usize,
    pub embedding_dim: usize,
    pub layers: usize,
    pub heads: usize,
    pub quant_scheme: QuantScheme,
}

impl ModelShape {
    fn head_dim(&self) -> usize {
        if self.heads == 0 {
            0
        } else {
            self.embedding_dim / self.heads
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemoryEstimate {
    pub parameters_bytes: u64,
    pub activations_bytes: u64,
    pub kv_cache_bytes: u64,
    pub overhead_bytes: u64,
}

impl MemoryEstimate {
    pub fn total_bytes(&self) -> u64 {
        self.parameters_bytes + self.activations_bytes + self.kv_cache_bytes + self.overhead_bytes
    }
}

/// Rough parameter count for a transformer of this shape: embedding table
/// plus, per layer, the attention projections and MLP expansion.
fn estimate_parameter_count(shape: &ModelShape) -> u64 {
    let embedding = shape.vocab_size as u64 * shape.embedding_dim as u64;
    let per_layer_attn = 4 * shape.embedding_dim as u64 * shape.embedding_dim as u64;
    let per_layer_mlp = 8 * shape.embedding_dim as u64 * shape.embedding_dim as u64;
    embedding + shape.layers as u64 * (per_layer_attn + per_layer_mlp)
}

fn estimate_parameters_bytes(shape: &ModelShape) -> u64 {
    let elements = estimate_parameter_count(shape);
    let bits = shape.quant_scheme.bits_per_element();
    ((elements as f64) * bits / 8.0).ceil() as u64
}

fn estimate_activations_bytes(shape: &ModelShape) -> u64 {
    let elements = ACTIVATION_CONSTANT
        * shape.layers as f64
        * shape.block_size as f64
        * shape.embedding_dim as f64;
    (elements * BYTES_PER_F32 as f64) as u64
}

fn estimate_kv_cache_bytes(shape: &ModelShape) -> u64 {
    2 * shape.layers as u64
        * shape.block_size as u64
        * shape.heads as u64
        * shape.head_dim() as u64
        * BYTES_PER_F32
}

pub fn estimate(shape: &ModelShape) -> MemoryEstimate {
    MemoryEstimate {
        parameters_bytes: estimate_parameters_bytes(shape),
        activations_bytes: estimate_activations_bytes(shape),
        kv_cache_bytes: estimate_kv_cache_bytes(shape),
        overhead_bytes: OVERHEAD_BYTES,
    }
}

/// Checks the estimate against `available_bytes`, failing with
/// `ResourceExhausted` if the model wouldn't fit.
pub fn check_budget(shape: &ModelShape, available_bytes: u64) -> EngineResult<MemoryEstimate> {
    let estimate = estimate(shape);
    let total = estimate.total_bytes();
    if total > available_bytes {
        return Err(EngineError::ResourceExhausted {
            resource: "memory_budget".to_string(),
            max: available_bytes as usize,
            current: total as usize,
        });
    }
    Ok(estimate)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_shape() -> ModelShape {
        ModelShape {
            vocab_size: 32_000,
            block_size: 2048,
            embedding_dim: 4096,
            layers: 32,
            heads: 32,
            quant_scheme: QuantScheme::Q4_0,
        }
    }

    #[test]
    fn estimate_breaks_down_into_nonzero_components() {
        let estimate = estimate(&small_shape());
        assert!(estimate.parameters_bytes > 0);
        assert!(estimate.activations_bytes > 0);
        assert!(estimate.kv_cache_bytes > 0);
        assert_eq!(estimate.overhead_bytes, OVERHEAD_BYTES);
    }

    #[test]
    fn higher_bit_scheme_costs_more_parameter_memory() {
        let mut shape = small_shape();
        shape.quant_scheme = QuantScheme::Q4_0;
        let q4 = estimate(&shape).parameters_bytes;
        shape.quant_scheme = QuantScheme::Q8_0;
        let q8 = estimate(&shape).parameters_bytes;
        assert!(q8 > q4);
    }

    #[test]
    fn check_budget_fails_when_total_exceeds_available() {
        let shape = small_shape();
        let err = check_budget(&shape, 1).unwrap_err();
        assert!(matches!(err, EngineError::ResourceExhausted { .. }));
    }

    #[test]
    fn check_budget_succeeds_with_ample_memory() {
        let shape = small_shape();
        let estimate = check_budget(&shape, u64::MAX).unwrap();
        assert!(estimate.total_bytes() <= u64::MAX);
    }
}
