//! Uniform capability surface over an FP32 or quantized weight matrix.
//!
//! Dispatch is static: the scheme is known at model-load time and baked
//! into the enum variant, so the kernel inner loop never pays for a vtable
//! lookup. Callers must hold the tensor for the lifetime of any kernel call
//! made against it.

use crate::error::EngineResult;
use crate::quant::{QuantScheme, QuantTensor};
use crate::tensor_pool::TensorPool;

#[derive(Debug, Clone)]
pub enum WeightTensor {
    F32 { rows: usize, cols: usize, data: Vec<f32> },
    Quantized(QuantTensor),
}

impl WeightTensor {
    pub fn from_f32(data: Vec<f32>, rows: usize, cols: usize) -> Self {
        WeightTensor::F32 { rows, cols, data }
    }

    pub fn quantize(scheme: QuantScheme, data: &[f32], rows: usize, cols: usize) -> EngineResult<Self> {
        Ok(WeightTensor::Quantized(QuantTensor::quantize(
            scheme, data, rows, cols,
        )?))
    }

    pub fn rows(&self) -> usize {
        match self {
            WeightTensor::F32 { rows, .. } => *rows,
            WeightTensor::Quantized(t) => t.rows(),
        }
    }

    pub fn cols(&self) -> usize {
        match self {
            WeightTensor::F32 { cols, .. } => *cols,
            WeightTensor::Quantized(t) => t.cols(),
        }
    }

    pub fn scheme(&self) -> Option<QuantScheme> {
        match self {
            WeightTensor::F32 { .. } => None,
            WeightTensor::Quantized(t) => Some(t.scheme()),
        }
    }

    /// `activations` is `[m x rows]`, `out` is `[m x cols]`.
    pub fn mat_mul(
        &self,
        pool: &TensorPool,
        activations: &[f32],
        out: &mut [f32],
        m: usize,
    ) -> EngineResult<()> {
        let k = self.rows();
        let n = self.cols();
        match self {
            WeightTensor::F32 { data, .. } => {
                crate::kernels::simd::mat_mul(activations, data, out, m, k, n)
            }
            WeightTensor::Quantized(t) => {
                crate::kernels::fused_matmul::mat_mul(pool, activations, t, out, m, k, n)
            }
        }
    }

    pub fn to_fp32(&self) -> Vec<f32> {
        match self {
            WeightTensor::F32 { data, .. } => data.clone(),
            WeightTensor::Quantized(t) => t.dequantize(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn f32_weight_round_trips_through_to_fp32() {
        let data = vec![1.0, 2.0, 3.0, 4.0];
        let w = WeightTensor::from_f32(data.clone(), 2, 2);
        assert_eq!(w.to_fp32(), data);
    }

    #[test]
    fn quantized_weight_reports_scheme() {
        let data = vec![1.0; 128];
        let w = WeightTensor::quantize(QuantScheme::Q8_0, &data, 64, 2).unwrap();
        assert_eq!(w.scheme(), Some(QuantScheme::Q8_0));
        assert_eq!(w.rows(), 64);
        assert_eq!(w.cols(), 2);
    }

    #[test]
    fn mat_mul_dispatches_by_variant() {
        let pool = TensorPool::new();
        let k = 4;
        let n = 2;
        let w = WeightTensor::from_f32(vec![1.0; k * n], k, n);
        let activations = vec![1.0; k];
        let mut out = vec![0.0; n];
        w.mat_mul(&pool, &activations, &mut out, 1).unwrap();
        assert_eq!(out, vec![4.0, 4.0]);
    }
}
