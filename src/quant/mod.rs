//! Block-quantized weight tensors.
//!
//! Five schemes, each trading a per-block (or per-sub-block) scale for a
//! fraction of the bits a `f32` would cost. None of these materialize a
//! dequantized copy except when explicitly asked to via `dequantize` — the
//! fused kernels in [`crate::kernels`] read the packed form directly.

pub mod q4_0;
pub mod q4_1;
pub mod q4_k;
pub mod q6_k;
pub mod q8_0;

pub use q4_0::Q4_0Tensor;
pub use q4_1::Q4_1Tensor;
pub use q4_k::Q4KTensor;
pub use q6_k::Q6KTensor;
pub use q8_0::Q8_0Tensor;

use crate::error::{EngineError, EngineResult};

/// Default native block size. The XGF importer reads 32-element foreign
/// blocks; anything imported from it is re-quantized to this width, never
/// byte-copied.
pub const DEFAULT_BLOCK_SIZE: usize = 64;

/// Super-block width shared by the K-quant family.
pub const SUPER_BLOCK_SIZE: usize = 256;
/// Sub-blocks per super-block.
pub const SUB_BLOCKS_PER_SUPER: usize = SUPER_BLOCK_SIZE / 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuantScheme {
    Q8_0,
    Q4_0,
    Q4_1,
    Q4_K,
    Q6_K,
}

impl QuantScheme {
    pub fn name(&self) -> &'static str {
        match self {
            QuantScheme::Q8_0 => "Q8_0",
            QuantScheme::Q4_0 => "Q4_0",
            QuantScheme::Q4_1 => "Q4_1",
            QuantScheme::Q4_K => "Q4_K",
            QuantScheme::Q6_K => "Q6_K",
        }
    }

    /// Nominal bits per element, ignoring the small per-block scale
    /// overhead — used for rough parameter-memory estimates, not exact
    /// packed size.
    pub fn bits_per_element(&self) -> f64 {
        match self {
            QuantScheme::Q8_0 => 8.0,
            QuantScheme::Q4_0 => 4.0,
            QuantScheme::Q4_1 => 4.0,
            QuantScheme::Q4_K => 4.5,
            QuantScheme::Q6_K => 6.5,
        }
    }
}

/// A quantized matrix in one of the five supported schemes.
#[derive(Debug, Clone)]
pub enum QuantTensor {
    Q8_0(Q8_0Tensor),
    Q4_0(Q4_0Tensor),
    Q4_1(Q4_1Tensor),
    Q4_K(Q4KTensor),
    Q6_K(Q6KTensor),
}

impl QuantTensor {
    pub fn scheme(&self) -> QuantScheme {
        match self {
            QuantTensor::Q8_0(_) => QuantScheme::Q8_0,
            QuantTensor::Q4_0(_) => QuantScheme::Q4_0,
            QuantTensor::Q4_1(_) => QuantScheme::Q4_1,
            QuantTensor::Q4_K(_) => QuantScheme::Q4_K,
            QuantTensor::Q6_K(_) => QuantScheme::Q6_K,
        }
    }

    pub fn rows(&self) -> usize {
        match self {
            QuantTensor::Q8_0(t) => t.rows,
            QuantTensor::Q4_0(t) => t.rows,
            QuantTensor::Q4_1(t) => t.rows,
            QuantTensor::Q4_K(t) => t.rows,
            QuantTensor::Q6_K(t) => t.rows,
        }
    }

    pub fn cols(&self) -> usize {
        match self {
            QuantTensor::Q8_0(t) => t.cols,
            QuantTensor::Q4_0(t) => t.cols,
            QuantTensor::Q4_1(t) => t.cols,
            QuantTensor::Q4_K(t) => t.cols,
            QuantTensor::Q6_K(t) => t.cols,
        }
    }

    pub fn quantize(
        scheme: QuantScheme,
        data: &[f32],
        rows: usize,
        cols: usize,
    ) -> EngineResult<Self> {
        if rows == 0 || cols == 0 {
            return Err(EngineError::InvalidShape(format!(
                "quantize: zero-sized matrix ({rows}x{cols})"
            )));
        }
        if data.len() != rows * cols {
            return Err(EngineError::InvalidShape(format!(
                "quantize: data length {} does not match {}x{}",
                data.len(),
                rows,
                cols
            )));
        }
        Ok(match scheme {
            QuantScheme::Q8_0 => QuantTensor::Q8_0(Q8_0Tensor::quantize(data, rows, cols)),
            QuantScheme::Q4_0 => QuantTensor::Q4_0(Q4_0Tensor::quantize(data, rows, cols)),
            QuantScheme::Q4_1 => QuantTensor::Q4_1(Q4_1Tensor::quantize(data, rows, cols)),
            QuantScheme::Q4_K => QuantTensor::Q4_K(Q4KTensor::quantize(data, rows, cols)),
            QuantScheme::Q6_K => QuantTensor::Q6_K(Q6KTensor::quantize(data, rows, cols)),
        })
    }

    pub fn dequantize(&self) -> Vec<f32> {
        match self {
            QuantTensor::Q8_0(t) => t.dequantize(),
            QuantTensor::Q4_0(t) => t.dequantize(),
            QuantTensor::Q4_1(t) => t.dequantize(),
            QuantTensor::Q4_K(t) => t.dequantize(),
            QuantTensor::Q6_K(t) => t.dequantize(),
        }
    }
}

/// Uniform access to a quantized tensor's native block structure, used by
/// the fused kernels to decode one block at a time instead of ever
/// materializing a fully dequantized copy.
pub trait BlockDecode {
    fn native_block_size(&self) -> usize;
    fn num_blocks(&self) -> usize;
    fn element_count(&self) -> usize;
    fn decode_into(&self, block_idx: usize, buf: &mut [f32]);
}

macro_rules! impl_block_decode {
    ($ty:ty) => {
        impl BlockDecode for $ty {
            fn native_block_size(&self) -> usize {
                self.native_block_size()
            }
            fn num_blocks(&self) -> usize {
                self.num_blocks()
            }
            fn element_count(&self) -> usize {
                self.element_count
            }
            fn decode_into(&self, block_idx: usize, buf: &mut [f32]) {
                self.decode_into(block_idx, buf)
            }
        }
    };
}

impl_block_decode!(Q4_0Tensor);
impl_block_decode!(Q4_1Tensor);
impl_block_decode!(Q4KTensor);
impl_block_decode!(Q6KTensor);

impl BlockDecode for Q8_0Tensor {
    fn native_block_size(&self) -> usize {
        self.native_block_size()
    }
    fn num_blocks(&self) -> usize {
        self.num_blocks()
    }
    fn element_count(&self) -> usize {
        self.quants.len()
    }
    fn decode_into(&self, block_idx: usize, buf: &mut [f32]) {
        self.decode_into(block_idx, buf)
    }
}

impl QuantTensor {
    pub fn as_block_decode(&self) -> &dyn BlockDecode {
        match self {
            QuantTensor::Q8_0(t) => t,
            QuantTensor::Q4_0(t) => t,
            QuantTensor::Q4_1(t) => t,
            QuantTensor::Q4_K(t) => t,
            QuantTensor::Q6_K(t) => t,
        }
    }
}

/// Number of blocks of `block_size` needed to cover `element_count`,
/// including a final partial block.
pub(crate) fn block_count(element_count: usize, block_size: usize) -> usize {
    element_count.div_ceil(block_size)
}
