//! CPU-only quantized transformer inference runtime core: fused kernels
//! over block-quantized weights, a binary model container with a foreign
//! importer, a batching scheduler, and the telemetry/explainability/memory
//! accounting wrapped around generation.

pub mod config;
pub mod container;
pub mod error;
pub mod explain;
pub mod inference;
pub mod kernels;
pub mod logging;
pub mod memory_budget;
pub mod ops;
pub mod quant;
pub mod sampler;
pub mod telemetry;
pub mod tensor_pool;
pub mod weight_tensor;
pub mod xgf;

pub use error::{EngineError, EngineResult, StopReason};
