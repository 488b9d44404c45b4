//! XGF: a foreign checkpoint format this crate can import from, converting
//! its tensors into native [`crate::weight_tensor::WeightTensor`]s. Not a
//! format this crate ever writes — import is one-way.

pub mod binary_reader;
pub mod fp16;
pub mod importer;
pub mod parser;
pub mod types;

pub use importer::{import_xgf, ImportedModel};
