//! Typed entry points behind the CLI surface: `quantize`, `import-xgf`,
//! `inspect`, `verify`. Each is a plain function returning [`EngineResult`];
//! binding these onto an actual `argv` parser and mapping their outcome to a
//! process exit code is left to whatever wraps this crate — the functions
//! here only document the intended code via [`exit_code`] /
//! [`verify_exit_code`].

use std::path::Path;

use crate::container::validator::{validate_container, ValidationIssue};
use crate::container::writer::{write_container, NamedTensor};
use crate::container::QmfReader;
use crate::error::{EngineError, EngineResult};
use crate::quant::{QuantScheme, DEFAULT_BLOCK_SIZE};
use crate::weight_tensor::WeightTensor;
use crate::xgf::import_xgf as import_xgf_bytes;

/// Requantizes every F32 tensor in an existing container to `scheme`,
/// writing the result to `output_path`. `block_size` is accepted for
/// parity with the CLI surface but must equal [`DEFAULT_BLOCK_SIZE`] — this
/// crate's quantizers are not parameterized over block width.
pub fn quantize_checkpoint(
    checkpoint_path: &Path,
    output_path: &Path,
    scheme: QuantScheme,
    block_size: usize,
) -> EngineResult<()> {
    if block_size != DEFAULT_BLOCK_SIZE {
        return Err(EngineError::InvalidInput(format!(
            "block_size {block_size} is not supported, only {DEFAULT_BLOCK_SIZE}"
        )));
    }

    let reader = QmfReader::open(checkpoint_path)?;
    let names: Vec<String> = reader.tensor_names().into_iter().map(str::to_string).collect();

    let mut quantized = Vec::with_capacity(names.len());
    for name in &names {
        let tensor = reader.load(name)?;
        let requantized = match tensor {
            WeightTensor::F32 { data, rows, cols } => {
                WeightTensor::quantize(scheme, &data, rows, cols)?
            }
            already_quantized => already_quantized,
        };
        quantized.push((name.clone(), requantized));
    }

    let named: Vec<NamedTensor<'_>> = quantized
        .iter()
        .map(|(name, tensor)| NamedTensor {
            name: name.clone(),
            tensor,
        })
        .collect();

    write_container(output_path, &named, reader.metadata.clone())
}

/// Imports an XGF file and writes it out as a QMF container. Fails with
/// [`EngineError::UnsupportedQuantScheme`] (documented exit code 2) if any
/// tensor in the source uses a scheme this crate cannot import.
pub fn import_xgf(input_path: &Path, output_path: &Path) -> EngineResult<()> {
    let bytes = std::fs::read(input_path)?;
    let imported = import_xgf_bytes(&bytes)?;

    let named: Vec<NamedTensor<'_>> = imported
        .tensors
        .iter()
        .map(|(name, tensor)| NamedTensor {
            name: name.clone(),
            tensor,
        })
        .collect();

    write_container(output_path, &named, imported.metadata)
}

/// Tensor summary returned by [`inspect`]; printing is the caller's job.
#[derive(Debug, Clone)]
pub struct TensorSummary {
    pub name: String,
    pub dtype: &'static str,
    pub rows: usize,
    pub cols: usize,
}

#[derive(Debug, Clone)]
pub struct ModelInspection {
    pub metadata: serde_json::Value,
    pub tensors: Vec<TensorSummary>,
}

/// Opens a container and returns its metadata plus a per-tensor summary.
/// The `--verbose`/`--tensors` CLI flags only change what a caller prints
/// from this; inspection itself always reads the full directory.
pub fn inspect(path: &Path) -> EngineResult<ModelInspection> {
    let reader = QmfReader::open(path)?;
    let metadata = reader.metadata.clone();
    let mut tensors = Vec::new();
    for name in reader.tensor_names() {
        let tensor = reader.load(name)?;
        let dtype = tensor.scheme().map(|s| s.name()).unwrap_or("F32");
        tensors.push(TensorSummary {
            name: name.to_string(),
            dtype,
            rows: tensor.rows(),
            cols: tensor.cols(),
        });
    }
    Ok(ModelInspection { metadata, tensors })
}

/// Structural validation of a container; an empty result means valid.
pub fn verify(path: &Path) -> Vec<ValidationIssue> {
    validate_container(path)
}

/// Documented exit-code convention for [`quantize_checkpoint`] and
/// [`import_xgf`]: 0 on success, 2 for an unsupported-scheme rejection
/// (the only documented non-zero CLI case), 1 for anything else.
pub fn exit_code<T>(result: &EngineResult<T>) -> i32 {
    match result {
        Ok(_) => 0,
        Err(EngineError::UnsupportedQuantScheme(_)) => 2,
        Err(_) => 1,
    }
}

/// Documented exit-code convention for [`verify`]: 0 if no issues, 1
/// otherwise.
pub fn verify_exit_code(issues: &[ValidationIssue]) -> i32 {
    if issues.is_empty() {
        0
    } else {
        1
    }
}
