//! Reads a `.qmf` file's header and directory eagerly, then loads individual
//! tensor payloads on demand.

use std::path::{Path, PathBuf};

use crate::container::format::{align_up, AuxData, DType, TensorDirEntry, DIR_ENTRY_SIZE, MAGIC};
use crate::error::{EngineError, EngineResult};
use crate::quant::{q4_0::Q4_0Tensor, q4_1::Q4_1Tensor, q4_k::Q4KTensor, q6_k::Q6KTensor, q8_0::Q8_0Tensor};
use crate::quant::QuantTensor;
use crate::weight_tensor::WeightTensor;

pub struct QmfReader {
    path: PathBuf,
    pub metadata: serde_json::Value,
    entries: Vec<TensorDirEntry>,
}

impl QmfReader {
    /// Reads and validates the header and directory; tensor payloads are not
    /// touched until [`QmfReader::load`] is called for a given name.
    pub fn open(path: &Path) -> EngineResult<Self> {
        let bytes = std::fs::read(path)?;
        let (metadata, entries) = parse_header_and_directory(&bytes)?;
        Ok(Self {
            path: path.to_path_buf(),
            metadata,
            entries,
        })
    }

    pub fn tensor_names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    pub fn load(&self, name: &str) -> EngineResult<WeightTensor> {
        let entry = self
            .entries
            .iter()
            .find(|e| e.name == name)
            .ok_or_else(|| EngineError::InvalidInput(format!("no tensor named '{name}' in container")))?;

        let bytes = std::fs::read(&self.path)?;
        let data_start = entry.data_offset as usize;
        let data_end = data_start + entry.data_length as usize;
        let scale_start = entry.scale_offset as usize;
        let scale_end = scale_start + entry.scale_length as usize;
        if data_end > bytes.len() || scale_end > bytes.len() {
            return Err(EngineError::ContainerCorrupt(format!(
                "tensor '{name}' payload extends past end of file"
            )));
        }
        let data_bytes = &bytes[data_start..data_end];
        let scale_bytes = &bytes[scale_start..scale_end];
        let aux: AuxData = serde_json::from_slice(scale_bytes)?;

        decode_tensor(entry, data_bytes, aux)
    }
}

fn parse_header_and_directory(bytes: &[u8]) -> EngineResult<(serde_json::Value, Vec<TensorDirEntry>)> {
    if bytes.len() < 20 || &bytes[0..8] != MAGIC {
        return Err(EngineError::ContainerCorrupt("bad magic".to_string()));
    }
    let version = u32::from_le_bytes(bytes[8..12].try_into().unwrap());
    if version != crate::container::format::VERSION {
        return Err(EngineError::ContainerCorrupt(format!(
            "unsupported container version {version}"
        )));
    }
    let tensor_count = u32::from_le_bytes(bytes[12..16].try_into().unwrap()) as usize;
    let metadata_len = u32::from_le_bytes(bytes[16..20].try_into().unwrap()) as usize;

    let metadata_start = 20;
    let metadata_end = metadata_start + metadata_len;
    if metadata_end > bytes.len() {
        return Err(EngineError::ContainerCorrupt(
            "metadata region overruns file".to_string(),
        ));
    }
    let metadata: serde_json::Value = serde_json::from_slice(&bytes[metadata_start..metadata_end])?;

    let dir_start = metadata_end;
    let dir_len = tensor_count * DIR_ENTRY_SIZE;
    let dir_end = dir_start + dir_len;
    if dir_end > bytes.len() {
        return Err(EngineError::ContainerCorrupt(
            "tensor directory truncated".to_string(),
        ));
    }

    let mut entries = Vec::with_capacity(tensor_count);
    for i in 0..tensor_count {
        let start = dir_start + i * DIR_ENTRY_SIZE;
        entries.push(TensorDirEntry::from_bytes(&bytes[start..start + DIR_ENTRY_SIZE])?);
    }

    let _ = align_up(dir_end as u64);
    Ok((metadata, entries))
}

fn decode_tensor(entry: &TensorDirEntry, data_bytes: &[u8], aux: AuxData) -> EngineResult<WeightTensor> {
    if entry.dims.len() != 2 {
        return Err(EngineError::InvalidShape(format!(
            "tensor '{}' has rank {} (only 2-D matrices are supported)",
            entry.name,
            entry.dims.len()
        )));
    }
    let rows = entry.dims[0] as usize;
    let cols = entry.dims[1] as usize;

    match (entry.dtype, aux) {
        (DType::F32, AuxData::None) => {
            if data_bytes.len() != rows * cols * 4 {
                return Err(EngineError::ContainerCorrupt(format!(
                    "tensor '{}' f32 payload length mismatch",
                    entry.name
                )));
            }
            let data = data_bytes
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes(c.try_into().unwrap()))
                .collect();
            Ok(WeightTensor::from_f32(data, rows, cols))
        }
        (DType::Q8_0, AuxData::Q8_0 { scales }) => {
            let quants = data_bytes.iter().map(|&b| b as i8).collect();
            Ok(WeightTensor::Quantized(QuantTensor::Q8_0(Q8_0Tensor {
                rows,
                cols,
                block_size: crate::quant::DEFAULT_BLOCK_SIZE,
                quants,
                scales,
            })))
        }
        (DType::Q4_0, AuxData::Q4_0 { scales }) => {
            Ok(WeightTensor::Quantized(QuantTensor::Q4_0(Q4_0Tensor {
                rows,
                cols,
                block_size: crate::quant::DEFAULT_BLOCK_SIZE,
                element_count: rows * cols,
                quants: data_bytes.to_vec(),
                scales,
            })))
        }
        (DType::Q4_1, AuxData::Q4_1 { scales, mins }) => {
            Ok(WeightTensor::Quantized(QuantTensor::Q4_1(Q4_1Tensor {
                rows,
                cols,
                block_size: crate::quant::DEFAULT_BLOCK_SIZE,
                element_count: rows * cols,
                quants: data_bytes.to_vec(),
                scales,
                mins,
            })))
        }
        (
            DType::Q4_K,
            AuxData::Q4K {
                sub_scale_q,
                sub_min_q,
                super_scale,
                super_min_base,
                super_min_scale,
            },
        ) => Ok(WeightTensor::Quantized(QuantTensor::Q4_K(Q4KTensor {
            rows,
            cols,
            element_count: rows * cols,
            quants: data_bytes.to_vec(),
            sub_scale_q,
            sub_min_q,
            super_scale,
            super_min_base,
            super_min_scale,
        }))),
        (DType::Q6_K, AuxData::Q6K { sub_scale_q, super_scale }) => {
            let quants = data_bytes.iter().map(|&b| b as i8).collect();
            Ok(WeightTensor::Quantized(QuantTensor::Q6_K(Q6KTensor {
                rows,
                cols,
                element_count: rows * cols,
                quants,
                sub_scale_q,
                super_scale,
            })))
        }
        (dtype, _) => Err(EngineError::ContainerCorrupt(format!(
            "tensor '{}' declares dtype {:?} but its aux data doesn't match",
            entry.name, dtype
        ))),
    }
}
