//! Converts a parsed foreign container into this crate's native
//! [`WeightTensor`]s.
//!
//! Two reconciliations happen here and nowhere else: foreign fp16 values are
//! bit-converted to f32 (never carried around in half precision), and
//! foreign 32-element quantized blocks are fully dequantized then
//! re-quantized into this crate's native 64-element blocks — never copied
//! byte for byte, since the block boundaries don't line up.

use crate::error::{EngineError, EngineResult};
use crate::quant::QuantScheme;
use crate::weight_tensor::WeightTensor;
use crate::xgf::fp16::f16_to_f32;
use crate::xgf::parser::{self, ParsedXgf};
use crate::xgf::types::{ForeignTensorDType, ForeignTensorEntry, FOREIGN_BLOCK_SIZE};

pub struct ImportedModel {
    pub metadata: serde_json::Value,
    pub tensors: Vec<(String, WeightTensor)>,
}

pub fn import_xgf(bytes: &[u8]) -> EngineResult<ImportedModel> {
    let ParsedXgf { version, metadata, tensors } = parser::parse(bytes)?;

    let unsupported: Vec<String> = tensors
        .iter()
        .filter(|t| !t.dtype.is_importable(version))
        .map(|t| format!("{}: {}", t.name, t.dtype.name()))
        .collect();
    if !unsupported.is_empty() {
        return Err(EngineError::UnsupportedQuantScheme(unsupported));
    }

    let mut out = Vec::with_capacity(tensors.len());
    for entry in &tensors {
        let tensor = decode_foreign_tensor(entry, version)?;
        out.push((entry.name.clone(), tensor));
    }

    Ok(ImportedModel { metadata, tensors: out })
}

fn decode_foreign_tensor(entry: &ForeignTensorEntry, version: u32) -> EngineResult<WeightTensor> {
    if entry.dims.len() != 2 {
        return Err(EngineError::InvalidShape(format!(
            "tensor '{}' has rank {} (only 2-D matrices are supported)",
            entry.name,
            entry.dims.len()
        )));
    }
    let rows = entry.dims[0] as usize;
    let cols = entry.dims[1] as usize;
    let element_count = rows * cols;

    match entry.dtype {
        ForeignTensorDType::F32 => {
            if entry.data.len() != element_count * 4 {
                return Err(EngineError::ContainerCorrupt(format!(
                    "tensor '{}' F32 payload length mismatch",
                    entry.name
                )));
            }
            let data = entry
                .data
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes(c.try_into().unwrap()))
                .collect();
            Ok(WeightTensor::from_f32(data, rows, cols))
        }
        ForeignTensorDType::F16 => {
            if version < 3 {
                return Err(EngineError::UnsupportedQuantScheme(vec![format!(
                    "{}: F16 (requires version >= 3)",
                    entry.name
                )]));
            }
            if entry.data.len() != element_count * 2 {
                return Err(EngineError::ContainerCorrupt(format!(
                    "tensor '{}' F16 payload length mismatch",
                    entry.name
                )));
            }
            let data = entry
                .data
                .chunks_exact(2)
                .map(|c| f16_to_f32(u16::from_le_bytes(c.try_into().unwrap())))
                .collect();
            Ok(WeightTensor::from_f32(data, rows, cols))
        }
        ForeignTensorDType::Q8_0 => {
            let data = dequantize_foreign_q8_0(&entry.data, element_count, &entry.name)?;
            WeightTensor::quantize(QuantScheme::Q8_0, &data, rows, cols)
        }
        ForeignTensorDType::Q4_0 => {
            let data = dequantize_foreign_q4_0(&entry.data, element_count, &entry.name)?;
            WeightTensor::quantize(QuantScheme::Q4_0, &data, rows, cols)
        }
        other => Err(EngineError::UnsupportedQuantScheme(vec![format!(
            "{}: {}",
            entry.name,
            other.name()
        )])),
    }
}

/// Foreign Q8_0: 32-element blocks, each `[f16 scale][32 x i8 quant]`.
fn dequantize_foreign_q8_0(bytes: &[u8], element_count: usize, name: &str) -> EngineResult<Vec<f32>> {
    let block_bytes = 2 + FOREIGN_BLOCK_SIZE;
    let n_blocks = element_count.div_ceil(FOREIGN_BLOCK_SIZE);
    if bytes.len() != n_blocks * block_bytes {
        return Err(EngineError::ContainerCorrupt(format!(
            "tensor '{name}' foreign Q8_0 payload length mismatch"
        )));
    }
    let mut out = Vec::with_capacity(element_count);
    for block in bytes.chunks(block_bytes) {
        let scale = f16_to_f32(u16::from_le_bytes(block[0..2].try_into().unwrap()));
        for &q in &block[2..2 + FOREIGN_BLOCK_SIZE] {
            if out.len() >= element_count {
                break;
            }
            out.push(q as i8 as f32 * scale);
        }
    }
    Ok(out)
}

/// Foreign Q4_0: 32-element blocks, each `[f16 scale][16 bytes packed nibbles]`.
fn dequantize_foreign_q4_0(bytes: &[u8], element_count: usize, name: &str) -> EngineResult<Vec<f32>> {
    let block_bytes = 2 + FOREIGN_BLOCK_SIZE / 2;
    let n_blocks = element_count.div_ceil(FOREIGN_BLOCK_SIZE);
    if bytes.len() != n_blocks * block_bytes {
        return Err(EngineError::ContainerCorrupt(format!(
            "tensor '{name}' foreign Q4_0 payload length mismatch"
        )));
    }
    let mut out = Vec::with_capacity(element_count);
    for block in bytes.chunks(block_bytes) {
        let scale = f16_to_f32(u16::from_le_bytes(block[0..2].try_into().unwrap()));
        for &byte in &block[2..2 + FOREIGN_BLOCK_SIZE / 2] {
            if out.len() >= element_count {
                break;
            }
            let lo = decode_nibble(byte & 0x0F);
            out.push(lo as f32 * scale);
            if out.len() >= element_count {
                break;
            }
            let hi = decode_nibble((byte >> 4) & 0x0F);
            out.push(hi as f32 * scale);
        }
    }
    Ok(out)
}

#[inline]
fn decode_nibble(nibble: u8) -> i32 {
    if nibble < 8 {
        nibble as i32
    } else {
        nibble as i32 - 16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_nibble(v: i32) -> u8 {
        (if v < 0 { v + 16 } else { v }) as u8
    }

    #[test]
    fn dequantizes_foreign_q8_0_block() {
        let scale = 0.1f32;
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&crate::xgf::fp16::f32_to_f16(scale).to_le_bytes());
        for i in 0..32 {
            bytes.push((i - 16) as i8 as u8);
        }
        let out = dequantize_foreign_q8_0(&bytes, 32, "t").unwrap();
        assert_eq!(out.len(), 32);
        assert!((out[0] - (-16.0 * scale)).abs() < 1e-2);
    }

    #[test]
    fn dequantizes_foreign_q4_0_block() {
        let scale = 0.2f32;
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&crate::xgf::fp16::f32_to_f16(scale).to_le_bytes());
        for _ in 0..16 {
            let lo = encode_nibble(3);
            let hi = encode_nibble(-3);
            bytes.push(lo | (hi << 4));
        }
        let out = dequantize_foreign_q4_0(&bytes, 32, "t").unwrap();
        assert_eq!(out.len(), 32);
        assert!((out[0] - 3.0 * scale).abs() < 1e-2);
        assert!((out[1] - (-3.0 * scale)).abs() < 1e-2);
    }

    #[test]
    fn import_rejects_all_unsupported_tensors_in_one_batch() {
        let mut buf = Vec::new();
        buf.extend_from_slice(parser::MAGIC);
        buf.extend_from_slice(&2u32.to_le_bytes());
        buf.extend_from_slice(&0u64.to_le_bytes()); // no metadata

        buf.extend_from_slice(&2u32.to_le_bytes()); // 2 tensors
        for (name, code) in [("a", 7u8), ("b", 8u8)] {
            // Q2_K, Q3_K
            buf.extend_from_slice(&(name.len() as u32).to_le_bytes());
            buf.extend_from_slice(name.as_bytes());
            buf.push(code);
            buf.push(1); // rank
            buf.extend_from_slice(&4u64.to_le_bytes());
            buf.extend_from_slice(&0u64.to_le_bytes()); // zero-length payload
        }

        let err = import_xgf(&buf).unwrap_err();
        match err {
            EngineError::UnsupportedQuantScheme(names) => assert_eq!(names.len(), 2),
            other => panic!("expected UnsupportedQuantScheme, got {other:?}"),
        }
    }
}
