//! Serializes a set of named weight tensors to a `.qmf` file plus its JSON
//! sidecar manifest.

use std::io::Write;
use std::path::Path;

use crate::container::format::{
    align_up, AuxData, DType, TensorDirEntry, DIR_ENTRY_SIZE, MAGIC, VERSION,
};
use crate::container::manifest::{sha256_hex, Manifest, TensorDigest};
use crate::error::{EngineError, EngineResult};
use crate::quant::QuantTensor;
use crate::weight_tensor::WeightTensor;

pub struct NamedTensor<'a> {
    pub name: String,
    pub tensor: &'a WeightTensor,
}

/// Writes `tensors` (in the given order, which becomes directory order) to
/// `path`, plus `<path>.manifest.json` alongside it.
///
/// The same input always produces the same output bytes: no timestamps, no
/// padding beyond the fixed 16-byte payload alignment, tensors laid out in
/// the order given.
pub fn write_container(
    path: &Path,
    tensors: &[NamedTensor<'_>],
    metadata: serde_json::Value,
) -> EngineResult<()> {
    let mut data_blobs = Vec::with_capacity(tensors.len());
    let mut scale_blobs = Vec::with_capacity(tensors.len());

    for nt in tensors {
        let (dtype, dims, data_bytes, aux) = encode_tensor(nt.tensor)?;
        let scale_bytes = serde_json::to_vec(&aux)?;
        data_blobs.push((nt.name.clone(), dtype, dims, data_bytes));
        scale_blobs.push(scale_bytes);
    }

    let metadata_bytes = serde_json::to_vec(&metadata)?;

    // header: magic(8) + version(4) + tensor_count(4) + metadata_len(4)
    let header_len = 8 + 4 + 4 + 4;
    let dir_len = tensors.len() * DIR_ENTRY_SIZE;
    let mut cursor = align_up((header_len + metadata_bytes.len() as u64) + dir_len as u64);

    let mut entries = Vec::with_capacity(tensors.len());
    for ((name, dtype, dims, data_bytes), scale_bytes) in data_blobs.iter().zip(scale_blobs.iter())
    {
        let data_offset = cursor;
        let data_length = data_bytes.len() as u64;
        cursor = align_up(cursor + data_length);
        let scale_offset = cursor;
        let scale_length = scale_bytes.len() as u64;
        cursor = align_up(cursor + scale_length);

        entries.push(TensorDirEntry {
            name: name.clone(),
            dtype: *dtype,
            dims: dims.clone(),
            data_offset,
            data_length,
            scale_offset,
            scale_length,
        });
    }

    let mut out = Vec::with_capacity(cursor as usize);
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&VERSION.to_le_bytes());
    out.extend_from_slice(&(tensors.len() as u32).to_le_bytes());
    out.extend_from_slice(&(metadata_bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(&metadata_bytes);
    for entry in &entries {
        out.extend_from_slice(&entry.to_bytes()?);
    }
    pad_to(&mut out, header_len as usize + metadata_bytes.len() + dir_len);

    for (entry, ((_, _, _, data_bytes), scale_bytes)) in
        entries.iter().zip(data_blobs.iter().zip(scale_blobs.iter()))
    {
        pad_to(&mut out, entry.data_offset as usize);
        out.extend_from_slice(data_bytes);
        pad_to(&mut out, entry.scale_offset as usize);
        out.extend_from_slice(scale_bytes);
    }
    pad_to(&mut out, cursor as usize);

    let mut file = std::fs::File::create(path)?;
    file.write_all(&out)?;

    let manifest = Manifest {
        container_sha256: sha256_hex(&out),
        tensors: entries
            .iter()
            .zip(data_blobs.iter())
            .map(|(entry, (_, _, _, data_bytes))| TensorDigest {
                name: entry.name.clone(),
                sha256: sha256_hex(data_bytes),
            })
            .collect(),
        metadata,
    };
    let manifest_path = manifest_path_for(path);
    manifest.write_to_path(&manifest_path)?;

    Ok(())
}

pub fn manifest_path_for(container_path: &Path) -> std::path::PathBuf {
    let mut name = container_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".manifest.json");
    container_path.with_file_name(name)
}

fn pad_to(buf: &mut Vec<u8>, target_len: usize) {
    if buf.len() < target_len {
        buf.resize(target_len, 0);
    }
}

type EncodedTensor = (DType, Vec<u64>, Vec<u8>, AuxData);

fn encode_tensor(tensor: &WeightTensor) -> EngineResult<EncodedTensor> {
    match tensor {
        WeightTensor::F32 { rows, cols, data } => {
            if data.len() != rows * cols {
                return Err(EngineError::DimensionMismatch {
                    context: "write_container f32 tensor".to_string(),
                    expected: rows * cols,
                    actual: data.len(),
                });
            }
            let mut bytes = Vec::with_capacity(data.len() * 4);
            for v in data {
                bytes.extend_from_slice(&v.to_le_bytes());
            }
            Ok((DType::F32, vec![*rows as u64, *cols as u64], bytes, AuxData::None))
        }
        WeightTensor::Quantized(q) => {
            let dims = vec![q.rows() as u64, q.cols() as u64];
            Ok(match q {
                QuantTensor::Q8_0(t) => (
                    DType::Q8_0,
                    dims,
                    t.quants.iter().map(|&b| b as u8).collect(),
                    AuxData::Q8_0 { scales: t.scales.clone() },
                ),
                QuantTensor::Q4_0(t) => (
                    DType::Q4_0,
                    dims,
                    t.quants.clone(),
                    AuxData::Q4_0 { scales: t.scales.clone() },
                ),
                QuantTensor::Q4_1(t) => (
                    DType::Q4_1,
                    dims,
                    t.quants.clone(),
                    AuxData::Q4_1 {
                        scales: t.scales.clone(),
                        mins: t.mins.clone(),
                    },
                ),
                QuantTensor::Q4_K(t) => (
                    DType::Q4_K,
                    dims,
                    t.quants.clone(),
                    AuxData::Q4K {
                        sub_scale_q: t.sub_scale_q.clone(),
                        sub_min_q: t.sub_min_q.clone(),
                        super_scale: t.super_scale.clone(),
                        super_min_base: t.super_min_base.clone(),
                        super_min_scale: t.super_min_scale.clone(),
                    },
                ),
                QuantTensor::Q6_K(t) => (
                    DType::Q6_K,
                    dims,
                    t.quants.iter().map(|&b| b as u8).collect(),
                    AuxData::Q6K {
                        sub_scale_q: t.sub_scale_q.clone(),
                        super_scale: t.super_scale.clone(),
                    },
                ),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quant::QuantScheme;

    #[test]
    fn write_container_produces_aligned_nonempty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.qmf");
        let w = WeightTensor::from_f32(vec![1.0, 2.0, 3.0, 4.0], 2, 2);
        let named = [NamedTensor { name: "w0".to_string(), tensor: &w }];
        write_container(&path, &named, serde_json::json!({"name": "test"})).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert!(!bytes.is_empty());
        assert_eq!(&bytes[0..8], MAGIC);
        assert!(manifest_path_for(&path).exists());
    }

    #[test]
    fn write_container_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let path_a = dir.path().join("a.qmf");
        let path_b = dir.path().join("b.qmf");
        let data = vec![1.0_f32; 128];
        let w = WeightTensor::quantize(QuantScheme::Q4_0, &data, 64, 2).unwrap();
        let named = [NamedTensor { name: "w0".to_string(), tensor: &w }];
        write_container(&path_a, &named, serde_json::json!({})).unwrap();
        write_container(&path_b, &named, serde_json::json!({})).unwrap();
        assert_eq!(std::fs::read(&path_a).unwrap(), std::fs::read(&path_b).unwrap());
    }
}
