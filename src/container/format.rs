//! On-disk layout constants and the fixed-size tensor directory entry.

use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};

pub const MAGIC: &[u8; 8] = b"QMFv0001";
pub const VERSION: u32 = 1;
pub const PAYLOAD_ALIGNMENT: u64 = 16;
pub const NAME_FIELD_LEN: usize = 128;

/// Tensor element type as recorded in the directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum DType {
    F32 = 0,
    Q8_0 = 1,
    Q4_0 = 2,
    Q4_1 = 3,
    Q4_K = 4,
    Q6_K = 5,
}

impl DType {
    pub fn from_u16(v: u16) -> EngineResult<Self> {
        Ok(match v {
            0 => DType::F32,
            1 => DType::Q8_0,
            2 => DType::Q4_0,
            3 => DType::Q4_1,
            4 => DType::Q4_K,
            5 => DType::Q6_K,
            other => {
                return Err(EngineError::ContainerCorrupt(format!(
                    "unknown dtype code {other}"
                )))
            }
        });
    }
}

/// One fixed-size entry per tensor in the on-disk directory.
#[derive(Debug, Clone)]
pub struct TensorDirEntry {
    pub name: String,
    pub dtype: DType,
    pub dims: Vec<u64>,
    pub data_offset: u64,
    pub data_length: u64,
    pub scale_offset: u64,
    pub scale_length: u64,
}

pub const DIR_ENTRY_SIZE: usize = NAME_FIELD_LEN + 2 + 2 + 8 * 8 + 8 + 8 + 8 + 8;

impl TensorDirEntry {
    pub fn to_bytes(&self) -> EngineResult<Vec<u8>> {
        if self.name.len() > NAME_FIELD_LEN {
            return Err(EngineError::InvalidInput(format!(
                "tensor name '{}' exceeds {NAME_FIELD_LEN} bytes",
                self.name
            )));
        }
        if self.dims.len() > 8 {
            return Err(EngineError::InvalidShape(format!(
                "tensor '{}' has rank {} > 8",
                self.name,
                self.dims.len()
            )));
        }

        let mut buf = Vec::with_capacity(DIR_ENTRY_SIZE);
        let mut name_bytes = [0u8; NAME_FIELD_LEN];
        name_bytes[..self.name.len()].copy_from_slice(self.name.as_bytes());
        buf.extend_from_slice(&name_bytes);
        buf.extend_from_slice(&(self.dtype as u16).to_le_bytes());
        buf.extend_from_slice(&(self.dims.len() as u16).to_le_bytes());
        let mut dims = [0u64; 8];
        dims[..self.dims.len()].copy_from_slice(&self.dims);
        for d in dims {
            buf.extend_from_slice(&d.to_le_bytes());
        }
        buf.extend_from_slice(&self.data_offset.to_le_bytes());
        buf.extend_from_slice(&self.data_length.to_le_bytes());
        buf.extend_from_slice(&self.scale_offset.to_le_bytes());
        buf.extend_from_slice(&self.scale_length.to_le_bytes());
        Ok(buf)
    }

    pub fn from_bytes(buf: &[u8]) -> EngineResult<Self> {
        if buf.len() < DIR_ENTRY_SIZE {
            return Err(EngineError::ContainerCorrupt(
                "tensor directory entry truncated".to_string(),
            ));
        }
        let mut off = 0;
        let name_bytes = &buf[off..off + NAME_FIELD_LEN];
        off += NAME_FIELD_LEN;
        let nul = name_bytes.iter().position(|&b| b == 0).unwrap_or(name_bytes.len());
        let name = String::from_utf8_lossy(&name_bytes[..nul]).to_string();

        let dtype = DType::from_u16(u16::from_le_bytes(buf[off..off + 2].try_into().unwrap()))?;
        off += 2;
        let rank = u16::from_le_bytes(buf[off..off + 2].try_into().unwrap()) as usize;
        off += 2;
        if rank > 8 {
            return Err(EngineError::ContainerCorrupt(format!(
                "tensor '{name}' declares rank {rank} > 8"
            )));
        }
        let mut dims = Vec::with_capacity(rank);
        for i in 0..8 {
            let d = u64::from_le_bytes(buf[off + i * 8..off + i * 8 + 8].try_into().unwrap());
            if i < rank {
                dims.push(d);
            }
        }
        off += 8 * 8;
        let data_offset = u64::from_le_bytes(buf[off..off + 8].try_into().unwrap());
        off += 8;
        let data_length = u64::from_le_bytes(buf[off..off + 8].try_into().unwrap());
        off += 8;
        let scale_offset = u64::from_le_bytes(buf[off..off + 8].try_into().unwrap());
        off += 8;
        let scale_length = u64::from_le_bytes(buf[off..off + 8].try_into().unwrap());

        Ok(Self {
            name,
            dtype,
            dims,
            data_offset,
            data_length,
            scale_offset,
            scale_length,
        })
    }
}

pub fn align_up(offset: u64) -> u64 {
    offset.div_ceil(PAYLOAD_ALIGNMENT) * PAYLOAD_ALIGNMENT
}

/// Per-tensor quantization side-band data (scales, mins, sub-block
/// parameters). Stored JSON-encoded in the tensor's scale region rather than
/// packed bit-for-bit: the directory entry already carries rank/dims/dtype,
/// so this only needs to carry what `QuantTensor::quantize` produced beyond
/// the raw quant bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AuxData {
    None,
    Q8_0 { scales: Vec<f32> },
    Q4_0 { scales: Vec<f32> },
    Q4_1 { scales: Vec<f32>, mins: Vec<f32> },
    Q4K {
        sub_scale_q: Vec<u8>,
        sub_min_q: Vec<u8>,
        super_scale: Vec<f32>,
        super_min_base: Vec<f32>,
        super_min_scale: Vec<f32>,
    },
    Q6K {
        sub_scale_q: Vec<u8>,
        super_scale: Vec<f32>,
    },
}
