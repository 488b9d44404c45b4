//! Foreign-format primitive and tensor dtype codes.

use crate::error::{EngineError, EngineResult};

/// Metadata value primitive type tags. Covers the full set the foreign
/// format can carry in its key/value metadata section; `Array` nests another
/// tagged value recursively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaTypeTag {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    F32,
    F64,
    Bool,
    String,
    Array,
}

impl MetaTypeTag {
    pub fn from_code(code: u8) -> EngineResult<Self> {
        Ok(match code {
            0 => MetaTypeTag::U8,
            1 => MetaTypeTag::I8,
            2 => MetaTypeTag::U16,
            3 => MetaTypeTag::I16,
            4 => MetaTypeTag::U32,
            5 => MetaTypeTag::I32,
            6 => MetaTypeTag::U64,
            7 => MetaTypeTag::I64,
            8 => MetaTypeTag::F32,
            9 => MetaTypeTag::F64,
            10 => MetaTypeTag::Bool,
            11 => MetaTypeTag::String,
            12 => MetaTypeTag::Array,
            other => {
                return Err(EngineError::ContainerCorrupt(format!(
                    "unknown XGF metadata type code {other}"
                )))
            }
        })
    }
}

/// Foreign tensor element type codes. Only [`ForeignTensorDType::F32`],
/// [`ForeignTensorDType::F16`] (version 3 only), [`ForeignTensorDType::Q8_0`]
/// and [`ForeignTensorDType::Q4_0`] are importable; everything else is
/// recognized (so it can be named in a rejection error) but not decodable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForeignTensorDType {
    F32,
    F16,
    Q8_0,
    Q4_0,
    Q4_1,
    Q5_0,
    Q5_1,
    Q2_K,
    Q3_K,
}

impl ForeignTensorDType {
    pub fn from_code(code: u8) -> EngineResult<Self> {
        Ok(match code {
            0 => ForeignTensorDType::F32,
            1 => ForeignTensorDType::F16,
            2 => ForeignTensorDType::Q8_0,
            3 => ForeignTensorDType::Q4_0,
            4 => ForeignTensorDType::Q4_1,
            5 => ForeignTensorDType::Q5_0,
            6 => ForeignTensorDType::Q5_1,
            7 => ForeignTensorDType::Q2_K,
            8 => ForeignTensorDType::Q3_K,
            other => {
                return Err(EngineError::ContainerCorrupt(format!(
                    "unknown XGF tensor dtype code {other}"
                )))
            }
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            ForeignTensorDType::F32 => "F32",
            ForeignTensorDType::F16 => "F16",
            ForeignTensorDType::Q8_0 => "Q8_0",
            ForeignTensorDType::Q4_0 => "Q4_0",
            ForeignTensorDType::Q4_1 => "Q4_1",
            ForeignTensorDType::Q5_0 => "Q5_0",
            ForeignTensorDType::Q5_1 => "Q5_1",
            ForeignTensorDType::Q2_K => "Q2_K",
            ForeignTensorDType::Q3_K => "Q3_K",
        }
    }

    pub fn is_importable(&self, version: u32) -> bool {
        match self {
            ForeignTensorDType::F32 => true,
            ForeignTensorDType::F16 => version >= 3,
            ForeignTensorDType::Q8_0 | ForeignTensorDType::Q4_0 => true,
            _ => false,
        }
    }
}

pub const FOREIGN_BLOCK_SIZE: usize = 32;

#[derive(Debug, Clone)]
pub struct ForeignTensorEntry {
    pub name: String,
    pub dtype: ForeignTensorDType,
    pub dims: Vec<u64>,
    pub data: Vec<u8>,
}
