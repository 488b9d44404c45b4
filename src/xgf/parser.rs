//! Sequential single-pass parser for the foreign XGF container: magic,
//! version, a metadata key/value section, then a flat tensor section. Every
//! field is read exactly once, in file order — there is no directory to
//! seek through first, unlike QMF.

use crate::error::{EngineError, EngineResult};
use crate::xgf::binary_reader::XgfReader;
use crate::xgf::types::{ForeignTensorDType, ForeignTensorEntry, MetaTypeTag};

pub const MAGIC: &[u8; 4] = b"XGF0";
pub const SUPPORTED_VERSIONS: &[u32] = &[2, 3];

pub struct ParsedXgf {
    pub version: u32,
    pub metadata: serde_json::Value,
    pub tensors: Vec<ForeignTensorEntry>,
}

pub fn parse(buf: &[u8]) -> EngineResult<ParsedXgf> {
    let mut reader = XgfReader::new(buf);

    let magic = reader.read_bytes(4)?;
    if magic != MAGIC {
        return Err(EngineError::ContainerCorrupt("bad XGF magic".to_string()));
    }

    let version = reader.read_u32()?;
    if !SUPPORTED_VERSIONS.contains(&version) {
        return Err(EngineError::ContainerCorrupt(format!(
            "unsupported XGF version {version}"
        )));
    }

    let metadata = read_metadata_section(&mut reader)?;

    let tensor_count = reader.read_u32()? as usize;
    let mut tensors = Vec::with_capacity(tensor_count);
    for _ in 0..tensor_count {
        tensors.push(read_tensor_entry(&mut reader)?);
    }

    Ok(ParsedXgf { version, metadata, tensors })
}

fn read_metadata_section(reader: &mut XgfReader<'_>) -> EngineResult<serde_json::Value> {
    let kv_count = reader.read_u64()?;
    let mut map = serde_json::Map::with_capacity(kv_count as usize);
    for _ in 0..kv_count {
        let key = reader.read_string()?;
        let tag = MetaTypeTag::from_code(reader.read_u8()?)?;
        let value = read_meta_value(reader, tag)?;
        map.insert(key, value);
    }
    Ok(serde_json::Value::Object(map))
}

fn read_meta_value(reader: &mut XgfReader<'_>, tag: MetaTypeTag) -> EngineResult<serde_json::Value> {
    Ok(match tag {
        MetaTypeTag::U8 => serde_json::json!(reader.read_u8()?),
        MetaTypeTag::I8 => serde_json::json!(reader.read_i8()?),
        MetaTypeTag::U16 => serde_json::json!(reader.read_u16()?),
        MetaTypeTag::I16 => serde_json::json!(reader.read_i16()?),
        MetaTypeTag::U32 => serde_json::json!(reader.read_u32()?),
        MetaTypeTag::I32 => serde_json::json!(reader.read_i32()?),
        MetaTypeTag::U64 => serde_json::json!(reader.read_u64()?),
        MetaTypeTag::I64 => serde_json::json!(reader.read_i64()?),
        MetaTypeTag::F32 => serde_json::json!(reader.read_f32()?),
        MetaTypeTag::F64 => serde_json::json!(reader.read_f64()?),
        MetaTypeTag::Bool => serde_json::json!(reader.read_bool()?),
        MetaTypeTag::String => serde_json::json!(reader.read_string()?),
        MetaTypeTag::Array => {
            let elem_tag = MetaTypeTag::from_code(reader.read_u8()?)?;
            let len = reader.read_u32()? as usize;
            let mut items = Vec::with_capacity(len);
            for _ in 0..len {
                items.push(read_meta_value(reader, elem_tag)?);
            }
            serde_json::Value::Array(items)
        }
    })
}

fn read_tensor_entry(reader: &mut XgfReader<'_>) -> EngineResult<ForeignTensorEntry> {
    let name = reader.read_string()?;
    let dtype_code = reader.read_u8()?;
    let dtype = ForeignTensorDType::from_code(dtype_code)?;
    let rank = reader.read_u8()? as usize;
    let mut dims = Vec::with_capacity(rank);
    for _ in 0..rank {
        dims.push(reader.read_u64()?);
    }
    let data_length = reader.read_u64()? as usize;
    let data = reader.read_bytes(data_length)?.to_vec();

    Ok(ForeignTensorEntry { name, dtype, dims, data })
}
