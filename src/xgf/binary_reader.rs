//! Sequential little-endian reads over an in-memory XGF buffer.
//!
//! Primitive-by-primitive reads over a byte cursor instead of a `File`: the
//! whole foreign file is mapped into memory before parsing begins.

use crate::error::{EngineError, EngineResult};
use crate::xgf::fp16;

pub struct XgfReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> XgfReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    fn take(&mut self, n: usize) -> EngineResult<&'a [u8]> {
        if self.pos + n > self.buf.len() {
            return Err(EngineError::ContainerCorrupt(format!(
                "unexpected end of XGF stream at offset {} (needed {n} more bytes)",
                self.pos
            )));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> EngineResult<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_i8(&mut self) -> EngineResult<i8> {
        Ok(self.take(1)?[0] as i8)
    }

    pub fn read_u16(&mut self) -> EngineResult<u16> {
        Ok(u16::from_le_bytes(self.take(2)?.try_into().unwrap()))
    }

    pub fn read_i16(&mut self) -> EngineResult<i16> {
        Ok(i16::from_le_bytes(self.take(2)?.try_into().unwrap()))
    }

    pub fn read_u32(&mut self) -> EngineResult<u32> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    pub fn read_i32(&mut self) -> EngineResult<i32> {
        Ok(i32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    pub fn read_u64(&mut self) -> EngineResult<u64> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    pub fn read_i64(&mut self) -> EngineResult<i64> {
        Ok(i64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    pub fn read_f32(&mut self) -> EngineResult<f32> {
        Ok(f32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    pub fn read_f64(&mut self) -> EngineResult<f64> {
        Ok(f64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    pub fn read_f16_as_f32(&mut self) -> EngineResult<f32> {
        Ok(fp16::f16_to_f32(self.read_u16()?))
    }

    pub fn read_bool(&mut self) -> EngineResult<bool> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_string(&mut self) -> EngineResult<String> {
        let len = self.read_u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| EngineError::ContainerCorrupt(format!("invalid UTF-8 in XGF string: {e}")))
    }

    pub fn read_bytes(&mut self, n: usize) -> EngineResult<&'a [u8]> {
        self.take(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_sequential_primitives() {
        let mut bytes = Vec::new();
        bytes.push(7u8);
        bytes.extend_from_slice(&42u32.to_le_bytes());
        bytes.extend_from_slice(&1.5f32.to_le_bytes());
        bytes.push(1u8); // bool true

        let mut reader = XgfReader::new(&bytes);
        assert_eq!(reader.read_u8().unwrap(), 7);
        assert_eq!(reader.read_u32().unwrap(), 42);
        assert_eq!(reader.read_f32().unwrap(), 1.5);
        assert!(reader.read_bool().unwrap());
    }

    #[test]
    fn rejects_reads_past_end() {
        let bytes = [0u8, 1, 2];
        let mut reader = XgfReader::new(&bytes);
        assert!(reader.read_u64().is_err());
    }

    #[test]
    fn reads_length_prefixed_string() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&5u32.to_le_bytes());
        bytes.extend_from_slice(b"hello");
        let mut reader = XgfReader::new(&bytes);
        assert_eq!(reader.read_string().unwrap(), "hello");
    }
}
