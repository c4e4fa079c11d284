//! Little-endian field codec. No padding between fields.

use glam::Vec3;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("empty packet")]
    Empty,
    #[error("unexpected end of buffer: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEnd { needed: usize, remaining: usize },
    #[error("unknown packet kind 0x{0:02x}")]
    UnknownKind(u8),
    #[error("invalid boolean byte {0}")]
    InvalidBool(u8),
    #[error("invalid channel id {0}")]
    InvalidChannel(u8),
    #[error("bad frame magic 0x{0:08x}")]
    BadMagic(u32),
    #[error("string is not valid utf-8")]
    InvalidUtf8,
    #[error("{0} trailing bytes after message")]
    TrailingBytes(usize),
    #[error("entity count {0} exceeds remaining buffer")]
    TooManyEntities(u32),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    #[error("field of {len} bytes exceeds the {max} byte length prefix")]
    TooLong { len: usize, max: usize },
    #[error("{0} entities do not fit a u32 count")]
    TooManyEntities(usize),
}

#[derive(Debug, Default, Clone)]
pub struct WireWriter {
    buf: Vec<u8>,
}

impl WireWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_u64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Bit pattern, NaNs included.
    pub fn write_f32(&mut self, value: f32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_bool(&mut self, value: bool) {
        self.buf.push(u8::from(value));
    }

    pub fn write_vec3(&mut self, value: Vec3) {
        self.write_f32(value.x);
        self.write_f32(value.y);
        self.write_f32(value.z);
    }

    pub fn write_slice(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Bytes preceded by a `u16` count.
    pub fn write_prefixed_bytes(&mut self, bytes: &[u8]) -> Result<(), EncodeError> {
        let len = u16::try_from(bytes.len()).map_err(|_| EncodeError::TooLong {
            len: bytes.len(),
            max: u16::MAX as usize,
        })?;
        self.write_u16(len);
        self.write_slice(bytes);
        Ok(())
    }

    pub fn write_str(&mut self, value: &str) -> Result<(), EncodeError> {
        self.write_prefixed_bytes(value.as_bytes())
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

#[derive(Debug, Clone)]
pub struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn take(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        let remaining = self.remaining();
        if len > remaining {
            return Err(DecodeError::UnexpectedEnd {
                needed: len,
                remaining,
            });
        }
        let bytes = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take_array::<1>()?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, DecodeError> {
        Ok(u16::from_le_bytes(self.take_array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_le_bytes(self.take_array()?))
    }

    pub fn read_u64(&mut self) -> Result<u64, DecodeError> {
        Ok(u64::from_le_bytes(self.take_array()?))
    }

    pub fn read_f32(&mut self) -> Result<f32, DecodeError> {
        Ok(f32::from_le_bytes(self.take_array()?))
    }

    pub fn read_bool(&mut self) -> Result<bool, DecodeError> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(DecodeError::InvalidBool(other)),
        }
    }

    pub fn read_vec3(&mut self) -> Result<Vec3, DecodeError> {
        let x = self.read_f32()?;
        let y = self.read_f32()?;
        let z = self.read_f32()?;
        Ok(Vec3::new(x, y, z))
    }

    pub fn read_prefixed_bytes(&mut self) -> Result<&'a [u8], DecodeError> {
        let len = self.read_u16()? as usize;
        self.take(len)
    }

    pub fn read_str(&mut self) -> Result<&'a str, DecodeError> {
        let bytes = self.read_prefixed_bytes()?;
        std::str::from_utf8(bytes).map_err(|_| DecodeError::InvalidUtf8)
    }

    pub fn rest(&mut self) -> &'a [u8] {
        let bytes = &self.buf[self.pos..];
        self.pos = self.buf.len();
        bytes
    }

    pub fn finish(&self) -> Result<(), DecodeError> {
        match self.remaining() {
            0 => Ok(()),
            extra => Err(DecodeError::TrailingBytes(extra)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_are_little_endian() {
        let mut writer = WireWriter::new();
        writer.write_u16(0x0102);
        writer.write_u32(0x0304_0506);
        let bytes = writer.finish();
        assert_eq!(bytes, vec![0x02, 0x01, 0x06, 0x05, 0x04, 0x03]);
    }

    #[test]
    fn primitives_read_back() {
        let mut writer = WireWriter::new();
        writer.write_u8(7);
        writer.write_u64(u64::MAX - 1);
        writer.write_f32(-0.0);
        writer.write_bool(true);
        writer.write_vec3(Vec3::new(1.5, -2.0, 0.25));
        let bytes = writer.finish();

        let mut reader = WireReader::new(&bytes);
        assert_eq!(reader.read_u8().unwrap(), 7);
        assert_eq!(reader.read_u64().unwrap(), u64::MAX - 1);
        assert_eq!(reader.read_f32().unwrap().to_bits(), (-0.0f32).to_bits());
        assert!(reader.read_bool().unwrap());
        assert_eq!(reader.read_vec3().unwrap(), Vec3::new(1.5, -2.0, 0.25));
        assert!(reader.finish().is_ok());
    }

    #[test]
    fn short_read_reports_unexpected_end() {
        let bytes = [1u8, 2, 3];
        let mut reader = WireReader::new(&bytes);
        assert_eq!(
            reader.read_u32(),
            Err(DecodeError::UnexpectedEnd {
                needed: 4,
                remaining: 3
            })
        );
    }

    #[test]
    fn string_length_larger_than_buffer_fails() {
        // Declares 10 bytes but carries 2.
        let bytes = [10u8, 0, b'h', b'i'];
        let mut reader = WireReader::new(&bytes);
        assert!(matches!(
            reader.read_str(),
            Err(DecodeError::UnexpectedEnd { needed: 10, .. })
        ));
    }

    #[test]
    fn string_round_trip() {
        let mut writer = WireWriter::new();
        writer.write_str("").unwrap();
        writer.write_str("trueshot").unwrap();
        let bytes = writer.finish();

        let mut reader = WireReader::new(&bytes);
        assert_eq!(reader.read_str().unwrap(), "");
        assert_eq!(reader.read_str().unwrap(), "trueshot");
        assert!(reader.finish().is_ok());
    }

    #[test]
    fn oversized_prefixed_field_is_rejected() {
        let big = vec![0u8; u16::MAX as usize + 1];
        let mut writer = WireWriter::new();
        assert!(matches!(
            writer.write_prefixed_bytes(&big),
            Err(EncodeError::TooLong { .. })
        ));
        assert!(writer.is_empty());
    }

    #[test]
    fn invalid_bool_is_rejected() {
        let mut reader = WireReader::new(&[2]);
        assert_eq!(reader.read_bool(), Err(DecodeError::InvalidBool(2)));
    }

    #[test]
    fn trailing_bytes_are_reported() {
        let bytes = [0u8, 0, 0, 0, 9];
        let mut reader = WireReader::new(&bytes);
        reader.read_u32().unwrap();
        assert_eq!(reader.finish(), Err(DecodeError::TrailingBytes(1)));
    }
}
