//! Integer and string codec shared by the chunk reader and the writer.
//!
//! Integers in a compressed chunk are LEB128 encoded: 7 bits per byte with
//! the high bit as continuation flag, at most 9 bytes, the 9th byte carrying
//! a full 8 bits. Uncompressed chunks store integers big-endian at their
//! declared width. Floating point values are always raw big-endian.

use anyhow::{bail, Result};

/// Encoding byte for a null string.
pub const STRING_NULL: u8 = 0;
/// Encoding byte for the empty string.
pub const STRING_EMPTY: u8 = 1;
/// Encoding byte for a reference into the string constant pool.
pub const STRING_CONSTANT_POOL: u8 = 2;
/// Encoding byte for an inline UTF-8 string.
pub const STRING_UTF8: u8 = 3;
/// Encoding byte for an inline UTF-16 char array.
pub const STRING_CHAR_ARRAY: u8 = 4;

/// Number of bytes `value` takes as a compressed integer.
pub fn varint_len(value: i64) -> usize {
    let mut v = value as u64;
    for len in 1..=8 {
        if v & !0x7f == 0 {
            return len;
        }
        v >>= 7;
    }
    9
}

/// Growable output buffer for compressed records.
#[derive(Debug, Default, Clone)]
pub struct Leb128Writer {
    buf: Vec<u8>,
}

impl Leb128Writer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn write_bool(&mut self, value: bool) {
        self.buf.push(value as u8);
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_long(&mut self, value: i64) {
        let mut v = value as u64;
        for _ in 0..8 {
            if v & !0x7f == 0 {
                self.buf.push(v as u8);
                return;
            }
            self.buf.push((v & 0x7f) as u8 | 0x80);
            v >>= 7;
        }
        self.buf.push(v as u8);
    }

    pub fn write_int(&mut self, value: i32) {
        self.write_long(value as i64);
    }

    pub fn write_f32(&mut self, value: f32) {
        self.buf.extend_from_slice(&value.to_bits().to_be_bytes());
    }

    pub fn write_f64(&mut self, value: f64) {
        self.buf.extend_from_slice(&value.to_bits().to_be_bytes());
    }

    pub fn write_raw_u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_raw_i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_raw_i64(&mut self, value: i64) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    /// Overwrite eight bytes at `offset` with a big-endian value.
    pub fn patch_raw_i64(&mut self, offset: usize, value: i64) {
        self.buf[offset..offset + 8].copy_from_slice(&value.to_be_bytes());
    }

    /// Write a string inline. `None` is the null string.
    pub fn write_string(&mut self, value: Option<&str>) {
        match value {
            None => self.write_u8(STRING_NULL),
            Some("") => self.write_u8(STRING_EMPTY),
            Some(s) => {
                self.write_u8(STRING_UTF8);
                self.write_int(s.len() as i32);
                self.write_bytes(s.as_bytes());
            }
        }
    }

    /// Append a complete record: a size prefix counting itself, then `payload`.
    pub fn write_record(&mut self, payload: &[u8]) {
        let mut size = payload.len() as i64 + 1;
        while varint_len(size) as i64 + payload.len() as i64 != size {
            size += 1;
        }
        self.write_long(size);
        self.write_bytes(payload);
    }
}

/// A decoded string slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawString {
    Null,
    Inline(String),
    ConstantPool(i64),
}

/// Cursor over a chunk's bytes.
#[derive(Debug, Clone)]
pub struct DataInput<'a> {
    data: &'a [u8],
    pos: usize,
    compressed: bool,
}

impl<'a> DataInput<'a> {
    pub fn new(data: &'a [u8], compressed: bool) -> Self {
        Self {
            data,
            pos: 0,
            compressed,
        }
    }

    pub fn at(data: &'a [u8], pos: usize, compressed: bool) -> Self {
        Self {
            data,
            pos,
            compressed,
        }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn set_position(&mut self, pos: usize) {
        self.pos = pos;
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = match self.pos.checked_add(n) {
            Some(end) if end <= self.data.len() => end,
            _ => bail!(
                "read of {} bytes at {} runs past end of data ({})",
                n,
                self.pos,
                self.data.len()
            ),
        };
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_raw_u16(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(self.take_array()?))
    }

    pub fn read_raw_i32(&mut self) -> Result<i32> {
        Ok(i32::from_be_bytes(self.take_array()?))
    }

    pub fn read_raw_i64(&mut self) -> Result<i64> {
        Ok(i64::from_be_bytes(self.take_array()?))
    }

    fn read_varlong(&mut self) -> Result<i64> {
        let mut result: u64 = 0;
        for i in 0..8 {
            let byte = self.read_u8()?;
            result |= ((byte & 0x7f) as u64) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(result as i64);
            }
        }
        let byte = self.read_u8()?;
        result |= (byte as u64) << 56;
        Ok(result as i64)
    }

    pub fn read_long(&mut self) -> Result<i64> {
        if self.compressed {
            self.read_varlong()
        } else {
            self.read_raw_i64()
        }
    }

    pub fn read_int(&mut self) -> Result<i32> {
        if self.compressed {
            Ok(self.read_varlong()? as i32)
        } else {
            self.read_raw_i32()
        }
    }

    pub fn read_short(&mut self) -> Result<i16> {
        if self.compressed {
            Ok(self.read_varlong()? as i16)
        } else {
            Ok(self.read_raw_u16()? as i16)
        }
    }

    pub fn read_char(&mut self) -> Result<u16> {
        Ok(self.read_short()? as u16)
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(f32::from_bits(u32::from_be_bytes(self.take_array()?)))
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        Ok(f64::from_bits(u64::from_be_bytes(self.take_array()?)))
    }

    /// Read a count or length, rejecting negative values and values that
    /// could not possibly fit in the remaining data.
    pub fn read_len(&mut self) -> Result<usize> {
        let len = self.read_int()?;
        if len < 0 || len as usize > self.data.len() - self.pos.min(self.data.len()) {
            bail!("bad length {} at {}", len, self.pos);
        }
        Ok(len as usize)
    }

    pub fn read_string(&mut self) -> Result<RawString> {
        match self.read_u8()? {
            STRING_NULL => Ok(RawString::Null),
            STRING_EMPTY => Ok(RawString::Inline(String::new())),
            STRING_CONSTANT_POOL => Ok(RawString::ConstantPool(self.read_long()?)),
            STRING_UTF8 => {
                let len = self.read_len()?;
                let bytes = self.take(len)?;
                Ok(RawString::Inline(String::from_utf8_lossy(bytes).into_owned()))
            }
            STRING_CHAR_ARRAY => {
                let len = self.read_len()?;
                let mut units = Vec::with_capacity(len);
                for _ in 0..len {
                    units.push(self.read_char()?);
                }
                Ok(RawString::Inline(String::from_utf16_lossy(&units)))
            }
            other => bail!("unknown string encoding {} at {}", other, self.pos - 1),
        }
    }
}
