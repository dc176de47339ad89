use anyhow::Result;
use serde::Serialize;

use super::reader::Chunk;
use crate::error::FormatError;
use crate::leb128::Leb128Writer;

/// Magic bytes at the start of every chunk.
pub const MAGIC: [u8; 4] = *b"FLR\0";
/// Size of the fixed chunk header in bytes.
pub const HEADER_SIZE: usize = 68;
/// Offset of the chunk size field, patched by the writer when a chunk closes.
pub const SIZE_OFFSET: usize = 8;
pub const CONSTANT_POOL_OFFSET: usize = 16;
pub const METADATA_OFFSET: usize = 24;
pub const DURATION_OFFSET: usize = 40;
/// Feature bit for LEB128 compressed integers.
pub const FEATURE_COMPRESSED_INTS: i32 = 1;

pub const WRITER_MAJOR: u16 = 2;
pub const WRITER_MINOR: u16 = 0;

/// Decoded chunk header. All offsets are relative to the chunk start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChunkHeader {
    pub major: u16,
    pub minor: u16,
    pub size: i64,
    pub constant_pool_offset: i64,
    pub metadata_offset: i64,
    pub start_nanos: i64,
    pub duration_nanos: i64,
    pub start_ticks: i64,
    pub ticks_per_second: i64,
    pub features: i32,
}

fn be_i64(bytes: &[u8], at: usize) -> i64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[at..at + 8]);
    i64::from_be_bytes(raw)
}

impl ChunkHeader {
    /// Fill the header of `chunk` and decode it.
    pub fn read(chunk: &mut Chunk<'_>) -> Result<Self> {
        let bytes = chunk.fill(HEADER_SIZE as i64)?;
        Self::parse(bytes)
    }

    /// Decode and validate a header from the first `HEADER_SIZE` bytes.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(FormatError::invalid(format!(
                "chunk header needs {HEADER_SIZE} bytes, got {}",
                bytes.len()
            ))
            .into());
        }
        if bytes[..4] != MAGIC {
            return Err(FormatError::invalid("bad chunk magic").into());
        }
        let mut features = [0u8; 4];
        features.copy_from_slice(&bytes[64..68]);
        let header = ChunkHeader {
            major: u16::from_be_bytes([bytes[4], bytes[5]]),
            minor: u16::from_be_bytes([bytes[6], bytes[7]]),
            size: be_i64(bytes, SIZE_OFFSET),
            constant_pool_offset: be_i64(bytes, CONSTANT_POOL_OFFSET),
            metadata_offset: be_i64(bytes, METADATA_OFFSET),
            start_nanos: be_i64(bytes, 32),
            duration_nanos: be_i64(bytes, DURATION_OFFSET),
            start_ticks: be_i64(bytes, 48),
            ticks_per_second: be_i64(bytes, 56),
            features: i32::from_be_bytes(features),
        };
        header.validate()?;
        Ok(header)
    }

    fn validate(&self) -> Result<()> {
        if !matches!(self.major, 1 | 2) {
            return Err(FormatError::VersionNotSupported {
                major: self.major,
                minor: self.minor,
            }
            .into());
        }
        if self.size < HEADER_SIZE as i64 || self.size > i32::MAX as i64 {
            return Err(FormatError::invalid(format!("bad chunk size {}", self.size)).into());
        }
        for (name, offset) in [
            ("constant pool", self.constant_pool_offset),
            ("metadata", self.metadata_offset),
        ] {
            if offset < HEADER_SIZE as i64 || offset >= self.size {
                return Err(FormatError::invalid(format!(
                    "{name} offset {offset} outside chunk of {} bytes",
                    self.size
                ))
                .into());
            }
        }
        if self.ticks_per_second <= 0 {
            return Err(FormatError::invalid(format!(
                "bad tick frequency {}",
                self.ticks_per_second
            ))
            .into());
        }
        Ok(())
    }

    pub fn compressed_ints(&self) -> bool {
        self.features & FEATURE_COMPRESSED_INTS != 0
    }

    /// Convert a tick timestamp to nanoseconds since the epoch, or `None`
    /// when the result does not fit an i64.
    pub fn ticks_to_epoch_nanos(&self, ticks: i64) -> Option<i64> {
        let elapsed = self.ticks_to_nanos(ticks.checked_sub(self.start_ticks)?)?;
        self.start_nanos.checked_add(elapsed)
    }

    /// Convert a tick count to nanoseconds, or `None` on overflow.
    pub fn ticks_to_nanos(&self, ticks: i64) -> Option<i64> {
        let nanos = ticks as i128 * 1_000_000_000 / self.ticks_per_second as i128;
        i64::try_from(nanos).ok()
    }

    /// Write the header raw. The writer emits zero offsets and patches them
    /// once the chunk closes.
    pub fn write_to(&self, w: &mut Leb128Writer) {
        w.write_bytes(&MAGIC);
        w.write_raw_u16(self.major);
        w.write_raw_u16(self.minor);
        w.write_raw_i64(self.size);
        w.write_raw_i64(self.constant_pool_offset);
        w.write_raw_i64(self.metadata_offset);
        w.write_raw_i64(self.start_nanos);
        w.write_raw_i64(self.duration_nanos);
        w.write_raw_i64(self.start_ticks);
        w.write_raw_i64(self.ticks_per_second);
        w.write_raw_i32(self.features);
    }
}
