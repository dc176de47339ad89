use std::io::{self, Read};

use anyhow::{Context, Result};

use crate::error::FormatError;

/// Growth factor applied when `fill` needs a larger buffer.
const GROWTH_NUMERATOR: usize = 6;
const GROWTH_DENOMINATOR: usize = 5;

/// Incremental reader for one chunk.
///
/// The buffer holds the chunk's bytes from its first byte up to the highest
/// position filled so far. Filling further may reallocate the buffer but never
/// loses bytes that were already read. Not meant to be shared across threads;
/// each chunk is read by one thread and then handed off as plain bytes.
pub struct Chunk<'a> {
    input: &'a mut dyn Read,
    buffer: Vec<u8>,
    position: usize,
    major: u16,
    minor: u16,
}

fn checked_position(upto: i64) -> Result<usize> {
    if !(0..=i32::MAX as i64).contains(&upto) {
        return Err(FormatError::invalid(format!(
            "chunk offset {upto} is outside the supported range"
        ))
        .into());
    }
    Ok(upto as usize)
}

impl<'a> Chunk<'a> {
    /// Start a chunk whose first `offset` bytes have already been consumed
    /// from `input` and sit at the start of `buffer`, then decode the
    /// two-field version that follows them.
    pub fn open(input: &'a mut dyn Read, buffer: Vec<u8>, offset: usize) -> Result<Self> {
        if buffer.len() < offset {
            return Err(FormatError::invalid(format!(
                "chunk prefix of {offset} bytes missing from buffer of {}",
                buffer.len()
            ))
            .into());
        }
        let mut chunk = Self {
            input,
            buffer,
            position: offset,
            major: 0,
            minor: 0,
        };
        let version = chunk.fill(offset as i64 + 4)?;
        let major = u16::from_be_bytes([version[offset], version[offset + 1]]);
        let minor = u16::from_be_bytes([version[offset + 2], version[offset + 3]]);
        chunk.major = major;
        chunk.minor = minor;
        Ok(chunk)
    }

    pub fn major_version(&self) -> u16 {
        self.major
    }

    pub fn minor_version(&self) -> u16 {
        self.minor
    }

    /// Number of chunk bytes consumed from the input so far.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Make sure bytes `[0, upto)` of the chunk are in the buffer and return
    /// them. Positions already filled are a no-op. Asking for bytes that were
    /// skipped and never buffered is `InvalidFormat`.
    pub fn fill(&mut self, upto: i64) -> Result<&[u8]> {
        let upto = checked_position(upto)?;
        if upto > self.position {
            if self.buffer.len() < upto {
                let grown = (upto / GROWTH_DENOMINATOR)
                    .saturating_mul(GROWTH_NUMERATOR)
                    .max(upto);
                self.buffer.resize(grown, 0);
            }
            self.input
                .read_exact(&mut self.buffer[self.position..upto])
                .with_context(|| {
                    format!("reading chunk bytes {}..{}", self.position, upto)
                })?;
            self.position = upto;
        } else if self.buffer.len() < upto {
            return Err(FormatError::invalid(format!(
                "chunk bytes below {upto} were skipped, not read"
            ))
            .into());
        }
        Ok(&self.buffer[..upto])
    }

    /// Advance to `upto` without keeping the bytes in between.
    pub fn skip(&mut self, upto: i64) -> Result<()> {
        let upto = checked_position(upto)?;
        if upto <= self.position {
            return Ok(());
        }
        let wanted = (upto - self.position) as u64;
        let skipped = io::copy(&mut (&mut *self.input).take(wanted), &mut io::sink())?;
        if skipped != wanted {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("chunk ends after {} of {wanted} skipped bytes", skipped),
            )
            .into());
        }
        self.position = upto;
        Ok(())
    }

    /// Give the buffer back. Only bytes below `position()` are meaningful,
    /// and only if they were filled rather than skipped.
    pub fn into_buffer(self) -> Vec<u8> {
        self.buffer
    }
}
