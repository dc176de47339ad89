use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use super::header::{ChunkHeader, MAGIC};
use super::reader::Chunk;
use crate::error::FormatError;

/// The bytes of one fully read chunk.
#[derive(Debug)]
pub struct RawChunk {
    pub index: usize,
    /// Byte offset of the chunk in the input.
    pub offset: u64,
    pub header: ChunkHeader,
    buffer: Vec<u8>,
}

impl RawChunk {
    /// The chunk's bytes, header included.
    pub fn data(&self) -> &[u8] {
        &self.buffer[..self.header.size as usize]
    }

    /// Release the buffer so the next chunk can reuse it.
    pub fn into_buffer(self) -> Vec<u8> {
        self.buffer
    }
}

/// Summary of one chunk, produced without decoding its contents.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ChunkInfo {
    pub index: usize,
    pub offset: u64,
    pub header: ChunkHeader,
}

fn check_length(remaining: Option<u64>, index: usize, header: &ChunkHeader) -> Result<()> {
    if let Some(remaining) = remaining {
        if header.size as u64 > remaining {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "chunk {index} claims {} bytes but only {remaining} remain",
                    header.size
                ),
            )
            .into());
        }
    }
    Ok(())
}

/// Reads consecutive chunks from a byte stream.
pub struct ChunkSupplier<R> {
    input: R,
    remaining: Option<u64>,
    offset: u64,
    index: usize,
}

impl ChunkSupplier<BufReader<File>> {
    /// Open a recording file. The file length bounds every chunk.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open recording: {}", path.display()))?;
        let len = file.metadata()?.len();
        Ok(Self::with_length(BufReader::new(file), len))
    }
}

impl<R: Read> ChunkSupplier<R> {
    pub fn new(input: R) -> Self {
        Self {
            input,
            remaining: None,
            offset: 0,
            index: 0,
        }
    }

    /// A supplier over input with a known total length.
    pub fn with_length(input: R, len: u64) -> Self {
        Self {
            input,
            remaining: Some(len),
            offset: 0,
            index: 0,
        }
    }

    /// Read the magic of the next chunk. `None` at a clean end of input.
    fn next_magic(&mut self) -> Result<Option<()>> {
        if self.remaining == Some(0) {
            return Ok(None);
        }
        let mut magic = [0u8; 4];
        let mut read = 0;
        while read < magic.len() {
            match self.input.read(&mut magic[read..]) {
                Ok(0) => break,
                Ok(n) => read += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        if read == 0 {
            return Ok(None);
        }
        if read < magic.len() || magic != MAGIC {
            return Err(FormatError::invalid(format!(
                "no chunk magic at offset {}",
                self.offset
            ))
            .into());
        }
        Ok(Some(()))
    }

    fn advance(&mut self, size: i64) {
        self.offset += size as u64;
        self.index += 1;
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining -= size as u64;
        }
    }

    /// Read the next whole chunk into `buffer`.
    pub fn next_chunk(&mut self, mut buffer: Vec<u8>) -> Result<Option<RawChunk>> {
        if self.next_magic()?.is_none() {
            return Ok(None);
        }
        buffer.clear();
        buffer.extend_from_slice(&MAGIC);
        let index = self.index;
        let mut chunk = Chunk::open(&mut self.input, buffer, MAGIC.len())?;
        let header = ChunkHeader::read(&mut chunk)?;
        check_length(self.remaining, self.index, &header)?;
        chunk
            .fill(header.size)
            .with_context(|| format!("Failed to read chunk {index}"))?;
        let raw = RawChunk {
            index: self.index,
            offset: self.offset,
            header,
            buffer: chunk.into_buffer(),
        };
        self.advance(header.size);
        Ok(Some(raw))
    }

    /// Read the next chunk's header and skip its body.
    pub fn next_info(&mut self) -> Result<Option<ChunkInfo>> {
        if self.next_magic()?.is_none() {
            return Ok(None);
        }
        let mut chunk = Chunk::open(&mut self.input, MAGIC.to_vec(), MAGIC.len())?;
        let header = ChunkHeader::read(&mut chunk)?;
        check_length(self.remaining, self.index, &header)?;
        chunk.skip(header.size)?;
        let info = ChunkInfo {
            index: self.index,
            offset: self.offset,
            header,
        };
        self.advance(header.size);
        Ok(Some(info))
    }
}

/// List the chunks of a recording without decoding them.
pub fn read_chunk_info<R: Read>(input: R) -> Result<Vec<ChunkInfo>> {
    let mut supplier = ChunkSupplier::new(input);
    let mut infos = Vec::new();
    while let Some(info) = supplier.next_info()? {
        infos.push(info);
    }
    Ok(infos)
}

/// Split a recording into the raw bytes of each chunk.
pub fn split_chunks<R: Read>(input: R) -> impl Iterator<Item = Result<Vec<u8>>> {
    let mut supplier = ChunkSupplier::new(input);
    let mut done = false;
    std::iter::from_fn(move || {
        if done {
            return None;
        }
        match supplier.next_chunk(Vec::new()) {
            Ok(Some(chunk)) => Some(Ok(chunk.data().to_vec())),
            Ok(None) => {
                done = true;
                None
            }
            Err(e) => {
                done = true;
                Some(Err(e))
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::header::{FEATURE_COMPRESSED_INTS, HEADER_SIZE};
    use crate::leb128::Leb128Writer;
    use std::io::Cursor;

    fn fake_chunk(body: &[u8], start_nanos: i64) -> Vec<u8> {
        let size = (HEADER_SIZE + body.len()) as i64;
        let header = ChunkHeader {
            major: 2,
            minor: 0,
            size,
            constant_pool_offset: HEADER_SIZE as i64,
            metadata_offset: HEADER_SIZE as i64,
            start_nanos,
            duration_nanos: 0,
            start_ticks: 0,
            ticks_per_second: 1_000_000_000,
            features: FEATURE_COMPRESSED_INTS,
        };
        let mut w = Leb128Writer::new();
        header.write_to(&mut w);
        w.write_bytes(body);
        w.into_inner()
    }

    #[test]
    fn test_chunk_info_and_split() {
        let mut bytes = fake_chunk(&[1, 2, 3], 10);
        bytes.extend(fake_chunk(&[4; 40], 20));
        let infos = read_chunk_info(Cursor::new(&bytes)).unwrap();
        assert_eq!(infos.len(), 2);
        assert_eq!(infos[1].offset, (HEADER_SIZE + 3) as u64);
        assert_eq!(infos[1].header.start_nanos, 20);

        let chunks: Vec<Vec<u8>> = split_chunks(Cursor::new(&bytes))
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].len(), HEADER_SIZE + 40);
        assert_eq!(&chunks[0][HEADER_SIZE..], &[1, 2, 3]);
    }

    #[test]
    fn test_buffer_is_reused() {
        let mut bytes = fake_chunk(&[9; 300], 1);
        bytes.extend(fake_chunk(&[8; 10], 2));
        let mut supplier = ChunkSupplier::with_length(Cursor::new(&bytes), bytes.len() as u64);
        let first = supplier.next_chunk(Vec::new()).unwrap().unwrap();
        let buffer = first.into_buffer();
        let capacity = buffer.capacity();
        let second = supplier.next_chunk(buffer).unwrap().unwrap();
        assert_eq!(second.data().len(), HEADER_SIZE + 10);
        assert_eq!(second.data()[HEADER_SIZE], 8);
        assert!(second.into_buffer().capacity() >= capacity);
        assert!(supplier.next_chunk(Vec::new()).unwrap().is_none());
    }

    #[test]
    fn test_garbage_and_truncation() {
        let err = read_chunk_info(Cursor::new(b"nope".to_vec())).unwrap_err();
        assert!(err.downcast_ref::<FormatError>().is_some());

        let bytes = fake_chunk(&[0; 20], 1);
        let truncated = &bytes[..bytes.len() - 5];
        let mut supplier =
            ChunkSupplier::with_length(Cursor::new(truncated), truncated.len() as u64);
        let err = supplier.next_chunk(Vec::new()).unwrap_err();
        assert!(err.downcast_ref::<io::Error>().is_some());
    }
}
