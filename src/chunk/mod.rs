//! Chunk level access to a recording stream.
//!
//! A recording is a sequence of self-contained chunks. Each starts with the
//! `FLR\0` magic, a two-field version and a fixed header pointing at the
//! chunk's metadata and constant pool records.

pub mod header;
pub mod reader;
pub mod supplier;

pub use header::{ChunkHeader, HEADER_SIZE, MAGIC};
pub use reader::Chunk;
pub use supplier::{read_chunk_info, split_chunks, ChunkInfo, ChunkSupplier, RawChunk};
