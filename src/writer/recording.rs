//! Recordings written chunk by chunk.
//!
//! Events are encoded into the current chunk as they are written. When the
//! chunk is rotated or the recording closed, the chunk gets one checkpoint
//! holding every constant pool entry seen so far and one metadata record
//! describing every type, so each chunk can be read on its own. Pool
//! indices and class ids stay the same across chunks.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};

use super::constant_pool::WriterConstantPools;
use super::encoder::write_event;
use super::metadata::metadata_root;
use super::structure::TypeStructureBuilder;
use super::types::{JdkType, TypeHandle, TypeRegistry};
use super::value::{TypedValue, TypedValueBuilder};
use crate::chunk::header::{
    ChunkHeader, CONSTANT_POOL_OFFSET, DURATION_OFFSET, FEATURE_COMPRESSED_INTS, METADATA_OFFSET,
    SIZE_OFFSET, WRITER_MAJOR, WRITER_MINOR,
};
use crate::config::RecordingSettings;
use crate::error::TypeRegistrationError;
use crate::leb128::Leb128Writer;
use crate::parser::metadata::{write_metadata_record, CHECKPOINT_RECORD_ID};

const TICKS_PER_SECOND: i64 = 1_000_000_000;

fn epoch_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0)
}

/// Entry points for new recordings.
pub struct Recordings;

impl Recordings {
    pub fn new_recording(path: impl AsRef<Path>) -> Result<Recording<BufWriter<File>>> {
        Self::new_recording_with(path, RecordingSettings::default())
    }

    pub fn new_recording_with(
        path: impl AsRef<Path>,
        settings: RecordingSettings,
    ) -> Result<Recording<BufWriter<File>>> {
        let path = path.as_ref();
        let file = File::create(path)
            .with_context(|| format!("Failed to create recording {}", path.display()))?;
        Ok(Recording::new(BufWriter::new(file), settings))
    }

    pub fn to_writer<W: Write>(output: W, settings: RecordingSettings) -> Recording<W> {
        Recording::new(output, settings)
    }
}

/// An open recording. Not meant to be shared between threads; wrap it in a
/// mutex if several threads write events.
pub struct Recording<W: Write> {
    output: Option<W>,
    settings: RecordingSettings,
    registry: TypeRegistry,
    pools: WriterConstantPools,
    events: Leb128Writer,
    event_count: usize,
    opened: Instant,
    start_nanos: i64,
    start_ticks: i64,
    chunk_start_nanos: i64,
    chunk_opened: Instant,
    chunks_written: usize,
}

impl<W: Write> Recording<W> {
    fn new(output: W, settings: RecordingSettings) -> Self {
        let start_nanos = settings.start_nanos.unwrap_or_else(epoch_nanos);
        let start_ticks = settings.start_ticks.unwrap_or(start_nanos);
        let now = Instant::now();
        Self {
            output: Some(output),
            registry: TypeRegistry::new(settings.initialize_jdk_types),
            settings,
            pools: WriterConstantPools::new(),
            events: Leb128Writer::new(),
            event_count: 0,
            opened: now,
            start_nanos,
            start_ticks,
            chunk_start_nanos: start_nanos,
            chunk_opened: now,
            chunks_written: 0,
        }
    }

    pub fn settings(&self) -> &RecordingSettings {
        &self.settings
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.registry
    }

    pub fn types_mut(&mut self) -> &mut TypeRegistry {
        &mut self.registry
    }

    pub fn register_event_type<F>(&mut self, name: &str, builder: F) -> Result<TypeHandle>
    where
        F: FnOnce(&mut TypeStructureBuilder<'_>) + Send + 'static,
    {
        Ok(self.registry.register_event_type(name, builder)?)
    }

    pub fn register_annotation_type<F>(&mut self, name: &str, builder: F) -> Result<TypeHandle>
    where
        F: FnOnce(&mut TypeStructureBuilder<'_>) + Send + 'static,
    {
        Ok(self.registry.register_annotation_type(name, builder)?)
    }

    pub fn register_type<F>(&mut self, name: &str, builder: F) -> Result<TypeHandle>
    where
        F: FnOnce(&mut TypeStructureBuilder<'_>) + Send + 'static,
    {
        Ok(self.registry.register_type(name, builder)?)
    }

    pub fn get_type(&self, name: &str) -> Option<TypeHandle> {
        self.registry.get_type(name)
    }

    pub fn predefined(&self, jdk_type: JdkType) -> Result<TypeHandle> {
        Ok(self.registry.predefined(jdk_type)?)
    }

    pub fn new_value<F>(&mut self, handle: TypeHandle, build: F) -> Result<TypedValue>
    where
        F: FnOnce(&mut TypedValueBuilder<'_>),
    {
        Ok(self.registry.new_value(handle, build)?)
    }

    /// Current time in recording ticks.
    pub fn now_ticks(&self) -> i64 {
        self.start_ticks + self.opened.elapsed().as_nanos() as i64
    }

    pub fn chunks_written(&self) -> usize {
        self.chunks_written
    }

    /// Events in the chunk that is still open.
    pub fn pending_events(&self) -> usize {
        self.event_count
    }

    /// Append `event` to the current chunk. The event's type must have the
    /// event marker somewhere in its supertype chain.
    pub fn write_event(&mut self, event: &TypedValue) -> Result<&mut Self> {
        let event_type = event.value_type();
        if !self.registry.is_event_type(event_type) {
            return Err(TypeRegistrationError::NotAnEvent {
                type_name: self.registry.name(event_type).to_string(),
            }
            .into());
        }
        if event.is_null() {
            return Err(TypeRegistrationError::illegal("cannot write a null event").into());
        }
        let mut payload = Leb128Writer::new();
        write_event(&self.registry, &mut self.pools, event, &mut payload)
            .with_context(|| format!("Failed to encode {} event", self.registry.name(event_type)))?;
        self.events.write_record(payload.as_slice());
        self.event_count += 1;
        Ok(self)
    }

    /// Finish the current chunk and start a new one.
    pub fn rotate_chunk(&mut self) -> Result<()> {
        self.finish_chunk()?;
        let elapsed = self.start_nanos + self.opened.elapsed().as_nanos() as i64;
        // chunk starts must be strictly increasing for readers to keep them apart
        self.chunk_start_nanos = elapsed.max(self.chunk_start_nanos + 1);
        self.chunk_opened = Instant::now();
        self.events = Leb128Writer::new();
        self.event_count = 0;
        Ok(())
    }

    /// Finish the last chunk and hand back the output.
    pub fn close(mut self) -> Result<W> {
        self.finish_chunk()?;
        let mut output = self.output.take().context("recording already closed")?;
        output.flush().context("Failed to flush recording")?;
        Ok(output)
    }

    fn finish_chunk(&mut self) -> Result<()> {
        if self.output.is_none() {
            return Ok(());
        }
        let types = self.registry.resolve_all();
        let start_ticks = self.start_ticks + (self.chunk_start_nanos - self.start_nanos);
        let header = ChunkHeader {
            major: WRITER_MAJOR,
            minor: WRITER_MINOR,
            size: 0,
            constant_pool_offset: 0,
            metadata_offset: 0,
            start_nanos: self.chunk_start_nanos,
            duration_nanos: 0,
            start_ticks,
            ticks_per_second: TICKS_PER_SECOND,
            features: FEATURE_COMPRESSED_INTS,
        };
        let mut chunk = Leb128Writer::new();
        header.write_to(&mut chunk);
        chunk.write_bytes(self.events.as_slice());

        let constant_pool_offset = chunk.len();
        let mut checkpoint = Leb128Writer::new();
        checkpoint.write_long(CHECKPOINT_RECORD_ID);
        checkpoint.write_long(start_ticks);
        checkpoint.write_long(0);
        // delta to the previous checkpoint, 0 ends the chain
        checkpoint.write_long(0);
        // flush
        checkpoint.write_long(1);
        self.pools
            .write_pools(&self.registry, &mut checkpoint)
            .context("Failed to encode constant pools")?;
        chunk.write_record(checkpoint.as_slice());

        let metadata_offset = chunk.len();
        let root = metadata_root(&self.registry, &types);
        write_metadata_record(&root, start_ticks, 0, &mut chunk);

        let duration = self
            .settings
            .duration_nanos
            .unwrap_or_else(|| self.chunk_opened.elapsed().as_nanos() as i64);
        chunk.patch_raw_i64(SIZE_OFFSET, chunk.len() as i64);
        chunk.patch_raw_i64(CONSTANT_POOL_OFFSET, constant_pool_offset as i64);
        chunk.patch_raw_i64(METADATA_OFFSET, metadata_offset as i64);
        chunk.patch_raw_i64(DURATION_OFFSET, duration);

        let output = self.output.as_mut().context("recording already closed")?;
        output
            .write_all(chunk.as_slice())
            .context("Failed to write chunk")?;
        self.chunks_written += 1;
        tracing::debug!(
            "Wrote chunk {}: {} events, {} types, {} bytes",
            self.chunks_written,
            self.event_count,
            types.len(),
            chunk.len()
        );
        Ok(())
    }
}

impl<W: Write> Drop for Recording<W> {
    fn drop(&mut self) {
        if self.output.is_none() {
            return;
        }
        if let Err(e) = self.finish_chunk() {
            tracing::error!("Failed to finish recording: {:#}", e);
            return;
        }
        if let Some(output) = self.output.as_mut() {
            if let Err(e) = output.flush() {
                tracing::error!("Failed to flush recording: {}", e);
            }
        }
    }
}
