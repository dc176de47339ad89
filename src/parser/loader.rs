//! Loading whole recordings.
//!
//! Chunk bytes are read sequentially on the calling thread and decoded on a
//! `workerpool` pool. Buffers travel back from the workers so at most
//! `workers` chunk buffers are alive at once.

use std::collections::HashSet;
use std::io::{self, Read};
use std::path::Path;
use std::sync::mpsc::{channel, Receiver};
use std::sync::Arc;

use anyhow::{Context, Result};
use workerpool::thunk::{Thunk, ThunkWorker};
use workerpool::Pool;

use super::chunk_loader::load_chunk;
use super::context::LoaderContext;
use super::event_array::EventArrays;
use super::sink::ParserExtension;
use super::stats::StatsSnapshot;
use crate::chunk::ChunkSupplier;
use crate::config::LoaderConfig;
use crate::error::FormatError;

/// The outcome of loading a recording.
#[derive(Debug, Clone)]
pub struct LoadedRecording {
    pub events: EventArrays,
    pub stats: StatsSnapshot,
}

pub fn load_file(path: &Path, config: &LoaderConfig) -> Result<LoadedRecording> {
    load_file_with_extensions(path, &[], config)
}

pub fn load_file_with_extensions(
    path: &Path,
    extensions: &[Arc<dyn ParserExtension>],
    config: &LoaderConfig,
) -> Result<LoadedRecording> {
    let mut supplier = ChunkSupplier::open(path)?;
    load_chunks(&mut supplier, extensions, config)
        .with_context(|| format!("Failed to load recording {}", path.display()))
}

pub fn load_stream<R: Read>(
    input: R,
    extensions: &[Arc<dyn ParserExtension>],
    config: &LoaderConfig,
) -> Result<LoadedRecording> {
    let mut supplier = ChunkSupplier::new(input);
    load_chunks(&mut supplier, extensions, config)
}

/// Load every chunk from `supplier` into a fresh session.
pub fn load_chunks<R: Read>(
    supplier: &mut ChunkSupplier<R>,
    extensions: &[Arc<dyn ParserExtension>],
    config: &LoaderConfig,
) -> Result<LoadedRecording> {
    let context = Arc::new(LoaderContext::new(extensions, config.hide_experimentals));
    let loaded = read_chunks(supplier, &context, config)?;
    if loaded == 0 {
        return Err(FormatError::invalid("No readable chunks in recording").into());
    }
    let events = context.build_event_arrays();
    let stats = context.stats_snapshot();
    tracing::info!(
        "Loaded {} chunks, {} event types, {} events, {} skipped",
        stats.chunk_count,
        events.len(),
        events.item_count(),
        stats.skipped_event_count
    );
    Ok(LoadedRecording { events, stats })
}

fn is_truncation(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| cause.downcast_ref::<io::Error>().is_some())
}

type ChunkResult = Result<Vec<u8>>;

fn collect(result: ChunkResult, spare: &mut Vec<Vec<u8>>, first_error: &mut Option<anyhow::Error>) {
    match result {
        Ok(buffer) => spare.push(buffer),
        Err(e) => {
            first_error.get_or_insert(e);
        }
    }
}

fn wait_one(
    rx: &Receiver<ChunkResult>,
    outstanding: &mut usize,
    spare: &mut Vec<Vec<u8>>,
    first_error: &mut Option<anyhow::Error>,
) {
    match rx.recv() {
        Ok(result) => collect(result, spare, first_error),
        Err(_) => {
            first_error.get_or_insert_with(|| anyhow::anyhow!("chunk worker exited without a result"));
        }
    }
    *outstanding -= 1;
}

/// Returns the number of chunks that were decoded.
fn read_chunks<R: Read>(
    supplier: &mut ChunkSupplier<R>,
    context: &Arc<LoaderContext>,
    config: &LoaderConfig,
) -> Result<usize> {
    let workers = config.worker_count();
    let pool = Pool::<ThunkWorker<ChunkResult>>::new(workers);
    let (tx, rx) = channel();
    let mut outstanding = 0usize;
    let mut spare: Vec<Vec<u8>> = Vec::new();
    let mut first_error: Option<anyhow::Error> = None;
    let mut starts = HashSet::new();
    let mut loaded = 0usize;

    while first_error.is_none() {
        while let Ok(result) = rx.try_recv() {
            outstanding -= 1;
            collect(result, &mut spare, &mut first_error);
        }
        if first_error.is_some() {
            break;
        }
        if outstanding >= workers {
            wait_one(&rx, &mut outstanding, &mut spare, &mut first_error);
            continue;
        }

        let chunk = match supplier.next_chunk(spare.pop().unwrap_or_default()) {
            Ok(Some(chunk)) => chunk,
            Ok(None) => break,
            Err(e) if config.ignore_truncated_chunk && is_truncation(&e) => {
                tracing::warn!("Ignoring truncated chunk: {:#}", e);
                break;
            }
            Err(e) => {
                first_error = Some(e);
                break;
            }
        };
        if !starts.insert(chunk.header.start_nanos) {
            tracing::warn!(
                "Skipping chunk {} with duplicate start time {}",
                chunk.index,
                chunk.header.start_nanos
            );
            spare.push(chunk.into_buffer());
            continue;
        }
        loaded += 1;

        if config.single_threaded {
            let index = chunk.index;
            match load_chunk(&chunk, context) {
                Ok(()) => spare.push(chunk.into_buffer()),
                Err(e) => first_error = Some(e.context(format!("Failed to load chunk {index}"))),
            }
            continue;
        }

        let context = context.clone();
        outstanding += 1;
        pool.execute_to(
            tx.clone(),
            Thunk::of(move || {
                let index = chunk.index;
                load_chunk(&chunk, &context)
                    .with_context(|| format!("Failed to load chunk {index}"))?;
                Ok(chunk.into_buffer())
            }),
        );
    }

    drop(tx);
    while outstanding > 0 {
        wait_one(&rx, &mut outstanding, &mut spare, &mut first_error);
    }
    pool.join();

    match first_error {
        Some(e) => Err(e),
        None => Ok(loaded),
    }
}
