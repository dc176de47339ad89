use std::collections::HashMap;

use anyhow::Result;

use super::context::LoaderContext;
use super::metadata::{read_metadata_record, CHECKPOINT_RECORD_ID, METADATA_RECORD_ID};
use super::sink::{EventSink, NopEventSink, SkipFieldsEventSink};
use super::types::{ChunkTypes, Decoder};
use crate::chunk::{RawChunk, HEADER_SIZE};
use crate::error::FormatError;
use crate::leb128::DataInput;

/// Where the rows of one event class go.
struct EventTarget {
    name: String,
    sink: Box<dyn EventSink>,
    decode: bool,
}

fn event_targets(types: &ChunkTypes, context: &LoaderContext) -> Result<HashMap<i64, EventTarget>> {
    let hide = context.hide_experimentals();
    let mut targets = HashMap::new();
    for id in types.event_class_ids() {
        let name = types.class_name(id).unwrap_or_default().to_string();
        if hide && types.is_experimental(id) {
            targets.insert(
                id,
                EventTarget {
                    name,
                    sink: Box::new(NopEventSink),
                    decode: false,
                },
            );
            continue;
        }
        let descriptor = types.descriptor(id, hide)?;
        let mut sink = context.sink_factory().create(descriptor);
        let skip = types.experimental_fields(id);
        if hide && skip.iter().any(|s| *s) {
            sink = Box::new(SkipFieldsEventSink::new(sink, skip));
        }
        targets.insert(
            id,
            EventTarget {
                name,
                sink,
                decode: true,
            },
        );
    }
    Ok(targets)
}

/// Decode every event of `chunk` into the context's sinks.
///
/// Rows that fail to decode are counted and skipped. Broken record framing,
/// metadata or checkpoints abort the chunk with `InvalidFormat`.
pub fn load_chunk(chunk: &RawChunk, context: &LoaderContext) -> Result<()> {
    let header = &chunk.header;
    let data = chunk.data();
    let compressed = header.compressed_ints();
    let stats = context.stats();
    stats.set_version(header.major, header.minor);

    let root = read_metadata_record(data, header.metadata_offset as usize, compressed)?;
    let types = ChunkTypes::new(&root)?;
    let mut decoder = Decoder::new(data, header, &types, context.constant_pools());
    let constants = decoder.index_checkpoints()?;
    let mut targets = event_targets(&types, context)?;

    let mut values = Vec::new();
    let mut pos = HEADER_SIZE;
    let mut events = 0u64;
    while pos < data.len() {
        let mut input = DataInput::at(data, pos, compressed);
        let size = input
            .read_long()
            .map_err(|e| FormatError::invalid(format!("bad record size at {pos}: {e}")))?;
        if size <= 0 || size as u64 > (data.len() - pos) as u64 {
            return Err(FormatError::invalid(format!("bad record size {size} at {pos}")).into());
        }
        let end = pos + size as usize;
        let mut input = DataInput::at(&data[..end], input.position(), compressed);
        let type_id = match input.read_long() {
            Ok(id) => id,
            Err(e) => {
                stats.add_skipped_event(format!("record at {pos}: {e}"));
                pos = end;
                continue;
            }
        };
        if type_id == METADATA_RECORD_ID || type_id == CHECKPOINT_RECORD_ID {
            pos = end;
            continue;
        }
        match targets.get_mut(&type_id) {
            None => {
                tracing::debug!("Skipping record of unknown type {} at {}", type_id, pos);
                stats.add_skipped_event(format!("unknown event type {type_id} at {pos}"));
            }
            Some(target) => {
                stats.update_event_stats(&target.name, size as u64);
                if target.decode {
                    match decoder.read_event(type_id, &mut input, &mut values) {
                        Ok(()) => {
                            target.sink.add_event(&values);
                            events += 1;
                        }
                        Err(e) => {
                            tracing::debug!("Skipping {} event at {}: {:#}", target.name, pos, e);
                            stats.add_skipped_event(format!("{} at {pos}: {e:#}", target.name));
                        }
                    }
                }
            }
        }
        pos = end;
    }
    // dropping the sinks hands their lanes to the repository
    drop(targets);
    stats.increment_chunk_count();
    tracing::debug!(
        "Loaded chunk {}: {} events, {} constants",
        chunk.index,
        events,
        constants
    );
    Ok(())
}
