//! Common test utilities for flightrec integration tests.

#![allow(dead_code)]

use flightrec::chunk::header::{
    ChunkHeader, CONSTANT_POOL_OFFSET, FEATURE_COMPRESSED_INTS, METADATA_OFFSET, SIZE_OFFSET,
};
use flightrec::config::RecordingSettings;
use flightrec::constants::{
    ANNOTATION_SUPER_TYPE, EVENT_SUPER_TYPE, EXPERIMENTAL, LABEL, TIMESPAN, TIMESTAMP,
};
use flightrec::leb128::Leb128Writer;
use flightrec::parser::metadata::{write_metadata_record, Element, CHECKPOINT_RECORD_ID};

pub const START_NANOS: i64 = 1_700_000_000_000_000_000;
pub const START_TICKS: i64 = 1_000;

/// Writer settings with a fixed clock so timestamps are predictable.
pub fn fixed_settings() -> RecordingSettings {
    RecordingSettings {
        start_ticks: Some(START_TICKS),
        start_nanos: Some(START_NANOS),
        duration_nanos: Some(1_000_000),
        initialize_jdk_types: false,
    }
}

/// Wall clock nanoseconds of a tick value written with `fixed_settings`.
pub fn epoch_of(ticks: i64) -> i64 {
    START_NANOS + ticks - START_TICKS
}

// Class ids used by hand-built chunks.
pub const LONG_ID: i64 = 100;
pub const INT_ID: i64 = 101;
pub const STRING_ID: i64 = 102;
pub const TIMESTAMP_ID: i64 = 103;
pub const EXPERIMENTAL_ID: i64 = 104;
pub const LABEL_ID: i64 = 105;
pub const TIMESPAN_ID: i64 = 106;

pub fn field(name: &str, class_id: i64) -> Element {
    Element::new("field")
        .attribute("name", name)
        .attribute("class", class_id.to_string())
}

/// A long field holding a timestamp in ticks.
pub fn timestamp_field(name: &str) -> Element {
    field(name, LONG_ID).child(
        Element::new("annotation")
            .attribute("class", TIMESTAMP_ID.to_string())
            .attribute("value", "TICKS"),
    )
}

/// A long field annotated with `@Timestamp(unit)`.
pub fn timestamp_field_in(name: &str, unit: &str) -> Element {
    field(name, LONG_ID).child(
        Element::new("annotation")
            .attribute("class", TIMESTAMP_ID.to_string())
            .attribute("value", unit),
    )
}

/// A long field annotated with `@Timespan(unit)`.
pub fn timespan_field(name: &str, unit: &str) -> Element {
    field(name, LONG_ID).child(
        Element::new("annotation")
            .attribute("class", TIMESPAN_ID.to_string())
            .attribute("value", unit),
    )
}

/// A field holding an index into the constant pool of `class_id`.
pub fn pooled_field(name: &str, class_id: i64) -> Element {
    field(name, class_id).attribute("constantPool", "true")
}

pub fn experimental(element: Element) -> Element {
    element.child(Element::new("annotation").attribute("class", EXPERIMENTAL_ID.to_string()))
}

pub fn labeled(element: Element, label: &str) -> Element {
    element.child(
        Element::new("annotation")
            .attribute("class", LABEL_ID.to_string())
            .attribute("value", label),
    )
}

pub fn event_class(name: &str, id: i64, fields: Vec<Element>) -> Element {
    fields.into_iter().fold(
        Element::new("class")
            .attribute("name", name)
            .attribute("id", id.to_string())
            .attribute("superType", EVENT_SUPER_TYPE),
        Element::child,
    )
}

/// Payload of a string constant.
pub fn string_payload(value: &str) -> Vec<u8> {
    let mut w = Leb128Writer::new();
    w.write_string(Some(value));
    w.into_inner()
}

/// Event record body: the class id, then each value as a compressed long.
pub fn event_payload(class_id: i64, values: &[i64]) -> Vec<u8> {
    let mut w = Leb128Writer::new();
    w.write_long(class_id);
    for v in values {
        w.write_long(*v);
    }
    w.into_inner()
}

fn builtin_classes() -> Vec<Element> {
    let class = |name: &str, id: i64| {
        Element::new("class")
            .attribute("name", name)
            .attribute("id", id.to_string())
    };
    let annotation = |name: &str, id: i64| class(name, id).attribute("superType", ANNOTATION_SUPER_TYPE);
    vec![
        class("long", LONG_ID),
        class("int", INT_ID),
        class("java.lang.String", STRING_ID),
        annotation(TIMESTAMP, TIMESTAMP_ID).child(field("value", STRING_ID)),
        annotation(TIMESPAN, TIMESPAN_ID).child(field("value", STRING_ID)),
        annotation(EXPERIMENTAL, EXPERIMENTAL_ID),
        annotation(LABEL, LABEL_ID).child(field("value", STRING_ID)),
    ]
}

/// Builds chunks by hand, for data the writer never produces.
pub struct RawChunkBuilder {
    major: u16,
    start_nanos: i64,
    classes: Vec<Element>,
    events: Leb128Writer,
    pools: Vec<(i64, Vec<(i64, Vec<u8>)>)>,
    checkpoint_delta: i64,
}

impl RawChunkBuilder {
    pub fn new(start_nanos: i64) -> Self {
        Self {
            major: 2,
            start_nanos,
            classes: builtin_classes(),
            events: Leb128Writer::new(),
            pools: Vec::new(),
            checkpoint_delta: 0,
        }
    }

    pub fn version(mut self, major: u16) -> Self {
        self.major = major;
        self
    }

    pub fn class(mut self, element: Element) -> Self {
        self.classes.push(element);
        self
    }

    pub fn event(mut self, payload: &[u8]) -> Self {
        self.events.write_record(payload);
        self
    }

    /// Add constant `index` of class `class_id`, encoded as `payload`.
    pub fn constant(mut self, class_id: i64, index: i64, payload: &[u8]) -> Self {
        let entry = (index, payload.to_vec());
        match self.pools.iter_mut().find(|(id, _)| *id == class_id) {
            Some((_, entries)) => entries.push(entry),
            None => self.pools.push((class_id, vec![entry])),
        }
        self
    }

    /// Delta from the checkpoint to the next one; 0 ends the chain.
    pub fn checkpoint_delta(mut self, delta: i64) -> Self {
        self.checkpoint_delta = delta;
        self
    }

    pub fn build(self) -> Vec<u8> {
        let header = ChunkHeader {
            major: self.major,
            minor: 0,
            size: 0,
            constant_pool_offset: 0,
            metadata_offset: 0,
            start_nanos: self.start_nanos,
            duration_nanos: 1_000,
            start_ticks: 0,
            ticks_per_second: 1_000_000_000,
            features: FEATURE_COMPRESSED_INTS,
        };
        let mut chunk = Leb128Writer::new();
        header.write_to(&mut chunk);
        chunk.write_bytes(self.events.as_slice());

        let checkpoint_offset = chunk.len();
        let mut checkpoint = Leb128Writer::new();
        for v in [CHECKPOINT_RECORD_ID, 0, 0, self.checkpoint_delta, 1] {
            checkpoint.write_long(v);
        }
        checkpoint.write_long(self.pools.len() as i64);
        for (class_id, entries) in &self.pools {
            checkpoint.write_long(*class_id);
            checkpoint.write_long(entries.len() as i64);
            for (index, payload) in entries {
                checkpoint.write_long(*index);
                checkpoint.write_bytes(payload);
            }
        }
        chunk.write_record(checkpoint.as_slice());

        let metadata_offset = chunk.len();
        let root = Element::new("root").child(
            self.classes
                .into_iter()
                .fold(Element::new("metadata"), Element::child),
        );
        write_metadata_record(&root, 0, 0, &mut chunk);

        chunk.patch_raw_i64(SIZE_OFFSET, chunk.len() as i64);
        chunk.patch_raw_i64(CONSTANT_POOL_OFFSET, checkpoint_offset as i64);
        chunk.patch_raw_i64(METADATA_OFFSET, metadata_offset as i64);
        chunk.into_inner()
    }
}
