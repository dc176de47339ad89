//! Event type schemas as seen by the parser.
//!
//! A sink is created from an [`EventTypeDescriptor`], the raw description of
//! an event type read from chunk metadata. The repository turns it into an
//! [`EventType`], which adds the synthesized attributes:
//!
//! - `eventType`, always the first attribute
//! - `duration` right after `startTime` when only start and end are stored
//! - `endTime` right after `duration` when only start and duration are stored
//!
//! Synthesized attributes are computed once when the `EventType` is built and
//! are never stored in items.

use serde::Serialize;

use super::value::ContentType;

pub const EVENT_TYPE: &str = "eventType";
pub const START_TIME: &str = "startTime";
pub const END_TIME: &str = "endTime";
pub const DURATION: &str = "duration";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValueField {
    pub identifier: String,
    pub name: String,
    pub description: Option<String>,
    pub content_type: ContentType,
}

impl ValueField {
    pub fn new(identifier: impl Into<String>, content_type: ContentType) -> Self {
        let identifier = identifier.into();
        Self {
            name: identifier.clone(),
            identifier,
            description: None,
            content_type,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Same field count, identifiers and content types, in the same order.
/// Display names and descriptions may differ.
pub fn fields_compatible(a: &[ValueField], b: &[ValueField]) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .zip(b)
            .all(|(a, b)| a.identifier == b.identifier && a.content_type == b.content_type)
}

/// Raw description of an event type handed to a sink factory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventTypeDescriptor {
    pub identifier: String,
    pub label: String,
    pub category: Vec<String>,
    pub description: Option<String>,
    pub fields: Vec<ValueField>,
}

impl EventTypeDescriptor {
    pub fn new(identifier: impl Into<String>, fields: Vec<ValueField>) -> Self {
        let identifier = identifier.into();
        Self {
            label: identifier.clone(),
            identifier,
            category: Vec::new(),
            description: None,
            fields,
        }
    }

    pub fn is_compatible_with(&self, fields: &[ValueField]) -> bool {
        fields_compatible(&self.fields, fields)
    }
}

/// Where an attribute value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AttributeSource {
    EventType,
    Field(usize),
    /// `end - start`
    Duration { start: usize, end: usize },
    /// `start + duration`
    EndTime { start: usize, duration: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attribute {
    pub field: ValueField,
    pub source: AttributeSource,
}

/// How an event type places its items in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TimeLayout {
    /// Start and end are both known; items go to disjoint lanes.
    Duration { start: usize, end: EndSource },
    /// Point in time events, sorted by `start` when present. `start` is the
    /// start time field, or the end time field when that is the only one.
    Instant { start: Option<usize> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EndSource {
    Field(usize),
    Duration(usize),
}

/// One schema instance of an event type.
#[derive(Debug, Clone, Serialize)]
pub struct EventType {
    /// Public identifier, shared by all schema variants.
    pub identifier: String,
    /// Unique per variant; equal to `identifier` for the first one.
    pub internal_id: String,
    pub label: String,
    pub category: Vec<String>,
    pub description: Option<String>,
    fields: Vec<ValueField>,
    attributes: Vec<Attribute>,
    layout: TimeLayout,
}

fn find(fields: &[ValueField], identifier: &str, content_type: ContentType) -> Option<usize> {
    fields
        .iter()
        .position(|f| f.identifier == identifier && f.content_type == content_type)
}

impl EventType {
    pub fn new(descriptor: EventTypeDescriptor, internal_id: impl Into<String>) -> Self {
        let fields = descriptor.fields;
        let start = find(&fields, START_TIME, ContentType::Timestamp);
        let end = find(&fields, END_TIME, ContentType::Timestamp);
        let duration = find(&fields, DURATION, ContentType::Timespan);

        let layout = match (start, end, duration) {
            (Some(start), Some(end), _) => TimeLayout::Duration {
                start,
                end: EndSource::Field(end),
            },
            (Some(start), None, Some(duration)) => TimeLayout::Duration {
                start,
                end: EndSource::Duration(duration),
            },
            (start, end, _) => TimeLayout::Instant {
                start: start.or(end),
            },
        };

        let mut attributes = Vec::with_capacity(fields.len() + 2);
        attributes.push(Attribute {
            field: ValueField::new(EVENT_TYPE, ContentType::EventType).with_name("Event Type"),
            source: AttributeSource::EventType,
        });
        for (i, field) in fields.iter().enumerate() {
            attributes.push(Attribute {
                field: field.clone(),
                source: AttributeSource::Field(i),
            });
            match (start, end, duration) {
                (Some(s), Some(e), None) if s == i => attributes.push(Attribute {
                    field: ValueField::new(DURATION, ContentType::Timespan).with_name("Duration"),
                    source: AttributeSource::Duration { start: s, end: e },
                }),
                (Some(s), None, Some(d)) if d == i => attributes.push(Attribute {
                    field: ValueField::new(END_TIME, ContentType::Timestamp).with_name("End Time"),
                    source: AttributeSource::EndTime {
                        start: s,
                        duration: d,
                    },
                }),
                _ => {}
            }
        }

        Self {
            identifier: descriptor.identifier,
            internal_id: internal_id.into(),
            label: descriptor.label,
            category: descriptor.category,
            description: descriptor.description,
            fields,
            attributes,
            layout,
        }
    }

    /// Stored fields, in item order.
    pub fn fields(&self) -> &[ValueField] {
        &self.fields
    }

    /// Stored and synthesized attributes, in presentation order.
    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn attribute_index(&self, identifier: &str) -> Option<usize> {
        self.attributes
            .iter()
            .position(|a| a.field.identifier == identifier)
    }

    pub fn field_index(&self, identifier: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.identifier == identifier)
    }

    pub fn layout(&self) -> TimeLayout {
        self.layout
    }

    pub fn is_duration(&self) -> bool {
        matches!(self.layout, TimeLayout::Duration { .. })
    }

    pub fn is_compatible_with(&self, fields: &[ValueField]) -> bool {
        fields_compatible(&self.fields, fields)
    }
}
