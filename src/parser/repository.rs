//! In-memory storage for decoded events.
//!
//! [`RepositoryBuilder`] is the terminal [`EventSinkFactory`]. It keeps a
//! list of schema variants per identifier: a create request reuses the first
//! variant with compatible fields, otherwise a new variant is appended and a
//! warning is logged. Layouts that differ are never merged.
//!
//! Each sink owns its lanes while rows are being added, so chunks decoded on
//! different threads do not contend. Lanes are handed to the variant when
//! the sink is dropped, and combined when the event arrays are built.

use std::collections::BTreeMap;
use std::mem;
use std::sync::{Arc, Mutex};

use super::event_array::{EventArray, EventArrays};
use super::item::Item;
use super::lanes::{merge_disjoint_lanes, merge_instant_lanes, DisjointBuilder};
use super::schema::{EventType, EventTypeDescriptor, TimeLayout};
use super::sink::{EventSink, EventSinkFactory};
use super::value::Value;

type Lanes = Arc<[Vec<Item>]>;

struct EventTypeEntry {
    event_type: Arc<EventType>,
    delivered: Mutex<Vec<Vec<Item>>>,
    finalized: Mutex<Option<Lanes>>,
}

impl EventTypeEntry {
    fn new(event_type: EventType) -> Self {
        Self {
            event_type: Arc::new(event_type),
            delivered: Mutex::new(Vec::new()),
            finalized: Mutex::new(None),
        }
    }

    fn deliver(&self, lanes: Vec<Vec<Item>>) {
        if lanes.is_empty() {
            return;
        }
        self.delivered
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend(lanes);
    }

    /// Combine everything delivered so far. Repeated calls with nothing new
    /// delivered return the same storage.
    fn finalize(&self) -> Lanes {
        let mut finalized = self.finalized.lock().unwrap_or_else(|e| e.into_inner());
        let delivered = mem::take(&mut *self.delivered.lock().unwrap_or_else(|e| e.into_inner()));
        if delivered.is_empty() {
            if let Some(lanes) = finalized.as_ref() {
                return lanes.clone();
            }
        }
        let mut lanes: Vec<Vec<Item>> = finalized
            .take()
            .map(|previous| previous.to_vec())
            .unwrap_or_default();
        lanes.extend(delivered);
        let lanes: Vec<Vec<Item>> = match self.event_type.layout() {
            TimeLayout::Duration { .. } => merge_disjoint_lanes(lanes),
            TimeLayout::Instant { start } => {
                let all = merge_instant_lanes(lanes, start.is_some());
                if all.is_empty() {
                    Vec::new()
                } else {
                    vec![all]
                }
            }
        };
        let lanes: Lanes = lanes.into();
        *finalized = Some(lanes.clone());
        lanes
    }
}

struct DurationSink {
    entry: Arc<EventTypeEntry>,
    builder: DisjointBuilder<Item>,
}

impl EventSink for DurationSink {
    fn add_event(&mut self, values: &[Value]) {
        let item = Item::new(self.entry.event_type.clone(), values.iter().cloned());
        self.builder.add(item);
    }
}

impl Drop for DurationSink {
    fn drop(&mut self) {
        let builder = mem::take(&mut self.builder);
        self.entry.deliver(builder.into_lanes());
    }
}

struct InstantSink {
    entry: Arc<EventTypeEntry>,
    items: Vec<Item>,
}

impl EventSink for InstantSink {
    fn add_event(&mut self, values: &[Value]) {
        let item = Item::new(self.entry.event_type.clone(), values.iter().cloned());
        self.items.push(item);
    }
}

impl Drop for InstantSink {
    fn drop(&mut self) {
        let items = mem::take(&mut self.items);
        if !items.is_empty() {
            self.entry.deliver(vec![items]);
        }
    }
}

#[derive(Default)]
pub struct RepositoryBuilder {
    entries: Mutex<BTreeMap<String, Vec<Arc<EventTypeEntry>>>>,
}

impl RepositoryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry_for(&self, descriptor: EventTypeDescriptor) -> Arc<EventTypeEntry> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let variants = entries.entry(descriptor.identifier.clone()).or_default();
        if let Some(entry) = variants
            .iter()
            .find(|e| e.event_type.is_compatible_with(&descriptor.fields))
        {
            return entry.clone();
        }
        let internal_id = if variants.is_empty() {
            descriptor.identifier.clone()
        } else {
            let internal_id = format!("{}#{}", descriptor.identifier, variants.len());
            tracing::warn!(
                "Event type {} redefined with incompatible fields, storing as {}",
                descriptor.identifier,
                internal_id
            );
            internal_id
        };
        let entry = Arc::new(EventTypeEntry::new(EventType::new(descriptor, internal_id)));
        variants.push(entry.clone());
        entry
    }

    /// All schema variants of `identifier`, oldest first.
    pub fn variants(&self, identifier: &str) -> Vec<Arc<EventType>> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(identifier)
            .map(|v| v.iter().map(|e| e.event_type.clone()).collect())
            .unwrap_or_default()
    }

    /// One array per schema variant, ordered by identifier then variant.
    pub fn build_event_arrays(&self) -> EventArrays {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let arrays = entries
            .values()
            .flatten()
            .map(|entry| EventArray::new(entry.event_type.clone(), entry.finalize()))
            .collect();
        EventArrays::new(arrays)
    }
}

impl EventSinkFactory for RepositoryBuilder {
    fn create(&self, descriptor: EventTypeDescriptor) -> Box<dyn EventSink> {
        let entry = self.entry_for(descriptor);
        if entry.event_type.is_duration() {
            Box::new(DurationSink {
                entry,
                builder: DisjointBuilder::new(),
            })
        } else {
            Box::new(InstantSink {
                entry,
                items: Vec::new(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::schema::{ValueField, DURATION, END_TIME, START_TIME};
    use crate::parser::value::ContentType;

    fn interval_descriptor() -> EventTypeDescriptor {
        EventTypeDescriptor::new(
            "A",
            vec![
                ValueField::new(START_TIME, ContentType::Timestamp),
                ValueField::new(END_TIME, ContentType::Timestamp),
                ValueField::new("value", ContentType::Integer),
            ],
        )
    }

    fn row(start: i64, end: i64, value: i64) -> Vec<Value> {
        vec![
            Value::Timestamp(start),
            Value::Timestamp(end),
            Value::Long(value),
        ]
    }

    #[test]
    fn test_sinks_from_two_sources() {
        let repo = RepositoryBuilder::new();
        {
            let mut sink = repo.create(interval_descriptor());
            sink.add_event(&row(0, 10, 1));
            sink.add_event(&row(5, 15, 2));
        }
        {
            let mut sink = repo.create(interval_descriptor());
            sink.add_event(&row(20, 30, 3));
        }
        let arrays = repo.build_event_arrays();
        assert_eq!(arrays.len(), 1);
        let a = arrays.get("A").unwrap();
        assert_eq!(a.len(), 3);
        assert_eq!(a.lanes().len(), 2);
        assert_eq!(a.event_type().attribute_index(DURATION), Some(2));
        let order: Vec<i64> = a
            .iter_by_start()
            .map(|i| i.get_field(2).unwrap().as_long().unwrap())
            .collect();
        assert_eq!(order, vec![1, 2, 3]);
        assert_eq!(a.time_range(), Some((0, 30)));
    }

    #[test]
    fn test_incompatible_redefinition_chains() {
        let repo = RepositoryBuilder::new();
        drop(repo.create(interval_descriptor()));
        let other = EventTypeDescriptor::new("A", vec![ValueField::new("value", ContentType::String)]);
        let mut sink = repo.create(other.clone());
        sink.add_event(&[Value::String("x".into())]);
        drop(sink);
        // a third request with the second layout reuses the second variant
        drop(repo.create(other));

        let variants = repo.variants("A");
        assert_eq!(variants.len(), 2);
        assert_eq!(variants[0].internal_id, "A");
        assert_ne!(variants[1].internal_id, "A");
        assert_eq!(variants[1].identifier, "A");
        assert_eq!(variants[0].fields().len(), 3);
        assert_eq!(variants[1].fields().len(), 1);

        let arrays = repo.build_event_arrays();
        let counts: Vec<usize> = arrays.by_identifier("A").map(EventArray::len).collect();
        assert_eq!(counts, vec![0, 1]);
    }

    #[test]
    fn test_build_is_idempotent() {
        let repo = RepositoryBuilder::new();
        let mut sink = repo.create(interval_descriptor());
        sink.add_event(&row(0, 10, 1));
        drop(sink);
        drop(repo.create(EventTypeDescriptor::new("empty", vec![])));

        let first = repo.build_event_arrays();
        let second = repo.build_event_arrays();
        assert_eq!(first.len(), 2);
        for (a, b) in first.iter().zip(second.iter()) {
            assert!(Arc::ptr_eq(a.lanes_arc(), b.lanes_arc()));
            assert_eq!(
                a.event_type().attributes().len(),
                b.event_type().attributes().len()
            );
        }
        assert!(first.get("empty").unwrap().is_empty());
    }

    #[test]
    fn test_instant_rows_sorted() {
        let repo = RepositoryBuilder::new();
        let descriptor = EventTypeDescriptor::new(
            "tick",
            vec![ValueField::new(START_TIME, ContentType::Timestamp)],
        );
        let mut a = repo.create(descriptor.clone());
        let mut b = repo.create(descriptor);
        a.add_event(&[Value::Timestamp(30)]);
        b.add_event(&[Value::Timestamp(10)]);
        a.add_event(&[Value::Timestamp(20)]);
        drop(a);
        drop(b);
        let arrays = repo.build_event_arrays();
        let starts: Vec<i64> = arrays
            .get("tick")
            .unwrap()
            .iter()
            .map(|i| i.start_time().unwrap())
            .collect();
        assert_eq!(starts, vec![10, 20, 30]);
    }

    #[test]
    fn test_end_only_rows_sorted_by_end() {
        let repo = RepositoryBuilder::new();
        let mut sink = repo.create(EventTypeDescriptor::new(
            "done",
            vec![ValueField::new(END_TIME, ContentType::Timestamp)],
        ));
        for end in [30, 10, 20] {
            sink.add_event(&[Value::Timestamp(end)]);
        }
        drop(sink);
        let arrays = repo.build_event_arrays();
        let ends: Vec<i64> = arrays
            .get("done")
            .unwrap()
            .iter()
            .map(|i| i.end_time().unwrap())
            .collect();
        assert_eq!(ends, vec![10, 20, 30]);
    }
}
