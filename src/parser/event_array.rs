use std::sync::Arc;

use serde::Serialize;

use super::item::Item;
use super::lanes::Interval;
use super::schema::EventType;
use crate::collection::merge_by_key;

/// All items of one schema instance, grouped in lanes.
///
/// For duration events each lane is temporally disjoint. Instant events are
/// stored as a single lane sorted by start time when the schema has one.
#[derive(Debug, Clone)]
pub struct EventArray {
    event_type: Arc<EventType>,
    lanes: Arc<[Vec<Item>]>,
}

impl EventArray {
    pub fn new(event_type: Arc<EventType>, lanes: Arc<[Vec<Item>]>) -> Self {
        Self { event_type, lanes }
    }

    pub fn event_type(&self) -> &Arc<EventType> {
        &self.event_type
    }

    pub fn lanes(&self) -> &[Vec<Item>] {
        &self.lanes
    }

    /// Shared storage, for identity checks between builds.
    pub fn lanes_arc(&self) -> &Arc<[Vec<Item>]> {
        &self.lanes
    }

    pub fn len(&self) -> usize {
        self.lanes.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Items lane by lane.
    pub fn iter(&self) -> impl Iterator<Item = &Item> + '_ {
        self.lanes.iter().flatten()
    }

    /// Items across all lanes in start time order.
    pub fn iter_by_start(&self) -> impl Iterator<Item = &Item> + '_ {
        merge_by_key(self.lanes.iter().map(Vec::as_slice), |item: &Item| item.start())
    }

    /// Earliest start and latest end over all items that have times.
    pub fn time_range(&self) -> Option<(i64, i64)> {
        self.iter()
            .filter_map(|item| Some((item.start_time()?, item.end_time()?)))
            .reduce(|(s0, e0), (s1, e1)| (s0.min(s1), e0.max(e1)))
    }
}

/// Summary row used by the command line tool.
#[derive(Debug, Clone, Serialize)]
pub struct EventArraySummary {
    pub identifier: String,
    pub internal_id: String,
    pub label: String,
    pub category: Vec<String>,
    pub count: usize,
    pub lanes: usize,
    pub fields: Vec<String>,
}

/// The result of a parse: one array per schema instance, empty ones included.
#[derive(Debug, Clone, Default)]
pub struct EventArrays {
    arrays: Vec<EventArray>,
}

impl EventArrays {
    pub fn new(arrays: Vec<EventArray>) -> Self {
        Self { arrays }
    }

    pub fn iter(&self) -> impl Iterator<Item = &EventArray> + '_ {
        self.arrays.iter()
    }

    pub fn len(&self) -> usize {
        self.arrays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arrays.is_empty()
    }

    /// Every schema variant registered under `identifier`.
    pub fn by_identifier<'a>(&'a self, identifier: &'a str) -> impl Iterator<Item = &'a EventArray> {
        self.arrays
            .iter()
            .filter(move |a| a.event_type.identifier == identifier)
    }

    /// The first schema variant of `identifier`.
    pub fn get(&self, identifier: &str) -> Option<&EventArray> {
        self.arrays
            .iter()
            .find(|a| a.event_type.identifier == identifier)
    }

    pub fn item_count(&self) -> usize {
        self.arrays.iter().map(EventArray::len).sum()
    }

    pub fn time_range(&self) -> Option<(i64, i64)> {
        self.arrays
            .iter()
            .filter_map(EventArray::time_range)
            .reduce(|(s0, e0), (s1, e1)| (s0.min(s1), e0.max(e1)))
    }

    pub fn summaries(&self) -> Vec<EventArraySummary> {
        self.arrays
            .iter()
            .map(|a| EventArraySummary {
                identifier: a.event_type.identifier.clone(),
                internal_id: a.event_type.internal_id.clone(),
                label: a.event_type.label.clone(),
                category: a.event_type.category.clone(),
                count: a.len(),
                lanes: a.lanes.len(),
                fields: a
                    .event_type
                    .attributes()
                    .iter()
                    .map(|attr| attr.field.identifier.clone())
                    .collect(),
            })
            .collect()
    }
}

impl<'a> IntoIterator for &'a EventArrays {
    type Item = &'a EventArray;
    type IntoIter = std::slice::Iter<'a, EventArray>;

    fn into_iter(self) -> Self::IntoIter {
        self.arrays.iter()
    }
}
