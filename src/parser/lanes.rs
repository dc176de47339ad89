//! Lane construction for the item storage.
//!
//! Duration events are spread over lanes so that no two items in a lane
//! overlap, using greedy first fit. Instant events are collected per source
//! and sorted once at the end.

/// Anything with a `[start, end)` time range.
pub trait Interval {
    fn start(&self) -> i64;
    fn end(&self) -> i64;
}

/// Builds temporally disjoint lanes.
///
/// Every lane is ordered by start time and for consecutive items `a`, `b`
/// in a lane `a.end() <= b.start()` holds.
#[derive(Debug)]
pub struct DisjointBuilder<T> {
    lanes: Vec<Vec<T>>,
}

impl<T> Default for DisjointBuilder<T> {
    fn default() -> Self {
        Self { lanes: Vec::new() }
    }
}

impl<T: Interval> DisjointBuilder<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put `item` in the first lane whose last item ends no later than `item`
    /// starts, or in a new lane if there is none.
    pub fn add(&mut self, item: T) {
        let start = item.start();
        for lane in self.lanes.iter_mut() {
            if lane.last().map_or(true, |last| last.end() <= start) {
                lane.push(item);
                return;
            }
        }
        self.lanes.push(vec![item]);
    }

    pub fn lane_count(&self) -> usize {
        self.lanes.len()
    }

    pub fn len(&self) -> usize {
        self.lanes.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.lanes.is_empty()
    }

    pub fn into_lanes(self) -> Vec<Vec<T>> {
        self.lanes
    }
}

/// Coalesce disjoint lanes built by different sources.
///
/// Lanes are taken in order of their first start time and appended whole to
/// the first output lane they fit after, so each output lane stays disjoint
/// and sorted.
pub fn merge_disjoint_lanes<T: Interval>(mut lanes: Vec<Vec<T>>) -> Vec<Vec<T>> {
    lanes.retain(|lane| !lane.is_empty());
    lanes.sort_by_key(|lane| (lane[0].start(), lane[0].end()));
    let mut merged: Vec<Vec<T>> = Vec::new();
    for lane in lanes {
        let first_start = lane[0].start();
        match merged
            .iter_mut()
            .find(|out| out.last().map_or(true, |last| last.end() <= first_start))
        {
            Some(out) => out.extend(lane),
            None => merged.push(lane),
        }
    }
    merged
}

/// Concatenate instant lanes, stable sorted by start when `sort` is set.
pub fn merge_instant_lanes<T: Interval>(lanes: Vec<Vec<T>>, sort: bool) -> Vec<T> {
    let mut all: Vec<T> = lanes.into_iter().flatten().collect();
    if sort {
        all.sort_by_key(|item| item.start());
    }
    all
}
