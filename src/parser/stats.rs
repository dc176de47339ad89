//! Counters updated while chunks are decoded.
//!
//! All counters are safe to bump from several chunk workers at once: plain
//! atomics for the totals and a `DashMap` of atomic pairs for the per-type
//! statistics.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

use dashmap::DashMap;
use serde::Serialize;

use crate::collection::BoundedList;

/// Number of row decode errors kept for diagnostics.
const RECENT_ERRORS: usize = 16;

#[derive(Debug, Default)]
struct EventTypeStats {
    count: AtomicU64,
    total_size: AtomicU64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct EventTypeStatsSnapshot {
    pub event_type: String,
    pub count: u64,
    pub total_size: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub version: Option<(u16, u16)>,
    pub chunk_count: usize,
    pub skipped_event_count: u64,
    pub event_types: Vec<EventTypeStatsSnapshot>,
    pub constant_pools: Vec<(String, usize)>,
    pub recent_errors: Vec<String>,
}

#[derive(Debug)]
pub struct ParserStats {
    version: Mutex<Option<(u16, u16)>>,
    chunk_count: AtomicUsize,
    skipped_event_count: AtomicU64,
    by_type: DashMap<String, EventTypeStats>,
    recent_errors: Mutex<BoundedList<String>>,
}

impl Default for ParserStats {
    fn default() -> Self {
        Self {
            version: Mutex::new(None),
            chunk_count: AtomicUsize::new(0),
            skipped_event_count: AtomicU64::new(0),
            by_type: DashMap::new(),
            recent_errors: Mutex::new(BoundedList::new(RECENT_ERRORS)),
        }
    }
}

impl ParserStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember the version of the first chunk seen.
    pub fn set_version(&self, major: u16, minor: u16) {
        let mut version = self.version.lock().unwrap_or_else(|e| e.into_inner());
        version.get_or_insert((major, minor));
    }

    pub fn version(&self) -> Option<(u16, u16)> {
        *self.version.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn increment_chunk_count(&self) {
        self.chunk_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn chunk_count(&self) -> usize {
        self.chunk_count.load(Ordering::Relaxed)
    }

    /// Count a dropped row and keep its error message.
    pub fn add_skipped_event(&self, message: String) {
        self.skipped_event_count.fetch_add(1, Ordering::Relaxed);
        self.recent_errors
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(message);
    }

    pub fn skipped_event_count(&self) -> u64 {
        self.skipped_event_count.load(Ordering::Relaxed)
    }

    pub fn recent_errors(&self) -> Vec<String> {
        self.recent_errors
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    pub fn update_event_stats(&self, event_type: &str, size: u64) {
        if let Some(stats) = self.by_type.get(event_type) {
            stats.count.fetch_add(1, Ordering::Relaxed);
            stats.total_size.fetch_add(size, Ordering::Relaxed);
            return;
        }
        let stats = self.by_type.entry(event_type.to_string()).or_default();
        stats.count.fetch_add(1, Ordering::Relaxed);
        stats.total_size.fetch_add(size, Ordering::Relaxed);
    }

    /// `(count, total size in bytes)` for one type.
    pub fn event_stats(&self, event_type: &str) -> Option<(u64, u64)> {
        self.by_type.get(event_type).map(|s| {
            (
                s.count.load(Ordering::Relaxed),
                s.total_size.load(Ordering::Relaxed),
            )
        })
    }

    pub fn snapshot(&self, constant_pools: Vec<(String, usize)>) -> StatsSnapshot {
        let mut event_types: Vec<EventTypeStatsSnapshot> = self
            .by_type
            .iter()
            .map(|r| EventTypeStatsSnapshot {
                event_type: r.key().clone(),
                count: r.value().count.load(Ordering::Relaxed),
                total_size: r.value().total_size.load(Ordering::Relaxed),
            })
            .collect();
        event_types.sort_by(|a, b| a.event_type.cmp(&b.event_type));
        StatsSnapshot {
            version: self.version(),
            chunk_count: self.chunk_count(),
            skipped_event_count: self.skipped_event_count(),
            event_types,
            constant_pools,
            recent_errors: self.recent_errors(),
        }
    }
}
