//! Map from 64-bit indices to values.
//!
//! Constant pool indices are mostly small and densely packed, so indices in
//! `0..page_size * max_pages` live in lazily allocated pages and resolve with
//! two array lookups. Anything else, negative keys included, goes to a
//! `HashMap` overflow.

use std::collections::HashMap;

const DEFAULT_PAGE_SIZE: usize = 256;
const DEFAULT_MAX_PAGES: usize = 1024;

#[derive(Debug, Clone)]
pub struct SparseIndexMap<V> {
    page_size: usize,
    pages: Vec<Option<Box<[Option<V>]>>>,
    overflow: HashMap<i64, V>,
    len: usize,
}

impl<V> SparseIndexMap<V> {
    pub fn new() -> Self {
        Self::with_geometry(DEFAULT_PAGE_SIZE, DEFAULT_MAX_PAGES)
    }

    /// Create a map whose paged range is `0..page_size * max_pages`.
    pub fn with_geometry(page_size: usize, max_pages: usize) -> Self {
        let page_size = page_size.max(1);
        Self {
            page_size,
            pages: (0..max_pages).map(|_| None).collect(),
            overflow: HashMap::new(),
            len: 0,
        }
    }

    /// Upper bound (exclusive) of the paged index range.
    pub fn paged_limit(&self) -> i64 {
        (self.page_size * self.pages.len()) as i64
    }

    fn slot(&self, index: i64) -> Option<(usize, usize)> {
        if index < 0 || index >= self.paged_limit() {
            return None;
        }
        let index = index as usize;
        Some((index / self.page_size, index % self.page_size))
    }

    pub fn get(&self, index: i64) -> Option<&V> {
        match self.slot(index) {
            Some((page, offset)) => self.pages[page]
                .as_ref()
                .and_then(|p| p[offset].as_ref()),
            None => self.overflow.get(&index),
        }
    }

    pub fn contains(&self, index: i64) -> bool {
        self.get(index).is_some()
    }

    fn page_mut(&mut self, page: usize) -> &mut [Option<V>] {
        let page_size = self.page_size;
        self.pages[page].get_or_insert_with(|| (0..page_size).map(|_| None).collect())
    }

    /// Store `value` at `index`, returning the previous value.
    pub fn put(&mut self, index: i64, value: V) -> Option<V> {
        let previous = match self.slot(index) {
            Some((page, offset)) => self.page_mut(page)[offset].replace(value),
            None => self.overflow.insert(index, value),
        };
        if previous.is_none() {
            self.len += 1;
        }
        previous
    }

    /// Return the value at `index`, inserting `f()` first if the slot is empty.
    pub fn get_or_insert_with<F: FnOnce() -> V>(&mut self, index: i64, f: F) -> &V {
        match self.slot(index) {
            Some((page, offset)) => {
                if self.get(index).is_none() {
                    self.len += 1;
                }
                self.page_mut(page)[offset].get_or_insert_with(f)
            }
            None => {
                let len = &mut self.len;
                self.overflow.entry(index).or_insert_with(|| {
                    *len += 1;
                    f()
                })
            }
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Paged entries in ascending index order, then overflow entries.
    pub fn iter(&self) -> impl Iterator<Item = (i64, &V)> + '_ {
        let page_size = self.page_size;
        let paged = self
            .pages
            .iter()
            .enumerate()
            .filter_map(|(i, p)| p.as_ref().map(|p| (i, p)))
            .flat_map(move |(page, slots)| {
                slots.iter().enumerate().filter_map(move |(offset, v)| {
                    v.as_ref().map(|v| ((page * page_size + offset) as i64, v))
                })
            });
        paged.chain(self.overflow.iter().map(|(k, v)| (*k, v)))
    }

    pub fn values(&self) -> impl Iterator<Item = &V> + '_ {
        self.iter().map(|(_, v)| v)
    }
}

impl<V> Default for SparseIndexMap<V> {
    fn default() -> Self {
        Self::new()
    }
}
