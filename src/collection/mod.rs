//! Small containers shared by the reader and the writer.
//!
//! - [`SparseIndexMap`] - index to value map with paged storage for small keys
//! - [`BoundedList`] - ring list that keeps the newest N entries
//! - [`MergeByKey`] - k-way merge over lanes that are each sorted by a key

pub mod iter;
pub mod ring;
pub mod sparse_map;

pub use iter::{merge_by_key, MergeByKey};
pub use ring::BoundedList;
pub use sparse_map::SparseIndexMap;
