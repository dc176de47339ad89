//! Recording reader.
//!
//! Chunks are decoded into sinks created by an [`EventSinkFactory`] chain that
//! ends in the [`RepositoryBuilder`]. The result is one [`EventArray`] per
//! event schema instance.
//!
//! # Example
//!
//! ```no_run
//! use flightrec::config::LoaderConfig;
//! use flightrec::parser::load_file;
//! use std::path::Path;
//!
//! let recording = load_file(Path::new("app.flr"), &LoaderConfig::default()).unwrap();
//! for array in recording.events.iter() {
//!     println!("{}: {}", array.event_type().identifier, array.len());
//! }
//! ```

pub mod chunk_loader;
pub mod constant_pool;
pub mod context;
pub mod event_array;
pub mod item;
pub mod lanes;
pub mod loader;
pub mod metadata;
pub mod repository;
pub mod schema;
pub mod sink;
pub mod stats;
pub mod types;
pub mod value;

pub use constant_pool::{ConstantPool, ConstantPools};
pub use context::LoaderContext;
pub use event_array::{EventArray, EventArraySummary, EventArrays};
pub use item::Item;
pub use lanes::{DisjointBuilder, Interval};
pub use loader::{load_chunks, load_file, load_file_with_extensions, load_stream, LoadedRecording};
pub use repository::RepositoryBuilder;
pub use schema::{Attribute, AttributeSource, EventType, EventTypeDescriptor, ValueField};
pub use sink::{EventSink, EventSinkFactory, ParserExtension};
pub use stats::{ParserStats, StatsSnapshot};
pub use value::{ContentType, StructValue, Value};
