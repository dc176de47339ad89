//! flightrec library - reading and writing chunked flight recordings.
//!
//! A recording is a stream of self-contained binary chunks. The reader turns
//! the events of all chunks into one array per event schema; the writer
//! declares types and emits events, rotating chunks on request.
//!
//! # Modules
//!
//! - [`chunk`] - Chunk headers and splitting a stream into chunks
//! - [`parser`] - Loading recordings into event arrays
//! - [`writer`] - Type registry and chunk writer
//! - [`collection`] - Sparse index map, bounded list and lane merging
//! - [`config`] - Loader and recording settings
//! - [`error`] - Typed errors callers can match on
//!
//! # Example
//!
//! ```no_run
//! use flightrec::{load_file, LoaderConfig};
//! use std::path::Path;
//!
//! let recording = load_file(Path::new("app.flr"), &LoaderConfig::default())
//!     .expect("Failed to load recording");
//! println!("{} events", recording.events.item_count());
//! ```

pub mod chunk;
pub mod collection;
pub mod config;
pub mod constants;
pub mod error;
pub mod leb128;
pub mod parser;
pub mod writer;

// Re-export for convenience
pub use config::{LoaderConfig, RecordingSettings};
pub use error::{FormatError, TypeRegistrationError};
pub use parser::{load_file, load_stream, EventArrays, LoadedRecording};
pub use writer::{Recording, Recordings};
