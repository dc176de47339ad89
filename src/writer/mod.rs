//! Recording writer.
//!
//! Types are declared through a [`TypeRegistry`] owned by the
//! [`Recording`], values are built against them and written as events.
//!
//! ```no_run
//! use flightrec::writer::{Builtin, Recordings};
//!
//! let mut recording = Recordings::new_recording("demo.flr").unwrap();
//! let event = recording
//!     .register_event_type("demo.Event", |b| {
//!         b.add_field("msg", Builtin::String);
//!     })
//!     .unwrap();
//! let now = recording.now_ticks();
//! let hello = recording
//!     .new_value(event, |v| {
//!         v.put("startTime", now).put("msg", "hello");
//!     })
//!     .unwrap();
//! recording.write_event(&hello).unwrap();
//! recording.close().unwrap();
//! ```

pub mod annotation;
pub mod constant_pool;
mod encoder;
pub mod metadata;
pub mod recording;
pub mod structure;
pub mod types;
pub mod value;

pub use annotation::Annotation;
pub use constant_pool::WriterConstantPools;
pub use recording::{Recording, Recordings};
pub use structure::{FieldType, TypeStructure, TypeStructureBuilder, TypedField, TypedFieldBuilder};
pub use types::{Builtin, JdkType, TypeHandle, TypeRegistry};
pub use value::{FieldValue, Scalar, TypedValue, TypedValueBuilder, ValueData};
