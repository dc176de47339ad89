//! Well-known class and annotation names of the recording format.

/// Supertype marking a class as an event type.
pub const EVENT_SUPER_TYPE: &str = "jdk.jfr.Event";
/// Supertype marking a class as an annotation type.
pub const ANNOTATION_SUPER_TYPE: &str = "java.lang.annotation.Annotation";
pub const STRING_CLASS: &str = "java.lang.String";

pub const LABEL: &str = "jdk.jfr.Label";
pub const DESCRIPTION: &str = "jdk.jfr.Description";
pub const CATEGORY: &str = "jdk.jfr.Category";
pub const EXPERIMENTAL: &str = "jdk.jfr.Experimental";
pub const TIMESTAMP: &str = "jdk.jfr.Timestamp";
pub const TIMESPAN: &str = "jdk.jfr.Timespan";
pub const UNSIGNED: &str = "jdk.jfr.Unsigned";
pub const CONTENT_TYPE: &str = "jdk.jfr.ContentType";
pub const NAME: &str = "jdk.jfr.Name";

pub const TIMESTAMP_TICKS: &str = "TICKS";
pub const TIMESTAMP_NANOS_SINCE_EPOCH: &str = "NANOSECONDS_SINCE_EPOCH";
pub const TIMESTAMP_MILLIS_SINCE_EPOCH: &str = "MILLISECONDS_SINCE_EPOCH";

pub const TIMESPAN_TICKS: &str = "TICKS";
pub const TIMESPAN_NANOSECONDS: &str = "NANOSECONDS";
pub const TIMESPAN_MICROSECONDS: &str = "MICROSECONDS";
pub const TIMESPAN_MILLISECONDS: &str = "MILLISECONDS";
pub const TIMESPAN_SECONDS: &str = "SECONDS";
