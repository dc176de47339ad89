//! Decoded field values and their content types.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::Serialize;

/// What kind of value a field holds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum ContentType {
    /// The synthesized event type tag.
    EventType,
    Boolean,
    Integer,
    Float,
    String,
    /// Nanoseconds since the epoch.
    Timestamp,
    /// Nanoseconds.
    Timespan,
    /// A structured value of the named class.
    Struct(String),
    Array(Box<ContentType>),
}

impl ContentType {
    pub fn is_time(&self) -> bool {
        matches!(self, ContentType::Timestamp | ContentType::Timespan)
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentType::EventType => write!(f, "type"),
            ContentType::Boolean => write!(f, "boolean"),
            ContentType::Integer => write!(f, "integer"),
            ContentType::Float => write!(f, "float"),
            ContentType::String => write!(f, "string"),
            ContentType::Timestamp => write!(f, "timestamp"),
            ContentType::Timespan => write!(f, "timespan"),
            ContentType::Struct(name) => write!(f, "{name}"),
            ContentType::Array(inner) => write!(f, "{inner}[]"),
        }
    }
}

/// A structured value, usually a canonical constant pool entry.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct StructValue {
    pub type_name: Arc<str>,
    pub fields: Vec<(Arc<str>, Value)>,
}

impl StructValue {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(field, _)| &**field == name)
            .map(|(_, value)| value)
    }
}

/// Equality is structural. Doubles compare by bit pattern so values can key
/// the constant pools.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Boolean(bool),
    Long(i64),
    Double(f64),
    String(Arc<str>),
    Timestamp(i64),
    Timespan(i64),
    Struct(Arc<StructValue>),
    Array(Arc<[Value]>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Integral view of integer and time values.
    pub fn as_long(&self) -> Option<i64> {
        match self {
            Value::Long(v) | Value::Timestamp(v) | Value::Timespan(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&StructValue> {
        match self {
            Value::Struct(s) => Some(s),
            _ => None,
        }
    }

    /// True when both values are the same shared object, not just equal.
    pub fn same_instance(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Struct(a), Value::Struct(b)) => Arc::ptr_eq(a, b),
            (Value::String(a), Value::String(b)) => Arc::ptr_eq(a, b),
            (Value::Array(a), Value::Array(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Long(a), Value::Long(b))
            | (Value::Timestamp(a), Value::Timestamp(b))
            | (Value::Timespan(a), Value::Timespan(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a.to_bits() == b.to_bits(),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Struct(a), Value::Struct(b)) => Arc::ptr_eq(a, b) || a == b,
            (Value::Array(a), Value::Array(b)) => Arc::ptr_eq(a, b) || a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Boolean(v) => v.hash(state),
            Value::Long(v) | Value::Timestamp(v) | Value::Timespan(v) => v.hash(state),
            Value::Double(v) => v.to_bits().hash(state),
            Value::String(v) => v.hash(state),
            Value::Struct(v) => v.hash(state),
            Value::Array(v) => v.hash(state),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Boolean(v) => serializer.serialize_bool(*v),
            Value::Long(v) | Value::Timestamp(v) | Value::Timespan(v) => {
                serializer.serialize_i64(*v)
            }
            Value::Double(v) => serializer.serialize_f64(*v),
            Value::String(v) => serializer.serialize_str(v),
            Value::Struct(v) => {
                let mut map = serializer.serialize_map(Some(v.fields.len()))?;
                for (name, value) in &v.fields {
                    map.serialize_entry(&**name, value)?;
                }
                map.end()
            }
            Value::Array(values) => serializer.collect_seq(values.iter()),
        }
    }
}
