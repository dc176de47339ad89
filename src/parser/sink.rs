//! Seams between the chunk decoder and the item storage.
//!
//! The decoder asks an [`EventSinkFactory`] for one sink per event type and
//! chunk and pushes decoded rows into it. Extensions wrap the factory to
//! rewrite schemas or rows before they reach the storage.

use std::sync::Arc;

use super::schema::EventTypeDescriptor;
use super::value::Value;

/// Receives decoded rows of one event type, in field order.
pub trait EventSink: Send {
    fn add_event(&mut self, values: &[Value]);
}

pub trait EventSinkFactory: Send + Sync {
    fn create(&self, descriptor: EventTypeDescriptor) -> Box<dyn EventSink>;

    /// Called once before the event arrays are built.
    fn flush(&self) {}
}

impl<T: EventSinkFactory + ?Sized> EventSinkFactory for Arc<T> {
    fn create(&self, descriptor: EventTypeDescriptor) -> Box<dyn EventSink> {
        (**self).create(descriptor)
    }

    fn flush(&self) {
        (**self).flush()
    }
}

/// A stream transform placed in front of the storage.
pub trait ParserExtension: Send + Sync {
    fn name(&self) -> &str;

    /// Wrap `inner`; the returned factory sees rows before `inner` does.
    fn wrap(&self, inner: Box<dyn EventSinkFactory>) -> Box<dyn EventSinkFactory>;
}

/// Discards everything.
pub struct NopEventSink;

impl EventSink for NopEventSink {
    fn add_event(&mut self, _values: &[Value]) {}
}

/// Drops the fields whose positions are set in `skip` before forwarding.
pub struct SkipFieldsEventSink {
    inner: Box<dyn EventSink>,
    skip: Vec<bool>,
    scratch: Vec<Value>,
}

impl SkipFieldsEventSink {
    pub fn new(inner: Box<dyn EventSink>, skip: Vec<bool>) -> Self {
        Self {
            inner,
            skip,
            scratch: Vec::new(),
        }
    }
}

impl EventSink for SkipFieldsEventSink {
    fn add_event(&mut self, values: &[Value]) {
        self.scratch.clear();
        self.scratch.extend(
            values
                .iter()
                .zip(self.skip.iter().chain(std::iter::repeat(&false)))
                .filter(|(_, skip)| !**skip)
                .map(|(v, _)| v.clone()),
        );
        self.inner.add_event(&self.scratch);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Capture(Arc<Mutex<Vec<Vec<Value>>>>);

    impl EventSink for Capture {
        fn add_event(&mut self, values: &[Value]) {
            self.0.lock().unwrap().push(values.to_vec());
        }
    }

    #[test]
    fn test_skip_fields() {
        let rows = Arc::new(Mutex::new(Vec::new()));
        let mut sink = SkipFieldsEventSink::new(
            Box::new(Capture(rows.clone())),
            vec![false, true, false],
        );
        sink.add_event(&[Value::Long(1), Value::Long(2), Value::Long(3)]);
        assert_eq!(
            rows.lock().unwrap()[0],
            vec![Value::Long(1), Value::Long(3)]
        );
    }
}
