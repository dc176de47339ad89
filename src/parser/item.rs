use std::sync::Arc;

use smallvec::SmallVec;

use super::lanes::Interval;
use super::schema::{AttributeSource, EndSource, EventType, TimeLayout};
use super::value::Value;

/// Field count up to which an item keeps its values inline, without a
/// separate heap allocation.
pub const INLINE_FIELDS: usize = 8;

/// One decoded event, bound to the schema it was read with.
#[derive(Debug, Clone)]
pub struct Item {
    event_type: Arc<EventType>,
    values: SmallVec<[Value; INLINE_FIELDS]>,
}

impl Item {
    /// Build an item from values in field order. Missing trailing values are
    /// null and surplus values are dropped, so an item always has exactly one
    /// value per schema field.
    pub fn new(event_type: Arc<EventType>, values: impl IntoIterator<Item = Value>) -> Self {
        let count = event_type.fields().len();
        let mut values: SmallVec<[Value; INLINE_FIELDS]> =
            values.into_iter().take(count).collect();
        values.resize(count, Value::Null);
        Self { event_type, values }
    }

    pub fn event_type(&self) -> &Arc<EventType> {
        &self.event_type
    }

    pub fn field_count(&self) -> usize {
        self.values.len()
    }

    pub fn get_field(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn fields(&self) -> &[Value] {
        &self.values
    }

    /// Whether the values live inside the item itself.
    pub fn is_inline(&self) -> bool {
        !self.values.spilled()
    }

    fn long_field(&self, index: usize) -> Option<i64> {
        self.values.get(index).and_then(Value::as_long)
    }

    /// Value of the attribute at `index` of `event_type().attributes()`,
    /// computing synthesized attributes on the fly.
    pub fn attribute(&self, index: usize) -> Option<Value> {
        let attribute = self.event_type.attributes().get(index)?;
        Some(match attribute.source {
            AttributeSource::EventType => Value::String(self.event_type.identifier.as_str().into()),
            AttributeSource::Field(i) => self.values[i].clone(),
            AttributeSource::Duration { start, end } => {
                match (self.long_field(start), self.long_field(end)) {
                    (Some(s), Some(e)) => e.checked_sub(s).map_or(Value::Null, Value::Timespan),
                    _ => Value::Null,
                }
            }
            AttributeSource::EndTime { start, duration } => {
                match (self.long_field(start), self.long_field(duration)) {
                    (Some(s), Some(d)) => s.checked_add(d).map_or(Value::Null, Value::Timestamp),
                    _ => Value::Null,
                }
            }
        })
    }

    /// Attribute lookup by identifier.
    pub fn get(&self, identifier: &str) -> Option<Value> {
        self.attribute(self.event_type.attribute_index(identifier)?)
    }

    pub fn start_time(&self) -> Option<i64> {
        match self.event_type.layout() {
            TimeLayout::Duration { start, .. } => self.long_field(start),
            TimeLayout::Instant { start } => start.and_then(|i| self.long_field(i)),
        }
    }

    pub fn end_time(&self) -> Option<i64> {
        match self.event_type.layout() {
            TimeLayout::Duration {
                end: EndSource::Field(end),
                ..
            } => self.long_field(end),
            TimeLayout::Duration {
                start,
                end: EndSource::Duration(duration),
            } => self.long_field(start)?.checked_add(self.long_field(duration)?),
            TimeLayout::Instant { .. } => self.start_time(),
        }
    }

    pub fn duration(&self) -> Option<i64> {
        self.end_time()?.checked_sub(self.start_time()?)
    }
}

impl Interval for Item {
    fn start(&self) -> i64 {
        self.start_time().unwrap_or(i64::MIN)
    }

    /// An end past `i64::MAX` is clamped there, so the item still blocks
    /// its lane for the rest of time.
    fn end(&self) -> i64 {
        if let Some(end) = self.end_time() {
            return end;
        }
        match self.event_type.layout() {
            TimeLayout::Duration {
                start,
                end: EndSource::Duration(duration),
            } => match (self.long_field(start), self.long_field(duration)) {
                (Some(s), Some(d)) => s.saturating_add(d),
                _ => self.start(),
            },
            _ => self.start(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::schema::{
        EventTypeDescriptor, ValueField, DURATION, END_TIME, EVENT_TYPE, START_TIME,
    };
    use crate::parser::value::ContentType;

    fn schema_with(n: usize) -> Arc<EventType> {
        let fields = (0..n)
            .map(|i| ValueField::new(format!("f{i}"), ContentType::Integer))
            .collect();
        Arc::new(EventType::new(EventTypeDescriptor::new("t", fields), "t"))
    }

    #[test]
    fn test_every_arity_reads_back() {
        for n in 0..=20 {
            let schema = schema_with(n);
            let values: Vec<Value> = (0..n).map(|i| Value::Long(i as i64 * 7)).collect();
            let item = Item::new(schema, values.clone());
            assert_eq!(item.field_count(), n);
            for (i, v) in values.iter().enumerate() {
                assert_eq!(item.get_field(i), Some(v), "arity {n} field {i}");
            }
            assert_eq!(item.get_field(n), None);
            assert_eq!(item.is_inline(), n <= INLINE_FIELDS);
        }
    }

    #[test]
    fn test_short_and_long_inputs_normalize() {
        let schema = schema_with(3);
        let short = Item::new(schema.clone(), vec![Value::Long(1)]);
        assert_eq!(short.fields(), &[Value::Long(1), Value::Null, Value::Null]);
        let long = Item::new(schema, (0..5).map(Value::Long));
        assert_eq!(long.field_count(), 3);
    }

    #[test]
    fn test_synthesized_attributes() {
        let schema = Arc::new(EventType::new(
            EventTypeDescriptor::new(
                "A",
                vec![
                    ValueField::new(START_TIME, ContentType::Timestamp),
                    ValueField::new(DURATION, ContentType::Timespan),
                ],
            ),
            "A",
        ));
        let item = Item::new(schema, vec![Value::Timestamp(100), Value::Timespan(25)]);
        assert_eq!(item.get(EVENT_TYPE), Some(Value::String("A".into())));
        assert_eq!(item.get(END_TIME), Some(Value::Timestamp(125)));
        assert_eq!(item.start_time(), Some(100));
        assert_eq!(item.end_time(), Some(125));
        assert_eq!(item.duration(), Some(25));
        assert_eq!(item.get("missing"), None);
    }

    #[test]
    fn test_extreme_times_do_not_overflow() {
        use crate::parser::lanes::DisjointBuilder;

        let schema = Arc::new(EventType::new(
            EventTypeDescriptor::new(
                "A",
                vec![
                    ValueField::new(START_TIME, ContentType::Timestamp),
                    ValueField::new(DURATION, ContentType::Timespan),
                ],
            ),
            "A",
        ));
        let late = Item::new(
            schema.clone(),
            vec![Value::Timestamp(i64::MAX - 5), Value::Timespan(10)],
        );
        assert_eq!(late.end_time(), None);
        assert_eq!(late.duration(), None);
        assert_eq!(late.get(END_TIME), Some(Value::Null));
        assert_eq!(Interval::end(&late), i64::MAX);

        let early = Item::new(schema, vec![Value::Timestamp(1), Value::Timespan(1)]);
        let mut builder = DisjointBuilder::new();
        builder.add(late);
        builder.add(early);
        assert_eq!(builder.lane_count(), 2);
        assert_eq!(builder.len(), 2);

        let spread = Arc::new(EventType::new(
            EventTypeDescriptor::new(
                "B",
                vec![
                    ValueField::new(START_TIME, ContentType::Timestamp),
                    ValueField::new(END_TIME, ContentType::Timestamp),
                ],
            ),
            "B",
        ));
        let item = Item::new(spread, vec![Value::Timestamp(i64::MIN), Value::Timestamp(i64::MAX)]);
        assert_eq!(item.get(DURATION), Some(Value::Null));
        assert_eq!(item.duration(), None);
    }
}
