//! Class definitions of one chunk and the value decoder built on them.
//!
//! [`ChunkTypes`] turns the metadata element tree into field readers. The
//! [`Decoder`] reads values with them, resolving constant pool references
//! lazily: checkpoints are only indexed up front, and an entry is decoded the
//! first time something refers to it, then interned in the session pools.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::{bail, Context, Result};

use super::metadata::{Element, CHECKPOINT_RECORD_ID};
use super::constant_pool::ConstantPools;
use super::schema::{EventTypeDescriptor, ValueField};
use super::value::{ContentType, StructValue, Value};
use crate::chunk::ChunkHeader;
use crate::collection::SparseIndexMap;
use crate::constants::*;
use crate::error::FormatError;
use crate::leb128::{DataInput, RawString};

/// Guards against checkpoint chains that loop.
const MAX_CHECKPOINTS: usize = 100_000;

/// Deepest chain of constants referring to constants that gets resolved.
const MAX_REFERENCE_DEPTH: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Primitive {
    Byte,
    UnsignedByte,
    Char,
    Short,
    UnsignedShort,
    Int,
    UnsignedInt,
    Long,
    Float,
    Double,
    Boolean,
}

impl Primitive {
    fn of_name(name: &str) -> Option<Self> {
        Some(match name {
            "byte" => Primitive::Byte,
            "char" => Primitive::Char,
            "short" => Primitive::Short,
            "int" => Primitive::Int,
            "long" => Primitive::Long,
            "float" => Primitive::Float,
            "double" => Primitive::Double,
            "boolean" => Primitive::Boolean,
            _ => return None,
        })
    }

    fn unsigned(self) -> Self {
        match self {
            Primitive::Byte => Primitive::UnsignedByte,
            Primitive::Short => Primitive::UnsignedShort,
            Primitive::Int => Primitive::UnsignedInt,
            other => other,
        }
    }

    fn is_integral(self) -> bool {
        !matches!(
            self,
            Primitive::Float | Primitive::Double | Primitive::Boolean | Primitive::Char
        )
    }

    fn read_integral(self, input: &mut DataInput<'_>) -> Result<i64> {
        Ok(match self {
            Primitive::Byte => input.read_u8()? as i8 as i64,
            Primitive::UnsignedByte => input.read_u8()? as i64,
            Primitive::Short => input.read_short()? as i64,
            Primitive::UnsignedShort => input.read_short()? as u16 as i64,
            Primitive::Int => input.read_int()? as i64,
            Primitive::UnsignedInt => input.read_int()? as u32 as i64,
            _ => input.read_long()?,
        })
    }

    fn read(self, input: &mut DataInput<'_>) -> Result<Value> {
        Ok(match self {
            Primitive::Float => Value::Double(input.read_f32()? as f64),
            Primitive::Double => Value::Double(input.read_f64()?),
            Primitive::Boolean => Value::Boolean(input.read_bool()?),
            Primitive::Char => {
                let unit = input.read_char()?;
                Value::String(String::from_utf16_lossy(&[unit]).into())
            }
            integral => Value::Long(integral.read_integral(input)?),
        })
    }

    fn content_type(self) -> ContentType {
        match self {
            Primitive::Boolean => ContentType::Boolean,
            Primitive::Float | Primitive::Double => ContentType::Float,
            Primitive::Char => ContentType::String,
            _ => ContentType::Integer,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimestampUnit {
    Ticks,
    NanosSinceEpoch,
    MillisSinceEpoch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimespanUnit {
    Ticks,
    /// Nanoseconds per unit.
    Scaled(i64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum FieldReader {
    Primitive(Primitive),
    String,
    Timestamp(Primitive, TimestampUnit),
    Timespan(Primitive, TimespanUnit),
    /// Index into the constant pool of the class.
    Constant(i64),
    /// The class's fields, inline.
    Inline(i64),
    Array(Box<FieldReader>),
}

impl FieldReader {
    fn inline_class(&self) -> Option<i64> {
        match self {
            FieldReader::Inline(id) => Some(*id),
            FieldReader::Array(inner) => inner.inline_class(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClassKind {
    Primitive(Primitive),
    String,
    Struct,
}

#[derive(Debug)]
struct FieldDef {
    name: Arc<str>,
    label: Option<String>,
    description: Option<String>,
    reader: FieldReader,
    experimental: bool,
}

#[derive(Debug)]
struct ClassDef {
    name: Arc<str>,
    super_type: Option<String>,
    kind: ClassKind,
    fields: Vec<FieldDef>,
    label: Option<String>,
    description: Option<String>,
    category: Vec<String>,
    experimental: bool,
}

#[derive(Debug, Default)]
struct Annotations {
    label: Option<String>,
    description: Option<String>,
    category: Vec<String>,
    experimental: bool,
    timestamp: Option<String>,
    timespan: Option<String>,
    unsigned: bool,
}

impl Annotations {
    fn read(element: &Element, names: &HashMap<i64, String>) -> Self {
        let mut out = Annotations::default();
        for annotation in element.children_named("annotation") {
            let class = annotation
                .get("class")
                .and_then(|id| id.parse::<i64>().ok())
                .and_then(|id| names.get(&id));
            let Some(class) = class else {
                continue;
            };
            let value = annotation.get("value").map(str::to_string);
            match class.as_str() {
                LABEL => out.label = value,
                DESCRIPTION => out.description = value,
                EXPERIMENTAL => out.experimental = true,
                TIMESTAMP => out.timestamp = Some(value.unwrap_or_default()),
                TIMESPAN => out.timespan = Some(value.unwrap_or_default()),
                UNSIGNED => out.unsigned = true,
                CATEGORY => {
                    let indexed: Vec<String> = (0..)
                        .map_while(|i| annotation.get(&format!("value-{i}")).map(str::to_string))
                        .collect();
                    out.category = if indexed.is_empty() {
                        value.into_iter().collect()
                    } else {
                        indexed
                    };
                }
                _ => {}
            }
        }
        out
    }
}

fn parse_attr<T: std::str::FromStr>(element: &Element, key: &str) -> Result<Option<T>> {
    element
        .get(key)
        .map(|v| {
            v.parse::<T>()
                .ok()
                .with_context(|| format!("bad {key} attribute {v:?}"))
        })
        .transpose()
}

/// Classes declared by one chunk's metadata.
#[derive(Debug)]
pub struct ChunkTypes {
    classes: HashMap<i64, ClassDef>,
    string_class: Option<i64>,
}

impl ChunkTypes {
    pub fn new(root: &Element) -> Result<Self> {
        Self::build(root)
            .map_err(|e| FormatError::invalid(format!("bad class metadata: {e:#}")).into())
    }

    fn build(root: &Element) -> Result<Self> {
        let class_elements: Vec<&Element> = root
            .children_named("metadata")
            .flat_map(|m| m.children_named("class"))
            .collect();

        let mut names = HashMap::with_capacity(class_elements.len());
        for element in &class_elements {
            let id: i64 = parse_attr(element, "id")?.context("class without id")?;
            let name = element.get("name").context("class without name")?;
            names.insert(id, name.to_string());
        }

        let mut classes = HashMap::with_capacity(class_elements.len());
        for element in &class_elements {
            let id: i64 = parse_attr(element, "id")?.context("class without id")?;
            let name = names[&id].clone();
            let annotations = Annotations::read(element, &names);
            let mut fields = Vec::new();
            for field in element.children_named("field") {
                fields.push(Self::field(field, &names).with_context(|| format!("in class {name}"))?);
            }
            let kind = match Primitive::of_name(&name) {
                Some(p) if fields.is_empty() => ClassKind::Primitive(p),
                _ if name == STRING_CLASS && fields.is_empty() => ClassKind::String,
                _ => ClassKind::Struct,
            };
            classes.insert(
                id,
                ClassDef {
                    name: name.as_str().into(),
                    super_type: element.get("superType").map(str::to_string),
                    kind,
                    fields,
                    label: annotations.label,
                    description: annotations.description,
                    category: annotations.category,
                    experimental: annotations.experimental,
                },
            );
        }
        let string_class = classes
            .iter()
            .find(|(_, c)| c.kind == ClassKind::String)
            .map(|(id, _)| *id);
        let types = Self {
            classes,
            string_class,
        };
        types.check_inline_cycles()?;
        Ok(types)
    }

    /// Inline fields are read in place, so a class that inlines itself,
    /// directly or through other classes, has no finite encoding.
    fn check_inline_cycles(&self) -> Result<()> {
        let mut done: HashSet<i64> = HashSet::new();
        for &root in self.classes.keys() {
            if done.contains(&root) {
                continue;
            }
            // depth-first walk; `path` holds the classes on the current chain
            let mut path: Vec<i64> = vec![root];
            let mut stack = vec![self.inline_children(root)];
            while let Some(children) = stack.last_mut() {
                match children.next() {
                    Some(child) if path.contains(&child) => {
                        bail!(
                            "class {} inlines itself",
                            self.class_name(child).unwrap_or_default()
                        );
                    }
                    Some(child) if !done.contains(&child) => {
                        path.push(child);
                        stack.push(self.inline_children(child));
                    }
                    Some(_) => {}
                    None => {
                        stack.pop();
                        if let Some(id) = path.pop() {
                            done.insert(id);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Classes that `id` stores inline, as plain fields or array elements.
    fn inline_children(&self, id: i64) -> std::vec::IntoIter<i64> {
        self.classes
            .get(&id)
            .map(|c| c.fields.iter().filter_map(|f| f.reader.inline_class()).collect::<Vec<_>>())
            .unwrap_or_default()
            .into_iter()
    }

    fn field(element: &Element, names: &HashMap<i64, String>) -> Result<FieldDef> {
        let name = element.get("name").context("field without name")?;
        let class_id: i64 = parse_attr(element, "class")?
            .with_context(|| format!("field {name} without class"))?;
        let class_name = names
            .get(&class_id)
            .with_context(|| format!("field {name} refers to unknown class {class_id}"))?;
        let dimension: i32 = parse_attr(element, "dimension")?.unwrap_or(0);
        let constant_pool = element.get("constantPool") == Some("true");
        let annotations = Annotations::read(element, names);

        let base = match Primitive::of_name(class_name) {
            _ if constant_pool => FieldReader::Constant(class_id),
            Some(p) => {
                let p = if annotations.unsigned { p.unsigned() } else { p };
                match (&annotations.timestamp, &annotations.timespan) {
                    (Some(unit), _) if p.is_integral() => {
                        FieldReader::Timestamp(p, timestamp_unit(unit))
                    }
                    (None, Some(unit)) if p.is_integral() => {
                        FieldReader::Timespan(p, timespan_unit(unit))
                    }
                    _ => FieldReader::Primitive(p),
                }
            }
            None if class_name == STRING_CLASS => FieldReader::String,
            None => FieldReader::Inline(class_id),
        };
        let reader = match dimension {
            0 => base,
            1 => FieldReader::Array(Box::new(base)),
            d => bail!("field {name} has unsupported dimension {d}"),
        };
        Ok(FieldDef {
            name: name.into(),
            label: annotations.label,
            description: annotations.description,
            reader,
            experimental: annotations.experimental,
        })
    }

    fn class(&self, id: i64) -> Result<&ClassDef> {
        self.classes
            .get(&id)
            .with_context(|| format!("unknown class id {id}"))
    }

    pub fn class_name(&self, id: i64) -> Option<&str> {
        self.classes.get(&id).map(|c| &*c.name)
    }

    /// Ids of the classes with the event marker somewhere in their
    /// supertype chain.
    pub fn event_class_ids(&self) -> Vec<i64> {
        let by_name: HashMap<&str, &ClassDef> =
            self.classes.values().map(|c| (&*c.name, c)).collect();
        let is_event = |class: &ClassDef| {
            let mut current = class.super_type.as_deref();
            for _ in 0..=by_name.len() {
                match current {
                    Some(EVENT_SUPER_TYPE) => return true,
                    Some(name) => current = by_name.get(name).and_then(|c| c.super_type.as_deref()),
                    None => return false,
                }
            }
            false
        };
        let mut ids: Vec<i64> = self
            .classes
            .iter()
            .filter(|(_, c)| is_event(c))
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn is_experimental(&self, id: i64) -> bool {
        self.classes.get(&id).is_some_and(|c| c.experimental)
    }

    /// Which fields of class `id` are experimental, in field order.
    pub fn experimental_fields(&self, id: i64) -> Vec<bool> {
        self.classes
            .get(&id)
            .map(|c| c.fields.iter().map(|f| f.experimental).collect())
            .unwrap_or_default()
    }

    fn content_type(&self, reader: &FieldReader) -> ContentType {
        match reader {
            FieldReader::Primitive(p) => p.content_type(),
            FieldReader::String => ContentType::String,
            FieldReader::Timestamp(..) => ContentType::Timestamp,
            FieldReader::Timespan(..) => ContentType::Timespan,
            FieldReader::Constant(id) | FieldReader::Inline(id) => {
                ContentType::Struct(self.class_name(*id).unwrap_or_default().to_string())
            }
            FieldReader::Array(inner) => ContentType::Array(Box::new(self.content_type(inner))),
        }
    }

    /// Describe event class `id` for a sink, leaving out experimental fields
    /// when `hide_experimentals` is set.
    pub fn descriptor(&self, id: i64, hide_experimentals: bool) -> Result<EventTypeDescriptor> {
        let class = self.class(id)?;
        let fields = class
            .fields
            .iter()
            .filter(|f| !(hide_experimentals && f.experimental))
            .map(|f| ValueField {
                identifier: f.name.to_string(),
                name: f.label.clone().unwrap_or_else(|| f.name.to_string()),
                description: f.description.clone(),
                content_type: self.content_type(&f.reader),
            })
            .collect();
        Ok(EventTypeDescriptor {
            identifier: class.name.to_string(),
            label: class.label.clone().unwrap_or_else(|| class.name.to_string()),
            category: class.category.clone(),
            description: class.description.clone(),
            fields,
        })
    }
}

fn timestamp_unit(unit: &str) -> TimestampUnit {
    match unit {
        TIMESTAMP_NANOS_SINCE_EPOCH => TimestampUnit::NanosSinceEpoch,
        TIMESTAMP_MILLIS_SINCE_EPOCH => TimestampUnit::MillisSinceEpoch,
        _ => TimestampUnit::Ticks,
    }
}

fn timespan_unit(unit: &str) -> TimespanUnit {
    match unit {
        TIMESPAN_NANOSECONDS => TimespanUnit::Scaled(1),
        TIMESPAN_MICROSECONDS => TimespanUnit::Scaled(1_000),
        TIMESPAN_MILLISECONDS => TimespanUnit::Scaled(1_000_000),
        TIMESPAN_SECONDS => TimespanUnit::Scaled(1_000_000_000),
        _ => TimespanUnit::Ticks,
    }
}

/// Reads values from one chunk's bytes.
pub struct Decoder<'a> {
    data: &'a [u8],
    header: &'a ChunkHeader,
    types: &'a ChunkTypes,
    pools: &'a ConstantPools,
    positions: HashMap<i64, SparseIndexMap<usize>>,
    resolved: RefCell<HashMap<i64, SparseIndexMap<Value>>>,
    resolving: RefCell<HashSet<(i64, i64)>>,
    depth: Cell<usize>,
}

impl<'a> Decoder<'a> {
    pub fn new(
        data: &'a [u8],
        header: &'a ChunkHeader,
        types: &'a ChunkTypes,
        pools: &'a ConstantPools,
    ) -> Self {
        Self {
            data,
            header,
            types,
            pools,
            positions: HashMap::new(),
            resolved: RefCell::new(HashMap::new()),
            resolving: RefCell::new(HashSet::new()),
            depth: Cell::new(0),
        }
    }

    pub fn compressed(&self) -> bool {
        self.header.compressed_ints()
    }

    /// Walk the checkpoint chain and remember where each constant starts.
    /// Returns the number of constants indexed.
    pub fn index_checkpoints(&mut self) -> Result<usize> {
        let mut found = Vec::new();
        let mut offset = self.header.constant_pool_offset;
        let mut visited = HashSet::new();
        while visited.len() < MAX_CHECKPOINTS {
            if offset < 0 || offset as usize >= self.data.len() || !visited.insert(offset) {
                return Err(FormatError::invalid(format!("bad checkpoint offset {offset}")).into());
            }
            let delta = self
                .scan_checkpoint(offset as usize, &mut found)
                .map_err(|e| FormatError::invalid(format!("bad checkpoint at {offset}: {e:#}")))?;
            if delta == 0 {
                break;
            }
            offset = offset.checked_add(delta).ok_or_else(|| {
                FormatError::invalid(format!("checkpoint delta {delta} at {offset} overflows"))
            })?;
        }
        let count = found.len();
        for (class_id, index, position) in found {
            self.positions
                .entry(class_id)
                .or_default()
                .put(index, position);
        }
        Ok(count)
    }

    fn scan_checkpoint(&self, offset: usize, found: &mut Vec<(i64, i64, usize)>) -> Result<i64> {
        let mut input = DataInput::at(self.data, offset, self.compressed());
        let size = input.read_long()?;
        if size <= 0 || size as u64 > (self.data.len() - offset) as u64 {
            bail!("record size {size} out of range");
        }
        let end = offset + size as usize;
        let mut input = DataInput::at(&self.data[..end], input.position(), self.compressed());
        let record_type = input.read_long()?;
        if record_type != CHECKPOINT_RECORD_ID {
            bail!("expected checkpoint record, found type {record_type}");
        }
        let _start = input.read_long()?;
        let _duration = input.read_long()?;
        let delta = input.read_long()?;
        let _flush = input.read_long()?;
        let pool_count = input.read_len()?;
        for _ in 0..pool_count {
            let class_id = input.read_long()?;
            let class = self.types.class(class_id)?;
            let count = input.read_len()?;
            for _ in 0..count {
                let index = input.read_long()?;
                found.push((class_id, index, input.position()));
                self.read_class(class, &mut input, false)?;
            }
        }
        Ok(delta)
    }

    /// The canonical value of constant `index` of class `class_id`. Unknown
    /// constants and references back into a constant being resolved are null.
    fn resolve(&self, class_id: i64, index: i64) -> Result<Value> {
        let cached = self
            .resolved
            .borrow()
            .get(&class_id)
            .and_then(|m| m.get(index).cloned());
        if let Some(value) = cached {
            return Ok(value);
        }
        let class = self.types.class(class_id)?;
        let Some(position) = self.positions.get(&class_id).and_then(|m| m.get(index)) else {
            if index != 0 {
                tracing::debug!("Unresolved constant {}[{}]", class.name, index);
            }
            return Ok(Value::Null);
        };
        if !self.resolving.borrow_mut().insert((class_id, index)) {
            return Ok(Value::Null);
        }
        let depth = self.depth.get();
        let value = if depth >= MAX_REFERENCE_DEPTH {
            Err(FormatError::invalid(format!(
                "constant {}[{}] nested deeper than {MAX_REFERENCE_DEPTH}",
                class.name, index
            ))
            .into())
        } else {
            self.depth.set(depth + 1);
            let mut input = DataInput::at(self.data, *position, self.compressed());
            let value = self.read_class(class, &mut input, true);
            self.depth.set(depth);
            value
        };
        self.resolving.borrow_mut().remove(&(class_id, index));
        let value = self.pools.pool_for(&class.name).intern(value?);
        self.resolved
            .borrow_mut()
            .entry(class_id)
            .or_default()
            .put(index, value.clone());
        Ok(value)
    }

    fn read_string(&self, input: &mut DataInput<'_>, resolve: bool) -> Result<Value> {
        Ok(match input.read_string()? {
            RawString::Null => Value::Null,
            RawString::Inline(s) => Value::String(s.into()),
            RawString::ConstantPool(index) => match self.types.string_class {
                Some(class_id) if resolve => self.resolve(class_id, index)?,
                Some(_) => Value::Null,
                None => bail!("string constant {index} without a string class"),
            },
        })
    }

    fn read_class(&self, class: &ClassDef, input: &mut DataInput<'_>, resolve: bool) -> Result<Value> {
        match class.kind {
            ClassKind::Primitive(p) => p.read(input),
            ClassKind::String => self.read_string(input, resolve),
            ClassKind::Struct => {
                let mut fields = Vec::with_capacity(class.fields.len());
                for field in &class.fields {
                    let value = self.read_value(&field.reader, input, resolve)?;
                    fields.push((field.name.clone(), value));
                }
                Ok(Value::Struct(Arc::new(StructValue {
                    type_name: class.name.clone(),
                    fields,
                })))
            }
        }
    }

    fn read_value(&self, reader: &FieldReader, input: &mut DataInput<'_>, resolve: bool) -> Result<Value> {
        Ok(match reader {
            FieldReader::Primitive(p) => p.read(input)?,
            FieldReader::String => self.read_string(input, resolve)?,
            FieldReader::Timestamp(p, unit) => {
                let raw = p.read_integral(input)?;
                Value::Timestamp(match unit {
                    TimestampUnit::Ticks => self
                        .header
                        .ticks_to_epoch_nanos(raw)
                        .with_context(|| format!("timestamp {raw} ticks out of range"))?,
                    TimestampUnit::NanosSinceEpoch => raw,
                    TimestampUnit::MillisSinceEpoch => raw.saturating_mul(1_000_000),
                })
            }
            FieldReader::Timespan(p, unit) => {
                let raw = p.read_integral(input)?;
                Value::Timespan(match unit {
                    TimespanUnit::Ticks => self
                        .header
                        .ticks_to_nanos(raw)
                        .with_context(|| format!("timespan {raw} ticks out of range"))?,
                    TimespanUnit::Scaled(factor) => raw.saturating_mul(*factor),
                })
            }
            FieldReader::Constant(class_id) => {
                let index = input.read_long()?;
                if resolve {
                    self.resolve(*class_id, index)?
                } else {
                    Value::Null
                }
            }
            FieldReader::Inline(class_id) => {
                let class = self.types.class(*class_id)?;
                self.read_class(class, input, resolve)?
            }
            FieldReader::Array(inner) => {
                let len = input.read_len()?;
                let mut values = Vec::with_capacity(len);
                for _ in 0..len {
                    values.push(self.read_value(inner, input, resolve)?);
                }
                Value::Array(values.into())
            }
        })
    }

    /// Decode the fields of an event of class `class_id` from a record body.
    pub fn read_event(&self, class_id: i64, input: &mut DataInput<'_>, out: &mut Vec<Value>) -> Result<()> {
        let class = self.types.class(class_id)?;
        out.clear();
        for field in &class.fields {
            out.push(self.read_value(&field.reader, input, true)?);
        }
        Ok(())
    }
}
