//! The metadata record: a string table followed by an element tree
//! describing every class used in the chunk.

use std::collections::HashMap;

use anyhow::{bail, Context, Result};

use crate::error::FormatError;
use crate::leb128::{DataInput, Leb128Writer, RawString};

/// Record type id of the metadata record.
pub const METADATA_RECORD_ID: i64 = 0;
/// Record type id of a checkpoint (constant pool) record.
pub const CHECKPOINT_RECORD_ID: i64 = 1;

/// Deeper trees are rejected instead of recursing further.
const MAX_ELEMENT_DEPTH: usize = 32;

/// A node of the metadata tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Element>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }

    pub fn child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.children.iter().filter(move |c| c.name == name)
    }

    fn collect_strings(&self, table: &mut StringTable) {
        table.index(&self.name);
        for (k, v) in &self.attributes {
            table.index(k);
            table.index(v);
        }
        for child in &self.children {
            child.collect_strings(table);
        }
    }

    fn write(&self, table: &StringTable, w: &mut Leb128Writer) {
        w.write_int(table.lookup(&self.name));
        w.write_int(self.attributes.len() as i32);
        for (k, v) in &self.attributes {
            w.write_int(table.lookup(k));
            w.write_int(table.lookup(v));
        }
        w.write_int(self.children.len() as i32);
        for child in &self.children {
            child.write(table, w);
        }
    }

    fn read(input: &mut DataInput<'_>, strings: &[String], depth: usize) -> Result<Element> {
        if depth > MAX_ELEMENT_DEPTH {
            bail!("metadata nested deeper than {MAX_ELEMENT_DEPTH}");
        }
        let string = |index: i32| -> Result<String> {
            strings
                .get(index as usize)
                .cloned()
                .with_context(|| format!("string index {index} out of range"))
        };
        let name = string(input.read_int()?)?;
        let attribute_count = input.read_len()?;
        let mut attributes = Vec::with_capacity(attribute_count);
        for _ in 0..attribute_count {
            let key = string(input.read_int()?)?;
            let value = string(input.read_int()?)?;
            attributes.push((key, value));
        }
        let child_count = input.read_len()?;
        let mut children = Vec::with_capacity(child_count);
        for _ in 0..child_count {
            children.push(Element::read(input, strings, depth + 1)?);
        }
        Ok(Element {
            name,
            attributes,
            children,
        })
    }
}

#[derive(Default)]
struct StringTable {
    strings: Vec<String>,
    indices: HashMap<String, i32>,
}

impl StringTable {
    fn index(&mut self, s: &str) {
        if !self.indices.contains_key(s) {
            self.indices.insert(s.to_string(), self.strings.len() as i32);
            self.strings.push(s.to_string());
        }
    }

    fn lookup(&self, s: &str) -> i32 {
        self.indices.get(s).copied().unwrap_or(0)
    }
}

/// Encode a complete metadata record for `root`.
pub fn write_metadata_record(root: &Element, start_ticks: i64, duration_ticks: i64, w: &mut Leb128Writer) {
    let mut table = StringTable::default();
    root.collect_strings(&mut table);

    let mut payload = Leb128Writer::new();
    payload.write_long(METADATA_RECORD_ID);
    payload.write_long(start_ticks);
    payload.write_long(duration_ticks);
    // metadata id
    payload.write_long(0);
    payload.write_int(table.strings.len() as i32);
    for s in &table.strings {
        payload.write_string(Some(s));
    }
    root.write(&table, &mut payload);
    w.write_record(payload.as_slice());
}

/// Decode the metadata record at `offset` and return its root element.
pub fn read_metadata_record(data: &[u8], offset: usize, compressed: bool) -> Result<Element> {
    read_root(data, offset, compressed)
        .map_err(|e| FormatError::invalid(format!("bad metadata record at {offset}: {e:#}")).into())
}

fn read_root(data: &[u8], offset: usize, compressed: bool) -> Result<Element> {
    let mut input = DataInput::at(data, offset, compressed);
    let size = input.read_long()?;
    let end = offset
        .checked_add(size as usize)
        .filter(|end| size > 0 && *end <= data.len())
        .with_context(|| format!("record size {size} out of range"))?;
    let mut input = DataInput::at(&data[..end], input.position(), compressed);
    let record_type = input.read_long()?;
    if record_type != METADATA_RECORD_ID {
        bail!("expected metadata record, found type {record_type}");
    }
    let _start = input.read_long()?;
    let _duration = input.read_long()?;
    let _metadata_id = input.read_long()?;
    let count = input.read_len()?;
    let mut strings = Vec::with_capacity(count);
    for _ in 0..count {
        strings.push(match input.read_string()? {
            RawString::Inline(s) => s,
            RawString::Null => String::new(),
            RawString::ConstantPool(_) => bail!("constant pool string in metadata"),
        });
    }
    Element::read(&mut input, &strings, 0)
}
