//! Per-type constant pools on the writing side.
//!
//! Values of pooled types are written by index. Equal values share one
//! index for the whole recording; indices start at 1, 0 being null.
//! Encoded entries are kept so that every chunk can repeat the full pool
//! without encoding values again.

use std::collections::{BTreeMap, HashMap};

use anyhow::Result;

use super::encoder::write_struct;
use super::types::{TypeHandle, TypeRegistry};
use super::value::TypedValue;
use crate::leb128::Leb128Writer;

#[derive(Debug, Default)]
struct Pool {
    indices: HashMap<TypedValue, i64>,
    values: Vec<TypedValue>,
    encoded: Vec<Vec<u8>>,
}

#[derive(Debug, Default)]
pub struct WriterConstantPools {
    pools: BTreeMap<TypeHandle, Pool>,
}

impl WriterConstantPools {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of `value` in its type's pool, adding it if new.
    pub fn add(&mut self, value: &TypedValue) -> i64 {
        if value.is_null() {
            return 0;
        }
        let pool = self.pools.entry(value.value_type()).or_default();
        if let Some(index) = pool.indices.get(value) {
            return *index;
        }
        pool.values.push(value.clone());
        let index = pool.values.len() as i64;
        pool.indices.insert(value.clone(), index);
        index
    }

    pub fn len(&self, handle: TypeHandle) -> usize {
        self.pools.get(&handle).map_or(0, |p| p.values.len())
    }

    pub fn is_empty(&self) -> bool {
        self.pools.values().all(|p| p.values.is_empty())
    }

    /// Encode every entry not encoded yet. Encoding an entry can add
    /// entries to other pools, so this runs until nothing new shows up.
    fn encode_pending(&mut self, registry: &TypeRegistry) -> Result<()> {
        loop {
            let pending: Vec<TypedValue> = self
                .pools
                .values()
                .flat_map(|p| p.values[p.encoded.len()..].iter().cloned())
                .collect();
            if pending.is_empty() {
                return Ok(());
            }
            for value in pending {
                let mut w = Leb128Writer::new();
                write_struct(registry, self, &value, &mut w)?;
                if let Some(pool) = self.pools.get_mut(&value.value_type()) {
                    pool.encoded.push(w.into_inner());
                }
            }
        }
    }

    /// Write the pool section of a checkpoint: the pool count, then per
    /// pool the class id, entry count and `(index, value)` pairs.
    pub fn write_pools(&mut self, registry: &TypeRegistry, w: &mut Leb128Writer) -> Result<()> {
        self.encode_pending(registry)?;
        let pools: Vec<(&TypeHandle, &Pool)> = self
            .pools
            .iter()
            .filter(|(_, p)| !p.encoded.is_empty())
            .collect();
        w.write_int(pools.len() as i32);
        for (handle, pool) in pools {
            w.write_long(registry.id(*handle));
            w.write_int(pool.encoded.len() as i32);
            for (i, bytes) in pool.encoded.iter().enumerate() {
                w.write_long(i as i64 + 1);
                w.write_bytes(bytes);
            }
        }
        Ok(())
    }
}
