//! Session-wide canonical constant pools.
//!
//! Raw constant indices only mean something inside the chunk that declared
//! them, so each chunk's decoder keeps its own index table. Once a constant
//! is decoded it is interned here by value: equal payloads of one type map to
//! one shared value object for the whole parse session, whichever chunk or
//! worker decoded them first.

use std::sync::Arc;

use dashmap::DashMap;

use super::value::Value;

#[derive(Debug)]
pub struct ConstantPool {
    type_name: Arc<str>,
    entries: DashMap<Value, Value>,
}

impl ConstantPool {
    fn new(type_name: &str) -> Self {
        Self {
            type_name: type_name.into(),
            entries: DashMap::new(),
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// The canonical instance equal to `value`, if one was interned.
    pub fn get(&self, value: &Value) -> Option<Value> {
        self.entries.get(value).map(|r| r.value().clone())
    }

    /// Store `value` unless an equal value is there already, and return the
    /// canonical instance.
    pub fn intern(&self, value: Value) -> Value {
        if value.is_null() {
            return value;
        }
        if let Some(canonical) = self.entries.get(&value) {
            return canonical.value().clone();
        }
        self.entries
            .entry(value.clone())
            .or_insert(value)
            .value()
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Per-type pools, created on first use.
#[derive(Debug, Default)]
pub struct ConstantPools {
    pools: DashMap<String, Arc<ConstantPool>>,
}

impl ConstantPools {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pool_for(&self, type_key: &str) -> Arc<ConstantPool> {
        if let Some(pool) = self.pools.get(type_key) {
            return pool.clone();
        }
        self.pools
            .entry(type_key.to_string())
            .or_insert_with(|| Arc::new(ConstantPool::new(type_key)))
            .clone()
    }

    /// Entry count per type, sorted by type name.
    pub fn sizes(&self) -> Vec<(String, usize)> {
        let mut sizes: Vec<(String, usize)> = self
            .pools
            .iter()
            .map(|r| (r.key().clone(), r.value().len()))
            .collect();
        sizes.sort();
        sizes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::value::StructValue;
    use std::thread;

    fn thread_value(name: &str) -> Value {
        Value::Struct(Arc::new(StructValue {
            type_name: "java.lang.Thread".into(),
            fields: vec![("name".into(), Value::String(name.into()))],
        }))
    }

    #[test]
    fn test_equal_payloads_share_an_instance() {
        let pools = ConstantPools::new();
        let first = pools.pool_for("java.lang.Thread").intern(thread_value("main"));
        let again = pools.pool_for("java.lang.Thread").intern(thread_value("main"));
        let other = pools.pool_for("java.lang.Thread").intern(thread_value("worker"));
        assert!(first.same_instance(&again));
        assert!(!first.same_instance(&other));
        assert!(pools
            .pool_for("java.lang.Thread")
            .get(&thread_value("main"))
            .unwrap()
            .same_instance(&first));
        assert!(pools.pool_for("other").get(&thread_value("main")).is_none());
        assert!(pools.pool_for("other").intern(Value::Null).is_null());
        assert_eq!(
            pools.sizes(),
            vec![("java.lang.Thread".to_string(), 2), ("other".to_string(), 0)]
        );
    }

    #[test]
    fn test_concurrent_interning_agrees() {
        let pools = Arc::new(ConstantPools::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pools = pools.clone();
                thread::spawn(move || {
                    (0..100)
                        .map(|i| pools.pool_for("t").intern(thread_value(&format!("t{i}"))))
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let results: Vec<Vec<Value>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for other in &results[1..] {
            for (a, b) in results[0].iter().zip(other) {
                assert!(a.same_instance(b));
            }
        }
        assert_eq!(pools.pool_for("t").len(), 100);
    }
}
