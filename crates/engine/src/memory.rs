//! The bundled in-memory record store
//!
//! Records live in a key-ordered map behind a read-write lock, so the
//! default result order (no sorts) is key order and ancestor families
//! stay contiguous. Ids are allocated from per-kind counters. The store
//! is cheaply cloneable; clones share state.

use crate::adapter::{RecordStore, StoreError, StoreTxn};
use dashmap::DashMap;
use graft_core::key::Key;
use graft_core::property::PropertySet;
use graft_core::record::Record;
use graft_query::{order_records, NativeQuery, QueryRun};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::trace;

#[derive(Default)]
struct Shared {
    records: RwLock<BTreeMap<Key, Record>>,
    counters: DashMap<String, i64>,
}

/// An in-memory [`RecordStore`]
#[derive(Clone, Default)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl MemoryStore {
    /// An empty store
    pub fn new() -> Self {
        MemoryStore::default()
    }

    /// Number of records held
    pub fn len(&self) -> usize {
        self.shared.records.read().len()
    }

    /// True when the store holds nothing
    pub fn is_empty(&self) -> bool {
        self.shared.records.read().is_empty()
    }

    fn matching(&self, query: &NativeQuery) -> Vec<Record> {
        let records = self.shared.records.read();
        let mut matched: Vec<Record> = records
            .values()
            .filter(|r| query.matches(r))
            .cloned()
            .collect();
        if !query.sorts.is_empty() {
            order_records(&mut matched, &query.sorts);
        }
        if query.keys_only {
            for record in &mut matched {
                *record = Record::new(record.key().clone(), PropertySet::new());
            }
        }
        matched
    }
}

impl RecordStore for MemoryStore {
    fn put(&self, records: Vec<Record>) -> Result<(), StoreError> {
        let mut map = self.shared.records.write();
        for record in records {
            map.insert(record.key().clone(), record);
        }
        Ok(())
    }

    fn get(&self, key: &Key) -> Result<Option<Record>, StoreError> {
        Ok(self.shared.records.read().get(key).cloned())
    }

    fn delete(&self, keys: &[Key]) -> Result<(), StoreError> {
        let mut map = self.shared.records.write();
        for key in keys {
            map.remove(key);
        }
        Ok(())
    }

    fn allocate_id(&self, kind: &str) -> Result<i64, StoreError> {
        let mut counter = self.shared.counters.entry(kind.to_string()).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }

    fn run(&self, query: &NativeQuery) -> Result<QueryRun, StoreError> {
        Ok(query.window(self.matching(query)))
    }

    fn count(&self, query: &NativeQuery) -> Result<usize, StoreError> {
        Ok(query.window(self.matching(query)).records.len())
    }

    fn begin(&self) -> Result<Box<dyn StoreTxn>, StoreError> {
        Ok(Box::new(MemoryTxn {
            shared: Arc::clone(&self.shared),
            buffer: Vec::new(),
        }))
    }
}

enum BufferedOp {
    Put(Record),
    Delete(Key),
}

struct MemoryTxn {
    shared: Arc<Shared>,
    buffer: Vec<BufferedOp>,
}

impl StoreTxn for MemoryTxn {
    fn put(&mut self, records: Vec<Record>) -> Result<(), StoreError> {
        self.buffer.extend(records.into_iter().map(BufferedOp::Put));
        Ok(())
    }

    fn delete(&mut self, keys: &[Key]) -> Result<(), StoreError> {
        self.buffer
            .extend(keys.iter().cloned().map(BufferedOp::Delete));
        Ok(())
    }

    fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let mut map = self.shared.records.write();
        trace!(ops = self.buffer.len(), "committing buffered operations");
        for op in self.buffer {
            match op {
                BufferedOp::Put(record) => {
                    map.insert(record.key().clone(), record);
                }
                BufferedOp::Delete(key) => {
                    map.remove(&key);
                }
            }
        }
        Ok(())
    }
}
