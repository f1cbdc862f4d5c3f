//! The backing store contract
//!
//! A [`RecordStore`] holds flat records by key and executes native
//! queries against its own result order. The engine owns translation and
//! query composition; adapters own persistence, indexing, and id
//! allocation. Transactions buffer writes on a handle until commit, and
//! reads issued while a transaction is open see the pre-commit state.

use graft_core::key::Key;
use graft_core::record::Record;
use graft_query::{NativeQuery, QueryRun};
use thiserror::Error;

/// Failures surfaced by a backing store
///
/// The bundled in-memory store never raises these; the contract is
/// fallible for adapters backed by real services.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not serve the request
    #[error("backing store unavailable: {reason}")]
    Unavailable {
        /// Adapter-specific diagnosis
        reason: String,
    },

    /// An operation reached a transaction handle that already closed
    #[error("transaction handle is already closed")]
    TransactionClosed,
}

/// A store of flat records addressed by key
pub trait RecordStore: Send + Sync {
    /// Insert or replace records at their keys
    fn put(&self, records: Vec<Record>) -> Result<(), StoreError>;

    /// The record at `key`, if present
    fn get(&self, key: &Key) -> Result<Option<Record>, StoreError>;

    /// Remove the records at `keys`; absent keys are ignored
    fn delete(&self, keys: &[Key]) -> Result<(), StoreError>;

    /// A fresh numeric id for `kind`, never zero and never repeated
    fn allocate_id(&self, kind: &str) -> Result<i64, StoreError>;

    /// Execute one native query over the store's result order
    ///
    /// Results arrive sorted by the query's directives (key order when it
    /// has none) with the fetch window already applied.
    fn run(&self, query: &NativeQuery) -> Result<QueryRun, StoreError>;

    /// How many records the query would yield
    fn count(&self, query: &NativeQuery) -> Result<usize, StoreError>;

    /// Open a write buffer that applies atomically on commit
    fn begin(&self) -> Result<Box<dyn StoreTxn>, StoreError>;
}

/// A transaction handle: buffered writes, atomic commit
///
/// Dropping a handle without committing discards the buffer.
pub trait StoreTxn: Send {
    /// Buffer record upserts
    fn put(&mut self, records: Vec<Record>) -> Result<(), StoreError>;

    /// Buffer deletions
    fn delete(&mut self, keys: &[Key]) -> Result<(), StoreError>;

    /// Apply every buffered write in order
    fn commit(self: Box<Self>) -> Result<(), StoreError>;
}
