//! The object datastore
//!
//! This crate assembles the full engine behind one handle:
//! - [`Datastore`]: store, load, refresh, and delete registered
//!   instances, with key fields filled in place
//! - [`FindCommand`]: the fluent find surface, from filters and OR
//!   branches down to cursors and worker-thread terminators
//! - [`Transaction`]: buffered writes with atomic commit and
//!   ancestor-scoped queries
//! - [`RecordStore`]: the adapter contract a backing store implements,
//!   with [`MemoryStore`] as the bundled reference adapter
//!
//! Translation between instances and flat records lives in
//! `graft-translate`; query composition lives in `graft-query`. This
//! crate wires both to a store and owns the operational policy in
//! [`Config`].

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapter;
pub mod config;
pub mod datastore;
pub mod error;
pub mod find;
pub mod memory;
pub mod task;

pub use adapter::{RecordStore, StoreError, StoreTxn};
pub use config::{Config, DEFAULT_ACTIVATION_DEPTH};
pub use datastore::{Datastore, DatastoreBuilder, Transaction};
pub use error::{Error, Result};
pub use find::{FindCommand, FindSpec, FoundIter};
pub use memory::MemoryStore;
pub use task::Deferred;
