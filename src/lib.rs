//! Graft - object mapping and query composition over flat record stores
//!
//! Graft maps object graphs onto schemaless keyed records and back:
//! register types once, then store, load, and find live instances while
//! ancestry, embedded values, and polymorphic fields flatten into
//! path-addressed attributes.
//!
//! # Quick Start
//!
//! ```ignore
//! use graftdb::{Datastore, FilterOp, MemoryStore, SchemaBuilder};
//!
//! #[derive(Debug, Default)]
//! struct Museum { id: i64, name: String }
//!
//! let mut schema = SchemaBuilder::new();
//! schema.kind::<Museum>("museum", |k| {
//!     k.id_int("id", |m| &m.id, |m| &mut m.id);
//!     k.field::<String>("name", |m| &m.name, |m| &mut m.name);
//! });
//!
//! let db = Datastore::builder(schema.seal()?).open(MemoryStore::new());
//!
//! let mut museum = Museum { id: 0, name: "tate".into() };
//! let key = db.store(&mut museum)?;
//!
//! let found = db.find::<Museum>()
//!     .filter("name", FilterOp::Eq, "tate")
//!     .return_all()?;
//! ```
//!
//! # Architecture
//!
//! The engine crate carries the whole operational surface and is
//! re-exported wholesale. The layers underneath it (record model, datum
//! converters, object translation, query composition) are separate
//! crates; the types callers meet at the API boundary are re-exported
//! here alongside the engine.

// Re-export the operational API from graft-engine
pub use graft_engine::*;

pub use graft_core::datum::{Datum, DatumKind};
pub use graft_core::key::{Ancestor, IdValue, Key};
pub use graft_core::path::{Path, PathError};
pub use graft_core::property::{Property, PropertySet};
pub use graft_core::record::Record;
pub use graft_core::schema::{Registry, SchemaBuilder, SchemaError, VariantField};
pub use graft_query::{Cursor, FilterOp, Merge, QueryError};
pub use graft_translate::{DecodeError, EncodeError};
