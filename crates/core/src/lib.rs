//! Core types for Graft
//!
//! This crate defines the foundational types used throughout the system:
//! - Path: Dotted attribute address inside a flattened record
//! - Datum: Unified storage value enum
//! - Property: One (path, datum, indexed) attribute
//! - PropertySet: Sorted, duplicate-free attribute collection with prefix views
//! - Key: Typed record identity with optional ancestry
//! - Ancestor: Parent field state (none, by key, or live instance)
//! - Record: A key plus its attributes, the storage unit
//! - Schema: Registered type descriptors (field tables, accessors, mutators)
//! - Limits: Structural bounds shared by every layer

#![warn(missing_docs)]
#![warn(clippy::all)]

// Module declarations
pub mod datum;
pub mod key;
pub mod limits;
pub mod path;
pub mod property;
pub mod record;
pub mod schema;

// Re-export commonly used types at the crate root
pub use datum::{Datum, DatumJsonError, DatumKind};
pub use key::{validate_kind, Ancestor, IdValue, Key, KeyError, RESERVED_PREFIX};
pub use limits::{MAX_COMPILED_QUERIES, MAX_EMBED_DEPTH, MAX_PATH_SEGMENTS, MAX_PATH_STRING};
pub use path::{Path, PathError};
pub use property::{DuplicatePath, PrefixGroup, PrefixGroups, Property, PropertySet, PropsView};
pub use record::Record;
pub use schema::{
    AncestorRead, AncestorWrite, FieldDescriptor, FieldPolicy, FieldRead, FieldRule, FieldShape,
    FieldWrite, IdKind, KindBuilder, Registry, Scalar, SchemaBuilder, SchemaError, TypeDescriptor,
    VariantField, VariantTable, VARIANT_TAG,
};
