//! The unified engine failure type

use crate::adapter::StoreError;
use graft_core::key::Key;
use graft_core::path::PathError;
use graft_core::schema::SchemaError;
use graft_query::QueryError;
use graft_translate::{DecodeError, EncodeError};
use thiserror::Error;

/// Result alias for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Everything a datastore operation can fail with
#[derive(Debug, Error)]
pub enum Error {
    /// A filter or sort named an unparseable attribute path
    #[error(transparent)]
    Path(#[from] PathError),

    /// Schema registration or accessor failure
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Flattening an instance failed
    #[error(transparent)]
    Encode(#[from] EncodeError),

    /// Rebuilding an instance failed
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Query compilation or merging failed
    #[error(transparent)]
    Query(#[from] QueryError),

    /// The backing store failed
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A load or refresh found nothing at the key
    #[error("no record at {key}")]
    NoSuchRecord {
        /// The missing key
        key: Key,
    },

    /// A key was presented to a type registered under another kind
    #[error("key {key} cannot address kind {expected:?}")]
    KindMismatch {
        /// The kind the requested type maps to
        expected: String,
        /// The key that named something else
        key: Key,
    },

    /// A uniqueness-checked store found the key occupied
    #[error("a record already occupies {key}")]
    UniqueKeyViolation {
        /// The occupied key
        key: Key,
    },

    /// The instance's key fields cannot produce a complete key
    #[error("an instance of kind {kind:?} cannot name its own key")]
    KeyUnresolvable {
        /// The kind whose key fields are incomplete
        kind: String,
    },

    /// A deferred worker died instead of returning
    #[error("deferred work failed: {reason}")]
    Internal {
        /// The worker's panic payload, rendered
        reason: String,
    },
}
