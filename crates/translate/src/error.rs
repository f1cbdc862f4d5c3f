//! Encode and decode failure taxonomy

use graft_convert::ConvertError;
use graft_core::path::Path;
use graft_core::property::DuplicatePath;
use graft_core::schema::SchemaError;
use thiserror::Error;

/// Failures while flattening an instance into properties
#[derive(Debug, Error)]
pub enum EncodeError {
    /// Two fields produced a property at the same path
    #[error(transparent)]
    Duplicate(#[from] DuplicatePath),

    /// A field value did not convert to its storage kind
    #[error("field at {path}: {source}")]
    Conversion {
        /// Path of the field being encoded
        path: Path,
        /// The conversion failure
        #[source]
        source: ConvertError,
    },

    /// An accessor or descriptor lookup failed
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Nesting exceeded the structural bound
    #[error("embedding at {path} exceeds the depth limit of {max}")]
    DepthExceeded {
        /// Path where the limit tripped
        path: Path,
        /// The limit that was exceeded
        max: usize,
    },

    /// An embedded list element carried a nested list value
    #[error("list element at {path} holds a nested list, which cannot be columnized")]
    NestedList {
        /// Path of the offending column
        path: Path,
    },

    /// A map key cannot serve as a path segment
    #[error("map key {key:?} at {path} is not usable as a path segment")]
    BadMapKey {
        /// Path of the map field
        path: Path,
        /// The rejected key
        key: String,
    },

    /// A collapsed field spread to more than one property
    #[error("collapsed field at {path} produced more than one property")]
    CollapsedSpread {
        /// Path of the collapsed field
        path: Path,
    },

    /// A text-id field was left empty, so no key can be built
    #[error("kind {kind:?} uses text ids and the id field is empty")]
    MissingName {
        /// The kind being encoded
        kind: String,
    },

    /// The id component was written twice in one encode session
    #[error("the key id was set twice while encoding")]
    IdConflict,

    /// The parent component was written twice in one encode session
    #[error("the parent reference was set twice while encoding")]
    ParentConflict,

    /// Packing a subtree into a blob failed
    #[error("packing subtree at {path} failed: {source}")]
    Pack {
        /// Path of the packed field
        path: Path,
        /// The serializer failure
        #[source]
        source: rmp_serde::encode::Error,
    },
}

/// Failures while rebuilding an instance from properties
#[derive(Debug, Error)]
pub enum DecodeError {
    /// A stored value did not convert to the field's natural kind
    #[error("field at {path}: {source}")]
    Conversion {
        /// Path of the field being decoded
        path: Path,
        /// The conversion failure
        #[source]
        source: ConvertError,
    },

    /// A mutator or descriptor lookup failed
    #[error("field at {path}: {source}")]
    Schema {
        /// Path of the field being decoded
        path: Path,
        /// The schema failure
        #[source]
        source: SchemaError,
    },

    /// A polymorphic group arrived without its discriminator
    #[error("variant group at {path} has no discriminator attribute")]
    MissingDiscriminator {
        /// Path of the variant field
        path: Path,
    },

    /// A property held the wrong structural shape for its field
    #[error("property at {path} does not match the field's shape")]
    WrongShape {
        /// Path of the field being decoded
        path: Path,
    },

    /// Unpacking a packed blob failed
    #[error("unpacking subtree at {path} failed: {source}")]
    Unpack {
        /// Path of the packed field
        path: Path,
        /// The deserializer failure
        #[source]
        source: rmp_serde::decode::Error,
    },

    /// A packed blob contained an invalid relative path
    #[error("packed subtree at {path} contains invalid path {inner:?}")]
    PackedPath {
        /// Path of the packed field
        path: Path,
        /// The unparseable relative path text
        inner: String,
    },

    /// Loading a referenced parent failed
    #[error("loading parent {key} failed: {reason}")]
    ParentLoad {
        /// The parent key being loaded
        key: graft_core::key::Key,
        /// The collaborator's failure, rendered
        reason: String,
    },
}
