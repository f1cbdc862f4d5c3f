//! Schema registration and field descriptors
//!
//! The translation engine never reflects over types at runtime. Instead,
//! every storable type is registered once, up front, into a [`Registry`]:
//! per type, a kind name, a constructor, and an ordered table of
//! [`FieldDescriptor`] entries (storage name, shape tag, accessor, mutator).
//! The registry is sealed after registration and shared immutably.
//!
//! Registration is closure-based:
//!
//! ```
//! use graft_core::schema::SchemaBuilder;
//!
//! #[derive(Default)]
//! struct Widget {
//!     id: i64,
//!     label: String,
//! }
//!
//! let mut schema = SchemaBuilder::new();
//! schema.kind::<Widget>("widget", |t| {
//!     t.id_int("id", |w| &w.id, |w| &mut w.id);
//!     t.field("label", |w: &Widget| &w.label, |w| &mut w.label);
//! });
//! let registry = schema.seal().unwrap();
//! assert!(registry.descriptor_by_kind("widget").is_ok());
//! ```
//!
//! Field tables are sorted by storage name at seal time; encode and decode
//! both walk that order, which is what keeps prefix grouping aligned.

use crate::datum::{Datum, DatumKind};
use crate::key::{validate_kind, Ancestor, IdValue, Key, KeyError};
use rustc_hash::{FxHashMap, FxHashSet};
use std::any::{type_name, Any, TypeId};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Reserved attribute name for the polymorphic discriminator
///
/// Lives one segment under a variant field's path; user field names may
/// not start with `__`.
pub const VARIANT_TAG: &str = "__variant";

/// Schema registration and accessor errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// Kind name failed validation
    #[error("invalid kind name {kind:?}")]
    InvalidKindName {
        /// The rejected kind name
        kind: String,
        /// The underlying rule violation
        #[source]
        source: KeyError,
    },

    /// Two registrations claimed the same kind name
    #[error("kind {kind:?} registered twice")]
    DuplicateKind {
        /// The contested kind name
        kind: String,
    },

    /// The same Rust type was registered twice
    #[error("type {type_name} registered twice")]
    DuplicateType {
        /// The contested type
        type_name: &'static str,
    },

    /// Two fields of one kind share a storage name
    #[error("kind {kind:?} declares field {field:?} twice")]
    DuplicateField {
        /// The kind being registered
        kind: String,
        /// The contested field name
        field: String,
    },

    /// Field name is empty or contains the path separator
    #[error("kind {kind:?} field {field:?} is not a valid path segment")]
    InvalidFieldName {
        /// The kind being registered
        kind: String,
        /// The rejected field name
        field: String,
    },

    /// Field name collides with the reserved `__` attribute space
    #[error("kind {kind:?} field {field:?} uses the reserved '__' prefix")]
    ReservedFieldName {
        /// The kind being registered
        kind: String,
        /// The rejected field name
        field: String,
    },

    /// More than one key field on a kind
    #[error("kind {kind:?} declares more than one key field")]
    MultipleKeyFields {
        /// The offending kind
        kind: String,
    },

    /// More than one parent field on a kind
    #[error("kind {kind:?} declares more than one parent field")]
    MultipleParentFields {
        /// The offending kind
        kind: String,
    },

    /// A policy flag does not apply to the field's shape
    #[error("kind {kind:?} field {field:?}: {reason}")]
    BadPolicy {
        /// The kind being registered
        kind: String,
        /// The field carrying the policy
        field: String,
        /// Which rule was violated
        reason: &'static str,
    },

    /// An embedded/parent/variant target type was never registered
    #[error("kind {kind:?} field {field:?} targets unregistered type {target}")]
    UnregisteredTarget {
        /// The kind being registered
        kind: String,
        /// The field naming the target
        field: String,
        /// The missing type
        target: &'static str,
    },

    /// Lookup by type found nothing
    #[error("type {type_name} is not registered")]
    UnknownType {
        /// The unregistered type
        type_name: &'static str,
    },

    /// Lookup by kind found nothing
    #[error("kind {kind:?} is not registered")]
    UnknownKind {
        /// The unregistered kind
        kind: String,
    },

    /// An accessor was handed an instance of the wrong type
    #[error("expected an instance of {expected}")]
    Downcast {
        /// The type the accessor was built for
        expected: &'static str,
    },

    /// A mutator was handed a value of the wrong write shape
    #[error("field expects a {expected} write")]
    WrongWrite {
        /// The shape the mutator accepts
        expected: &'static str,
    },

    /// A scalar field received a datum of the wrong kind
    #[error("expected a {expected} datum, got {got}")]
    WrongKind {
        /// The declared kind
        expected: DatumKind,
        /// The kind that arrived
        got: DatumKind,
    },

    /// An integer narrowed out of the field's range
    #[error("integer {value} is out of range for the field")]
    IntOutOfRange {
        /// The offending value
        value: i64,
    },

    /// Text failed to parse as the field's type
    #[error("text does not parse as {ty}")]
    Unparseable {
        /// The target type name
        ty: &'static str,
    },

    /// A discriminator tag named no registered variant
    #[error("unknown variant tag {tag:?}")]
    UnknownVariant {
        /// The tag that failed to dispatch
        tag: String,
    },
}

// ============================================================================
// Scalar leaf types
// ============================================================================

/// A Rust type storable as a single scalar attribute
///
/// `from_datum` is strict about kinds; the translation layer runs the
/// converter registry first, so by the time a mutator executes the datum
/// already has the field's natural kind.
pub trait Scalar: Clone + 'static {
    /// The natural storage kind of this type
    const KIND: DatumKind;

    /// Render to a datum
    fn to_datum(&self) -> Datum;

    /// Rebuild from a datum of the natural kind
    fn from_datum(datum: Datum) -> Result<Self, SchemaError>;
}

fn wrong_kind(expected: DatumKind, got: &Datum) -> SchemaError {
    SchemaError::WrongKind {
        expected,
        got: got.kind(),
    }
}

impl Scalar for bool {
    const KIND: DatumKind = DatumKind::Bool;

    fn to_datum(&self) -> Datum {
        Datum::Bool(*self)
    }

    fn from_datum(datum: Datum) -> Result<Self, SchemaError> {
        datum.as_bool().ok_or_else(|| wrong_kind(Self::KIND, &datum))
    }
}

impl Scalar for i64 {
    const KIND: DatumKind = DatumKind::Int;

    fn to_datum(&self) -> Datum {
        Datum::Int(*self)
    }

    fn from_datum(datum: Datum) -> Result<Self, SchemaError> {
        datum.as_int().ok_or_else(|| wrong_kind(Self::KIND, &datum))
    }
}

impl Scalar for i32 {
    const KIND: DatumKind = DatumKind::Int;

    fn to_datum(&self) -> Datum {
        Datum::Int(i64::from(*self))
    }

    fn from_datum(datum: Datum) -> Result<Self, SchemaError> {
        let value = datum.as_int().ok_or_else(|| wrong_kind(Self::KIND, &datum))?;
        i32::try_from(value).map_err(|_| SchemaError::IntOutOfRange { value })
    }
}

impl Scalar for u32 {
    const KIND: DatumKind = DatumKind::Int;

    fn to_datum(&self) -> Datum {
        Datum::Int(i64::from(*self))
    }

    fn from_datum(datum: Datum) -> Result<Self, SchemaError> {
        let value = datum.as_int().ok_or_else(|| wrong_kind(Self::KIND, &datum))?;
        u32::try_from(value).map_err(|_| SchemaError::IntOutOfRange { value })
    }
}

impl Scalar for f64 {
    const KIND: DatumKind = DatumKind::Float;

    fn to_datum(&self) -> Datum {
        Datum::Float(*self)
    }

    fn from_datum(datum: Datum) -> Result<Self, SchemaError> {
        datum.as_float().ok_or_else(|| wrong_kind(Self::KIND, &datum))
    }
}

impl Scalar for f32 {
    const KIND: DatumKind = DatumKind::Float;

    fn to_datum(&self) -> Datum {
        Datum::Float(f64::from(*self))
    }

    fn from_datum(datum: Datum) -> Result<Self, SchemaError> {
        // Narrowing back to f32 keeps the round-trip identity for values
        // that originated as f32.
        datum
            .as_float()
            .map(|x| x as f32)
            .ok_or_else(|| wrong_kind(Self::KIND, &datum))
    }
}

impl Scalar for String {
    const KIND: DatumKind = DatumKind::Text;

    fn to_datum(&self) -> Datum {
        Datum::Text(self.clone())
    }

    fn from_datum(datum: Datum) -> Result<Self, SchemaError> {
        match datum {
            Datum::Text(s) => Ok(s),
            other => Err(wrong_kind(Self::KIND, &other)),
        }
    }
}

impl Scalar for Vec<u8> {
    const KIND: DatumKind = DatumKind::Blob;

    fn to_datum(&self) -> Datum {
        Datum::Blob(self.clone())
    }

    fn from_datum(datum: Datum) -> Result<Self, SchemaError> {
        match datum {
            Datum::Blob(b) => Ok(b),
            other => Err(wrong_kind(Self::KIND, &other)),
        }
    }
}

impl Scalar for chrono::DateTime<chrono::Utc> {
    const KIND: DatumKind = DatumKind::Stamp;

    fn to_datum(&self) -> Datum {
        Datum::Stamp(*self)
    }

    fn from_datum(datum: Datum) -> Result<Self, SchemaError> {
        datum.as_stamp().ok_or_else(|| wrong_kind(Self::KIND, &datum))
    }
}

impl Scalar for Key {
    const KIND: DatumKind = DatumKind::Ref;

    fn to_datum(&self) -> Datum {
        Datum::Ref(self.clone())
    }

    fn from_datum(datum: Datum) -> Result<Self, SchemaError> {
        match datum {
            Datum::Ref(k) => Ok(k),
            other => Err(wrong_kind(Self::KIND, &other)),
        }
    }
}

impl Scalar for uuid::Uuid {
    const KIND: DatumKind = DatumKind::Text;

    fn to_datum(&self) -> Datum {
        Datum::Text(self.hyphenated().to_string())
    }

    fn from_datum(datum: Datum) -> Result<Self, SchemaError> {
        let text = match &datum {
            Datum::Text(s) => s,
            other => return Err(wrong_kind(Self::KIND, other)),
        };
        text.parse()
            .map_err(|_| SchemaError::Unparseable { ty: "uuid" })
    }
}

// ============================================================================
// Field shapes, reads and writes
// ============================================================================

/// Which id representation a key field uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdKind {
    /// `i64` field; `0` means unset, completed by allocation
    Int,
    /// `String` field; the empty string means unset and fails encode
    Text,
}

/// The erased shape of a registered field
///
/// `target_name` rides along for diagnostics; `TypeId` alone cannot name
/// the type it identifies.
#[derive(Clone)]
pub enum FieldShape {
    /// A single scalar attribute
    Scalar {
        /// Natural datum kind of the field type
        kind: DatumKind,
        /// Whether the Rust field is an `Option`
        optional: bool,
    },
    /// `Vec` of scalars, stored as one multi-valued attribute
    ScalarList {
        /// Natural datum kind of the element type
        kind: DatumKind,
    },
    /// A nested registered type
    Embedded {
        /// Target type
        target: TypeId,
        /// Target type name for diagnostics
        target_name: &'static str,
        /// Whether the Rust field is an `Option`
        optional: bool,
    },
    /// `Vec` of a nested registered type (parallel-list encoding)
    EmbeddedList {
        /// Element type
        target: TypeId,
        /// Element type name for diagnostics
        target_name: &'static str,
    },
    /// `BTreeMap<String, _>` of a nested registered type
    EmbeddedMap {
        /// Value type
        target: TypeId,
        /// Value type name for diagnostics
        target_name: &'static str,
    },
    /// A polymorphic field dispatched through a discriminator tag
    Variant {
        /// The tag table for the enum
        table: Arc<VariantTable>,
    },
    /// The key-id field
    KeyId {
        /// Numeric or text id
        kind: IdKind,
    },
    /// The parent (ancestor) field
    Parent {
        /// Parent type
        target: TypeId,
        /// Parent type name for diagnostics
        target_name: &'static str,
    },
}

impl fmt::Debug for FieldShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldShape::Scalar { kind, optional } => f
                .debug_struct("Scalar")
                .field("kind", kind)
                .field("optional", optional)
                .finish(),
            FieldShape::ScalarList { kind } => {
                f.debug_struct("ScalarList").field("kind", kind).finish()
            }
            FieldShape::Embedded {
                target_name,
                optional,
                ..
            } => f
                .debug_struct("Embedded")
                .field("target", target_name)
                .field("optional", optional)
                .finish(),
            FieldShape::EmbeddedList { target_name, .. } => f
                .debug_struct("EmbeddedList")
                .field("target", target_name)
                .finish(),
            FieldShape::EmbeddedMap { target_name, .. } => f
                .debug_struct("EmbeddedMap")
                .field("target", target_name)
                .finish(),
            FieldShape::Variant { table } => {
                f.debug_struct("Variant").field("tags", &table.tags).finish()
            }
            FieldShape::KeyId { kind } => f.debug_struct("KeyId").field("kind", kind).finish(),
            FieldShape::Parent { target_name, .. } => f
                .debug_struct("Parent")
                .field("target", target_name)
                .finish(),
        }
    }
}

/// Per-field storage policy
#[derive(Debug, Clone)]
pub struct FieldPolicy {
    /// Whether the attribute(s) participate in indexes (default: true)
    pub indexed: bool,
    /// Storage kind override for scalar fields; converters bridge both ways
    pub store_as: Option<DatumKind>,
    /// Collapse a single-field embedded type to one attribute at the field path
    pub collapse: bool,
    /// Serialize the whole subtree into one opaque blob attribute
    pub packed: bool,
    /// Activation depth override for parent fields
    pub activation: Option<usize>,
}

impl Default for FieldPolicy {
    fn default() -> Self {
        FieldPolicy {
            indexed: true,
            store_as: None,
            collapse: false,
            packed: false,
            activation: None,
        }
    }
}

/// A borrowed read of one field's value
pub enum FieldRead<'a> {
    /// Scalar value; `None` is a null (unset `Option`)
    Scalar(Option<Datum>),
    /// Scalar list elements
    ScalarList(Vec<Datum>),
    /// Embedded instance; `None` is a null
    Embedded(Option<&'a dyn Any>),
    /// Embedded list elements
    EmbeddedList(Vec<&'a dyn Any>),
    /// Embedded map entries in key order
    EmbeddedMap(Vec<(&'a str, &'a dyn Any)>),
    /// Active variant: tag and payload
    Variant(&'static str, &'a dyn Any),
    /// The key id as declared (sentinels not yet applied)
    KeyId(IdValue),
    /// The parent field state
    Parent(AncestorRead<'a>),
}

impl fmt::Debug for FieldRead<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldRead::Scalar(value) => f.debug_tuple("Scalar").field(value).finish(),
            FieldRead::ScalarList(values) => f.debug_tuple("ScalarList").field(values).finish(),
            FieldRead::Embedded(value) => f
                .debug_tuple("Embedded")
                .field(&value.map(|_| "<dyn Any>"))
                .finish(),
            FieldRead::EmbeddedList(values) => f
                .debug_struct("EmbeddedList")
                .field("len", &values.len())
                .finish(),
            FieldRead::EmbeddedMap(entries) => f
                .debug_struct("EmbeddedMap")
                .field("keys", &entries.iter().map(|(k, _)| *k).collect::<Vec<_>>())
                .finish(),
            FieldRead::Variant(tag, _) => f.debug_tuple("Variant").field(tag).finish(),
            FieldRead::KeyId(id) => f.debug_tuple("KeyId").field(id).finish(),
            FieldRead::Parent(parent) => f.debug_tuple("Parent").field(parent).finish(),
        }
    }
}

/// Borrowed view of a parent field
pub enum AncestorRead<'a> {
    /// No parent
    None,
    /// Parent known by key
    Key(&'a Key),
    /// Live parent instance
    Instance {
        /// The parent's registered type
        target: TypeId,
        /// The instance
        value: &'a dyn Any,
    },
}

impl fmt::Debug for AncestorRead<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AncestorRead::None => f.write_str("None"),
            AncestorRead::Key(key) => f.debug_tuple("Key").field(key).finish(),
            AncestorRead::Instance { target, .. } => f
                .debug_struct("Instance")
                .field("target", target)
                .finish(),
        }
    }
}

/// An owned write into one field
pub enum FieldWrite {
    /// The null sentinel: clears an `Option`, resets containers, leaves
    /// non-optional scalars at their constructed default
    Null,
    /// Scalar value already normalized to the field's natural kind
    Scalar(Datum),
    /// Scalar list elements
    ScalarList(Vec<Datum>),
    /// Embedded instance (boxed as the target type)
    Embedded(Box<dyn Any>),
    /// Embedded list elements
    EmbeddedList(Vec<Box<dyn Any>>),
    /// Embedded map entries
    EmbeddedMap(Vec<(String, Box<dyn Any>)>),
    /// A fully built enum value (boxed as the field's enum type)
    Variant(Box<dyn Any>),
    /// The key id
    KeyId(IdValue),
    /// The parent field state
    Parent(AncestorWrite),
}

/// Owned parent-field state for writes and extraction
pub enum AncestorWrite {
    /// No parent
    None,
    /// Parent known by key
    Key(Key),
    /// Live parent instance (boxed as the parent type)
    Instance(Box<dyn Any>),
}

/// Read accessor over an erased instance
pub type ReadFn = Box<dyn for<'a> Fn(&'a dyn Any) -> Result<FieldRead<'a>, SchemaError> + Send + Sync>;
/// Write mutator over an erased instance
pub type WriteFn = Box<dyn Fn(&mut dyn Any, FieldWrite) -> Result<(), SchemaError> + Send + Sync>;
/// Extraction hook: swap a field's value out, leaving a default
pub type TakeFn = Box<dyn Fn(&mut dyn Any) -> Result<FieldWrite, SchemaError> + Send + Sync>;
/// Zero-argument constructor for an erased instance
pub type ConstructFn = Box<dyn Fn() -> Box<dyn Any> + Send + Sync>;

/// Dispatch table for a polymorphic enum field
pub struct VariantTable {
    /// All registered tags
    pub tags: &'static [&'static str],
    /// Tag → payload type
    pub payload_type: fn(&str) -> Option<TypeId>,
    /// Tag → payload type name for diagnostics
    pub payload_name: fn(&str) -> Option<&'static str>,
    /// Rebuild the enum from a tag and its payload
    pub build: fn(&str, Box<dyn Any>) -> Result<Box<dyn Any>, SchemaError>,
}

impl fmt::Debug for VariantTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VariantTable").field("tags", &self.tags).finish()
    }
}

/// A polymorphic field value: an enum whose variants each carry one
/// registered payload type
///
/// Implementations are hand-written per enum; the registry turns the
/// static methods into a [`VariantTable`] at registration time.
pub trait VariantField: 'static {
    /// The active variant's tag
    fn tag(&self) -> &'static str;

    /// The active variant's payload
    fn payload(&self) -> &dyn Any;

    /// All tags, in a stable order
    fn tags() -> &'static [&'static str]
    where
        Self: Sized;

    /// The payload type registered for a tag
    fn payload_type(tag: &str) -> Option<TypeId>
    where
        Self: Sized;

    /// The payload type name for a tag
    fn payload_name(tag: &str) -> Option<&'static str>
    where
        Self: Sized;

    /// Rebuild the enum from a tag and payload
    fn from_payload(tag: &str, payload: Box<dyn Any>) -> Result<Self, SchemaError>
    where
        Self: Sized;
}

// ============================================================================
// Descriptors
// ============================================================================

/// One registered field: storage name, shape, policy, accessor, mutator
pub struct FieldDescriptor {
    name: String,
    shape: FieldShape,
    policy: FieldPolicy,
    read: ReadFn,
    write: WriteFn,
    take: Option<TakeFn>,
}

impl FieldDescriptor {
    /// The storage name (one path segment)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The field's shape tag
    pub fn shape(&self) -> &FieldShape {
        &self.shape
    }

    /// The field's storage policy
    pub fn policy(&self) -> &FieldPolicy {
        &self.policy
    }

    /// Read the field from an instance
    pub fn read<'a>(&self, instance: &'a dyn Any) -> Result<FieldRead<'a>, SchemaError> {
        (self.read)(instance)
    }

    /// Write the field into an instance
    pub fn write(&self, instance: &mut dyn Any, value: FieldWrite) -> Result<(), SchemaError> {
        (self.write)(instance, value)
    }

    /// Swap the field's value out, leaving a default (parent fields only)
    pub fn take(&self, instance: &mut dyn Any) -> Result<FieldWrite, SchemaError> {
        match &self.take {
            Some(take) => take(instance),
            None => Err(SchemaError::WrongWrite {
                expected: "extractable parent",
            }),
        }
    }
}

impl fmt::Debug for FieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("name", &self.name)
            .field("shape", &self.shape)
            .finish()
    }
}

/// One registered type: kind, constructor, sorted field table
pub struct TypeDescriptor {
    type_id: TypeId,
    type_name: &'static str,
    kind: String,
    construct: ConstructFn,
    fields: Vec<FieldDescriptor>,
    key_field: Option<usize>,
    parent_field: Option<usize>,
}

impl TypeDescriptor {
    /// The registered Rust type
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// The Rust type name
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// The storage kind
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Construct a blank instance
    pub fn construct(&self) -> Box<dyn Any> {
        (self.construct)()
    }

    /// The fields in storage-name order
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Look up a field by storage name
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields
            .binary_search_by(|f| f.name.as_str().cmp(name))
            .ok()
            .map(|i| &self.fields[i])
    }

    /// The key field, if declared
    pub fn key_field(&self) -> Option<&FieldDescriptor> {
        self.key_field.map(|i| &self.fields[i])
    }

    /// The parent field, if declared
    pub fn parent_field(&self) -> Option<&FieldDescriptor> {
        self.parent_field.map(|i| &self.fields[i])
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("type", &self.type_name)
            .field("kind", &self.kind)
            .field("fields", &self.fields)
            .finish()
    }
}

// ============================================================================
// Registration
// ============================================================================

/// Policy chaining handle for the field just added
///
/// Returned by every `KindBuilder` field method so registrations read as
/// one fluent line per field.
pub struct FieldRule<'a> {
    policy: &'a mut FieldPolicy,
}

impl<'a> FieldRule<'a> {
    /// Exclude the attribute(s) from indexes
    pub fn unindexed(self) -> Self {
        self.policy.indexed = false;
        self
    }

    /// Store the scalar under a different datum kind
    pub fn store_as(self, kind: DatumKind) -> Self {
        self.policy.store_as = Some(kind);
        self
    }

    /// Collapse a single-field embedded type to the field path itself
    pub fn collapse(self) -> Self {
        self.policy.collapse = true;
        self
    }

    /// Serialize the whole subtree as one opaque blob attribute
    pub fn packed(self) -> Self {
        self.policy.packed = true;
        self
    }

    /// Cap how deep ancestor loading recurses through this field
    pub fn activation(self, depth: usize) -> Self {
        self.policy.activation = Some(depth);
        self
    }
}

/// Builder for one kind's field table, handed to the registration closure
pub struct KindBuilder<T> {
    fields: Vec<FieldDescriptor>,
    _marker: std::marker::PhantomData<fn(T)>,
}

fn downcast_ref<T: 'static>(any: &dyn Any) -> Result<&T, SchemaError> {
    any.downcast_ref::<T>().ok_or(SchemaError::Downcast {
        expected: type_name::<T>(),
    })
}

fn downcast_mut<T: 'static>(any: &mut dyn Any) -> Result<&mut T, SchemaError> {
    any.downcast_mut::<T>().ok_or(SchemaError::Downcast {
        expected: type_name::<T>(),
    })
}

fn downcast_box<T: 'static>(boxed: Box<dyn Any>) -> Result<Box<T>, SchemaError> {
    boxed.downcast::<T>().map_err(|_| SchemaError::Downcast {
        expected: type_name::<T>(),
    })
}

impl<T: 'static> KindBuilder<T> {
    fn new() -> Self {
        KindBuilder {
            fields: Vec::new(),
            _marker: std::marker::PhantomData,
        }
    }

    fn push(
        &mut self,
        name: &str,
        shape: FieldShape,
        read: ReadFn,
        write: WriteFn,
        take: Option<TakeFn>,
    ) -> FieldRule<'_> {
        self.fields.push(FieldDescriptor {
            name: name.to_string(),
            shape,
            policy: FieldPolicy::default(),
            read,
            write,
            take,
        });
        let last = self.fields.len() - 1;
        FieldRule {
            policy: &mut self.fields[last].policy,
        }
    }

    /// A required scalar field
    pub fn field<F: Scalar>(
        &mut self,
        name: &str,
        get: fn(&T) -> &F,
        set: fn(&mut T) -> &mut F,
    ) -> FieldRule<'_> {
        let read: ReadFn = Box::new(move |any| {
            let t = downcast_ref::<T>(any)?;
            Ok(FieldRead::Scalar(Some(get(t).to_datum())))
        });
        let write: WriteFn = Box::new(move |any, value| {
            let t = downcast_mut::<T>(any)?;
            match value {
                FieldWrite::Scalar(datum) => {
                    *set(t) = F::from_datum(datum)?;
                    Ok(())
                }
                FieldWrite::Null => Ok(()),
                _ => Err(SchemaError::WrongWrite { expected: "scalar" }),
            }
        });
        self.push(
            name,
            FieldShape::Scalar {
                kind: F::KIND,
                optional: false,
            },
            read,
            write,
            None,
        )
    }

    /// An optional scalar field
    pub fn optional<F: Scalar>(
        &mut self,
        name: &str,
        get: fn(&T) -> &Option<F>,
        set: fn(&mut T) -> &mut Option<F>,
    ) -> FieldRule<'_> {
        let read: ReadFn = Box::new(move |any| {
            let t = downcast_ref::<T>(any)?;
            Ok(FieldRead::Scalar(get(t).as_ref().map(Scalar::to_datum)))
        });
        let write: WriteFn = Box::new(move |any, value| {
            let t = downcast_mut::<T>(any)?;
            match value {
                FieldWrite::Scalar(datum) => {
                    *set(t) = Some(F::from_datum(datum)?);
                    Ok(())
                }
                FieldWrite::Null => {
                    *set(t) = None;
                    Ok(())
                }
                _ => Err(SchemaError::WrongWrite { expected: "scalar" }),
            }
        });
        self.push(
            name,
            FieldShape::Scalar {
                kind: F::KIND,
                optional: true,
            },
            read,
            write,
            None,
        )
    }

    /// A scalar list field (`Vec<F>` as one multi-valued attribute)
    pub fn list<F: Scalar>(
        &mut self,
        name: &str,
        get: fn(&T) -> &Vec<F>,
        set: fn(&mut T) -> &mut Vec<F>,
    ) -> FieldRule<'_> {
        let read: ReadFn = Box::new(move |any| {
            let t = downcast_ref::<T>(any)?;
            Ok(FieldRead::ScalarList(
                get(t).iter().map(Scalar::to_datum).collect(),
            ))
        });
        let write: WriteFn = Box::new(move |any, value| {
            let t = downcast_mut::<T>(any)?;
            let dst = set(t);
            match value {
                FieldWrite::ScalarList(items) => {
                    // Fill in place: the instance keeps its own container
                    dst.clear();
                    dst.reserve(items.len());
                    for item in items {
                        dst.push(F::from_datum(item)?);
                    }
                    Ok(())
                }
                FieldWrite::Null => {
                    dst.clear();
                    Ok(())
                }
                _ => Err(SchemaError::WrongWrite {
                    expected: "scalar list",
                }),
            }
        });
        self.push(name, FieldShape::ScalarList { kind: F::KIND }, read, write, None)
    }

    /// A required embedded field of another registered type
    pub fn embedded<E: 'static>(
        &mut self,
        name: &str,
        get: fn(&T) -> &E,
        set: fn(&mut T) -> &mut E,
    ) -> FieldRule<'_> {
        let read: ReadFn = Box::new(move |any| {
            let t = downcast_ref::<T>(any)?;
            Ok(FieldRead::Embedded(Some(get(t) as &dyn Any)))
        });
        let write: WriteFn = Box::new(move |any, value| {
            let t = downcast_mut::<T>(any)?;
            match value {
                FieldWrite::Embedded(boxed) => {
                    *set(t) = *downcast_box::<E>(boxed)?;
                    Ok(())
                }
                FieldWrite::Null => Ok(()),
                _ => Err(SchemaError::WrongWrite { expected: "embedded" }),
            }
        });
        self.push(
            name,
            FieldShape::Embedded {
                target: TypeId::of::<E>(),
                target_name: type_name::<E>(),
                optional: false,
            },
            read,
            write,
            None,
        )
    }

    /// An optional embedded field
    pub fn embedded_opt<E: 'static>(
        &mut self,
        name: &str,
        get: fn(&T) -> &Option<E>,
        set: fn(&mut T) -> &mut Option<E>,
    ) -> FieldRule<'_> {
        let read: ReadFn = Box::new(move |any| {
            let t = downcast_ref::<T>(any)?;
            Ok(FieldRead::Embedded(
                get(t).as_ref().map(|e| e as &dyn Any),
            ))
        });
        let write: WriteFn = Box::new(move |any, value| {
            let t = downcast_mut::<T>(any)?;
            match value {
                FieldWrite::Embedded(boxed) => {
                    *set(t) = Some(*downcast_box::<E>(boxed)?);
                    Ok(())
                }
                FieldWrite::Null => {
                    *set(t) = None;
                    Ok(())
                }
                _ => Err(SchemaError::WrongWrite { expected: "embedded" }),
            }
        });
        self.push(
            name,
            FieldShape::Embedded {
                target: TypeId::of::<E>(),
                target_name: type_name::<E>(),
                optional: true,
            },
            read,
            write,
            None,
        )
    }

    /// A list of an embedded type (`Vec<E>`, parallel-list encoding)
    pub fn embedded_list<E: 'static>(
        &mut self,
        name: &str,
        get: fn(&T) -> &Vec<E>,
        set: fn(&mut T) -> &mut Vec<E>,
    ) -> FieldRule<'_> {
        let read: ReadFn = Box::new(move |any| {
            let t = downcast_ref::<T>(any)?;
            Ok(FieldRead::EmbeddedList(
                get(t).iter().map(|e| e as &dyn Any).collect(),
            ))
        });
        let write: WriteFn = Box::new(move |any, value| {
            let t = downcast_mut::<T>(any)?;
            let dst = set(t);
            match value {
                FieldWrite::EmbeddedList(items) => {
                    dst.clear();
                    dst.reserve(items.len());
                    for item in items {
                        dst.push(*downcast_box::<E>(item)?);
                    }
                    Ok(())
                }
                FieldWrite::Null => {
                    dst.clear();
                    Ok(())
                }
                _ => Err(SchemaError::WrongWrite {
                    expected: "embedded list",
                }),
            }
        });
        self.push(
            name,
            FieldShape::EmbeddedList {
                target: TypeId::of::<E>(),
                target_name: type_name::<E>(),
            },
            read,
            write,
            None,
        )
    }

    /// A string-keyed map of an embedded type (`BTreeMap<String, E>`)
    pub fn embedded_map<E: 'static>(
        &mut self,
        name: &str,
        get: fn(&T) -> &BTreeMap<String, E>,
        set: fn(&mut T) -> &mut BTreeMap<String, E>,
    ) -> FieldRule<'_> {
        let read: ReadFn = Box::new(move |any| {
            let t = downcast_ref::<T>(any)?;
            Ok(FieldRead::EmbeddedMap(
                get(t)
                    .iter()
                    .map(|(k, v)| (k.as_str(), v as &dyn Any))
                    .collect(),
            ))
        });
        let write: WriteFn = Box::new(move |any, value| {
            let t = downcast_mut::<T>(any)?;
            let dst = set(t);
            match value {
                FieldWrite::EmbeddedMap(entries) => {
                    dst.clear();
                    for (key, item) in entries {
                        dst.insert(key, *downcast_box::<E>(item)?);
                    }
                    Ok(())
                }
                FieldWrite::Null => {
                    dst.clear();
                    Ok(())
                }
                _ => Err(SchemaError::WrongWrite {
                    expected: "embedded map",
                }),
            }
        });
        self.push(
            name,
            FieldShape::EmbeddedMap {
                target: TypeId::of::<E>(),
                target_name: type_name::<E>(),
            },
            read,
            write,
            None,
        )
    }

    /// A polymorphic field dispatched by discriminator tag
    pub fn variants<V: VariantField>(
        &mut self,
        name: &str,
        get: fn(&T) -> &V,
        set: fn(&mut T) -> &mut V,
    ) -> FieldRule<'_> {
        fn build_shim<V: VariantField>(
            tag: &str,
            payload: Box<dyn Any>,
        ) -> Result<Box<dyn Any>, SchemaError> {
            V::from_payload(tag, payload).map(|v| Box::new(v) as Box<dyn Any>)
        }

        let table = Arc::new(VariantTable {
            tags: V::tags(),
            payload_type: V::payload_type,
            payload_name: V::payload_name,
            build: build_shim::<V>,
        });
        let read: ReadFn = Box::new(move |any| {
            let t = downcast_ref::<T>(any)?;
            let v = get(t);
            Ok(FieldRead::Variant(v.tag(), v.payload()))
        });
        let write: WriteFn = Box::new(move |any, value| {
            let t = downcast_mut::<T>(any)?;
            match value {
                FieldWrite::Variant(boxed) => {
                    *set(t) = *downcast_box::<V>(boxed)?;
                    Ok(())
                }
                FieldWrite::Null => Ok(()),
                _ => Err(SchemaError::WrongWrite { expected: "variant" }),
            }
        });
        self.push(name, FieldShape::Variant { table }, read, write, None)
    }

    /// The numeric key field (`i64`; 0 means unset)
    pub fn id_int(
        &mut self,
        name: &str,
        get: fn(&T) -> &i64,
        set: fn(&mut T) -> &mut i64,
    ) -> FieldRule<'_> {
        let read: ReadFn = Box::new(move |any| {
            let t = downcast_ref::<T>(any)?;
            Ok(FieldRead::KeyId(IdValue::Int(*get(t))))
        });
        let write: WriteFn = Box::new(move |any, value| {
            let t = downcast_mut::<T>(any)?;
            match value {
                FieldWrite::KeyId(IdValue::Int(id)) => {
                    *set(t) = id;
                    Ok(())
                }
                FieldWrite::Null => Ok(()),
                _ => Err(SchemaError::WrongWrite {
                    expected: "numeric id",
                }),
            }
        });
        self.push(name, FieldShape::KeyId { kind: IdKind::Int }, read, write, None)
    }

    /// The text key field (`String`; empty means unset)
    pub fn id_text(
        &mut self,
        name: &str,
        get: fn(&T) -> &String,
        set: fn(&mut T) -> &mut String,
    ) -> FieldRule<'_> {
        let read: ReadFn = Box::new(move |any| {
            let t = downcast_ref::<T>(any)?;
            Ok(FieldRead::KeyId(IdValue::Text(get(t).clone())))
        });
        let write: WriteFn = Box::new(move |any, value| {
            let t = downcast_mut::<T>(any)?;
            match value {
                FieldWrite::KeyId(IdValue::Text(name)) => {
                    *set(t) = name;
                    Ok(())
                }
                FieldWrite::Null => Ok(()),
                _ => Err(SchemaError::WrongWrite { expected: "text id" }),
            }
        });
        self.push(name, FieldShape::KeyId { kind: IdKind::Text }, read, write, None)
    }

    /// The parent field (`Ancestor<P>`)
    pub fn parent<P: 'static>(
        &mut self,
        name: &str,
        get: fn(&T) -> &Ancestor<P>,
        set: fn(&mut T) -> &mut Ancestor<P>,
    ) -> FieldRule<'_> {
        let read: ReadFn = Box::new(move |any| {
            let t = downcast_ref::<T>(any)?;
            Ok(FieldRead::Parent(match get(t) {
                Ancestor::None => AncestorRead::None,
                Ancestor::Key(key) => AncestorRead::Key(key),
                Ancestor::Instance(parent) => AncestorRead::Instance {
                    target: TypeId::of::<P>(),
                    value: &**parent as &dyn Any,
                },
            }))
        });
        let write: WriteFn = Box::new(move |any, value| {
            let t = downcast_mut::<T>(any)?;
            match value {
                FieldWrite::Parent(AncestorWrite::None) | FieldWrite::Null => {
                    *set(t) = Ancestor::None;
                    Ok(())
                }
                FieldWrite::Parent(AncestorWrite::Key(key)) => {
                    *set(t) = Ancestor::Key(key);
                    Ok(())
                }
                FieldWrite::Parent(AncestorWrite::Instance(boxed)) => {
                    *set(t) = Ancestor::Instance(downcast_box::<P>(boxed)?);
                    Ok(())
                }
                _ => Err(SchemaError::WrongWrite { expected: "parent" }),
            }
        });
        let take: TakeFn = Box::new(move |any| {
            let t = downcast_mut::<T>(any)?;
            Ok(FieldWrite::Parent(
                match std::mem::replace(set(t), Ancestor::None) {
                    Ancestor::None => AncestorWrite::None,
                    Ancestor::Key(key) => AncestorWrite::Key(key),
                    Ancestor::Instance(parent) => {
                        AncestorWrite::Instance(parent as Box<dyn Any>)
                    }
                },
            ))
        });
        self.push(
            name,
            FieldShape::Parent {
                target: TypeId::of::<P>(),
                target_name: type_name::<P>(),
            },
            read,
            write,
            Some(take),
        )
    }
}

/// Accumulates kind registrations, then seals into a [`Registry`]
#[derive(Default)]
pub struct SchemaBuilder {
    types: Vec<TypeDescriptor>,
}

impl SchemaBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        SchemaBuilder { types: Vec::new() }
    }

    /// Register a type under a kind name
    ///
    /// The closure declares the field table. All validation (names,
    /// shapes, cross-type targets) happens at [`SchemaBuilder::seal`].
    pub fn kind<T: Default + 'static>(
        &mut self,
        kind: impl Into<String>,
        declare: impl FnOnce(&mut KindBuilder<T>),
    ) -> &mut Self {
        let mut builder = KindBuilder::<T>::new();
        declare(&mut builder);
        self.types.push(TypeDescriptor {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            kind: kind.into(),
            construct: Box::new(|| Box::new(T::default()) as Box<dyn Any>),
            fields: builder.fields,
            key_field: None,
            parent_field: None,
        });
        self
    }

    /// Validate everything and produce the immutable registry
    pub fn seal(self) -> Result<Registry, SchemaError> {
        let mut registered: FxHashSet<TypeId> = FxHashSet::default();
        for ty in &self.types {
            registered.insert(ty.type_id);
        }

        let mut types: FxHashMap<TypeId, Arc<TypeDescriptor>> = FxHashMap::default();
        let mut kinds: FxHashMap<String, TypeId> = FxHashMap::default();

        for mut ty in self.types {
            validate_kind(&ty.kind).map_err(|source| SchemaError::InvalidKindName {
                kind: ty.kind.clone(),
                source,
            })?;
            if kinds.contains_key(&ty.kind) {
                return Err(SchemaError::DuplicateKind { kind: ty.kind });
            }
            if types.contains_key(&ty.type_id) {
                return Err(SchemaError::DuplicateType {
                    type_name: ty.type_name,
                });
            }

            ty.fields.sort_by(|a, b| a.name.cmp(&b.name));
            for pair in ty.fields.windows(2) {
                if pair[0].name == pair[1].name {
                    return Err(SchemaError::DuplicateField {
                        kind: ty.kind.clone(),
                        field: pair[0].name.clone(),
                    });
                }
            }

            let mut key_field = None;
            let mut parent_field = None;
            for (i, field) in ty.fields.iter().enumerate() {
                validate_field(&ty.kind, field, &registered)?;
                match field.shape {
                    FieldShape::KeyId { .. } => {
                        if key_field.replace(i).is_some() {
                            return Err(SchemaError::MultipleKeyFields {
                                kind: ty.kind.clone(),
                            });
                        }
                    }
                    FieldShape::Parent { .. } => {
                        if parent_field.replace(i).is_some() {
                            return Err(SchemaError::MultipleParentFields {
                                kind: ty.kind.clone(),
                            });
                        }
                    }
                    _ => {}
                }
            }
            ty.key_field = key_field;
            ty.parent_field = parent_field;

            kinds.insert(ty.kind.clone(), ty.type_id);
            types.insert(ty.type_id, Arc::new(ty));
        }

        // Collapse targets need their own field tables finished first
        for ty in types.values() {
            for field in &ty.fields {
                if field.policy.collapse {
                    let target = match &field.shape {
                        FieldShape::Embedded { target, .. } => *target,
                        _ => unreachable!("collapse validated to embedded shape"),
                    };
                    let target_ty = types.get(&target).ok_or_else(|| {
                        SchemaError::UnregisteredTarget {
                            kind: ty.kind.clone(),
                            field: field.name.clone(),
                            target: "collapse target",
                        }
                    })?;
                    let collapsible = target_ty.fields.len() == 1
                        && matches!(
                            target_ty.fields[0].shape,
                            FieldShape::Scalar { .. } | FieldShape::ScalarList { .. }
                        );
                    if !collapsible {
                        return Err(SchemaError::BadPolicy {
                            kind: ty.kind.clone(),
                            field: field.name.clone(),
                            reason: "collapse requires a target with exactly one scalar field",
                        });
                    }
                }
            }
        }

        Ok(Registry { types, kinds })
    }
}

fn validate_field(
    kind: &str,
    field: &FieldDescriptor,
    registered: &FxHashSet<TypeId>,
) -> Result<(), SchemaError> {
    if field.name.is_empty() || field.name.contains('.') {
        return Err(SchemaError::InvalidFieldName {
            kind: kind.to_string(),
            field: field.name.clone(),
        });
    }
    if field.name.starts_with("__") {
        return Err(SchemaError::ReservedFieldName {
            kind: kind.to_string(),
            field: field.name.clone(),
        });
    }

    let policy = &field.policy;
    let check = |ok: bool, reason: &'static str| {
        if ok {
            Ok(())
        } else {
            Err(SchemaError::BadPolicy {
                kind: kind.to_string(),
                field: field.name.clone(),
                reason,
            })
        }
    };
    match &field.shape {
        FieldShape::Scalar { .. } | FieldShape::ScalarList { .. } => {
            check(!policy.collapse, "collapse applies to embedded fields")?;
            check(!policy.packed, "packed applies to embedded shapes")?;
            check(policy.activation.is_none(), "activation applies to parent fields")?;
        }
        FieldShape::Embedded { target, target_name, .. } => {
            require_target(kind, field, *target, target_name, registered)?;
            check(policy.store_as.is_none(), "store_as applies to scalar fields")?;
            check(policy.activation.is_none(), "activation applies to parent fields")?;
            check(
                !(policy.collapse && policy.packed),
                "collapse and packed are mutually exclusive",
            )?;
        }
        FieldShape::EmbeddedList { target, target_name }
        | FieldShape::EmbeddedMap { target, target_name } => {
            require_target(kind, field, *target, target_name, registered)?;
            check(policy.store_as.is_none(), "store_as applies to scalar fields")?;
            check(!policy.collapse, "collapse applies to embedded fields")?;
            check(policy.activation.is_none(), "activation applies to parent fields")?;
        }
        FieldShape::Variant { table } => {
            for tag in table.tags {
                let target = (table.payload_type)(tag).ok_or_else(|| {
                    SchemaError::UnknownVariant {
                        tag: (*tag).to_string(),
                    }
                })?;
                if !registered.contains(&target) {
                    return Err(SchemaError::UnregisteredTarget {
                        kind: kind.to_string(),
                        field: field.name.clone(),
                        target: (table.payload_name)(tag).unwrap_or("variant payload"),
                    });
                }
            }
            check(policy.store_as.is_none(), "store_as applies to scalar fields")?;
            check(!policy.collapse, "collapse applies to embedded fields")?;
            check(!policy.packed, "packed applies to embedded shapes")?;
            check(policy.activation.is_none(), "activation applies to parent fields")?;
        }
        FieldShape::KeyId { .. } => {
            check(
                policy.store_as.is_none() && !policy.collapse && !policy.packed,
                "key fields carry no storage policy",
            )?;
            check(policy.activation.is_none(), "activation applies to parent fields")?;
        }
        FieldShape::Parent { target, target_name } => {
            require_target(kind, field, *target, target_name, registered)?;
            check(
                policy.store_as.is_none() && !policy.collapse && !policy.packed,
                "parent fields carry no storage policy",
            )?;
        }
    }
    Ok(())
}

fn require_target(
    kind: &str,
    field: &FieldDescriptor,
    target: TypeId,
    target_name: &'static str,
    registered: &FxHashSet<TypeId>,
) -> Result<(), SchemaError> {
    if registered.contains(&target) {
        Ok(())
    } else {
        Err(SchemaError::UnregisteredTarget {
            kind: kind.to_string(),
            field: field.name.clone(),
            target: target_name,
        })
    }
}

// ============================================================================
// Registry
// ============================================================================

/// The sealed, immutable schema: type⇄kind mapping plus field tables
///
/// Shared via `Arc` across the engine; nothing mutates after seal.
pub struct Registry {
    types: FxHashMap<TypeId, Arc<TypeDescriptor>>,
    kinds: FxHashMap<String, TypeId>,
}

impl Registry {
    /// Descriptor for a Rust type
    pub fn descriptor_of<T: 'static>(&self) -> Result<&Arc<TypeDescriptor>, SchemaError> {
        self.types
            .get(&TypeId::of::<T>())
            .ok_or(SchemaError::UnknownType {
                type_name: type_name::<T>(),
            })
    }

    /// Descriptor by erased type id
    ///
    /// `context` names the type for the error when the id is unknown.
    pub fn descriptor_by_id(
        &self,
        id: TypeId,
        context: &'static str,
    ) -> Result<&Arc<TypeDescriptor>, SchemaError> {
        self.types.get(&id).ok_or(SchemaError::UnknownType {
            type_name: context,
        })
    }

    /// Descriptor by storage kind
    pub fn descriptor_by_kind(&self, kind: &str) -> Result<&Arc<TypeDescriptor>, SchemaError> {
        self.kinds
            .get(kind)
            .and_then(|id| self.types.get(id))
            .ok_or_else(|| SchemaError::UnknownKind {
                kind: kind.to_string(),
            })
    }

    /// The storage kind of a Rust type
    pub fn kind_of<T: 'static>(&self) -> Result<&str, SchemaError> {
        self.descriptor_of::<T>().map(|d| d.kind())
    }

    /// Number of registered kinds
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// True when nothing is registered
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Iterate all descriptors (unspecified order)
    pub fn descriptors(&self) -> impl Iterator<Item = &Arc<TypeDescriptor>> {
        self.types.values()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<&str> = self.kinds.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        f.debug_struct("Registry").field("kinds", &kinds).finish()
    }
}
