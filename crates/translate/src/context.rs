//! Encode and decode contexts
//!
//! An encode run collects key material (kind, id, parent linkage) into a
//! [`KeySpec`] while the field walk produces properties. Parent linkage to
//! a not-yet-stored instance is recorded as a placeholder; a second phase
//! outside the translator resolves it to a real key before the record is
//! built. Each component of the key material is set at most once per run.
//!
//! A decode run carries the record's key plus an optional [`ParentLoader`]
//! capability for turning ancestor keys back into live instances, bounded
//! by an activation depth.

use crate::error::{DecodeError, EncodeError};
use graft_convert::ConverterRegistry;
use graft_core::key::{IdValue, Key};
use graft_core::schema::Registry;
use std::any::{Any, TypeId};

/// Parent linkage collected during encode
#[derive(Debug, Clone, PartialEq)]
pub enum ParentHold {
    /// The parent's key is already known
    Resolved(Key),
    /// The parent is a live instance awaiting its own store
    Pending,
}

/// Key material accumulated while encoding one instance
#[derive(Debug, Clone)]
pub struct KeySpec {
    kind: String,
    id: Option<IdValue>,
    parent: Option<ParentHold>,
}

impl KeySpec {
    /// Start an empty spec for a kind
    pub fn new(kind: impl Into<String>) -> Self {
        KeySpec {
            kind: kind.into(),
            id: None,
            parent: None,
        }
    }

    /// The kind this spec builds keys for
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// The id component, if one was encoded
    pub fn id(&self) -> Option<&IdValue> {
        self.id.as_ref()
    }

    /// The parent component, if one was encoded
    pub fn parent(&self) -> Option<&ParentHold> {
        self.parent.as_ref()
    }

    /// Record the id component; at most once per run
    pub fn set_id(&mut self, id: IdValue) -> Result<(), EncodeError> {
        if self.id.is_some() {
            return Err(EncodeError::IdConflict);
        }
        self.id = Some(id);
        Ok(())
    }

    /// Record the parent component; at most once per run
    pub fn set_parent(&mut self, hold: ParentHold) -> Result<(), EncodeError> {
        if self.parent.is_some() {
            return Err(EncodeError::ParentConflict);
        }
        self.parent = Some(hold);
        Ok(())
    }

    /// True when a placeholder still awaits resolution
    pub fn parent_pending(&self) -> bool {
        matches!(self.parent, Some(ParentHold::Pending))
    }

    /// Replace the placeholder with the stored parent's key
    pub fn resolve_parent(&mut self, key: Key) -> Result<(), EncodeError> {
        match self.parent {
            Some(ParentHold::Pending) => {
                self.parent = Some(ParentHold::Resolved(key));
                Ok(())
            }
            _ => Err(EncodeError::ParentConflict),
        }
    }

    /// The resolved parent key, if any
    ///
    /// `None` both when no parent was encoded and while a placeholder is
    /// still pending; check [`KeySpec::parent_pending`] first.
    pub fn parent_key(&self) -> Option<&Key> {
        match &self.parent {
            Some(ParentHold::Resolved(key)) => Some(key),
            _ => None,
        }
    }

    /// Build the key, if the id component is present and no placeholder
    /// remains
    pub fn to_key(&self) -> Option<Key> {
        if self.parent_pending() {
            return None;
        }
        let id = self.id.clone()?;
        Some(match self.parent_key() {
            Some(parent) => Key::with_parent(self.kind.clone(), id, parent.clone()),
            None => Key::new(self.kind.clone(), id),
        })
    }
}

/// State for one encode run
pub struct EncodeCx<'a> {
    registry: &'a Registry,
    converters: &'a ConverterRegistry,
    store_nulls: bool,
    key: KeySpec,
}

impl<'a> EncodeCx<'a> {
    /// Start an encode run for one instance of `kind`
    pub fn new(
        registry: &'a Registry,
        converters: &'a ConverterRegistry,
        kind: impl Into<String>,
        store_nulls: bool,
    ) -> Self {
        EncodeCx {
            registry,
            converters,
            store_nulls,
            key: KeySpec::new(kind),
        }
    }

    /// The schema registry
    pub fn registry(&self) -> &'a Registry {
        self.registry
    }

    /// The converter registry
    pub fn converters(&self) -> &'a ConverterRegistry {
        self.converters
    }

    /// Whether null field values become explicit null attributes
    pub fn store_nulls(&self) -> bool {
        self.store_nulls
    }

    /// The key material collected so far
    pub fn key(&self) -> &KeySpec {
        &self.key
    }

    /// Mutable access for the key and parent translators
    pub fn key_mut(&mut self) -> &mut KeySpec {
        &mut self.key
    }

    /// Finish the run, keeping the collected key material
    pub fn into_key_spec(self) -> KeySpec {
        self.key
    }
}

/// Capability for loading a parent instance during decode
///
/// Implemented by the session layer; the translator only knows the key
/// and the registered target type.
pub trait ParentLoader {
    /// Load and decode the record at `key` as `target`
    ///
    /// `depth` is the remaining activation budget for the parent's own
    /// ancestors. Returns `Ok(None)` when no record exists at the key.
    fn load_parent(
        &self,
        key: &Key,
        target: TypeId,
        depth: usize,
    ) -> Result<Option<Box<dyn Any>>, DecodeError>;
}

/// State for one decode run
pub struct DecodeCx<'a> {
    registry: &'a Registry,
    converters: &'a ConverterRegistry,
    key: Option<&'a Key>,
    loader: Option<&'a dyn ParentLoader>,
    depth_budget: usize,
}

impl<'a> DecodeCx<'a> {
    /// Start a decode run with no key and no parent loading
    pub fn new(registry: &'a Registry, converters: &'a ConverterRegistry) -> Self {
        DecodeCx {
            registry,
            converters,
            key: None,
            loader: None,
            depth_budget: usize::MAX,
        }
    }

    /// Attach the record's key, populating key and parent fields
    pub fn with_key(mut self, key: &'a Key) -> Self {
        self.key = Some(key);
        self
    }

    /// Attach a parent-loading capability
    pub fn with_loader(mut self, loader: &'a dyn ParentLoader) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Cap how many ancestor levels are loaded as live instances
    pub fn with_depth(mut self, depth: usize) -> Self {
        self.depth_budget = depth;
        self
    }

    /// The schema registry
    pub fn registry(&self) -> &'a Registry {
        self.registry
    }

    /// The converter registry
    pub fn converters(&self) -> &'a ConverterRegistry {
        self.converters
    }

    /// The record's key, when decoding a stored record
    pub fn key(&self) -> Option<&'a Key> {
        self.key
    }

    /// The parent-loading capability, when attached
    pub fn loader(&self) -> Option<&'a dyn ParentLoader> {
        self.loader
    }

    /// Remaining activation budget
    pub fn depth_budget(&self) -> usize {
        self.depth_budget
    }
}
