//! Stored record: a key plus its flat attributes

use crate::key::Key;
use crate::property::PropertySet;

/// One stored record
///
/// The unit the storage adapter puts, gets and queries. Attributes keep
/// the [`PropertySet`] ordering and uniqueness guarantees.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    key: Key,
    props: PropertySet,
}

impl Record {
    /// Create a record
    pub fn new(key: Key, props: PropertySet) -> Self {
        Record { key, props }
    }

    /// The record's key
    pub fn key(&self) -> &Key {
        &self.key
    }

    /// The record's attributes
    pub fn props(&self) -> &PropertySet {
        &self.props
    }

    /// Replace the key, keeping the attributes
    ///
    /// Used when the store allocates an id for an incomplete key.
    pub fn with_key(self, key: Key) -> Self {
        Record { key, props: self.props }
    }

    /// Deconstruct into parts
    pub fn into_parts(self) -> (Key, PropertySet) {
        (self.key, self.props)
    }
}
