//! Flattened attributes
//!
//! A [`Property`] is one flattened attribute of an object graph: a path, a
//! scalar value, and whether the attribute is indexed. A [`PropertySet`]
//! holds properties sorted by path with path uniqueness as a structural
//! invariant; decode walks it through [`PropsView::group_by_prefix`], which
//! slices the sorted run into one contiguous group per child field in O(n).

use crate::datum::Datum;
use crate::path::Path;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Two properties landed on the same path during encode or merge
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("duplicate property path: {path}")]
pub struct DuplicatePath {
    /// The contested path
    pub path: Path,
}

/// One flattened attribute: `(path, value, indexed)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    path: Path,
    value: Datum,
    indexed: bool,
}

impl Property {
    /// Create a property
    pub fn new(path: Path, value: Datum, indexed: bool) -> Self {
        Property {
            path,
            value,
            indexed,
        }
    }

    /// The attribute path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The attribute value
    pub fn value(&self) -> &Datum {
        &self.value
    }

    /// Whether the attribute participates in indexes
    pub fn indexed(&self) -> bool {
        self.indexed
    }

    /// Move the same value and indexing to a different path
    pub fn with_path(self, path: Path) -> Self {
        Property {
            path,
            value: self.value,
            indexed: self.indexed,
        }
    }

    /// Deconstruct into parts
    pub fn into_parts(self) -> (Path, Datum, bool) {
        (self.path, self.value, self.indexed)
    }
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}={:?}{}",
            self.path,
            self.value,
            if self.indexed { "" } else { " (unindexed)" }
        )
    }
}

/// A path-unique, path-sorted collection of properties
///
/// Sortedness and uniqueness are structural: every way in is checked, so
/// holders of a `PropertySet` can group and binary-search without
/// re-validating.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertySet {
    items: Vec<Property>,
}

impl PropertySet {
    /// Create an empty set
    pub fn new() -> Self {
        PropertySet { items: Vec::new() }
    }

    /// Create a set holding one property
    pub fn singleton(property: Property) -> Self {
        PropertySet {
            items: vec![property],
        }
    }

    /// Build from an unsorted vector, sorting and checking uniqueness
    pub fn from_vec(mut items: Vec<Property>) -> Result<Self, DuplicatePath> {
        items.sort_by(|a, b| a.path.cmp(&b.path));
        for pair in items.windows(2) {
            if pair[0].path == pair[1].path {
                return Err(DuplicatePath {
                    path: pair[0].path.clone(),
                });
            }
        }
        Ok(PropertySet { items })
    }

    /// Number of properties
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when the set holds nothing
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Insert one property, rejecting a path already present
    pub fn insert(&mut self, property: Property) -> Result<(), DuplicatePath> {
        match self
            .items
            .binary_search_by(|p| p.path.cmp(&property.path))
        {
            Ok(_) => Err(DuplicatePath {
                path: property.path,
            }),
            Err(pos) => {
                self.items.insert(pos, property);
                Ok(())
            }
        }
    }

    /// Merge another set in, rejecting any shared path
    pub fn merge(&mut self, other: PropertySet) -> Result<(), DuplicatePath> {
        for property in other.items {
            self.insert(property)?;
        }
        Ok(())
    }

    /// The property at exactly `path`, if present
    pub fn at(&self, path: &Path) -> Option<&Property> {
        self.view().at(path)
    }

    /// The only property, if the set holds exactly one
    pub fn single(&self) -> Option<&Property> {
        self.view().single()
    }

    /// Iterate in path order
    pub fn iter(&self) -> std::slice::Iter<'_, Property> {
        self.items.iter()
    }

    /// Borrow as a view for grouping and lookup
    pub fn view(&self) -> PropsView<'_> {
        PropsView { items: &self.items }
    }

    /// Keep only properties the predicate accepts
    pub fn retain(&mut self, mut f: impl FnMut(&Property) -> bool) {
        self.items.retain(|p| f(p));
    }

    /// Consume into the sorted property vector
    pub fn into_vec(self) -> Vec<Property> {
        self.items
    }
}

impl IntoIterator for PropertySet {
    type Item = Property;
    type IntoIter = std::vec::IntoIter<Property>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a PropertySet {
    type Item = &'a Property;
    type IntoIter = std::slice::Iter<'a, Property>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// A borrowed, path-sorted slice of properties
///
/// Views are how decode hands each field its own contiguous run without
/// copying: grouping a view yields smaller views over the same backing
/// slice.
#[derive(Debug, Clone, Copy)]
pub struct PropsView<'a> {
    items: &'a [Property],
}

impl<'a> PropsView<'a> {
    /// An empty view
    pub fn empty() -> Self {
        PropsView { items: &[] }
    }

    /// View over a slice the caller guarantees is sorted by path
    pub fn from_sorted(items: &'a [Property]) -> Self {
        PropsView { items }
    }

    /// Number of properties in view
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when nothing is in view
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterate in path order
    pub fn iter(&self) -> std::slice::Iter<'a, Property> {
        self.items.iter()
    }

    /// The only property, if exactly one is in view
    pub fn single(&self) -> Option<&'a Property> {
        match self.items {
            [only] => Some(only),
            _ => None,
        }
    }

    /// The property at exactly `path`, if present
    pub fn at(&self, path: &Path) -> Option<&'a Property> {
        self.items
            .binary_search_by(|p| p.path.cmp(path))
            .ok()
            .map(|i| &self.items[i])
    }

    /// True when the view is exactly one null property at `path`
    ///
    /// This is the "object absent" marker checked before any field walk.
    pub fn is_null_marker(&self, path: &Path) -> bool {
        matches!(self.single(), Some(p) if p.path == *path && p.value.is_null())
    }

    /// Group contiguous runs one segment below `base`
    ///
    /// Input must be sorted by path (structural for views obtained from a
    /// [`PropertySet`]) and hold only properties at or under `base`;
    /// grouping anything else is undefined. Properties at exactly `base`
    /// (the object-level marker) are skipped. Groups arrive in path order,
    /// which is what the lock-step field walk relies on.
    pub fn group_by_prefix(&self, base: &Path) -> PrefixGroups<'a> {
        PrefixGroups {
            base: base.clone(),
            items: self.items,
            pos: 0,
        }
    }
}

/// One contiguous run of properties sharing a prefix
#[derive(Debug, Clone)]
pub struct PrefixGroup<'a> {
    /// The shared prefix: base plus one segment
    pub prefix: Path,
    /// The properties at or under the prefix
    pub props: PropsView<'a>,
}

/// Iterator over [`PrefixGroup`] runs, produced by
/// [`PropsView::group_by_prefix`]
pub struct PrefixGroups<'a> {
    base: Path,
    items: &'a [Property],
    pos: usize,
}

impl<'a> Iterator for PrefixGroups<'a> {
    type Item = PrefixGroup<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        // Skip the object-level marker and anything not strictly below base
        while self.pos < self.items.len() {
            let path = &self.items[self.pos].path;
            if path.segment(self.base.len()).is_some() && path.starts_with(&self.base) {
                break;
            }
            self.pos += 1;
        }
        if self.pos >= self.items.len() {
            return None;
        }

        let head = &self.items[self.pos].path;
        let segment = head
            .segment(self.base.len())
            .unwrap_or_default()
            .to_string();
        let prefix = self.base.clone().child(segment);

        let start = self.pos;
        let mut end = self.pos + 1;
        while end < self.items.len() && self.items[end].path.starts_with(&prefix) {
            end += 1;
        }
        self.pos = end;

        Some(PrefixGroup {
            prefix,
            props: PropsView {
                items: &self.items[start..end],
            },
        })
    }
}
