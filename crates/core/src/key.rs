//! Record keys with ancestor chains
//!
//! A [`Key`] names one record: a kind, an id (numeric or text), and an
//! optional parent key. Parent chains group records into families; the
//! query layer scopes ancestor queries to one family and transactional
//! reads require such a scope.
//!
//! ## Contract
//!
//! Kind names are validated wherever they enter the system:
//! - must not be empty
//! - must not contain the structural characters `/ ( ) "` or NUL
//! - must not start with the reserved prefix `__`
//!
//! Text ids are unconstrained except for NUL; numeric id `0` and the empty
//! text name are the "unset" sentinels completed during store.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Reserved prefix for engine-generated kind names and attributes
pub const RESERVED_PREFIX: &str = "__";

/// Validate a kind name
///
/// This is the primary validation function for kind names; schema sealing
/// and key parsing both route through it.
///
/// # Examples
///
/// ```
/// use graft_core::key::validate_kind;
///
/// assert!(validate_kind("widget").is_ok());
/// assert!(validate_kind("music_festival").is_ok());
///
/// assert!(validate_kind("").is_err()); // empty
/// assert!(validate_kind("a/b").is_err()); // structural character
/// assert!(validate_kind("__shadow").is_err()); // reserved prefix
/// ```
pub fn validate_kind(kind: &str) -> Result<(), KeyError> {
    // Rule 1: kind cannot be empty
    if kind.is_empty() {
        return Err(KeyError::EmptyKind);
    }

    // Rule 2: kind cannot contain structural characters
    if let Some(ch) = kind.chars().find(|c| matches!(c, '/' | '(' | ')' | '"' | '\x00')) {
        return Err(KeyError::InvalidKindChar { ch });
    }

    // Rule 3: kind cannot use the reserved prefix
    if kind.starts_with(RESERVED_PREFIX) {
        return Err(KeyError::ReservedKind);
    }

    Ok(())
}

/// Key validation and parsing errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyError {
    /// Kind name is empty
    #[error("kind name cannot be empty")]
    EmptyKind,

    /// Kind name contains a structural character
    #[error("kind name cannot contain '{ch}'")]
    InvalidKindChar {
        /// The offending character
        ch: char,
    },

    /// Kind name uses the reserved `__` prefix
    #[error("kind names starting with '__' are reserved")]
    ReservedKind,

    /// Text id contains a NUL byte
    #[error("key name cannot contain NUL bytes")]
    NameContainsNul,

    /// Rendered key form did not parse
    #[error("malformed key at position {at}: {reason}")]
    Malformed {
        /// Byte position of the first offending character
        at: usize,
        /// What the parser expected
        reason: &'static str,
    },
}

/// A key id: numeric (allocatable) or text (caller-assigned)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IdValue {
    /// Numeric id; `0` means "not yet allocated"
    Int(i64),
    /// Text name; the empty string means "unset"
    Text(String),
}

impl IdValue {
    /// True for the unset sentinels (`Int(0)` and the empty text name)
    pub fn is_unset(&self) -> bool {
        match self {
            IdValue::Int(id) => *id == 0,
            IdValue::Text(name) => name.is_empty(),
        }
    }
}

impl fmt::Display for IdValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdValue::Int(id) => write!(f, "{}", id),
            IdValue::Text(name) => {
                f.write_str("\"")?;
                for ch in name.chars() {
                    if ch == '"' || ch == '\\' {
                        f.write_str("\\")?;
                    }
                    write!(f, "{}", ch)?;
                }
                f.write_str("\"")
            }
        }
    }
}

impl From<i64> for IdValue {
    fn from(id: i64) -> Self {
        IdValue::Int(id)
    }
}

impl From<&str> for IdValue {
    fn from(name: &str) -> Self {
        IdValue::Text(name.to_string())
    }
}

impl From<String> for IdValue {
    fn from(name: String) -> Self {
        IdValue::Text(name)
    }
}

/// A complete record key: kind, id, optional parent chain
///
/// Keys render as the slash-joined chain from the root ancestor down:
/// `festival(7)/band("Arcade Fire")`. The rendered form round-trips
/// through [`FromStr`].
///
/// Ordering follows the ancestor chain from the root down, so sorting
/// keys keeps each family contiguous.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Key {
    kind: String,
    id: IdValue,
    parent: Option<Box<Key>>,
}

impl Key {
    /// Create a root key (no parent)
    pub fn new(kind: impl Into<String>, id: impl Into<IdValue>) -> Self {
        Key {
            kind: kind.into(),
            id: id.into(),
            parent: None,
        }
    }

    /// Create a key under a parent
    pub fn with_parent(kind: impl Into<String>, id: impl Into<IdValue>, parent: Key) -> Self {
        Key {
            kind: kind.into(),
            id: id.into(),
            parent: Some(Box::new(parent)),
        }
    }

    /// Create a child key of this key
    pub fn child(&self, kind: impl Into<String>, id: impl Into<IdValue>) -> Self {
        Key::with_parent(kind, id, self.clone())
    }

    /// The kind name
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// The id component
    pub fn id(&self) -> &IdValue {
        &self.id
    }

    /// The parent key, if any
    pub fn parent(&self) -> Option<&Key> {
        self.parent.as_deref()
    }

    /// Depth of the ancestor chain (a root key has depth 1)
    pub fn depth(&self) -> usize {
        1 + self.parent.as_ref().map_or(0, |p| p.depth())
    }

    /// True when `ancestor` appears in this key's chain (or equals it)
    pub fn has_ancestor(&self, ancestor: &Key) -> bool {
        let mut cur = Some(self);
        while let Some(key) = cur {
            if key == ancestor {
                return true;
            }
            cur = key.parent();
        }
        false
    }

    /// The chain from the root ancestor down to this key
    fn chain(&self) -> Vec<&Key> {
        let mut chain = Vec::with_capacity(self.depth());
        let mut cur = Some(self);
        while let Some(key) = cur {
            chain.push(key);
            cur = key.parent();
        }
        chain.reverse();
        chain
    }

    /// Validate the kind names along the whole chain
    pub fn validate(&self) -> Result<(), KeyError> {
        let mut cur = Some(self);
        while let Some(key) = cur {
            validate_kind(&key.kind)?;
            if let IdValue::Text(name) = &key.id {
                if name.contains('\x00') {
                    return Err(KeyError::NameContainsNul);
                }
            }
            cur = key.parent();
        }
        Ok(())
    }
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        // Root-first chain comparison: families sort contiguously, with
        // each parent immediately before its children.
        let left = self.chain();
        let right = other.chain();
        for (a, b) in left.iter().zip(right.iter()) {
            let step = a.kind.cmp(&b.kind).then_with(|| a.id.cmp(&b.id));
            if step != Ordering::Equal {
                return step;
            }
        }
        left.len().cmp(&right.len())
    }
}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(parent) = &self.parent {
            write!(f, "{}/", parent)?;
        }
        write!(f, "{}({})", self.kind, self.id)
    }
}

impl FromStr for Key {
    type Err = KeyError;

    /// Parse the rendered chain form, e.g. `festival(7)/band("x")`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parsed: Option<Key> = None;
        let bytes = s.as_bytes();
        let mut i = 0usize;
        if bytes.is_empty() {
            return Err(KeyError::Malformed {
                at: 0,
                reason: "empty key",
            });
        }
        while i < bytes.len() {
            let kind_start = i;
            while i < bytes.len() && bytes[i] != b'(' {
                if bytes[i] == b'/' {
                    return Err(KeyError::Malformed {
                        at: i,
                        reason: "expected '(' before '/'",
                    });
                }
                i += 1;
            }
            if i == bytes.len() {
                return Err(KeyError::Malformed {
                    at: i,
                    reason: "expected '('",
                });
            }
            let kind = &s[kind_start..i];
            validate_kind(kind)?;
            i += 1; // consume '('

            let id = if i < bytes.len() && bytes[i] == b'"' {
                i += 1;
                let mut name = String::new();
                let mut closed = false;
                while i < bytes.len() {
                    match bytes[i] {
                        b'\\' if i + 1 < bytes.len() => {
                            name.push(bytes[i + 1] as char);
                            i += 2;
                        }
                        b'"' => {
                            i += 1;
                            closed = true;
                            break;
                        }
                        _ => {
                            // Multi-byte characters pass through untouched
                            let ch_start = i;
                            let mut ch_end = i + 1;
                            while ch_end < bytes.len() && !s.is_char_boundary(ch_end) {
                                ch_end += 1;
                            }
                            name.push_str(&s[ch_start..ch_end]);
                            i = ch_end;
                        }
                    }
                }
                if !closed {
                    return Err(KeyError::Malformed {
                        at: i,
                        reason: "unclosed quote",
                    });
                }
                IdValue::Text(name)
            } else {
                let num_start = i;
                while i < bytes.len() && bytes[i] != b')' {
                    i += 1;
                }
                let digits = &s[num_start..i];
                let id = digits.parse::<i64>().map_err(|_| KeyError::Malformed {
                    at: num_start,
                    reason: "expected numeric id",
                })?;
                IdValue::Int(id)
            };

            if i >= bytes.len() || bytes[i] != b')' {
                return Err(KeyError::Malformed {
                    at: i,
                    reason: "expected ')'",
                });
            }
            i += 1; // consume ')'

            parsed = Some(match parsed {
                None => Key::new(kind, id),
                Some(parent) => Key::with_parent(kind, id, parent),
            });

            if i < bytes.len() {
                if bytes[i] != b'/' {
                    return Err(KeyError::Malformed {
                        at: i,
                        reason: "expected '/' between keys",
                    });
                }
                i += 1;
                if i == bytes.len() {
                    return Err(KeyError::Malformed {
                        at: i,
                        reason: "trailing '/'",
                    });
                }
            }
        }
        parsed.ok_or(KeyError::Malformed {
            at: 0,
            reason: "empty key",
        })
    }
}

/// A typed parent-field value
///
/// The three states mirror the ancestor lifecycle: no parent, a parent
/// known only by key (beyond the activation depth, or never loaded), and
/// a live parent instance (which may itself be unstored at encode time).
#[derive(Debug, Clone, PartialEq)]
pub enum Ancestor<P> {
    /// No parent
    None,
    /// Parent known by key only
    Key(Key),
    /// Live parent instance
    Instance(Box<P>),
}

impl<P> Ancestor<P> {
    /// Wrap a live parent instance
    pub fn instance(parent: P) -> Self {
        Ancestor::Instance(Box::new(parent))
    }

    /// True when no parent is set
    pub fn is_none(&self) -> bool {
        matches!(self, Ancestor::None)
    }

    /// The parent key, when this holds one
    pub fn as_key(&self) -> Option<&Key> {
        match self {
            Ancestor::Key(key) => Some(key),
            _ => None,
        }
    }

    /// The live parent instance, when this holds one
    pub fn as_instance(&self) -> Option<&P> {
        match self {
            Ancestor::Instance(parent) => Some(parent),
            _ => None,
        }
    }

    /// Mutable access to the live parent instance
    pub fn as_instance_mut(&mut self) -> Option<&mut P> {
        match self {
            Ancestor::Instance(parent) => Some(parent),
            _ => None,
        }
    }
}

impl<P> Default for Ancestor<P> {
    fn default() -> Self {
        Ancestor::None
    }
}
