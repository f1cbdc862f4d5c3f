//! Hierarchical attribute paths
//!
//! A [`Path`] addresses one attribute in the flattened form of an object
//! graph: one name segment per level of nesting. Paths are immutable values
//! with a total lexicographic order, so a sorted property collection keeps
//! every nested subtree contiguous and decode can walk fields and property
//! runs in lock-step.
//!
//! # Path Syntax
//!
//! | Syntax | Meaning | Example |
//! |--------|---------|---------|
//! | `name` | One field level | `label` |
//! | `a.b`  | Nested field | `inner.label` |
//! | (empty) | Root | `` |

use crate::limits::{MAX_PATH_SEGMENTS, MAX_PATH_STRING};
use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use smallvec::SmallVec;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error type for path parsing and validation
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PathError {
    /// Empty segment in a rendered path
    #[error("empty segment in path at position {0}")]
    EmptySegment(usize),
    /// Segment count above [`MAX_PATH_SEGMENTS`]
    #[error("path has {count} segments, maximum is {max}")]
    TooManySegments {
        /// Number of segments in the offending path
        count: usize,
        /// The configured maximum
        max: usize,
    },
    /// Rendered form longer than [`MAX_PATH_STRING`] bytes
    #[error("path renders to {length} bytes, maximum is {max}")]
    TooLong {
        /// Rendered length in bytes
        length: usize,
        /// The configured maximum
        max: usize,
    },
}

/// A path into a flattened object graph
///
/// A `Path` is an ordered, immutable sequence of name segments. The root
/// path (no segments) exists only as a starting point for building; every
/// stored attribute sits at a non-empty path.
///
/// Ordering is lexicographic segment-by-segment, which is what keeps a
/// sorted property set grouped by subtree: `inner.a` and `inner.b` sort
/// together, before any sibling field that follows `inner`.
///
/// # Examples
///
/// ```
/// use graft_core::Path;
///
/// let inner = Path::root().child("inner");
/// let label = inner.clone().child("label");
///
/// assert!(inner.is_ancestor_of(&label));
/// assert_eq!(label.to_string(), "inner.label");
///
/// let parsed: Path = "inner.label".parse().unwrap();
/// assert_eq!(parsed, label);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Path {
    segments: SmallVec<[String; 4]>,
}

impl Path {
    /// Create the root path (empty path)
    pub fn root() -> Self {
        Path {
            segments: SmallVec::new(),
        }
    }

    /// Create a path with a single segment
    pub fn of(name: impl Into<String>) -> Self {
        Path::root().child(name)
    }

    /// Create a path from a vector of segments
    pub fn from_segments(segments: Vec<String>) -> Self {
        Path {
            segments: segments.into(),
        }
    }

    /// Get the path segments
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Get the number of segments in the path
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Check if this is the root path (empty)
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Check if this is the root path
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Append a segment (builder pattern)
    ///
    /// Segment validity (non-empty, no `.`) is enforced where untrusted
    /// names enter the system: path parsing and schema registration.
    pub fn child(mut self, name: impl Into<String>) -> Self {
        self.segments.push(name.into());
        self
    }

    /// Push a segment (mutating)
    pub fn push(&mut self, name: impl Into<String>) {
        self.segments.push(name.into());
    }

    /// Pop the last segment (mutating); None if root
    pub fn pop(&mut self) -> Option<String> {
        self.segments.pop()
    }

    /// Get the parent path (None if root)
    pub fn parent(&self) -> Option<Path> {
        if self.segments.is_empty() {
            None
        } else {
            let mut parent = self.clone();
            parent.segments.pop();
            Some(parent)
        }
    }

    /// Get the first segment (None if root)
    pub fn first(&self) -> Option<&str> {
        self.segments.first().map(String::as_str)
    }

    /// Get the last segment (None if root)
    pub fn last(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// Get the segment at `index`, if present
    pub fn segment(&self, index: usize) -> Option<&str> {
        self.segments.get(index).map(String::as_str)
    }

    /// Check if this path starts with the given prefix (or equals it)
    pub fn starts_with(&self, prefix: &Path) -> bool {
        prefix.is_ancestor_of(self)
    }

    /// Check if this path is an ancestor of another (or equal)
    ///
    /// A path is an ancestor if it is a prefix of the other path.
    /// The root path is an ancestor of all paths.
    /// A path is considered an ancestor of itself.
    pub fn is_ancestor_of(&self, other: &Path) -> bool {
        if self.segments.len() > other.segments.len() {
            return false;
        }
        self.segments
            .iter()
            .zip(other.segments.iter())
            .all(|(a, b)| a == b)
    }

    /// Check if this path is a strict ancestor of another (not equal)
    pub fn is_strict_ancestor_of(&self, other: &Path) -> bool {
        self.segments.len() < other.segments.len() && self.is_ancestor_of(other)
    }

    /// The segment immediately below `base` on the way to this path
    ///
    /// Returns None when `base` is not a strict ancestor of this path.
    /// This is the grouping key for prefix runs: every property below
    /// `inner` reports `inner` for an empty base.
    pub fn segment_after(&self, base: &Path) -> Option<&str> {
        if base.is_strict_ancestor_of(self) {
            self.segment(base.len())
        } else {
            None
        }
    }

    /// The remainder of this path below `base`
    ///
    /// Returns None when `base` is not an ancestor of this path. The
    /// remainder of a path relative to itself is the root path.
    pub fn strip_prefix(&self, base: &Path) -> Option<Path> {
        if base.is_ancestor_of(self) {
            Some(Path {
                segments: self.segments[base.len()..].iter().cloned().collect(),
            })
        } else {
            None
        }
    }

    /// Append all segments of `rel` to this path
    pub fn join(&self, rel: &Path) -> Path {
        let mut joined = self.clone();
        joined.segments.extend(rel.segments.iter().cloned());
        joined
    }

    /// Validate path limits
    ///
    /// Returns an error if the path exceeds [`MAX_PATH_SEGMENTS`] or its
    /// rendered form exceeds [`MAX_PATH_STRING`] bytes.
    pub fn validate(&self) -> Result<(), PathError> {
        let count = self.segments.len();
        if count > MAX_PATH_SEGMENTS {
            return Err(PathError::TooManySegments {
                count,
                max: MAX_PATH_SEGMENTS,
            });
        }
        let length = self
            .segments
            .iter()
            .map(|s| s.len() + 1)
            .sum::<usize>()
            .saturating_sub(1);
        if length > MAX_PATH_STRING {
            return Err(PathError::TooLong {
                length,
                max: MAX_PATH_STRING,
            });
        }
        Ok(())
    }
}

/// Validate one path segment as it enters from an untrusted source
///
/// Segments must be non-empty and must not contain the `.` separator.
/// Position `at` is reported in the error for parse diagnostics.
pub fn validate_segment(segment: &str, at: usize) -> Result<(), PathError> {
    if segment.is_empty() {
        return Err(PathError::EmptySegment(at));
    }
    Ok(())
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, seg) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            f.write_str(seg)?;
        }
        Ok(())
    }
}

impl FromStr for Path {
    type Err = PathError;

    /// Parse a dotted path string
    ///
    /// The empty string parses to the root path. Every segment between
    /// dots must be non-empty.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Ok(Path::root());
        }
        let mut path = Path::root();
        let mut at = 0usize;
        for seg in s.split('.') {
            validate_segment(seg, at)?;
            at += seg.len() + 1;
            path.push(seg);
        }
        path.validate()?;
        Ok(path)
    }
}

// Paths serialize as their rendered string form, which keeps the wire
// representation (attribute names, packed payloads, cursors) human-readable.
impl Serialize for Path {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Path {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(DeError::custom)
    }
}
