//! Opaque pagination cursors
//!
//! A cursor names a resume position inside one compiled query: the query's
//! position in compile order and a record offset within its result order.
//! The rendered form is base64 over `index:offset`, opaque enough that
//! callers hold it across requests without depending on the layout.
//! Cursors are only honored by plans that compile to a single native
//! query; merged results forfeit them.

use crate::error::QueryError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A resume position within one compiled query's results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    query_index: usize,
    offset: usize,
}

impl Cursor {
    /// Cursor at `offset` within the query at `query_index`
    pub fn new(query_index: usize, offset: usize) -> Self {
        Cursor {
            query_index,
            offset,
        }
    }

    /// Which compiled query the position belongs to
    pub fn query_index(&self) -> usize {
        self.query_index
    }

    /// Records consumed before this position
    pub fn offset(&self) -> usize {
        self.offset
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let raw = format!("{}:{}", self.query_index, self.offset);
        write!(f, "{}", STANDARD.encode(raw))
    }
}

impl FromStr for Cursor {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = STANDARD.decode(s).map_err(|_| malformed(s))?;
        let text = String::from_utf8(bytes).map_err(|_| malformed(s))?;
        let (index, offset) = text.split_once(':').ok_or_else(|| malformed(s))?;
        Ok(Cursor {
            query_index: index.parse().map_err(|_| malformed(s))?,
            offset: offset.parse().map_err(|_| malformed(s))?,
        })
    }
}

fn malformed(text: &str) -> QueryError {
    QueryError::UnsupportedCursor {
        reason: format!("malformed cursor {text:?}"),
    }
}
