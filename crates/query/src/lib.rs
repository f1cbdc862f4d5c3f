//! Query composition over flat record stores
//!
//! This crate turns a find specification into executable work:
//! - [`Filter`], [`Sort`]: attribute comparisons and orderings under the
//!   unified query order
//! - [`FilterTree`]: the AND/OR branch tree of one find invocation
//! - [`compile`]: expansion into one [`NativeQuery`] per disjunct, capped
//! - [`merge_runs`]: concatenation of per-query runs into one logical
//!   stream, de-duplicated by key
//! - [`Cursor`]: opaque resume positions, honored by single-query plans
//!
//! The crate knows nothing about object translation or any particular
//! backing store; adapters evaluate [`NativeQuery`] against their own
//! storage and hand runs back for merging.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cursor;
pub mod error;
pub mod filter;
pub mod merge;
pub mod plan;
pub mod tree;

pub use cursor::Cursor;
pub use error::QueryError;
pub use filter::{order_records, Filter, FilterOp, Sort};
pub use merge::{merge_runs, MergedStream};
pub use plan::{compile, CompileCx, NativeQuery, QueryRun, QuerySpec};
pub use tree::{FilterTree, Merge};
