//! Query composition failures

use thiserror::Error;

/// Errors raised while compiling, merging, or paginating queries
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// Branch expansion needs more native queries than allowed
    ///
    /// Raised during compilation when the AND/OR tree expands past the
    /// configured cap, and by `count` when the tree compiles to more than
    /// one native query.
    #[error("query expands to {count} native queries (limit {max})")]
    TooManyQueries {
        /// How many native queries the expansion reached
        count: usize,
        /// The cap in force
        max: usize,
    },

    /// An ancestor-less query was issued inside a transaction
    #[error("queries inside a transaction must set an ancestor")]
    TransactionRequiresAncestor,

    /// A cursor the compiled plan cannot honor
    #[error("cursor unsupported: {reason}")]
    UnsupportedCursor {
        /// Why the cursor cannot be honored
        reason: String,
    },

    /// A merge with no defined client-side semantics
    #[error("unsupported query plan: {reason}")]
    UnsupportedPlan {
        /// Why the plan is rejected
        reason: String,
    },

    /// A uniqueness terminator matched more than one record
    #[error("expected at most one result, found {count}")]
    NotUnique {
        /// How many records matched
        count: usize,
    },
}
