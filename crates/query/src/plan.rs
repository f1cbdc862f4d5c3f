//! Compilation of find specifications into native queries
//!
//! A [`QuerySpec`] is everything one find invocation asks for. [`compile`]
//! expands its branch tree into disjunctive normal form and emits one
//! [`NativeQuery`] per conjunct, carrying the shared scan directives. The
//! adapter executes each native query against its own result order and
//! reports a [`QueryRun`] per query; merging runs back into one stream is
//! the merge module's job.

use crate::cursor::Cursor;
use crate::error::QueryError;
use crate::filter::{Filter, Sort};
use crate::tree::FilterTree;
use graft_core::key::Key;
use graft_core::limits::MAX_COMPILED_QUERIES;
use graft_core::record::Record;
use tracing::debug;

/// Everything one find invocation asks for, before compilation
#[derive(Debug, Clone)]
pub struct QuerySpec {
    /// The queried kind
    pub kind: String,
    /// Filter specifications, combined conjunctively
    pub specs: Vec<FilterTree>,
    /// Sort directives, applied per native query
    pub sorts: Vec<Sort>,
    /// Scope results to the descendant chain of this key
    pub ancestor: Option<Key>,
    /// Skip record bodies and yield keys alone
    pub keys_only: bool,
    /// Records to skip per native query
    pub offset: usize,
    /// Maximum records to yield per native query
    pub limit: Option<usize>,
    /// Fetch-chunk hint for the adapter
    pub chunk: Option<usize>,
    /// Resume after this position
    pub start: Option<Cursor>,
    /// Stop at this position
    pub end: Option<Cursor>,
}

impl QuerySpec {
    /// An unfiltered specification over one kind
    pub fn new(kind: impl Into<String>) -> Self {
        QuerySpec {
            kind: kind.into(),
            specs: Vec::new(),
            sorts: Vec::new(),
            ancestor: None,
            keys_only: false,
            offset: 0,
            limit: None,
            chunk: None,
            start: None,
            end: None,
        }
    }
}

/// Constraints the issuing session places on compilation
#[derive(Debug, Clone, Copy)]
pub struct CompileCx {
    /// Whether the session has an open transaction
    pub in_transaction: bool,
    /// Cap on native queries one find may expand to
    pub max_queries: usize,
}

impl Default for CompileCx {
    fn default() -> Self {
        CompileCx {
            in_transaction: false,
            max_queries: MAX_COMPILED_QUERIES,
        }
    }
}

/// One executable query against the backing store
#[derive(Debug, Clone)]
pub struct NativeQuery {
    /// Position in compile order
    pub index: usize,
    /// The queried kind
    pub kind: String,
    /// Scope results to the descendant chain of this key
    pub ancestor: Option<Key>,
    /// Conjunctive filters
    pub filters: Vec<Filter>,
    /// Sort directives
    pub sorts: Vec<Sort>,
    /// Skip record bodies and yield keys alone
    pub keys_only: bool,
    /// Records to skip
    pub offset: usize,
    /// Maximum records to yield
    pub limit: Option<usize>,
    /// Fetch-chunk hint
    pub chunk: Option<usize>,
    /// Resume after this position
    pub start: Option<Cursor>,
    /// Stop at this position
    pub end: Option<Cursor>,
}

/// What one native query execution produced
#[derive(Debug, Clone)]
pub struct QueryRun {
    /// Records in result order, window applied
    pub records: Vec<Record>,
    /// The position a follow-up `continue_from` picks up at
    pub next: Cursor,
}

/// Expand a specification into its native queries
///
/// AND branches narrow a single query; OR branches fork, so the compiled
/// count is the Cartesian product across independent OR branches, capped
/// by the context. Cursors only make sense against one result order, so a
/// specification carrying them must compile to exactly one query.
/// Transactional reads require an ancestor scope.
pub fn compile(spec: &QuerySpec, cx: CompileCx) -> Result<Vec<NativeQuery>, QueryError> {
    if cx.in_transaction && spec.ancestor.is_none() {
        return Err(QueryError::TransactionRequiresAncestor);
    }

    let root = FilterTree::All(spec.specs.clone());
    let conjuncts = root.expand(cx.max_queries)?;

    if conjuncts.len() > 1 && (spec.start.is_some() || spec.end.is_some()) {
        return Err(QueryError::UnsupportedCursor {
            reason: format!("a cursor cannot span {} merged queries", conjuncts.len()),
        });
    }

    debug!(kind = %spec.kind, queries = conjuncts.len(), "compiled find specification");

    Ok(conjuncts
        .into_iter()
        .enumerate()
        .map(|(index, filters)| NativeQuery {
            index,
            kind: spec.kind.clone(),
            ancestor: spec.ancestor.clone(),
            filters,
            sorts: spec.sorts.clone(),
            keys_only: spec.keys_only,
            offset: spec.offset,
            limit: spec.limit,
            chunk: spec.chunk,
            start: spec.start,
            end: spec.end,
        })
        .collect())
}

impl NativeQuery {
    /// Whether a record satisfies the kind, ancestor scope, and filters
    pub fn matches(&self, record: &Record) -> bool {
        if record.key().kind() != self.kind {
            return false;
        }
        if let Some(ancestor) = &self.ancestor {
            if !record.key().has_ancestor(ancestor) {
                return false;
            }
        }
        self.filters.iter().all(|f| f.matches(record.props()))
    }

    /// Slice a full result order down to the requested window
    ///
    /// The start cursor and offset both skip from the front; the end
    /// cursor and limit both bound the tail. The reported resume position
    /// is absolute within the full order, which is what makes a follow-up
    /// `continue_from` land directly after the yielded records.
    pub fn window(&self, mut ordered: Vec<Record>) -> QueryRun {
        let total = ordered.len();
        let begin = self
            .start
            .map_or(0, |c| c.offset())
            .saturating_add(self.offset)
            .min(total);
        let mut end = self.end.map_or(total, |c| c.offset().min(total));
        if let Some(limit) = self.limit {
            end = end.min(begin.saturating_add(limit));
        }
        let end = end.max(begin);

        ordered.truncate(end);
        ordered.drain(..begin);
        QueryRun {
            records: ordered,
            next: Cursor::new(self.index, end),
        }
    }
}
