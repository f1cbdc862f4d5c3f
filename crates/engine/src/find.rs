//! The find surface
//!
//! [`FindCommand`] is the builder handed out by
//! [`Datastore::find`](crate::Datastore::find): filters, ranges, OR
//! branches, sorts, ancestry scope, fetch windows, and a family of
//! terminators. Field names and cursor text are kept raw until a
//! terminator runs, so every failure surfaces through the terminator's
//! `Result`.

use std::marker::PhantomData;
use std::sync::Arc;

use graft_core::datum::Datum;
use graft_core::key::Key;
use graft_core::path::Path;
use graft_core::property::Property;
use graft_core::record::Record;
use graft_core::schema::TypeDescriptor;
use graft_query::{
    compile, merge_runs, CompileCx, Cursor, Filter, FilterOp, FilterTree, Merge, MergedStream,
    NativeQuery, QueryError, QuerySpec, Sort,
};
use rustc_hash::FxHashSet;
use tracing::debug;

use crate::datastore::Datastore;
use crate::error::{Error, Result};
use crate::task::Deferred;

/// One declarative constraint on a find
///
/// Field names stay raw strings here; they resolve to attribute paths
/// when a terminator compiles the command.
#[derive(Debug, Clone)]
pub enum FindSpec {
    /// The attribute at `field` must compare against `value` under `op`
    Filter {
        /// Dotted attribute path
        field: String,
        /// Comparison operator
        op: FilterOp,
        /// Comparand
        value: Datum,
    },
    /// Half-open range: `from <= field < to`
    Range {
        /// Dotted attribute path
        field: String,
        /// Inclusive lower bound
        from: Datum,
        /// Exclusive upper bound
        to: Datum,
    },
    /// A nested group merged under one connective
    Branch {
        /// How the children combine
        merge: Merge,
        /// The grouped constraints
        children: Vec<FindSpec>,
    },
}

impl FindSpec {
    /// A single comparison
    pub fn filter(field: impl Into<String>, op: FilterOp, value: impl Into<Datum>) -> Self {
        FindSpec::Filter {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    /// A half-open range, `from <= field < to`
    pub fn range(field: impl Into<String>, from: impl Into<Datum>, to: impl Into<Datum>) -> Self {
        FindSpec::Range {
            field: field.into(),
            from: from.into(),
            to: to.into(),
        }
    }

    /// A nested AND/OR group
    pub fn branch(merge: Merge, children: Vec<FindSpec>) -> Self {
        FindSpec::Branch { merge, children }
    }

    fn to_tree(&self) -> Result<FilterTree> {
        match self {
            FindSpec::Filter { field, op, value } => Ok(FilterTree::Leaf(Filter::new(
                field.parse()?,
                *op,
                value.clone(),
            ))),
            FindSpec::Range { field, from, to } => {
                let path: Path = field.parse()?;
                Ok(FilterTree::All(vec![
                    FilterTree::Leaf(Filter::new(path.clone(), FilterOp::Ge, from.clone())),
                    FilterTree::Leaf(Filter::new(path, FilterOp::Lt, to.clone())),
                ]))
            }
            FindSpec::Branch { merge, children } => {
                let children = children
                    .iter()
                    .map(FindSpec::to_tree)
                    .collect::<Result<Vec<_>>>()?;
                Ok(FilterTree::branch(*merge, children))
            }
        }
    }
}

/// A find in the making
///
/// Built fluently, executed by one of the `return_*` terminators. The
/// command owns a datastore handle, so it can outlive the call site and
/// run on a worker thread via the `_later` terminators.
pub struct FindCommand<T> {
    db: Datastore,
    in_transaction: bool,
    specs: Vec<FindSpec>,
    sorts: Vec<(String, bool)>,
    ancestor: Option<Key>,
    keys_only: bool,
    offset: usize,
    limit: Option<usize>,
    chunk: Option<usize>,
    start_text: Option<String>,
    end_text: Option<String>,
    unactivated: bool,
    record_pred: Option<Box<dyn Fn(&Record) -> bool + Send>>,
    prop_pred: Option<Box<dyn Fn(&Property) -> bool + Send>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: 'static> FindCommand<T> {
    pub(crate) fn new(db: Datastore, in_transaction: bool) -> Self {
        FindCommand {
            db,
            in_transaction,
            specs: Vec::new(),
            sorts: Vec::new(),
            ancestor: None,
            keys_only: false,
            offset: 0,
            limit: None,
            chunk: None,
            start_text: None,
            end_text: None,
            unactivated: false,
            record_pred: None,
            prop_pred: None,
            _marker: PhantomData,
        }
    }

    /// Require `field op value`
    pub fn filter(
        mut self,
        field: impl Into<String>,
        op: FilterOp,
        value: impl Into<Datum>,
    ) -> Self {
        self.specs.push(FindSpec::filter(field, op, value));
        self
    }

    /// Require `from <= field < to`
    pub fn range(
        mut self,
        field: impl Into<String>,
        from: impl Into<Datum>,
        to: impl Into<Datum>,
    ) -> Self {
        self.specs.push(FindSpec::range(field, from, to));
        self
    }

    /// Attach a constraint built separately, typically an OR group
    pub fn branch(mut self, spec: FindSpec) -> Self {
        self.specs.push(spec);
        self
    }

    /// Sort ascending by an attribute
    pub fn sort(mut self, field: impl Into<String>) -> Self {
        self.sorts.push((field.into(), false));
        self
    }

    /// Sort descending by an attribute
    pub fn sort_desc(mut self, field: impl Into<String>) -> Self {
        self.sorts.push((field.into(), true));
        self
    }

    /// Scope results to one ancestry subtree, the ancestor included
    pub fn ancestor(mut self, key: &Key) -> Self {
        self.ancestor = Some(key.clone());
        self
    }

    /// Fetch keys without property payloads
    pub fn keys_only(mut self) -> Self {
        self.keys_only = true;
        self
    }

    /// Decode without activating ancestors; parent fields hold keys
    pub fn unactivated(mut self) -> Self {
        self.unactivated = true;
        self
    }

    /// Skip the first `offset` results
    pub fn start_at(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Yield at most `limit` results
    pub fn fetch_max(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Hint the adapter to fetch in batches of `chunk`
    pub fn fetch_by(mut self, chunk: usize) -> Self {
        self.chunk = Some(chunk);
        self
    }

    /// Resume after the position a previous find's cursor rendered
    pub fn continue_from(mut self, cursor: impl Into<String>) -> Self {
        self.start_text = Some(cursor.into());
        self
    }

    /// Stop at the position a previous find's cursor rendered
    pub fn finish_at(mut self, cursor: impl Into<String>) -> Self {
        self.end_text = Some(cursor.into());
        self
    }

    /// Drop fetched records the predicate rejects, before decoding
    pub fn filter_records(mut self, pred: impl Fn(&Record) -> bool + Send + 'static) -> Self {
        self.record_pred = Some(Box::new(pred));
        self
    }

    /// Drop individual properties the predicate rejects, before decoding
    pub fn filter_properties(mut self, pred: impl Fn(&Property) -> bool + Send + 'static) -> Self {
        self.prop_pred = Some(Box::new(pred));
        self
    }

    /// All matching instances, decoded
    pub fn return_all(self) -> Result<Vec<T>> {
        self.return_iter()?.collect()
    }

    /// A streaming iterator over matching instances
    pub fn return_iter(self) -> Result<FoundIter<T>> {
        self.execute()
    }

    /// The keys of matching records, skipping property payloads
    pub fn return_keys(mut self) -> Result<Vec<Key>> {
        self.keys_only = true;
        let iter = self.execute()?;
        Ok(iter.stream.map(|record| record.into_parts().0).collect())
    }

    /// Exactly zero or one match; more is an error
    pub fn return_unique(self) -> Result<Option<T>> {
        let mut iter = self.execute()?;
        let first = match iter.next() {
            Some(first) => first?,
            None => return Ok(None),
        };
        let extra = iter.stream.remaining();
        if extra > 0 {
            return Err(Error::Query(QueryError::NotUnique { count: 1 + extra }));
        }
        Ok(Some(first))
    }

    /// How many records match, counted adapter-side
    ///
    /// Counting needs exactly one native query, so OR branches are
    /// rejected here. Record and property predicates run client-side and
    /// do not participate.
    pub fn return_count(self) -> Result<usize> {
        let (_, queries) = self.prepare()?;
        match queries.as_slice() {
            [] => Ok(0),
            [query] => Ok(self.db.adapter().count(query)?),
            many => Err(Error::Query(QueryError::TooManyQueries {
                count: many.len(),
                max: 1,
            })),
        }
    }

    /// The distinct parents of matching records, in first-seen order
    ///
    /// Runs keys-only, deduplicates parent keys, then loads each parent
    /// as `P`. Records without a parent, and parent keys whose record is
    /// gone, are skipped.
    pub fn return_parents<P: 'static>(mut self) -> Result<Vec<P>> {
        self.keys_only = true;
        let FoundIter { db, stream, .. } = self.execute()?;
        let mut seen = FxHashSet::default();
        let mut parents = Vec::new();
        for record in stream {
            let parent_key = match record.key().parent() {
                Some(parent) => parent.clone(),
                None => continue,
            };
            if seen.insert(parent_key.clone()) {
                if let Some(parent) = db.load_by_key::<P>(&parent_key)? {
                    parents.push(parent);
                }
            }
        }
        Ok(parents)
    }

    /// Run [`FindCommand::return_all`] on a worker thread
    pub fn return_all_later(self) -> Deferred<Vec<T>>
    where
        T: Send,
    {
        Deferred::spawn(move || self.return_all())
    }

    /// Run [`FindCommand::return_unique`] on a worker thread
    pub fn return_unique_later(self) -> Deferred<Option<T>>
    where
        T: Send,
    {
        Deferred::spawn(move || self.return_unique())
    }

    /// Run [`FindCommand::return_count`] on a worker thread
    pub fn return_count_later(self) -> Deferred<usize> {
        Deferred::spawn(move || self.return_count())
    }

    fn prepare(&self) -> Result<(Arc<TypeDescriptor>, Vec<NativeQuery>)> {
        let descriptor = Arc::clone(self.db.registry().descriptor_of::<T>()?);
        let mut spec = QuerySpec::new(descriptor.kind());
        for constraint in &self.specs {
            spec.specs.push(constraint.to_tree()?);
        }
        for (field, descending) in &self.sorts {
            let path = field.parse()?;
            spec.sorts.push(if *descending {
                Sort::desc(path)
            } else {
                Sort::asc(path)
            });
        }
        spec.ancestor = self.ancestor.clone();
        spec.keys_only = self.keys_only;
        spec.offset = self.offset;
        spec.limit = self.limit;
        spec.chunk = self.chunk;
        if let Some(text) = &self.start_text {
            spec.start = Some(text.parse()?);
        }
        if let Some(text) = &self.end_text {
            spec.end = Some(text.parse()?);
        }
        let cx = CompileCx {
            in_transaction: self.in_transaction,
            max_queries: self.db.config().max_queries,
        };
        let queries = compile(&spec, cx)?;
        Ok((descriptor, queries))
    }

    fn execute(mut self) -> Result<FoundIter<T>> {
        let (descriptor, queries) = self.prepare()?;
        let mut runs = Vec::with_capacity(queries.len());
        for query in &queries {
            runs.push(self.db.adapter().run(query)?);
        }
        if let Some(pred) = self.record_pred.take() {
            for run in &mut runs {
                run.records.retain(|record| pred(record));
            }
        }
        if let Some(pred) = self.prop_pred.take() {
            for run in &mut runs {
                let records = std::mem::take(&mut run.records);
                run.records = records
                    .into_iter()
                    .map(|record| {
                        let (key, mut props) = record.into_parts();
                        props.retain(|property| pred(property));
                        Record::new(key, props)
                    })
                    .collect();
            }
        }
        let stream = merge_runs(Merge::Or, runs)?;
        debug!(
            sources = stream.sources(),
            results = stream.remaining(),
            "find executed"
        );
        let depth = if self.unactivated {
            0
        } else {
            self.db.config().activation_depth
        };
        Ok(FoundIter {
            db: self.db,
            descriptor,
            stream,
            depth,
            _marker: PhantomData,
        })
    }
}

/// Streaming results of a find, decoding one record per step
pub struct FoundIter<T> {
    db: Datastore,
    descriptor: Arc<TypeDescriptor>,
    stream: MergedStream,
    depth: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T> FoundIter<T> {
    /// How many native queries fed this stream
    pub fn sources(&self) -> usize {
        self.stream.sources()
    }

    /// Records fetched but not yet decoded
    pub fn remaining(&self) -> usize {
        self.stream.remaining()
    }

    /// Where a follow-up find should resume
    ///
    /// Available only when the results came from exactly one native
    /// query; merged streams forfeit cursors.
    pub fn cursor(&self) -> Result<Cursor> {
        Ok(self.stream.cursor()?)
    }
}

impl<T: 'static> Iterator for FoundIter<T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        let record = self.stream.next()?;
        Some(self.db.decode_with_depth(&self.descriptor, &record, self.depth))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.stream.size_hint()
    }
}
