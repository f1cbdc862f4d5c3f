//! Merging per-query runs into one logical stream
//!
//! A single run passes through with its resume cursor intact. Several runs
//! are the OR case: concatenate in compile order, de-duplicating by key
//! since one record may satisfy more than one branch. The merged stream is
//! client-materialized, so it forfeits cursor pagination. An AND merge
//! across independently compiled queries has no client-side intersection
//! semantics and is rejected instead of guessed.

use crate::cursor::Cursor;
use crate::error::QueryError;
use crate::plan::QueryRun;
use crate::tree::Merge;
use graft_core::record::Record;
use rustc_hash::FxHashSet;
use tracing::trace;

/// One logical result stream over any number of native query runs
#[derive(Debug)]
pub struct MergedStream {
    records: std::vec::IntoIter<Record>,
    sources: usize,
    next: Option<Cursor>,
}

/// Combine runs under a merge operator
pub fn merge_runs(merge: Merge, runs: Vec<QueryRun>) -> Result<MergedStream, QueryError> {
    if merge == Merge::And && runs.len() > 1 {
        return Err(QueryError::UnsupportedPlan {
            reason: format!(
                "AND across {} compiled queries has no merge semantics",
                runs.len()
            ),
        });
    }

    let sources = runs.len();
    let next = match runs.as_slice() {
        [only] => Some(only.next),
        _ => None,
    };

    let mut records = Vec::new();
    if sources > 1 {
        let mut seen: FxHashSet<_> = FxHashSet::default();
        for run in runs {
            for record in run.records {
                if seen.insert(record.key().clone()) {
                    records.push(record);
                }
            }
        }
        trace!(sources, yielded = records.len(), "merged OR result streams");
    } else {
        for run in runs {
            records.extend(run.records);
        }
    }

    Ok(MergedStream {
        records: records.into_iter(),
        sources,
        next,
    })
}

impl MergedStream {
    /// How many native queries fed the stream
    pub fn sources(&self) -> usize {
        self.sources
    }

    /// Records not yet consumed
    pub fn remaining(&self) -> usize {
        self.records.len()
    }

    /// The resume cursor, available only for single-query streams
    pub fn cursor(&self) -> Result<Cursor, QueryError> {
        self.next.ok_or_else(|| QueryError::UnsupportedCursor {
            reason: format!(
                "cursors require exactly one native query, results came from {}",
                self.sources
            ),
        })
    }
}

impl Iterator for MergedStream {
    type Item = Record;

    fn next(&mut self) -> Option<Self::Item> {
        self.records.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.records.size_hint()
    }
}
