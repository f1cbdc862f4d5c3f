//! The filter branch tree
//!
//! Finds are specified as a tree: leaves are single attribute comparisons,
//! AND nodes narrow one native query, OR nodes fork into separate native
//! queries. Expansion rewrites the tree into disjunctive normal form, so
//! every conjunct becomes one native query and OR branches multiply the
//! query count as a Cartesian product.

use crate::error::QueryError;
use crate::filter::Filter;

/// How a branch combines its children
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Merge {
    /// Every child must hold; narrows the same native query
    And,
    /// At least one child must hold; forks into separate native queries
    Or,
}

/// One node of the branch tree
#[derive(Debug, Clone, PartialEq)]
pub enum FilterTree {
    /// A single attribute comparison
    Leaf(Filter),
    /// Every child must hold
    All(Vec<FilterTree>),
    /// At least one child must hold
    Any(Vec<FilterTree>),
}

impl FilterTree {
    /// Branch node from a merge operator
    pub fn branch(merge: Merge, children: Vec<FilterTree>) -> Self {
        match merge {
            Merge::And => FilterTree::All(children),
            Merge::Or => FilterTree::Any(children),
        }
    }

    /// Expand to disjunctive normal form: one filter list per native query
    ///
    /// `All` is the Cartesian product of its children's expansions, `Any`
    /// their concatenation. The conjunct count is checked against `max` at
    /// every growth step, so a pathological tree fails fast instead of
    /// materializing its product. An empty `All` is one unfiltered
    /// conjunct (matches everything); an empty `Any` is no conjunct at
    /// all (matches nothing).
    pub fn expand(&self, max: usize) -> Result<Vec<Vec<Filter>>, QueryError> {
        match self {
            FilterTree::Leaf(filter) => Ok(vec![vec![filter.clone()]]),
            FilterTree::All(children) => {
                let mut acc: Vec<Vec<Filter>> = vec![Vec::new()];
                for child in children {
                    let expanded = child.expand(max)?;
                    let mut next =
                        Vec::with_capacity(acc.len().saturating_mul(expanded.len()));
                    for left in &acc {
                        for right in &expanded {
                            let mut merged = left.clone();
                            merged.extend(right.iter().cloned());
                            next.push(merged);
                        }
                    }
                    check_cap(next.len(), max)?;
                    acc = next;
                }
                Ok(acc)
            }
            FilterTree::Any(children) => {
                let mut acc = Vec::new();
                for child in children {
                    acc.extend(child.expand(max)?);
                    check_cap(acc.len(), max)?;
                }
                Ok(acc)
            }
        }
    }
}

fn check_cap(count: usize, max: usize) -> Result<(), QueryError> {
    if count > max {
        return Err(QueryError::TooManyQueries { count, max });
    }
    Ok(())
}
