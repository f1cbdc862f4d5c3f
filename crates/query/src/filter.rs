//! Property filters, sorts, and their in-memory evaluation
//!
//! Filters compare one attribute against a literal under the total query
//! order (numerics unified, kinds ranked). A multi-valued attribute
//! matches when any element matches, which is how list fields answer
//! equality filters.

use graft_core::datum::Datum;
use graft_core::path::Path;
use graft_core::property::PropertySet;
use graft_core::record::Record;
use std::cmp::Ordering;

/// Comparison operator of a property filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    /// Equal under the query order
    Eq,
    /// Strictly less than
    Lt,
    /// Less than or equal
    Le,
    /// Strictly greater than
    Gt,
    /// Greater than or equal
    Ge,
}

impl FilterOp {
    fn accepts(self, ord: Ordering) -> bool {
        match self {
            FilterOp::Eq => ord == Ordering::Equal,
            FilterOp::Lt => ord == Ordering::Less,
            FilterOp::Le => ord != Ordering::Greater,
            FilterOp::Gt => ord == Ordering::Greater,
            FilterOp::Ge => ord != Ordering::Less,
        }
    }
}

/// One attribute comparison
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    path: Path,
    op: FilterOp,
    value: Datum,
}

impl Filter {
    /// Create a filter
    pub fn new(path: Path, op: FilterOp, value: Datum) -> Self {
        Filter { path, op, value }
    }

    /// The filtered attribute path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The comparison operator
    pub fn op(&self) -> FilterOp {
        self.op
    }

    /// The literal being compared against
    pub fn value(&self) -> &Datum {
        &self.value
    }

    /// Whether an attribute set satisfies this filter
    ///
    /// An absent attribute never matches. Unindexed attributes do not
    /// answer filters, mirroring stores that only index what they are
    /// told to.
    pub fn matches(&self, props: &PropertySet) -> bool {
        let prop = match props.at(&self.path) {
            Some(p) => p,
            None => return false,
        };
        if !prop.indexed() {
            return false;
        }
        match prop.value() {
            Datum::List(items) => items
                .iter()
                .any(|item| self.op.accepts(item.query_cmp(&self.value))),
            single => self.op.accepts(single.query_cmp(&self.value)),
        }
    }
}

/// One sort directive
#[derive(Debug, Clone, PartialEq)]
pub struct Sort {
    /// The sorted attribute path
    pub path: Path,
    /// Descending instead of ascending
    pub descending: bool,
}

impl Sort {
    /// Ascending sort on a path
    pub fn asc(path: Path) -> Self {
        Sort {
            path,
            descending: false,
        }
    }

    /// Descending sort on a path
    pub fn desc(path: Path) -> Self {
        Sort {
            path,
            descending: true,
        }
    }
}

/// Order records by the sort list, then by key
///
/// Records missing a sorted attribute sort before records that have it,
/// matching how null ranks below every value in the query order.
pub fn order_records(records: &mut [Record], sorts: &[Sort]) {
    records.sort_by(|a, b| compare_records(a, b, sorts));
}

fn compare_records(a: &Record, b: &Record, sorts: &[Sort]) -> Ordering {
    for sort in sorts {
        let left = sort_datum(a, &sort.path);
        let right = sort_datum(b, &sort.path);
        let mut ord = left.query_cmp(right);
        if sort.descending {
            ord = ord.reverse();
        }
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.key().cmp(b.key())
}

fn sort_datum<'a>(record: &'a Record, path: &Path) -> &'a Datum {
    record
        .props()
        .at(path)
        .map(|p| p.value())
        .unwrap_or(&Datum::Null)
}
