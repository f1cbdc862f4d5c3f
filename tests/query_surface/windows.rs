//! Sort order, fetch windows, and projections

use crate::common::{seeded, titles, Track};
use graftdb::{FilterOp, Key};

#[test]
fn test_sort_ascending_is_stable_over_the_field() {
    let db = seeded();

    let found = db.find::<Track>().sort("plays").return_all().unwrap();

    assert_eq!(
        titles(&found),
        ["marrow", "night bus", "cold spring", "glass harbor"]
    );
}

#[test]
fn test_sort_descending_with_window() {
    let db = seeded();

    let found = db
        .find::<Track>()
        .sort_desc("plays")
        .start_at(1)
        .fetch_max(2)
        .return_all()
        .unwrap();

    assert_eq!(titles(&found), ["cold spring", "night bus"]);
}

#[test]
fn test_missing_sort_attribute_ranks_first() {
    let db = seeded();

    let found = db.find::<Track>().sort("rating").return_all().unwrap();

    // the unrated track has no attribute to compare and sorts ahead
    assert_eq!(
        titles(&found),
        ["night bus", "marrow", "glass harbor", "cold spring"]
    );
}

#[test]
fn test_absent_attribute_never_matches_filters() {
    let db = seeded();

    let found = db
        .find::<Track>()
        .filter("rating", FilterOp::Ge, 0i64)
        .return_all()
        .unwrap();

    assert_eq!(titles(&found), ["glass harbor", "cold spring", "marrow"]);
}

#[test]
fn test_range_excludes_the_upper_bound() {
    let db = seeded();

    let found = db
        .find::<Track>()
        .range("plays", 77i64, 420i64)
        .return_all()
        .unwrap();

    assert_eq!(titles(&found), ["night bus", "cold spring"]);
}

#[test]
fn test_keys_only_projects_bare_keys() {
    let db = seeded();

    let keys = db
        .find::<Track>()
        .filter("genre", FilterOp::Eq, "doom")
        .return_keys()
        .unwrap();

    assert_eq!(keys, [Key::new("track", 4)]);
}

#[test]
fn test_record_predicate_runs_before_decode() {
    let db = seeded();

    let found = db
        .find::<Track>()
        .filter_records(|record| record.key().id() == &graftdb::IdValue::Int(3))
        .return_all()
        .unwrap();

    assert_eq!(titles(&found), ["cold spring"]);
}

#[test]
fn test_deferred_count_runs_on_a_worker() {
    let db = seeded();

    let pending = db
        .find::<Track>()
        .filter("genre", FilterOp::Eq, "ambient")
        .return_count_later();

    assert_eq!(pending.wait().unwrap(), 2);
}
