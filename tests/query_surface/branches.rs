//! OR branches, merged result sets, and the single-query terminators

use crate::common::{seeded, titles, Track};
use graftdb::{Error, FilterOp, FindSpec, Merge, QueryError};
use rustc_hash::FxHashSet;

#[test]
fn test_or_branch_yields_each_match_once() {
    let db = seeded();

    let found = db
        .find::<Track>()
        .branch(FindSpec::branch(
            Merge::Or,
            vec![
                FindSpec::filter("genre", FilterOp::Eq, "ambient"),
                FindSpec::filter("plays", FilterOp::Ge, 100i64),
            ],
        ))
        .return_all()
        .unwrap();

    // the ambient arm answers first, then the high-play arm adds what is new
    assert_eq!(titles(&found), ["glass harbor", "cold spring", "night bus"]);

    let mut seen = FxHashSet::default();
    assert!(found.iter().all(|t| seen.insert(t.id)));
}

#[test]
fn test_and_inside_or_compiles_per_arm() {
    let db = seeded();

    let found = db
        .find::<Track>()
        .branch(FindSpec::branch(
            Merge::Or,
            vec![
                FindSpec::branch(
                    Merge::And,
                    vec![
                        FindSpec::filter("genre", FilterOp::Eq, "ambient"),
                        FindSpec::filter("plays", FilterOp::Lt, 350i64),
                    ],
                ),
                FindSpec::filter("genre", FilterOp::Eq, "doom"),
            ],
        ))
        .return_all()
        .unwrap();

    assert_eq!(titles(&found), ["cold spring", "marrow"]);
}

#[test]
fn test_unique_survives_overlapping_arms() {
    let db = seeded();

    // both arms match the same single track; the merge must not double it
    let only = db
        .find::<Track>()
        .branch(FindSpec::branch(
            Merge::Or,
            vec![
                FindSpec::filter("title", FilterOp::Eq, "glass harbor"),
                FindSpec::filter("plays", FilterOp::Ge, 400i64),
            ],
        ))
        .return_unique()
        .unwrap();

    assert_eq!(only.unwrap().title, "glass harbor");
}

#[test]
fn test_unique_rejects_a_second_match() {
    let db = seeded();

    let err = db
        .find::<Track>()
        .filter("genre", FilterOp::Eq, "ambient")
        .return_unique()
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Query(QueryError::NotUnique { count: 2 })
    ));
}

#[test]
fn test_count_over_a_single_query() {
    let db = seeded();

    let counted = db
        .find::<Track>()
        .filter("genre", FilterOp::Eq, "ambient")
        .return_count()
        .unwrap();

    assert_eq!(counted, 2);
}

#[test]
fn test_count_rejects_forked_plans() {
    let db = seeded();

    let err = db
        .find::<Track>()
        .branch(FindSpec::branch(
            Merge::Or,
            vec![
                FindSpec::filter("genre", FilterOp::Eq, "ambient"),
                FindSpec::filter("genre", FilterOp::Eq, "doom"),
            ],
        ))
        .return_count()
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Query(QueryError::TooManyQueries { count: 2, max: 1 })
    ));
}

#[test]
fn test_branch_fanout_is_capped() {
    use graftdb::{Config, Datastore, MemoryStore};

    let db = Datastore::builder(crate::common::registry())
        .config(Config::new().max_queries(4))
        .open(MemoryStore::new());

    // two three-way arms multiply out to nine native queries
    let wide = FindSpec::branch(
        Merge::Or,
        vec![
            FindSpec::filter("genre", FilterOp::Eq, "ambient"),
            FindSpec::filter("genre", FilterOp::Eq, "doom"),
            FindSpec::filter("genre", FilterOp::Eq, "electro"),
        ],
    );
    let err = db
        .find::<Track>()
        .branch(wide.clone())
        .branch(wide)
        .return_all()
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Query(QueryError::TooManyQueries { count: 9, max: 4 })
    ));
}
