//! Cursor paging and cursor serialization

use crate::common::{seeded, titles, Track};
use graftdb::{Cursor, Error, FilterOp, FindSpec, Merge, QueryError};

#[test]
fn test_paging_walks_the_full_result_set() {
    let db = seeded();
    let mut all: Vec<Track> = Vec::new();
    let mut cursor: Option<Cursor> = None;

    loop {
        let mut cmd = db.find::<Track>().sort("plays").fetch_max(2);
        if let Some(c) = &cursor {
            cmd = cmd.continue_from(c.to_string());
        }
        let mut iter = cmd.return_iter().unwrap();
        let before = all.len();
        for item in iter.by_ref() {
            all.push(item.unwrap());
        }
        if all.len() == before {
            break;
        }
        cursor = Some(iter.cursor().unwrap());
    }

    assert_eq!(
        titles(&all),
        ["marrow", "night bus", "cold spring", "glass harbor"]
    );
}

#[test]
fn test_finish_at_bounds_the_walk() {
    let db = seeded();

    let mut iter = db
        .find::<Track>()
        .sort("plays")
        .fetch_max(2)
        .return_iter()
        .unwrap();
    let first: Vec<Track> = iter.by_ref().map(|r| r.unwrap()).collect();
    assert_eq!(titles(&first), ["marrow", "night bus"]);
    let stop = iter.cursor().unwrap();

    // a fresh walk bounded by that cursor covers exactly the same window
    let bounded = db
        .find::<Track>()
        .sort("plays")
        .finish_at(stop.to_string())
        .return_all()
        .unwrap();
    assert_eq!(titles(&bounded), ["marrow", "night bus"]);
}

#[test]
fn test_cursor_travels_as_plain_data() {
    let cursor = Cursor::new(0, 2);

    let json = serde_json::to_string(&cursor).unwrap();
    let back: Cursor = serde_json::from_str(&json).unwrap();
    assert_eq!(back, cursor);

    let rendered = cursor.to_string();
    let parsed: Cursor = rendered.parse().unwrap();
    assert_eq!(parsed, cursor);
}

#[test]
fn test_merged_results_forfeit_the_cursor() {
    let db = seeded();

    let iter = db
        .find::<Track>()
        .branch(FindSpec::branch(
            Merge::Or,
            vec![
                FindSpec::filter("genre", FilterOp::Eq, "ambient"),
                FindSpec::filter("genre", FilterOp::Eq, "doom"),
            ],
        ))
        .return_iter()
        .unwrap();

    assert_eq!(iter.sources(), 2);
    assert!(matches!(
        iter.cursor(),
        Err(Error::Query(QueryError::UnsupportedCursor { .. }))
    ));
}

#[test]
fn test_malformed_cursor_text_is_rejected() {
    let db = seeded();

    let err = db
        .find::<Track>()
        .continue_from("not a cursor")
        .return_all()
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Query(QueryError::UnsupportedCursor { .. })
    ));
}
