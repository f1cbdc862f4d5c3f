//! Whole-instance round trips through the datastore

use crate::common::{datastore, exhibit, Curator, Dimensions, Exhibit};
use graftdb::Ancestor;
use proptest::prelude::*;

#[test]
fn test_every_field_shape_round_trips() {
    let db = datastore();
    let mut stored = exhibit("winter light");
    stored.curator = Ancestor::instance(Curator {
        id: 0,
        name: "ines".to_string(),
    });

    let key = db.store(&mut stored).unwrap();
    let loaded: Exhibit = db.load_by_key(&key).unwrap().unwrap();

    // store wrote allocated ids back in place, so the two now agree exactly
    assert_eq!(loaded, stored);
}

#[test]
fn test_embedded_values_survive_exactly() {
    let db = datastore();
    let mut piece = exhibit("atrium");
    piece.extent = Dimensions {
        width: 17,
        height: 4,
    };

    let key = db.store(&mut piece).unwrap();
    let loaded: Exhibit = db.load_by_key(&key).unwrap().unwrap();

    assert_eq!(
        loaded.extent,
        Dimensions {
            width: 17,
            height: 4,
        }
    );
}

#[test]
fn test_empty_list_and_absent_option_round_trip() {
    let db = datastore();
    let mut piece = exhibit("bare");
    piece.tags.clear();
    piece.notes = None;

    let key = db.store(&mut piece).unwrap();
    let loaded: Exhibit = db.load_by_key(&key).unwrap().unwrap();

    assert!(loaded.tags.is_empty());
    assert!(loaded.notes.is_none());
}

#[test]
fn test_update_preserves_untouched_fields() {
    let db = datastore();
    let mut piece = exhibit("first hang");
    let key = db.store(&mut piece).unwrap();

    piece.title = "rehang".to_string();
    let rewritten = db.update(&mut piece).unwrap();
    assert_eq!(rewritten, key);

    let loaded: Exhibit = db.load_by_key(&key).unwrap().unwrap();
    assert_eq!(loaded.title, "rehang");
    assert_eq!(loaded.catalog, piece.catalog);
    assert_eq!(loaded.opened, piece.opened);
}

proptest! {
    #[test]
    fn prop_scalars_and_lists_round_trip(
        title in "[a-z ]{1,24}",
        width in any::<i64>(),
        tags in prop::collection::vec("[a-z]{1,8}", 0..5),
    ) {
        let db = datastore();
        let mut piece = exhibit("seed");
        piece.title = title.clone();
        piece.extent.width = width;
        piece.tags = tags.clone();

        let key = db.store(&mut piece).unwrap();
        let loaded: Exhibit = db.load_by_key(&key).unwrap().unwrap();

        prop_assert_eq!(loaded.title, title);
        prop_assert_eq!(loaded.extent.width, width);
        prop_assert_eq!(loaded.tags, tags);
    }
}
