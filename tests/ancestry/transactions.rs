//! Transactions over ancestor-scoped work

use crate::common::{datastore, live_chain, Artist, Label, Release};
use graftdb::{Ancestor, Error, Key, QueryError};

#[test]
fn test_commit_applies_buffered_chain_writes() {
    let db = datastore();
    let mut label = Label {
        id: 0,
        name: "spool".to_string(),
    };
    db.store(&mut label).unwrap();
    let label_key = Key::new("label", label.id);

    let mut txn = db.transaction().unwrap();
    let mut artist = Artist {
        id: 0,
        label: Ancestor::Key(label_key.clone()),
        name: "vega tide".to_string(),
    };
    let artist_key = txn.store(&mut artist).unwrap();

    // nothing lands until commit
    assert!(db.load_by_key::<Artist>(&artist_key).unwrap().is_none());

    txn.commit().unwrap();
    assert!(db.load_by_key::<Artist>(&artist_key).unwrap().is_some());
}

#[test]
fn test_buffered_parents_commit_with_the_leaf() {
    let db = datastore();

    let mut txn = db.transaction().unwrap();
    let mut release = live_chain("hyperduct", "felt marrow", "sleeper coil");
    let key = txn.store(&mut release).unwrap();

    let root = Key::new("label", 1);
    assert!(db.load_by_key::<Label>(&root).unwrap().is_none());

    txn.commit().unwrap();

    assert!(db.load_by_key::<Label>(&root).unwrap().is_some());
    assert!(db.load_by_key::<Release>(&key).unwrap().is_some());
}

#[test]
fn test_rollback_discards_the_buffer() {
    let db = datastore();

    let mut txn = db.transaction().unwrap();
    let mut release = live_chain("amber", "vega tide", "first tape");
    let key = txn.store(&mut release).unwrap();
    txn.rollback();

    assert!(db.load_by_key::<Release>(&key).unwrap().is_none());
}

#[test]
fn test_queries_in_transactions_need_an_ancestor() {
    let db = datastore();
    let txn = db.transaction().unwrap();

    let err = txn.find::<Release>().return_all().unwrap_err();

    assert!(matches!(
        err,
        Error::Query(QueryError::TransactionRequiresAncestor)
    ));
}

#[test]
fn test_scoped_transactional_find_reads_committed_state() {
    let db = datastore();
    let mut committed = live_chain("amber", "vega tide", "first tape");
    db.store(&mut committed).unwrap();
    let label_key = Key::new("label", 1);

    let mut txn = db.transaction().unwrap();
    let mut buffered = Release {
        id: 0,
        artist: Ancestor::Key(label_key.clone().child("artist", 1)),
        title: "second tape".to_string(),
    };
    txn.store(&mut buffered).unwrap();

    // the buffered write is not visible to the scoped find
    let seen = txn
        .find::<Release>()
        .ancestor(&label_key)
        .return_all()
        .unwrap();
    assert_eq!(seen.len(), 1);

    txn.commit().unwrap();
    let after = db
        .find::<Release>()
        .ancestor(&label_key)
        .return_all()
        .unwrap();
    assert_eq!(after.len(), 2);
}

#[test]
fn test_store_unique_checks_committed_state() {
    let db = datastore();
    let mut label = Label {
        id: 0,
        name: "meridian".to_string(),
    };
    db.store(&mut label).unwrap();
    let label_key = Key::new("label", label.id);

    let mut first = Artist {
        id: 7,
        label: Ancestor::Key(label_key.clone()),
        name: "sable".to_string(),
    };
    db.store(&mut first).unwrap();

    let mut txn = db.transaction().unwrap();
    let mut second = Artist {
        id: 7,
        label: Ancestor::Key(label_key),
        name: "impostor".to_string(),
    };
    let err = txn.store_unique(&mut second).unwrap_err();

    assert!(matches!(err, Error::UniqueKeyViolation { .. }));
    txn.rollback();
}
