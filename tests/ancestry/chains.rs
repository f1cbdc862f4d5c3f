//! Ancestor chains: cascading stores, bounded activation, subtree scope

use crate::common::{datastore, live_chain, registry, Artist, Label, Release};
use graftdb::{Ancestor, Config, Datastore, Key, MemoryStore};

#[test]
fn test_storing_a_leaf_stores_the_whole_live_chain() {
    let store = MemoryStore::new();
    let db = Datastore::builder(registry()).open(store.clone());

    let mut release = live_chain("hyperduct", "felt marrow", "sleeper coil");
    let key = db.store(&mut release).unwrap();

    // one record per level, ids written back in place
    assert_eq!(store.len(), 3);
    let artist = release.artist.as_instance().unwrap();
    let label = artist.label.as_instance().unwrap();
    assert_eq!((release.id, artist.id, label.id), (1, 1, 1));

    let expected = Key::new("label", 1).child("artist", 1).child("release", 1);
    assert_eq!(key, expected);
}

#[test]
fn test_known_parent_key_is_chained_without_a_write() {
    let store = MemoryStore::new();
    let db = Datastore::builder(registry()).open(store.clone());

    let mut label = Label {
        id: 0,
        name: "amber".to_string(),
    };
    db.store(&mut label).unwrap();
    let label_key = Key::new("label", label.id);

    let mut artist = Artist {
        id: 0,
        label: Ancestor::Key(label_key.clone()),
        name: "vega tide".to_string(),
    };
    let artist_key = db.store(&mut artist).unwrap();

    assert_eq!(artist_key.parent(), Some(&label_key));
    assert_eq!(store.len(), 2);
}

#[test]
fn test_loading_activates_the_chain_to_the_root() {
    let db = datastore();
    let mut release = live_chain("hyperduct", "felt marrow", "sleeper coil");
    let key = db.store(&mut release).unwrap();

    let loaded: Release = db.load_by_key(&key).unwrap().unwrap();

    let artist = loaded.artist.as_instance().unwrap();
    assert_eq!(artist.name, "felt marrow");
    let label = artist.label.as_instance().unwrap();
    assert_eq!(label.name, "hyperduct");
}

#[test]
fn test_activation_depth_bounds_chain_loading() {
    let db = Datastore::builder(registry())
        .config(Config::new().activation_depth(1))
        .open(MemoryStore::new());

    let mut release = live_chain("hyperduct", "felt marrow", "sleeper coil");
    let key = db.store(&mut release).unwrap();

    let loaded: Release = db.load_by_key(&key).unwrap().unwrap();

    // one level materializes; beyond it the key placeholder remains
    let artist = loaded.artist.as_instance().unwrap();
    assert_eq!(artist.name, "felt marrow");
    assert_eq!(artist.label.as_key(), Some(&Key::new("label", 1)));
}

#[test]
fn test_unactivated_find_leaves_parent_keys() {
    let db = datastore();
    let mut release = live_chain("hyperduct", "felt marrow", "sleeper coil");
    db.store(&mut release).unwrap();

    let found = db
        .find::<Release>()
        .unactivated()
        .return_all()
        .unwrap();

    assert_eq!(found.len(), 1);
    let placeholder = found[0].artist.as_key().unwrap();
    assert_eq!(placeholder.kind(), "artist");
}

#[test]
fn test_ancestor_scope_covers_the_whole_subtree() {
    let db = datastore();

    let mut r1 = live_chain("amber", "vega tide", "first tape");
    db.store(&mut r1).unwrap();
    let amber_key = Key::new("label", 1);

    // second artist under the same label, third under another label
    let mut second = Artist {
        id: 0,
        label: Ancestor::Key(amber_key.clone()),
        name: "sable".to_string(),
    };
    let second_key = db.store(&mut second).unwrap();
    let mut r2 = Release {
        id: 0,
        artist: Ancestor::Key(second_key),
        title: "second tape".to_string(),
    };
    db.store(&mut r2).unwrap();

    let mut r3 = live_chain("basalt", "quarry", "third tape");
    db.store(&mut r3).unwrap();

    let under_amber = db
        .find::<Release>()
        .ancestor(&amber_key)
        .return_all()
        .unwrap();
    let names: Vec<&str> = under_amber.iter().map(|r| r.title.as_str()).collect();
    assert_eq!(names, ["first tape", "second tape"]);
}

#[test]
fn test_return_parents_deduplicates_first_seen() {
    let db = datastore();

    let mut r1 = live_chain("amber", "vega tide", "first tape");
    db.store(&mut r1).unwrap();
    let artist_key = Key::new("label", 1).child("artist", 1);

    let mut r2 = Release {
        id: 0,
        artist: Ancestor::Key(artist_key),
        title: "second tape".to_string(),
    };
    db.store(&mut r2).unwrap();

    let mut r3 = live_chain("basalt", "quarry", "third tape");
    db.store(&mut r3).unwrap();

    let parents = db.find::<Release>().return_parents::<Artist>().unwrap();

    let names: Vec<&str> = parents.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, ["vega tide", "quarry"]);
}
