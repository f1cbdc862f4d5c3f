//! Storage policies observed at the encode boundary

use crate::common::{datastore, datastore_with, exhibit};
use graftdb::{
    Config, Datastore, Datum, DatumKind, FilterOp, MemoryStore, Path, SchemaBuilder,
};

#[test]
fn test_store_nulls_keeps_absent_fields_addressable() {
    let db = datastore();
    let mut piece = exhibit("nulls on");
    piece.notes = None;

    let (_, props) = db.encode(&mut piece).unwrap();

    let path: Path = "notes".parse().unwrap();
    assert_eq!(props.at(&path).map(|p| p.value()), Some(&Datum::Null));
}

#[test]
fn test_store_nulls_off_drops_absent_fields() {
    let db = datastore_with(Config::new().store_nulls(false));
    let mut piece = exhibit("nulls off");
    piece.notes = None;

    let (_, props) = db.encode(&mut piece).unwrap();

    let path: Path = "notes".parse().unwrap();
    assert!(props.at(&path).is_none());
}

#[test]
fn test_unindexed_attribute_never_answers_filters() {
    #[derive(Debug, Default, Clone)]
    struct Memo {
        id: i64,
        body: String,
    }

    let mut schema = SchemaBuilder::new();
    schema.kind::<Memo>("memo", |k| {
        k.id_int("id", |m| &m.id, |m| &mut m.id);
        k.field::<String>("body", |m| &m.body, |m| &mut m.body)
            .unindexed();
    });
    let db = Datastore::builder(schema.seal().unwrap()).open(MemoryStore::new());

    let mut memo = Memo {
        id: 0,
        body: "quiet".to_string(),
    };
    let key = db.store(&mut memo).unwrap();

    let found = db
        .find::<Memo>()
        .filter("body", FilterOp::Eq, "quiet")
        .return_all()
        .unwrap();
    assert!(found.is_empty());

    // the value itself still round trips
    let loaded: Memo = db.load_by_key(&key).unwrap().unwrap();
    assert_eq!(loaded.body, "quiet");
}

#[test]
fn test_packed_subtree_is_one_opaque_attribute() {
    #[derive(Debug, Default, Clone, PartialEq)]
    struct Palette {
        primary: String,
        accent: String,
    }

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Poster {
        id: i64,
        palette: Palette,
    }

    let mut schema = SchemaBuilder::new();
    schema.kind::<Palette>("palette", |k| {
        k.field::<String>("primary", |p| &p.primary, |p| &mut p.primary);
        k.field::<String>("accent", |p| &p.accent, |p| &mut p.accent);
    });
    schema.kind::<Poster>("poster", |k| {
        k.id_int("id", |p| &p.id, |p| &mut p.id);
        k.embedded::<Palette>("palette", |p| &p.palette, |p| &mut p.palette)
            .packed();
    });
    let db = Datastore::builder(schema.seal().unwrap()).open(MemoryStore::new());

    let mut poster = Poster {
        id: 0,
        palette: Palette {
            primary: "teal".to_string(),
            accent: "rust".to_string(),
        },
    };
    let (key, props) = db.encode(&mut poster).unwrap();

    let path: Path = "palette".parse().unwrap();
    assert_eq!(props.at(&path).unwrap().value().kind(), DatumKind::Blob);

    let back: Poster = db.decode(&key, props).unwrap();
    assert_eq!(back.palette, poster.palette);
}

#[test]
fn test_collapsed_field_keeps_its_flat_address() {
    #[derive(Debug, Default, Clone, PartialEq)]
    struct Handle {
        screen_name: String,
    }

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Account {
        id: i64,
        handle: Handle,
    }

    let mut schema = SchemaBuilder::new();
    schema.kind::<Handle>("handle", |k| {
        k.field::<String>(
            "screen_name",
            |h| &h.screen_name,
            |h| &mut h.screen_name,
        );
    });
    schema.kind::<Account>("account", |k| {
        k.id_int("id", |a| &a.id, |a| &mut a.id);
        k.embedded::<Handle>("handle", |a| &a.handle, |a| &mut a.handle)
            .collapse();
    });
    let db = Datastore::builder(schema.seal().unwrap()).open(MemoryStore::new());

    let mut account = Account {
        id: 0,
        handle: Handle {
            screen_name: "ada".to_string(),
        },
    };
    let (key, props) = db.encode(&mut account).unwrap();

    // the single inner value lands at the field's own path, not under it
    let flat: Path = "handle".parse().unwrap();
    assert_eq!(
        props.at(&flat).map(|p| p.value()),
        Some(&Datum::Text("ada".to_string()))
    );
    let nested: Path = "handle.screen_name".parse().unwrap();
    assert!(props.at(&nested).is_none());

    let back: Account = db.decode(&key, props).unwrap();
    assert_eq!(back.handle.screen_name, "ada");
}
