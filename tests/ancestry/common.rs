//! Shared fixture: a three-level label / artist / release hierarchy

use graftdb::{Ancestor, Datastore, MemoryStore, Registry, SchemaBuilder};

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Label {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Default)]
pub struct Artist {
    pub id: i64,
    pub label: Ancestor<Label>,
    pub name: String,
}

#[derive(Debug, Default)]
pub struct Release {
    pub id: i64,
    pub artist: Ancestor<Artist>,
    pub title: String,
}

pub fn registry() -> Registry {
    let mut schema = SchemaBuilder::new();
    schema.kind::<Label>("label", |k| {
        k.id_int("id", |l| &l.id, |l| &mut l.id);
        k.field::<String>("name", |l| &l.name, |l| &mut l.name);
    });
    schema.kind::<Artist>("artist", |k| {
        k.id_int("id", |a| &a.id, |a| &mut a.id);
        k.parent::<Label>("label", |a| &a.label, |a| &mut a.label);
        k.field::<String>("name", |a| &a.name, |a| &mut a.name);
    });
    schema.kind::<Release>("release", |k| {
        k.id_int("id", |r| &r.id, |r| &mut r.id);
        k.parent::<Artist>("artist", |r| &r.artist, |r| &mut r.artist);
        k.field::<String>("title", |r| &r.title, |r| &mut r.title);
    });
    schema.seal().expect("schema is valid")
}

pub fn datastore() -> Datastore {
    Datastore::builder(registry()).open(MemoryStore::new())
}

/// A release carrying its whole unsaved chain as live instances
pub fn live_chain(label: &str, artist: &str, title: &str) -> Release {
    Release {
        id: 0,
        artist: Ancestor::instance(Artist {
            id: 0,
            label: Ancestor::instance(Label {
                id: 0,
                name: label.to_string(),
            }),
            name: artist.to_string(),
        }),
        title: title.to_string(),
    }
}
