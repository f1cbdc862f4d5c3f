//! Shared fixture: a seeded track catalog

use graftdb::{Config, Datastore, MemoryStore, Registry, SchemaBuilder};

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Track {
    pub id: i64,
    pub title: String,
    pub plays: i64,
    pub genre: String,
    pub rating: Option<i64>,
}

pub fn registry() -> Registry {
    let mut schema = SchemaBuilder::new();
    schema.kind::<Track>("track", |k| {
        k.id_int("id", |t| &t.id, |t| &mut t.id);
        k.field::<String>("title", |t| &t.title, |t| &mut t.title);
        k.field::<i64>("plays", |t| &t.plays, |t| &mut t.plays);
        k.field::<String>("genre", |t| &t.genre, |t| &mut t.genre);
        k.optional::<i64>("rating", |t| &t.rating, |t| &mut t.rating);
    });
    schema.seal().expect("schema is valid")
}

/// Four tracks under ids 1 through 4, in seed order. Nulls are not
/// stored, so the unrated track has no `rating` attribute at all.
pub fn seeded() -> Datastore {
    let db = Datastore::builder(registry())
        .config(Config::new().store_nulls(false))
        .open(MemoryStore::new());
    for (title, plays, genre, rating) in [
        ("glass harbor", 420i64, "ambient", Some(4i64)),
        ("night bus", 77, "electro", None),
        ("cold spring", 300, "ambient", Some(5)),
        ("marrow", 12, "doom", Some(2)),
    ] {
        let mut track = Track {
            id: 0,
            title: title.to_string(),
            plays,
            genre: genre.to_string(),
            rating,
        };
        db.store(&mut track).unwrap();
    }
    db
}

pub fn titles(tracks: &[Track]) -> Vec<&str> {
    tracks.iter().map(|t| t.title.as_str()).collect()
}
