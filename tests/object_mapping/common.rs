//! Shared fixtures: an exhibition schema exercising every field shape

use chrono::{DateTime, TimeZone, Utc};
use graftdb::{Ancestor, Config, Datastore, MemoryStore, Registry, SchemaBuilder};
use uuid::Uuid;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Curator {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Dimensions {
    pub width: i64,
    pub height: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Exhibit {
    pub id: i64,
    pub curator: Ancestor<Curator>,
    pub title: String,
    pub opened: DateTime<Utc>,
    pub catalog: Uuid,
    pub tags: Vec<String>,
    pub extent: Dimensions,
    pub notes: Option<String>,
}

impl Default for Exhibit {
    fn default() -> Self {
        Exhibit {
            id: 0,
            curator: Ancestor::None,
            title: String::new(),
            opened: DateTime::<Utc>::UNIX_EPOCH,
            catalog: Uuid::nil(),
            tags: Vec::new(),
            extent: Dimensions::default(),
            notes: None,
        }
    }
}

pub fn registry() -> Registry {
    let mut schema = SchemaBuilder::new();
    schema.kind::<Curator>("curator", |k| {
        k.id_int("id", |c| &c.id, |c| &mut c.id);
        k.field::<String>("name", |c| &c.name, |c| &mut c.name);
    });
    schema.kind::<Dimensions>("dimensions", |k| {
        k.field::<i64>("width", |d| &d.width, |d| &mut d.width);
        k.field::<i64>("height", |d| &d.height, |d| &mut d.height);
    });
    schema.kind::<Exhibit>("exhibit", |k| {
        k.id_int("id", |e| &e.id, |e| &mut e.id);
        k.parent::<Curator>("curator", |e| &e.curator, |e| &mut e.curator);
        k.field::<String>("title", |e| &e.title, |e| &mut e.title);
        k.field::<DateTime<Utc>>("opened", |e| &e.opened, |e| &mut e.opened);
        k.field::<Uuid>("catalog", |e| &e.catalog, |e| &mut e.catalog);
        k.list::<String>("tags", |e| &e.tags, |e| &mut e.tags);
        k.embedded::<Dimensions>("extent", |e| &e.extent, |e| &mut e.extent);
        k.optional::<String>("notes", |e| &e.notes, |e| &mut e.notes);
    });
    schema.seal().expect("schema is valid")
}

pub fn datastore() -> Datastore {
    Datastore::builder(registry()).open(MemoryStore::new())
}

pub fn datastore_with(config: Config) -> Datastore {
    Datastore::builder(registry())
        .config(config)
        .open(MemoryStore::new())
}

pub fn exhibit(title: &str) -> Exhibit {
    Exhibit {
        id: 0,
        curator: Ancestor::None,
        title: title.to_string(),
        opened: Utc.with_ymd_and_hms(2019, 4, 12, 10, 0, 0).unwrap(),
        catalog: Uuid::new_v4(),
        tags: vec!["modern".to_string(), "sculpture".to_string()],
        extent: Dimensions {
            width: 300,
            height: 240,
        },
        notes: Some("west wing".to_string()),
    }
}
