//! The datastore facade
//!
//! [`Datastore`] ties a sealed schema registry, a converter registry, and
//! a [`RecordStore`] adapter together behind the operations callers use:
//! store, load, refresh, delete, the find surface, and transactions.
//! Handles are cheap clones sharing one inner state, so one datastore can
//! serve many threads.

use std::any::{Any, TypeId};
use std::sync::Arc;

use graft_convert::ConverterRegistry;
use graft_core::key::{IdValue, Key};
use graft_core::path::Path;
use graft_core::property::PropertySet;
use graft_core::record::Record;
use graft_core::schema::{
    AncestorRead, AncestorWrite, FieldRead, FieldShape, FieldWrite, IdKind, Registry, SchemaError,
    TypeDescriptor,
};
use graft_query::NativeQuery;
use graft_translate::{
    decode_record, encode_record, DecodeCx, DecodeError, EncodeCx, EncodeError, ParentLoader,
};
use tracing::{debug, info};

use crate::adapter::{RecordStore, StoreTxn};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::find::FindCommand;
use crate::task::Deferred;

struct Inner {
    registry: Registry,
    converters: ConverterRegistry,
    store: Box<dyn RecordStore>,
    config: Config,
}

/// Assembles a [`Datastore`] from its collaborators
pub struct DatastoreBuilder {
    registry: Registry,
    converters: Option<ConverterRegistry>,
    config: Config,
}

impl DatastoreBuilder {
    /// Start from a sealed registry
    pub fn new(registry: Registry) -> Self {
        DatastoreBuilder {
            registry,
            converters: None,
            config: Config::new(),
        }
    }

    /// Replace the standard converter registry
    pub fn converters(mut self, converters: ConverterRegistry) -> Self {
        self.converters = Some(converters);
        self
    }

    /// Adjust the datastore policy
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Open the datastore over a backing store
    pub fn open(self, store: impl RecordStore + 'static) -> Datastore {
        let inner = Inner {
            converters: self.converters.unwrap_or_else(ConverterRegistry::standard),
            store: Box::new(store),
            config: self.config,
            registry: self.registry,
        };
        info!(kinds = inner.registry.len(), "datastore opened");
        Datastore {
            inner: Arc::new(inner),
        }
    }
}

/// Where writes go: straight to the store, or into a transaction buffer
enum WriteSink<'a> {
    Direct(&'a dyn RecordStore),
    Buffered(&'a mut dyn StoreTxn),
}

impl WriteSink<'_> {
    fn put(&mut self, record: Record) -> Result<()> {
        match self {
            WriteSink::Direct(store) => store.put(vec![record])?,
            WriteSink::Buffered(txn) => txn.put(vec![record])?,
        }
        Ok(())
    }
}

/// A handle on one object datastore
///
/// Instances go in through [`Datastore::store`] and come back through
/// [`Datastore::load`] and the [`Datastore::find`] surface. The handle is
/// a cheap clone; all clones share the registry, converters, and backing
/// store.
#[derive(Clone)]
pub struct Datastore {
    inner: Arc<Inner>,
}

impl Datastore {
    /// Start building a datastore over a sealed registry
    pub fn builder(registry: Registry) -> DatastoreBuilder {
        DatastoreBuilder::new(registry)
    }

    /// The schema registry
    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    /// The converter registry
    pub fn converters(&self) -> &ConverterRegistry {
        &self.inner.converters
    }

    /// The active policy
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub(crate) fn adapter(&self) -> &dyn RecordStore {
        self.inner.store.as_ref()
    }

    /// Store an instance, filling in its key fields
    ///
    /// A fresh numeric id is allocated when the id field is unset. A live
    /// parent instance is stored first so the child key can chain from
    /// its ancestry; the parent's own key fields are filled in place.
    pub fn store<T: 'static>(&self, instance: &mut T) -> Result<Key> {
        let descriptor = Arc::clone(self.inner.registry.descriptor_of::<T>()?);
        let mut sink = WriteSink::Direct(self.inner.store.as_ref());
        self.store_erased(&descriptor, instance, &mut sink)
    }

    /// Store a batch, returning the keys in order
    pub fn store_all<T: 'static>(&self, instances: &mut [T]) -> Result<Vec<Key>> {
        instances.iter_mut().map(|i| self.store(i)).collect()
    }

    /// Store an instance only if nothing occupies its key yet
    ///
    /// The check applies when the instance names its own key up front. An
    /// instance with an unset numeric id receives a fresh allocation and
    /// is unique by construction.
    pub fn store_unique<T: 'static>(&self, instance: &mut T) -> Result<Key> {
        let descriptor = Arc::clone(self.inner.registry.descriptor_of::<T>()?);
        if let Ok(key) = self.derive_key_erased(&descriptor, &*instance) {
            if self.inner.store.get(&key)?.is_some() {
                return Err(Error::UniqueKeyViolation { key });
            }
        }
        let mut sink = WriteSink::Direct(self.inner.store.as_ref());
        self.store_erased(&descriptor, instance, &mut sink)
    }

    /// Store on a worker thread, handing the instance back with its key
    pub fn store_later<T: Send + 'static>(&self, mut instance: T) -> Deferred<(Key, T)> {
        let db = self.clone();
        Deferred::spawn(move || {
            let key = db.store(&mut instance)?;
            Ok((key, instance))
        })
    }

    /// Rewrite the record at the key the instance already names
    ///
    /// Fails with [`Error::KeyUnresolvable`] when the key fields are
    /// unset; unlike [`Datastore::store`] this never allocates.
    pub fn update<T: 'static>(&self, instance: &mut T) -> Result<Key> {
        let descriptor = Arc::clone(self.inner.registry.descriptor_of::<T>()?);
        let key = self.derive_key_erased(&descriptor, &*instance)?;
        let mut cx = EncodeCx::new(
            &self.inner.registry,
            &self.inner.converters,
            descriptor.kind(),
            self.inner.config.store_nulls,
        );
        let props = encode_record(&mut cx, &*instance, &descriptor)?;
        debug!(key = %key, "updating record");
        self.inner.store.put(vec![Record::new(key.clone(), props)])?;
        Ok(key)
    }

    /// Load a root instance by bare id
    pub fn load<T: 'static>(&self, id: impl Into<IdValue>) -> Result<Option<T>> {
        let kind = self.inner.registry.kind_of::<T>()?.to_string();
        self.load_by_key(&Key::new(kind, id))
    }

    /// Load an instance by full key
    pub fn load_by_key<T: 'static>(&self, key: &Key) -> Result<Option<T>> {
        let descriptor = Arc::clone(self.inner.registry.descriptor_of::<T>()?);
        if key.kind() != descriptor.kind() {
            return Err(Error::KindMismatch {
                expected: descriptor.kind().to_string(),
                key: key.clone(),
            });
        }
        match self.inner.store.get(key)? {
            Some(record) => Ok(Some(self.decode_stored(&descriptor, &record)?)),
            None => Ok(None),
        }
    }

    /// Load a batch of root instances by bare id, `None` per miss
    pub fn load_all<T: 'static>(
        &self,
        ids: impl IntoIterator<Item = impl Into<IdValue>>,
    ) -> Result<Vec<Option<T>>> {
        ids.into_iter().map(|id| self.load(id)).collect()
    }

    /// Load whatever type the key's kind maps to
    pub fn load_any(&self, key: &Key) -> Result<Option<Box<dyn Any>>> {
        let descriptor = Arc::clone(self.inner.registry.descriptor_by_kind(key.kind())?);
        match self.inner.store.get(key)? {
            Some(record) => {
                let depth = self.inner.config.activation_depth;
                Ok(Some(self.decode_erased(&descriptor, &record, depth)?))
            }
            None => Ok(None),
        }
    }

    /// Overwrite an instance with the stored state at its key
    pub fn refresh<T: 'static>(&self, instance: &mut T) -> Result<()> {
        let descriptor = Arc::clone(self.inner.registry.descriptor_of::<T>()?);
        let key = self.derive_key_erased(&descriptor, &*instance)?;
        let record = match self.inner.store.get(&key)? {
            Some(record) => record,
            None => return Err(Error::NoSuchRecord { key }),
        };
        *instance = self.decode_stored(&descriptor, &record)?;
        Ok(())
    }

    /// Delete the record at the key the instance names
    pub fn delete<T: 'static>(&self, instance: &T) -> Result<()> {
        let descriptor = Arc::clone(self.inner.registry.descriptor_of::<T>()?);
        let key = self.derive_key_erased(&descriptor, &*instance)?;
        self.delete_by_key(&key)
    }

    /// Delete the record at a key; absent keys are a no-op
    pub fn delete_by_key(&self, key: &Key) -> Result<()> {
        debug!(key = %key, "deleting record");
        self.inner.store.delete(std::slice::from_ref(key))?;
        Ok(())
    }

    /// Delete every record of a kind, returning how many went
    pub fn delete_all<T: 'static>(&self) -> Result<usize> {
        let kind = self.inner.registry.kind_of::<T>()?.to_string();
        let query = NativeQuery {
            index: 0,
            kind: kind.clone(),
            ancestor: None,
            filters: Vec::new(),
            sorts: Vec::new(),
            keys_only: true,
            offset: 0,
            limit: None,
            chunk: None,
            start: None,
            end: None,
        };
        let run = self.inner.store.run(&query)?;
        let keys: Vec<Key> = run.records.into_iter().map(|r| r.into_parts().0).collect();
        let count = keys.len();
        self.inner.store.delete(&keys)?;
        debug!(kind = %kind, count, "deleted all records of a kind");
        Ok(count)
    }

    /// Start a find over instances of `T`
    pub fn find<T: 'static>(&self) -> FindCommand<T> {
        FindCommand::new(self.clone(), false)
    }

    /// Open a transaction: buffered writes, atomic commit
    pub fn transaction(&self) -> Result<Transaction<'_>> {
        debug!("opening transaction");
        let txn = self.inner.store.begin()?;
        Ok(Transaction { db: self, txn })
    }

    /// Flatten an instance to its key and property set without storing it
    ///
    /// Key resolution still runs, so an unset numeric id is allocated and
    /// a live parent instance is stored to obtain its key.
    pub fn encode<T: 'static>(&self, instance: &mut T) -> Result<(Key, PropertySet)> {
        let descriptor = Arc::clone(self.inner.registry.descriptor_of::<T>()?);
        let mut sink = WriteSink::Direct(self.inner.store.as_ref());
        self.resolve_and_encode(&descriptor, instance, &mut sink)
    }

    /// Rebuild an instance from a key and property set
    pub fn decode<T: 'static>(&self, key: &Key, props: PropertySet) -> Result<T> {
        let descriptor = Arc::clone(self.inner.registry.descriptor_of::<T>()?);
        let record = Record::new(key.clone(), props);
        self.decode_stored(&descriptor, &record)
    }

    fn store_erased(
        &self,
        descriptor: &TypeDescriptor,
        instance: &mut dyn Any,
        sink: &mut WriteSink<'_>,
    ) -> Result<Key> {
        let (key, props) = self.resolve_and_encode(descriptor, instance, sink)?;
        debug!(key = %key, props = props.len(), "storing record");
        sink.put(Record::new(key.clone(), props))?;
        Ok(key)
    }

    fn resolve_and_encode(
        &self,
        descriptor: &TypeDescriptor,
        instance: &mut dyn Any,
        sink: &mut WriteSink<'_>,
    ) -> Result<(Key, PropertySet)> {
        let mut cx = EncodeCx::new(
            &self.inner.registry,
            &self.inner.converters,
            descriptor.kind(),
            self.inner.config.store_nulls,
        );
        let props = encode_record(&mut cx, instance, descriptor)?;
        let mut spec = cx.into_key_spec();

        // Parent fields emit key material only, never properties, so
        // resolving the placeholder cannot invalidate `props`.
        if spec.parent_pending() {
            let parent_key = self.store_parent_of(descriptor, instance, sink)?;
            spec.resolve_parent(parent_key)?;
        }

        let id = match spec.id() {
            Some(id) => id.clone(),
            None => match key_id_kind(descriptor) {
                Some(IdKind::Text) => {
                    return Err(Error::Encode(EncodeError::MissingName {
                        kind: descriptor.kind().to_string(),
                    }));
                }
                _ => {
                    let allocated = self.inner.store.allocate_id(descriptor.kind())?;
                    if let Some(field) = descriptor.key_field() {
                        field.write(instance, FieldWrite::KeyId(IdValue::Int(allocated)))?;
                    }
                    IdValue::Int(allocated)
                }
            },
        };

        let key = match spec.parent_key() {
            Some(parent) => Key::with_parent(descriptor.kind(), id, parent.clone()),
            None => Key::new(descriptor.kind(), id),
        };
        Ok((key, props))
    }

    /// Store the live parent held in the instance's parent field
    ///
    /// The field is taken out, the parent stored through the same sink
    /// (filling its key fields in place), and the instance put back, so
    /// the caller's object graph keeps its materialized ancestor.
    fn store_parent_of(
        &self,
        descriptor: &TypeDescriptor,
        instance: &mut dyn Any,
        sink: &mut WriteSink<'_>,
    ) -> Result<Key> {
        let unresolvable = || Error::KeyUnresolvable {
            kind: descriptor.kind().to_string(),
        };
        let field = descriptor.parent_field().ok_or_else(unresolvable)?;
        let target = match field.shape() {
            FieldShape::Parent { target, .. } => *target,
            _ => return Err(unresolvable()),
        };
        match field.take(instance)? {
            FieldWrite::Parent(AncestorWrite::Instance(mut parent)) => {
                let parent_descriptor =
                    Arc::clone(self.inner.registry.descriptor_by_id(target, "parent field")?);
                let key = self.store_erased(&parent_descriptor, parent.as_mut(), sink)?;
                field.write(instance, FieldWrite::Parent(AncestorWrite::Instance(parent)))?;
                Ok(key)
            }
            other => {
                field.write(instance, other)?;
                Err(unresolvable())
            }
        }
    }

    /// Build the instance's key from its fields without touching the store
    fn derive_key_erased(&self, descriptor: &TypeDescriptor, instance: &dyn Any) -> Result<Key> {
        let unresolvable = || Error::KeyUnresolvable {
            kind: descriptor.kind().to_string(),
        };
        let id = match descriptor.key_field() {
            Some(field) => match field.read(instance)? {
                FieldRead::KeyId(id) if !id.is_unset() => id,
                _ => return Err(unresolvable()),
            },
            None => return Err(unresolvable()),
        };
        let parent = match descriptor.parent_field() {
            Some(field) => match field.read(instance)? {
                FieldRead::Parent(AncestorRead::None) => None,
                FieldRead::Parent(AncestorRead::Key(key)) => Some(key.clone()),
                FieldRead::Parent(AncestorRead::Instance { target, value }) => {
                    let parent_descriptor =
                        Arc::clone(self.inner.registry.descriptor_by_id(target, "parent field")?);
                    Some(self.derive_key_erased(&parent_descriptor, value)?)
                }
                _ => return Err(unresolvable()),
            },
            None => None,
        };
        Ok(match parent {
            Some(parent) => Key::with_parent(descriptor.kind(), id, parent),
            None => Key::new(descriptor.kind(), id),
        })
    }

    pub(crate) fn decode_erased(
        &self,
        descriptor: &TypeDescriptor,
        record: &Record,
        depth: usize,
    ) -> std::result::Result<Box<dyn Any>, DecodeError> {
        let loader = StoreParentLoader { db: self };
        let cx = DecodeCx::new(&self.inner.registry, &self.inner.converters)
            .with_key(record.key())
            .with_loader(&loader)
            .with_depth(depth);
        decode_record(&cx, record.props().view(), descriptor)
    }

    pub(crate) fn decode_with_depth<T: 'static>(
        &self,
        descriptor: &TypeDescriptor,
        record: &Record,
        depth: usize,
    ) -> Result<T> {
        downcast(self.decode_erased(descriptor, record, depth)?)
    }

    fn decode_stored<T: 'static>(&self, descriptor: &TypeDescriptor, record: &Record) -> Result<T> {
        self.decode_with_depth(descriptor, record, self.inner.config.activation_depth)
    }
}

fn key_id_kind(descriptor: &TypeDescriptor) -> Option<IdKind> {
    descriptor.key_field().and_then(|field| match field.shape() {
        FieldShape::KeyId { kind } => Some(*kind),
        _ => None,
    })
}

fn downcast<T: 'static>(boxed: Box<dyn Any>) -> Result<T> {
    boxed.downcast::<T>().map(|b| *b).map_err(|_| {
        Error::Schema(SchemaError::Downcast {
            expected: std::any::type_name::<T>(),
        })
    })
}

/// Activates ancestors during decode by fetching their records
struct StoreParentLoader<'a> {
    db: &'a Datastore,
}

impl ParentLoader for StoreParentLoader<'_> {
    fn load_parent(
        &self,
        key: &Key,
        target: TypeId,
        depth: usize,
    ) -> std::result::Result<Option<Box<dyn Any>>, DecodeError> {
        let descriptor = match self.db.inner.registry.descriptor_by_id(target, "parent field") {
            Ok(descriptor) => Arc::clone(descriptor),
            Err(source) => {
                return Err(DecodeError::Schema {
                    path: Path::root(),
                    source,
                })
            }
        };
        let record = self
            .db
            .inner
            .store
            .get(key)
            .map_err(|e| DecodeError::ParentLoad {
                key: key.clone(),
                reason: e.to_string(),
            })?;
        match record {
            Some(record) => Ok(Some(self.db.decode_erased(&descriptor, &record, depth)?)),
            None => Ok(None),
        }
    }
}

/// A transaction guard over one datastore
///
/// Writes are buffered on the handle and apply in order at
/// [`Transaction::commit`]. Reads issued through the guard see the
/// pre-commit state, and queries inside a transaction must carry an
/// ancestor. Dropping the guard without committing discards the buffer.
pub struct Transaction<'a> {
    db: &'a Datastore,
    txn: Box<dyn StoreTxn>,
}

impl Transaction<'_> {
    /// Buffer a store; key resolution happens now, the write at commit
    pub fn store<T: 'static>(&mut self, instance: &mut T) -> Result<Key> {
        let descriptor = Arc::clone(self.db.inner.registry.descriptor_of::<T>()?);
        let mut sink = WriteSink::Buffered(self.txn.as_mut());
        self.db.store_erased(&descriptor, instance, &mut sink)
    }

    /// Buffer a uniqueness-checked store
    ///
    /// Occupancy is checked against the pre-commit state, so two open
    /// transactions can still race; the adapter arbitrates at commit.
    pub fn store_unique<T: 'static>(&mut self, instance: &mut T) -> Result<Key> {
        let descriptor = Arc::clone(self.db.inner.registry.descriptor_of::<T>()?);
        if let Ok(key) = self.db.derive_key_erased(&descriptor, &*instance) {
            if self.db.inner.store.get(&key)?.is_some() {
                return Err(Error::UniqueKeyViolation { key });
            }
        }
        let mut sink = WriteSink::Buffered(self.txn.as_mut());
        self.db.store_erased(&descriptor, instance, &mut sink)
    }

    /// Buffer a delete of the key the instance names
    pub fn delete<T: 'static>(&mut self, instance: &T) -> Result<()> {
        let descriptor = Arc::clone(self.db.inner.registry.descriptor_of::<T>()?);
        let key = self.db.derive_key_erased(&descriptor, &*instance)?;
        self.delete_by_key(&key)
    }

    /// Buffer a delete by key
    pub fn delete_by_key(&mut self, key: &Key) -> Result<()> {
        self.txn.delete(std::slice::from_ref(key))?;
        Ok(())
    }

    /// Load through to the pre-commit state
    pub fn load<T: 'static>(&self, id: impl Into<IdValue>) -> Result<Option<T>> {
        self.db.load(id)
    }

    /// Load by key through to the pre-commit state
    pub fn load_by_key<T: 'static>(&self, key: &Key) -> Result<Option<T>> {
        self.db.load_by_key(key)
    }

    /// Start a find scoped to this transaction
    ///
    /// Compilation rejects the query unless it carries an ancestor.
    pub fn find<T: 'static>(&self) -> FindCommand<T> {
        FindCommand::new(self.db.clone(), true)
    }

    /// Apply every buffered write in order
    pub fn commit(self) -> Result<()> {
        debug!("committing transaction");
        self.txn.commit()?;
        Ok(())
    }

    /// Discard the buffer explicitly
    pub fn rollback(self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use graft_core::key::Ancestor;
    use graft_core::schema::SchemaBuilder;

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Venue {
        id: i64,
        name: String,
        capacity: i64,
    }

    #[derive(Debug, Default)]
    struct Concert {
        id: i64,
        venue: Ancestor<Venue>,
        headliner: String,
    }

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Tag {
        slug: String,
        hits: i64,
    }

    fn registry() -> Registry {
        let mut schema = SchemaBuilder::new();
        schema.kind::<Venue>("venue", |k| {
            k.id_int("id", |v| &v.id, |v| &mut v.id);
            k.field::<String>("name", |v| &v.name, |v| &mut v.name);
            k.field::<i64>("capacity", |v| &v.capacity, |v| &mut v.capacity);
        });
        schema.kind::<Concert>("concert", |k| {
            k.id_int("id", |c| &c.id, |c| &mut c.id);
            k.parent::<Venue>("venue", |c| &c.venue, |c| &mut c.venue);
            k.field::<String>("headliner", |c| &c.headliner, |c| &mut c.headliner);
        });
        schema.kind::<Tag>("tag", |k| {
            k.id_text("slug", |t| &t.slug, |t| &mut t.slug);
            k.field::<i64>("hits", |t| &t.hits, |t| &mut t.hits);
        });
        schema.seal().unwrap()
    }

    fn datastore() -> Datastore {
        Datastore::builder(registry()).open(MemoryStore::new())
    }

    fn venue(name: &str, capacity: i64) -> Venue {
        Venue {
            id: 0,
            name: name.to_string(),
            capacity,
        }
    }

    fn load_venue(db: &Datastore, id: i64) -> Option<Venue> {
        db.load(id).unwrap()
    }

    #[test]
    fn test_store_allocates_and_writes_back_id() {
        let db = datastore();
        let mut v = venue("troubadour", 500);
        let key = db.store(&mut v).unwrap();
        assert_eq!(v.id, 1);
        assert_eq!(key, Key::new("venue", 1));

        let loaded: Venue = db.load(1i64).unwrap().unwrap();
        assert_eq!(loaded, v);
    }

    #[test]
    fn test_store_keeps_explicit_id() {
        let db = datastore();
        let mut v = venue("fillmore", 1150);
        v.id = 9;
        let key = db.store(&mut v).unwrap();
        assert_eq!(key, Key::new("venue", 9));
        assert!(load_venue(&db, 9).is_some());
    }

    #[test]
    fn test_text_id_must_be_set() {
        let db = datastore();
        let mut tag = Tag {
            slug: String::new(),
            hits: 3,
        };
        let err = db.store(&mut tag).unwrap_err();
        assert!(matches!(
            err,
            Error::Encode(EncodeError::MissingName { .. })
        ));

        tag.slug = "indie".to_string();
        let key = db.store(&mut tag).unwrap();
        assert_eq!(key, Key::new("tag", "indie"));
    }

    #[test]
    fn test_live_parent_stored_with_child() {
        let db = datastore();
        let mut concert = Concert {
            id: 0,
            venue: Ancestor::instance(venue("roundhouse", 1700)),
            headliner: "quartet".to_string(),
        };
        let key = db.store(&mut concert).unwrap();

        let parent = concert.venue.as_instance().unwrap();
        assert_eq!(parent.id, 1);
        assert_eq!(key.parent(), Some(&Key::new("venue", 1)));
        assert!(load_venue(&db, 1).is_some());
    }

    #[test]
    fn test_parent_key_is_chained_without_a_write() {
        let db = datastore();
        let mut concert = Concert {
            id: 0,
            venue: Ancestor::Key(Key::new("venue", 77)),
            headliner: "duo".to_string(),
        };
        let key = db.store(&mut concert).unwrap();
        assert_eq!(key.parent(), Some(&Key::new("venue", 77)));
        assert!(load_venue(&db, 77).is_none());
    }

    #[test]
    fn test_load_activates_stored_parent() {
        let db = datastore();
        let mut concert = Concert {
            id: 0,
            venue: Ancestor::instance(venue("barbican", 1943)),
            headliner: "soloist".to_string(),
        };
        let key = db.store(&mut concert).unwrap();

        let loaded: Concert = db.load_by_key(&key).unwrap().unwrap();
        let parent = loaded.venue.as_instance().unwrap();
        assert_eq!(parent.name, "barbican");
    }

    #[test]
    fn test_activation_depth_zero_leaves_key_placeholder() {
        let registry = registry();
        let store = MemoryStore::new();
        let db = Datastore::builder(registry)
            .config(Config::new().activation_depth(0))
            .open(store);

        let mut concert = Concert {
            id: 0,
            venue: Ancestor::instance(venue("annex", 120)),
            headliner: "trio".to_string(),
        };
        let key = db.store(&mut concert).unwrap();

        let loaded: Concert = db.load_by_key(&key).unwrap().unwrap();
        assert_eq!(loaded.venue.as_key(), Some(&Key::new("venue", 1)));
        assert!(loaded.venue.as_instance().is_none());
    }

    #[test]
    fn test_load_by_key_rejects_wrong_kind() {
        let db = datastore();
        let err = db.load_by_key::<Venue>(&Key::new("concert", 1)).unwrap_err();
        assert!(matches!(err, Error::KindMismatch { .. }));
    }

    #[test]
    fn test_update_requires_a_complete_key() {
        let db = datastore();
        let mut v = venue("unsaved", 10);
        let err = db.update(&mut v).unwrap_err();
        assert!(matches!(err, Error::KeyUnresolvable { .. }));
    }

    #[test]
    fn test_update_rewrites_in_place() {
        let db = datastore();
        let mut v = venue("hall", 300);
        db.store(&mut v).unwrap();

        v.capacity = 340;
        db.update(&mut v).unwrap();

        let loaded: Venue = db.load(v.id).unwrap().unwrap();
        assert_eq!(loaded.capacity, 340);
    }

    #[test]
    fn test_refresh_overwrites_local_state() {
        let db = datastore();
        let mut v = venue("paradiso", 1500);
        db.store(&mut v).unwrap();

        let mut stale = v.clone();
        stale.capacity = 0;
        v.capacity = 1550;
        db.update(&mut v).unwrap();

        db.refresh(&mut stale).unwrap();
        assert_eq!(stale.capacity, 1550);
    }

    #[test]
    fn test_refresh_missing_record_is_an_error() {
        let db = datastore();
        let mut v = venue("ghost", 1);
        v.id = 404;
        let err = db.refresh(&mut v).unwrap_err();
        assert!(matches!(err, Error::NoSuchRecord { .. }));
    }

    #[test]
    fn test_delete_and_delete_all() {
        let db = datastore();
        let mut a = venue("a", 1);
        let mut b = venue("b", 2);
        db.store(&mut a).unwrap();
        db.store(&mut b).unwrap();

        db.delete(&a).unwrap();
        assert!(load_venue(&db, a.id).is_none());

        assert_eq!(db.delete_all::<Venue>().unwrap(), 1);
        assert!(load_venue(&db, b.id).is_none());
    }

    #[test]
    fn test_store_unique_rejects_occupied_key() {
        let db = datastore();
        let mut tag = Tag {
            slug: "jazz".to_string(),
            hits: 1,
        };
        db.store(&mut tag).unwrap();

        let mut dup = Tag {
            slug: "jazz".to_string(),
            hits: 2,
        };
        let err = db.store_unique(&mut dup).unwrap_err();
        assert!(matches!(err, Error::UniqueKeyViolation { .. }));
    }

    #[test]
    fn test_store_later_returns_key_and_instance() {
        let db = datastore();
        let (key, v) = db.store_later(venue("async", 50)).wait().unwrap();
        assert_eq!(v.id, 1);
        assert_eq!(key, Key::new("venue", 1));
        assert!(load_venue(&db, 1).is_some());
    }

    #[test]
    fn test_transaction_buffers_until_commit() {
        let db = datastore();
        let mut txn = db.transaction().unwrap();
        let mut v = venue("buffered", 80);
        txn.store(&mut v).unwrap();

        assert!(load_venue(&db, v.id).is_none());
        txn.commit().unwrap();
        assert!(load_venue(&db, v.id).is_some());
    }

    #[test]
    fn test_dropped_transaction_discards_writes() {
        let db = datastore();
        {
            let mut txn = db.transaction().unwrap();
            let mut v = venue("discarded", 80);
            txn.store(&mut v).unwrap();
        }
        assert!(load_venue(&db, 1).is_none());
    }

    #[test]
    fn test_encode_decode_round_trip() {
        let db = datastore();
        let mut v = venue("manual", 250);
        let (key, props) = db.encode(&mut v).unwrap();
        assert_eq!(v.id, 1);

        let back: Venue = db.decode(&key, props).unwrap();
        assert_eq!(back, v);
    }
}
