//! Deserializer identity registry.
//!
//! Every cached block carries a 4-byte id instead of a type name. The registry
//! maps those ids to the deserializer that can rebuild the block, and can
//! snapshot the id -> kind name table so a cache written by one process can be
//! interpreted by another.
//!
//! ## Concurrency
//!
//! Ids come from an atomic counter and entries live in a lock-free skip list,
//! so `register`, `lookup` and `snapshot` never wait on each other. A snapshot
//! taken while a registration is in flight may or may not include it; it never
//! sees a partial entry. Only [`DeserializerRegistry::register_if_absent`]
//! takes a lock, and only against other calls to itself.

use crate::cache::cacheable::CacheableDeserializer;
use crate::error::{Error, Result};
use crossbeam_skiplist::SkipMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

/// Process-scoped table of registered deserializers.
///
/// Constructed explicitly and shared through `Arc`; there is no global
/// instance.
///
/// # Example
///
/// ```
/// use cellfile::cache::DeserializerRegistry;
/// use cellfile::sfile::BlockDeserializers;
/// use std::sync::Arc;
///
/// let registry = Arc::new(DeserializerRegistry::new());
/// let kinds = BlockDeserializers::register(Arc::clone(&registry));
/// assert!(registry.lookup(kinds.data_id()).is_some());
/// ```
pub struct DeserializerRegistry {
    next_id: AtomicI32,
    deserializers: SkipMap<i32, Arc<dyn CacheableDeserializer>>,
    kind_lock: Mutex<()>,
}

impl DeserializerRegistry {
    /// Create an empty registry. The first id handed out is 1.
    pub fn new() -> Self {
        Self { next_id: AtomicI32::new(0), deserializers: SkipMap::new(), kind_lock: Mutex::new(()) }
    }

    /// Register a deserializer and return its new id.
    ///
    /// Ids strictly increase and are never reused. Registering the same
    /// deserializer twice yields two ids.
    pub fn register(&self, deserializer: Arc<dyn CacheableDeserializer>) -> i32 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        log::debug!("Registered cacheable deserializer {} as id {}", deserializer.kind_name(), id);
        self.deserializers.insert(id, deserializer);
        id
    }

    /// Id of a live deserializer with the same kind name, registering
    /// `deserializer` only when there is none.
    ///
    /// Concurrent calls for one kind all return the same id. A plain
    /// [`register`](Self::register) running at the same time can still add a
    /// second entry for the kind.
    pub fn register_if_absent(&self, deserializer: Arc<dyn CacheableDeserializer>) -> i32 {
        let _guard = self.kind_lock.lock();
        match self.id_for_kind(deserializer.kind_name()) {
            Some(id) => id,
            None => self.register(deserializer),
        }
    }

    /// The deserializer registered under `id`, if any.
    pub fn lookup(&self, id: i32) -> Option<Arc<dyn CacheableDeserializer>> {
        self.deserializers.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    /// Like [`lookup`](Self::lookup), but a missing id is an error.
    pub fn resolve(&self, id: i32) -> Result<Arc<dyn CacheableDeserializer>> {
        self.lookup(id).ok_or(Error::DeserializerNotFound(id))
    }

    /// Lowest live id whose deserializer produces `kind_name`.
    pub fn id_for_kind(&self, kind_name: &str) -> Option<i32> {
        self.deserializers
            .iter()
            .find(|entry| entry.value().kind_name() == kind_name)
            .map(|entry| *entry.key())
    }

    /// Point-in-time copy of the id -> kind name table.
    pub fn snapshot(&self) -> RegistrySnapshot {
        let kinds = self
            .deserializers
            .iter()
            .map(|entry| (*entry.key(), entry.value().kind_name().to_string()))
            .collect();
        RegistrySnapshot { kinds }
    }

    /// Number of registered deserializers.
    pub fn len(&self) -> usize {
        self.deserializers.len()
    }

    /// True if nothing has been registered.
    pub fn is_empty(&self) -> bool {
        self.deserializers.is_empty()
    }
}

impl Default for DeserializerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DeserializerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeserializerRegistry")
            .field("next_id", &self.next_id.load(Ordering::Relaxed))
            .field("registered", &self.deserializers.len())
            .finish()
    }
}

/// Id -> kind name mapping captured from a registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    kinds: BTreeMap<i32, String>,
}

impl RegistrySnapshot {
    /// Kind name recorded for `id`.
    pub fn kind_name(&self, id: i32) -> Option<&str> {
        self.kinds.get(&id).map(String::as_str)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    /// True if the snapshot has no entries.
    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    /// Entries in id order.
    pub fn iter(&self) -> impl Iterator<Item = (i32, &str)> {
        self.kinds.iter().map(|(id, name)| (*id, name.as_str()))
    }

    /// Render as JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse JSON produced by [`to_json`](Self::to_json).
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::cacheable::Cacheable;
    use bytes::Bytes;
    use std::collections::HashSet;
    use std::thread;

    struct NamedDeserializer(&'static str);

    impl CacheableDeserializer for NamedDeserializer {
        fn deserialize(&self, _bytes: Bytes) -> Result<Arc<dyn Cacheable>> {
            Err(Error::invalid_state("test deserializer"))
        }

        fn kind_name(&self) -> &'static str {
            self.0
        }
    }

    fn named(name: &'static str) -> Arc<dyn CacheableDeserializer> {
        Arc::new(NamedDeserializer(name))
    }

    #[test]
    fn test_ids_start_at_one_and_increase() {
        let registry = DeserializerRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.register(named("a")), 1);
        assert_eq!(registry.register(named("b")), 2);
        assert_eq!(registry.register(named("c")), 3);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_lookup_returns_registered_instance() {
        let registry = DeserializerRegistry::new();
        let d = named("data");
        let id = registry.register(Arc::clone(&d));

        let found = registry.lookup(id).unwrap();
        assert!(Arc::ptr_eq(&found, &d));
        assert!(registry.lookup(id + 1).is_none());
        assert!(registry.lookup(0).is_none());
        assert!(registry.lookup(-5).is_none());
        assert!(matches!(registry.resolve(99), Err(Error::DeserializerNotFound(99))));
    }

    #[test]
    fn test_same_deserializer_twice_gets_two_ids() {
        let registry = DeserializerRegistry::new();
        let d = named("dup");
        let first = registry.register(Arc::clone(&d));
        let second = registry.register(Arc::clone(&d));
        assert_ne!(first, second);
        assert_eq!(registry.id_for_kind("dup"), Some(first));
    }

    #[test]
    fn test_concurrent_registration_is_dense_and_unique() {
        let registry = Arc::new(DeserializerRegistry::new());
        let threads = 8;
        let per_thread = 250;

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    (0..per_thread).map(|_| registry.register(named("k"))).collect::<Vec<_>>()
                })
            })
            .collect();

        let mut ids = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(ids.insert(id), "duplicate id {}", id);
            }
        }

        let total = threads * per_thread;
        assert_eq!(ids.len(), total);
        assert_eq!(ids, (1..=total as i32).collect::<HashSet<_>>());
    }

    #[test]
    fn test_register_if_absent_races_to_one_id() {
        let registry = Arc::new(DeserializerRegistry::new());
        registry.register(named("other"));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    (0..20).map(|_| registry.register_if_absent(named("block"))).collect::<Vec<_>>()
                })
            })
            .collect();

        let ids: HashSet<i32> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
        assert_eq!(ids.len(), 1);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.id_for_kind("block"), ids.into_iter().next());
    }

    #[test]
    fn test_snapshot_covers_completed_registrations() {
        let registry = DeserializerRegistry::new();
        let a = registry.register(named("sfile.data"));
        let b = registry.register(named("sfile.index"));

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.kind_name(a), Some("sfile.data"));
        assert_eq!(snapshot.kind_name(b), Some("sfile.index"));

        registry.register(named("sfile.bloom"));
        assert_eq!(snapshot.len(), 2, "snapshot is a copy");
        assert_eq!(registry.snapshot().len(), 3);
    }

    #[test]
    fn test_snapshot_json_round_trip() {
        let registry = DeserializerRegistry::new();
        registry.register(named("sfile.data"));
        registry.register(named("sfile.bloom"));

        let snapshot = registry.snapshot();
        let parsed = RegistrySnapshot::from_json(&snapshot.to_json().unwrap()).unwrap();
        assert_eq!(parsed, snapshot);
        assert_eq!(parsed.iter().collect::<Vec<_>>(), vec![(1, "sfile.data"), (2, "sfile.bloom")]);
    }
}
