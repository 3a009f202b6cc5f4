//! Operator-supplied overrides that take absolute precedence over every other rule.
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, RwLock},
};

use crate::{Error, FlagValue, KeyValueStore, Result};

/// Snapshot of remote overrides, keyed by flag key.
pub type Overrides = HashMap<String, FlagValue>;

/// `RemoteOverrideCache` holds the latest override set received from the flag-management
/// backend, persisted so it survives restarts.
///
/// The set is replaced as a whole on every [`sync`](RemoteOverrideCache::sync); readers see
/// either the previous or the new snapshot, never a mix.
pub struct RemoteOverrideCache {
    store: Arc<dyn KeyValueStore>,
    storage_key: String,
    overrides: RwLock<Arc<Overrides>>,
    /// Serializes syncs so that the persisted snapshot matches the last published one.
    sync_lock: Mutex<()>,
}

impl RemoteOverrideCache {
    /// Create the cache, loading the last persisted snapshot.
    ///
    /// A store failure or a corrupt snapshot is logged and yields an empty override set.
    pub fn new(store: Arc<dyn KeyValueStore>, storage_key: impl Into<String>) -> Self {
        let storage_key = storage_key.into();
        let overrides = load_persisted(store.as_ref(), &storage_key);
        log::debug!(target: "featureflags",
                    overrides = overrides.len();
                    "loaded persisted remote overrides");
        RemoteOverrideCache {
            store,
            storage_key,
            overrides: RwLock::new(Arc::new(overrides)),
            sync_lock: Mutex::new(()),
        }
    }

    pub fn get(&self, key: &str) -> Option<FlagValue> {
        self.snapshot().get(key).cloned()
    }

    /// Currently active overrides.
    pub fn snapshot(&self) -> Arc<Overrides> {
        self.overrides
            .read()
            .expect("thread holding overrides lock should not panic")
            .clone()
    }

    /// Replace the override set and persist it.
    ///
    /// The new set is visible to readers even if persisting it fails, in which case
    /// [`Error::StorageUnavailable`] is returned and the previous snapshot stays on disk.
    pub fn sync(&self, overrides: Overrides) -> Result<()> {
        let _sync = self
            .sync_lock
            .lock()
            .expect("thread holding sync lock should not panic");

        let serialized = serde_json::to_string(&overrides)?;
        let count = overrides.len();
        self.publish(Arc::new(overrides));
        log::debug!(target: "featureflags", overrides = count; "synced remote overrides");

        self.store
            .set(&self.storage_key, &serialized)
            .inspect_err(|err| {
                log::warn!(target: "featureflags",
                           "failed to persist remote overrides: {:?}", err);
            })
            .map_err(|err| match err {
                err @ Error::StorageUnavailable(_) => err,
                other => Error::storage(other),
            })
    }

    /// Drop all overrides from memory. The persisted snapshot is left untouched.
    pub fn clear(&self) {
        self.publish(Arc::default());
    }

    fn publish(&self, overrides: Arc<Overrides>) {
        let mut slot = self
            .overrides
            .write()
            .expect("thread holding overrides lock should not panic");
        *slot = overrides;
    }
}

fn load_persisted(store: &dyn KeyValueStore, storage_key: &str) -> Overrides {
    let raw = match store.get(storage_key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return Overrides::new(),
        Err(err) => {
            log::warn!(target: "featureflags",
                       "failed to load persisted remote overrides: {:?}", err);
            return Overrides::new();
        }
    };
    serde_json::from_str(&raw).unwrap_or_else(|err| {
        log::warn!(target: "featureflags",
                   "ignoring corrupt persisted remote overrides: {:?}", err);
        Overrides::new()
    })
}
