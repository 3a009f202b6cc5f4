//! The external persistent key-value store and the implementations shipped with the crate.
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::{Mutex, RwLock},
};

use crate::{Error, Result};

/// A durable string-to-string store.
///
/// Implementations should fail fast rather than block indefinitely; failures are reported as
/// [`Error::StorageUnavailable`] (see [`Error::storage`]).
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// Store that keeps everything in process memory. Survives [`Resolver`](crate::Resolver)
/// restarts as long as the store itself is kept alive.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl InMemoryStore {
    pub fn new() -> InMemoryStore {
        InMemoryStore::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .expect("thread holding store lock should not panic")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for InMemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self
            .entries
            .read()
            .expect("thread holding store lock should not panic");
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .expect("thread holding store lock should not panic");
        entries.insert(key.to_owned(), value.to_owned());
        Ok(())
    }
}

/// Store backed by a single JSON document on disk.
///
/// The whole document is rewritten on every `set`, through a temporary file that is renamed
/// over the previous document.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    entries: Mutex<HashMap<String, String>>,
}

impl JsonFileStore {
    /// Open the store at `path`. A missing file is an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<JsonFileStore> {
        let path = path.into();
        let entries = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(err) => return Err(err.into()),
        };
        Ok(JsonFileStore {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self, entries: &HashMap<String, String>) -> Result<()> {
        let bytes = serde_json::to_vec(entries)?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, bytes).map_err(Error::storage)?;
        fs::rename(&tmp, &self.path).map_err(Error::storage)?;
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self
            .entries
            .lock()
            .expect("thread holding store lock should not panic");
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .expect("thread holding store lock should not panic");
        let previous = entries.insert(key.to_owned(), value.to_owned());
        if let Err(err) = self.write(&entries) {
            // Keep memory in line with what is on disk.
            match previous {
                Some(previous) => entries.insert(key.to_owned(), previous),
                None => entries.remove(key),
            };
            return Err(err);
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_stores {
    use std::sync::{
        atomic::{AtomicBool, Ordering},
        Mutex,
    };

    use super::{InMemoryStore, KeyValueStore};
    use crate::{Error, Result};

    /// A store that can be switched into failing every call, or only its reads.
    #[derive(Default)]
    pub struct FlakyStore {
        pub inner: InMemoryStore,
        pub failing: AtomicBool,
        pub reads_failing: AtomicBool,
    }

    impl FlakyStore {
        pub fn failing() -> FlakyStore {
            let store = FlakyStore::default();
            store.failing.store(true, Ordering::SeqCst);
            store
        }

        pub fn set_failing(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }

        pub fn set_reads_failing(&self, failing: bool) {
            self.reads_failing.store(failing, Ordering::SeqCst);
        }

        fn check(&self) -> Result<()> {
            if self.failing.load(Ordering::SeqCst) {
                Err(Error::storage("store is offline"))
            } else {
                Ok(())
            }
        }
    }

    impl KeyValueStore for FlakyStore {
        fn get(&self, key: &str) -> Result<Option<String>> {
            self.check()?;
            if self.reads_failing.load(Ordering::SeqCst) {
                return Err(Error::storage("read timed out"));
            }
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &str) -> Result<()> {
            self.check()?;
            self.inner.set(key, value)
        }
    }

    /// A store whose writes block while the gate is held.
    #[derive(Default)]
    pub struct GatedStore {
        pub inner: InMemoryStore,
        pub gate: Mutex<()>,
    }

    impl KeyValueStore for GatedStore {
        fn get(&self, key: &str) -> Result<Option<String>> {
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &str) -> Result<()> {
            let _gate = self.gate.lock().expect("gate should not be poisoned");
            self.inner.set(key, value)
        }
    }
}
