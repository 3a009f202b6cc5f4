//! Durable `(user_id, flag_key) -> value` assignments.
//!
//! Two levels: an in-memory map of per-user snapshots, populated lazily from the persistent store
//! on first lookup, and the persistent store itself, written through on every new assignment.
//! A user's blob is only written once it has been loaded, so that it never replaces assignments
//! the store still holds.
//! Each user's assignments are persisted as one JSON object under `"<namespace>:<user_id>"`.
use std::{
    collections::HashMap,
    sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use crate::{persistence::Persister, Error, FlagValue, KeyValueStore, Result};

/// Assignments of a single user, keyed by flag or experiment key.
pub type UserAssignments = HashMap<String, FlagValue>;

pub struct AssignmentStore {
    store: Arc<dyn KeyValueStore>,
    persister: Persister,
    namespace: String,
    users: RwLock<Users>,
}

/// Snapshots are never mutated in place; a new assignment publishes a new `Arc`.
#[derive(Default)]
struct Users {
    /// Users whose persisted assignments have been loaded.
    loaded: HashMap<String, Arc<UserAssignments>>,
    /// Assignments made while the user's persisted assignments could not be read. They are
    /// served from memory and only written once merged into the persisted blob.
    unconfirmed: HashMap<String, Arc<UserAssignments>>,
}

impl AssignmentStore {
    pub(crate) fn new(
        store: Arc<dyn KeyValueStore>,
        persister: Persister,
        namespace: impl Into<String>,
    ) -> AssignmentStore {
        AssignmentStore {
            store,
            persister,
            namespace: namespace.into(),
            users: RwLock::new(Users::default()),
        }
    }

    /// Previously stored assignment of `user_id` for `flag_key`.
    ///
    /// Store failures are logged and reported as no assignment.
    pub fn get(&self, user_id: &str, flag_key: &str) -> Option<FlagValue> {
        self.load_all(user_id).get(flag_key).cloned()
    }

    /// All assignments of `user_id`, loading them from the persistent store on first access.
    ///
    /// While the store cannot be read, only assignments made in memory since are returned and
    /// the next call retries the store.
    pub fn load_all(&self, user_id: &str) -> Arc<UserAssignments> {
        if let Some(assignments) = self.read_users().loaded.get(user_id) {
            return assignments.clone();
        }

        match self.read_persisted(user_id) {
            Some(persisted) => self.publish_loaded(user_id, persisted),
            None => self
                .read_users()
                .unconfirmed
                .get(user_id)
                .cloned()
                .unwrap_or_default(),
        }
    }

    /// Record `value` as the assignment of `user_id` for `flag_key` and queue it for persistence.
    ///
    /// Assignments are never overwritten: if one already exists it is kept and returned, and
    /// nothing is written. `Ok(None)` means `value` is now the user's assignment. An error means
    /// the assignment is kept in memory but could not be queued for persistence.
    ///
    /// If the user's persisted assignments cannot be read, the assignment is only kept in memory
    /// until a later lookup manages to load and merge them.
    pub fn set(
        &self,
        user_id: &str,
        flag_key: &str,
        value: FlagValue,
    ) -> Result<Option<FlagValue>> {
        // Writing the user's blob must not clobber assignments we have not seen yet.
        self.load_all(user_id);

        let mut users = self.write_users();

        let Some(current) = users.loaded.get(user_id).cloned() else {
            let unconfirmed = users.unconfirmed.entry(user_id.to_owned()).or_default();
            if let Some(existing) = unconfirmed.get(flag_key) {
                return Ok(Some(existing.clone()));
            }
            Arc::make_mut(unconfirmed).insert(flag_key.to_owned(), value);
            log::warn!(target: "featureflags",
                       user_id,
                       flag_key;
                       "keeping assignment in memory until stored assignments of the user can be loaded");
            return Ok(None);
        };

        if let Some(existing) = current.get(flag_key) {
            return Ok(Some(existing.clone()));
        }

        let mut updated = UserAssignments::clone(&current);
        updated.insert(flag_key.to_owned(), value.clone());
        let serialized = serde_json::to_string(&updated)?;
        users.loaded.insert(user_id.to_owned(), Arc::new(updated));

        // Submitting under the lock keeps blobs of the same user in production order.
        self.persister.submit(self.storage_key(user_id), serialized)?;
        drop(users);

        log::debug!(target: "featureflags",
                    user_id,
                    flag_key,
                    value:serde = &value;
                    "stored new assignment");
        Ok(None)
    }

    /// Forget all in-memory assignments. Persisted assignments are left untouched and are
    /// reloaded on next access.
    pub fn reset(&self) {
        *self.write_users() = Users::default();
    }

    /// Mark `user_id` as loaded with `persisted`, merging in assignments made while the store
    /// was unreadable. Persisted assignments win over unconfirmed ones.
    fn publish_loaded(
        &self,
        user_id: &str,
        mut persisted: UserAssignments,
    ) -> Arc<UserAssignments> {
        let mut users = self.write_users();
        // Another thread may have loaded (and extended) the same user meanwhile.
        if let Some(assignments) = users.loaded.get(user_id) {
            return assignments.clone();
        }

        let mut merged = 0;
        if let Some(unconfirmed) = users.unconfirmed.remove(user_id) {
            for (flag_key, value) in unconfirmed.iter() {
                if !persisted.contains_key(flag_key) {
                    persisted.insert(flag_key.clone(), value.clone());
                    merged += 1;
                }
            }
        }

        if merged > 0 {
            let submitted = serde_json::to_string(&persisted)
                .map_err(Error::from)
                .and_then(|serialized| {
                    self.persister.submit(self.storage_key(user_id), serialized)
                });
            if let Err(err) = submitted {
                log::warn!(target: "featureflags",
                           user_id;
                           "failed to persist merged user assignments: {:?}", err);
            }
        }

        log::debug!(target: "featureflags",
                    user_id,
                    assignments = persisted.len(),
                    merged;
                    "loaded user assignments");

        let assignments = Arc::new(persisted);
        users.loaded.insert(user_id.to_owned(), assignments.clone());
        assignments
    }

    fn read_users(&self) -> RwLockReadGuard<'_, Users> {
        self.users
            .read()
            .expect("thread holding assignments lock should not panic")
    }

    fn write_users(&self) -> RwLockWriteGuard<'_, Users> {
        self.users
            .write()
            .expect("thread holding assignments lock should not panic")
    }

    /// `None` if the store could not be read. A corrupt blob reads as no assignments.
    fn read_persisted(&self, user_id: &str) -> Option<UserAssignments> {
        let raw = match self.store.get(&self.storage_key(user_id)) {
            Ok(raw) => raw,
            Err(err) => {
                log::warn!(target: "featureflags",
                           user_id;
                           "failed to load user assignments: {:?}", err);
                return None;
            }
        };

        let Some(raw) = raw else {
            return Some(UserAssignments::new());
        };

        match serde_json::from_str(&raw) {
            Ok(assignments) => Some(assignments),
            Err(err) => {
                log::warn!(target: "featureflags",
                           user_id;
                           "ignoring corrupt user assignments: {:?}", err);
                Some(UserAssignments::new())
            }
        }
    }

    fn storage_key(&self, user_id: &str) -> String {
        format!("{}:{}", self.namespace, user_id)
    }
}
