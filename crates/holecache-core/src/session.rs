//! Read-modify-write access to navigation documents.
//!
//! Session documents never fail to load: absence and corruption both yield the default
//! state. Updates for the same document are serialized inside the process with a per-path
//! lock, so a background listing and a foreground reader sharing one manager cannot lose
//! each other's writes. Separate processes still race, and the last writer wins.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::Result;
use crate::document;
use crate::retained::RetainedStore;
use crate::types::{EntityId, HoleSessionState, SessionState};

/// Session documents of one user namespace.
///
/// Cloning is cheap and clones share their update locks.
#[derive(Debug, Clone)]
pub struct SessionStateManager {
    store: RetainedStore,
    locks: Arc<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>>,
}

impl SessionStateManager {
    #[must_use]
    pub fn new(store: RetainedStore) -> Self {
        Self {
            store,
            locks: Arc::default(),
        }
    }

    /// Current per-user state, or the default.
    #[must_use]
    pub fn get(&self) -> SessionState {
        document::read_or_default(&self.store.session_path())
    }

    /// Apply `transform` to the per-user state and write the result back.
    ///
    /// # Errors
    ///
    /// Returns an error if the updated document cannot be written.
    pub fn update<F>(&self, transform: F) -> Result<SessionState>
    where
        F: FnOnce(SessionState) -> SessionState,
    {
        self.read_modify_write(&self.store.session_path(), transform)
    }

    /// Current state for one hole, or the default.
    #[must_use]
    pub fn get_hole(&self, hole_id: EntityId) -> HoleSessionState {
        document::read_or_default(&self.store.hole_session_path(hole_id))
    }

    /// Apply `transform` to one hole's state and write the result back.
    ///
    /// # Errors
    ///
    /// Returns an error if the updated document cannot be written.
    pub fn update_hole<F>(&self, hole_id: EntityId, transform: F) -> Result<HoleSessionState>
    where
        F: FnOnce(HoleSessionState) -> HoleSessionState,
    {
        self.read_modify_write(&self.store.hole_session_path(hole_id), transform)
    }

    fn read_modify_write<T, F>(&self, path: &Path, transform: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Default,
        F: FnOnce(T) -> T,
    {
        let lock = self.lock_for(path);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let next = transform(document::read_or_default(path));
        document::write(path, &next)?;
        Ok(next)
    }

    fn lock_for(&self, path: &Path) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(path.to_path_buf()).or_default())
    }
}
