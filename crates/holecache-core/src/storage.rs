use crate::retained::RetainedStore;
use crate::session::SessionStateManager;
use crate::{Config, Error, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Numeric account identifier used to namespace retained data.
pub type UserId = u64;

/// Root of all per-user retained data.
///
/// ```text
/// <root>/
///   users/
///     <user_id>/
///       holes/  floors/  tags/  session_state/
/// ```
#[derive(Debug, Clone)]
pub struct Storage {
    root_dir: PathBuf,
}

impl Storage {
    /// Creates a storage instance rooted at the configured data directory
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::with_root(config.paths.root.clone())
    }

    /// Creates a storage instance with a custom root directory
    pub fn with_root(root_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&root_dir)
            .map_err(|e| Error::Storage(format!("Failed to create root directory: {e}")))?;
        debug!("Using data root {}", root_dir.display());
        Ok(Self { root_dir })
    }

    /// Returns the root data directory path
    #[must_use]
    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    fn users_dir(&self) -> PathBuf {
        self.root_dir.join("users")
    }

    /// Returns the namespace directory for a user
    #[must_use]
    pub fn user_dir(&self, user: UserId) -> PathBuf {
        self.users_dir().join(user.to_string())
    }

    /// Opens the retained store for a user
    #[must_use]
    pub fn retained(&self, user: UserId) -> RetainedStore {
        RetainedStore::at(self.user_dir(user))
    }

    /// Opens the session state manager for a user
    #[must_use]
    pub fn sessions(&self, user: UserId) -> SessionStateManager {
        SessionStateManager::new(self.retained(user))
    }

    /// Lists users that have a namespace directory, in ascending order
    #[must_use]
    pub fn list_users(&self) -> Vec<UserId> {
        let mut users: Vec<UserId> = fs::read_dir(self.users_dir())
            .map(|entries| {
                entries
                    .flatten()
                    .filter(|entry| entry.path().is_dir())
                    .filter_map(|entry| entry.file_name().to_str()?.parse().ok())
                    .collect()
            })
            .unwrap_or_default();
        users.sort_unstable();
        users
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_storage() -> (Storage, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let storage = Storage::with_root(temp_dir.path().join("data"))
            .expect("Failed to create test storage");
        (storage, temp_dir)
    }

    #[test]
    fn test_storage_creation_with_root() {
        let (storage, temp_dir) = create_test_storage();
        assert!(storage.root_dir().exists());
        assert!(storage.root_dir().starts_with(temp_dir.path()));
    }

    #[test]
    fn test_user_namespaces_are_disjoint() {
        let (storage, _temp_dir) = create_test_storage();
        let alice = storage.user_dir(1);
        let bob = storage.user_dir(2);

        assert!(alice.ends_with("users/1"));
        assert_ne!(alice, bob);
        assert_eq!(storage.retained(1).root(), alice.as_path());
    }

    #[test]
    fn test_list_users_ignores_foreign_entries() {
        let (storage, _temp_dir) = create_test_storage();
        fs::create_dir_all(storage.user_dir(20)).unwrap();
        fs::create_dir_all(storage.user_dir(3)).unwrap();
        fs::create_dir_all(storage.users_dir().join("not-a-user")).unwrap();
        fs::write(storage.users_dir().join("7"), b"file, not dir").unwrap();

        assert_eq!(storage.list_users(), vec![3, 20]);
    }
}
