//! Item uids and the interning factory
//!
//! A `RepositoryItemUid` names one item coordinate: (repository id, path).
//! The factory interns the backing `ItemLock` per coordinate, so two uids for
//! the same coordinate - created by different callers on different threads -
//! always share the same lock instance. That identity is what makes
//! cross-request mutual exclusion work at all.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

use quarry_core::Repository;

use crate::error::{RegistryError, Result};
use crate::lock::{Action, ItemLock};
use crate::registry::RepositoryRegistry;

/// One item coordinate plus its shared lock.
#[derive(Debug, Clone)]
pub struct RepositoryItemUid {
    repository_id: String,
    path: String,
    lock: Arc<ItemLock>,
}

impl RepositoryItemUid {
    pub fn repository_id(&self) -> &str {
        &self.repository_id
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// String form, `<repositoryId>:<path>`.
    pub fn key(&self) -> String {
        format!("{}:{}", self.repository_id, self.path)
    }

    pub fn lock(&self, action: Action) {
        self.lock.lock(action);
    }

    pub fn unlock(&self) {
        self.lock.unlock();
    }

    /// The shared lock instance backing this coordinate.
    pub fn lock_handle(&self) -> &Arc<ItemLock> {
        &self.lock
    }
}

impl std::fmt::Display for RepositoryItemUid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.repository_id, self.path)
    }
}

/// Interns item locks by (repository id, normalized path).
///
/// Locks are held weakly: once every uid for a coordinate is dropped, the
/// entry is reclaimed. Dead entries are pruned opportunistically on misses.
#[derive(Default)]
pub struct UidFactory {
    locks: Mutex<HashMap<(String, String), Weak<ItemLock>>>,
}

impl UidFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a uid for a path on a repository.
    pub fn create_uid(&self, repository: &Repository, path: &str) -> RepositoryItemUid {
        let path = normalize_path(path);
        let lock = self.intern(repository.id(), &path);
        RepositoryItemUid {
            repository_id: repository.id().to_string(),
            path,
            lock,
        }
    }

    /// Parse a `<repositoryId>:<path>` string and create a uid for it.
    ///
    /// Fails if the string is malformed or the repository is not registered.
    pub fn create_uid_from_str(
        &self,
        registry: &RepositoryRegistry,
        uid: &str,
    ) -> Result<RepositoryItemUid> {
        let (repo_id, path) = uid.split_once(':').ok_or_else(|| RegistryError::MalformedUid {
            value: uid.to_string(),
        })?;
        if repo_id.is_empty() {
            return Err(RegistryError::MalformedUid {
                value: uid.to_string(),
            });
        }
        let repository = registry.get_repository(repo_id)?;
        Ok(self.create_uid(&repository, path))
    }

    fn intern(&self, repository_id: &str, path: &str) -> Arc<ItemLock> {
        let key = (repository_id.to_string(), path.to_string());
        let mut locks = self.locks.lock();
        if let Some(existing) = locks.get(&key).and_then(Weak::upgrade) {
            return existing;
        }
        // miss: prune entries whose locks have been dropped
        locks.retain(|_, weak| weak.strong_count() > 0);
        let lock = Arc::new(ItemLock::new());
        locks.insert(key, Arc::downgrade(&lock));
        lock
    }

    /// Number of live interned locks, for diagnostics.
    pub fn active_lock_count(&self) -> usize {
        self.locks
            .lock()
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}

/// Normalize an item path to a single leading `/` with no trailing `/`.
fn normalize_path(path: &str) -> String {
    let trimmed = path.trim().trim_start_matches('/').trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{trimmed}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_core::ContentClass;

    fn hosted(id: &str) -> Repository {
        Repository::hosted(id, id, ContentClass::maven2())
    }

    #[test]
    fn test_same_coordinate_shares_lock_instance() {
        let factory = UidFactory::new();
        let repo = hosted("releases");

        let a = factory.create_uid(&repo, "/org/example/artifact.jar");
        let b = factory.create_uid(&repo, "/org/example/artifact.jar");
        assert!(Arc::ptr_eq(a.lock_handle(), b.lock_handle()));

        let other_path = factory.create_uid(&repo, "/org/example/other.jar");
        assert!(!Arc::ptr_eq(a.lock_handle(), other_path.lock_handle()));

        let other_repo = factory.create_uid(&hosted("snapshots"), "/org/example/artifact.jar");
        assert!(!Arc::ptr_eq(a.lock_handle(), other_repo.lock_handle()));
    }

    #[test]
    fn test_path_normalization_shares_lock() {
        let factory = UidFactory::new();
        let repo = hosted("releases");

        let plain = factory.create_uid(&repo, "org/example/artifact.jar");
        let slashed = factory.create_uid(&repo, "/org/example/artifact.jar/");
        assert_eq!(plain.path(), "/org/example/artifact.jar");
        assert!(Arc::ptr_eq(plain.lock_handle(), slashed.lock_handle()));

        let root = factory.create_uid(&repo, "");
        assert_eq!(root.path(), "/");
    }

    #[test]
    fn test_dead_locks_are_pruned() {
        let factory = UidFactory::new();
        let repo = hosted("releases");

        let uid = factory.create_uid(&repo, "/a.jar");
        assert_eq!(factory.active_lock_count(), 1);
        drop(uid);
        assert_eq!(factory.active_lock_count(), 0);

        // a fresh uid for the same coordinate gets a fresh lock
        let again = factory.create_uid(&repo, "/a.jar");
        assert!(again.lock_handle().write_holder_count() == 0);
    }

    #[test]
    fn test_uid_key_roundtrip() {
        let factory = UidFactory::new();
        let uid = factory.create_uid(&hosted("releases"), "/org/example/a.jar");
        assert_eq!(uid.key(), "releases:/org/example/a.jar");
        assert_eq!(uid.to_string(), uid.key());
    }
}
