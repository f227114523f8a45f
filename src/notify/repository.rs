//! Watched-user repository
//!
//! Stores the set of users who opted in to mute notifications. The
//! reconciler re-reads the set on every tick, so implementations must not
//! assume they are the only writer.

use crate::notify::NotifyResult;
use async_trait::async_trait;
use dashmap::DashSet;
use serde_yaml::{Mapping, Value};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::warn;

/// Default location of the YAML store
pub const DEFAULT_NOTIFY_DB: &str = "data/notify_db.yaml";
/// Key holding the watched ids inside the YAML store
pub const MUTE_LISTEN_KEY: &str = "mute_listen_users";

/// Async key-set store of users with mute notifications enabled
#[async_trait]
pub trait NotifyRepository: Send + Sync {
    /// All users with notifications enabled
    async fn get_users(&self) -> NotifyResult<BTreeSet<u64>>;

    /// Replace the whole set
    async fn set_users(&self, users: &BTreeSet<u64>) -> NotifyResult<()>;

    /// Enable notifications for `users`.
    ///
    /// Read-modify-write over [`get_users`](Self::get_users) and
    /// [`set_users`](Self::set_users); two concurrent callers can lose an
    /// update unless the implementation serializes them.
    async fn add_users(&self, users: &[u64]) -> NotifyResult<()> {
        let mut current = self.get_users().await?;
        current.extend(users.iter().copied());
        self.set_users(&current).await
    }

    /// Disable notifications for `users`. Same caveat as
    /// [`add_users`](Self::add_users).
    async fn remove_users(&self, users: &[u64]) -> NotifyResult<()> {
        let mut current = self.get_users().await?;
        for user in users {
            current.remove(user);
        }
        self.set_users(&current).await
    }

    async fn contains(&self, user_id: u64) -> NotifyResult<bool> {
        Ok(self.get_users().await?.contains(&user_id))
    }
}

/// Repository backed by a YAML file.
///
/// Other top-level keys in the file are preserved on write. Mutations made
/// through this repository are serialized by an internal lock; writers in
/// other processes are not.
pub struct YamlNotifyRepository {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl Default for YamlNotifyRepository {
    fn default() -> Self {
        Self::new(DEFAULT_NOTIFY_DB)
    }
}

impl std::fmt::Debug for YamlNotifyRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YamlNotifyRepository")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl YamlNotifyRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole document, `None` if the file does not exist
    async fn read_document(&self) -> NotifyResult<Option<Mapping>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match serde_yaml::from_str::<Value>(&content)? {
            Value::Mapping(mapping) => Ok(Some(mapping)),
            Value::Null => Ok(Some(Mapping::new())),
            other => {
                warn!(
                    path = %self.path.display(),
                    "Notify store is not a mapping ({other:?}), treating as empty"
                );
                Ok(Some(Mapping::new()))
            }
        }
    }

    async fn write_document(&self, document: &Mapping) -> NotifyResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let yaml = serde_yaml::to_string(document)?;
        tokio::fs::write(&self.path, yaml).await?;
        Ok(())
    }

    fn parse_users(&self, document: &Mapping) -> BTreeSet<u64> {
        let Some(Value::Sequence(entries)) = document.get(MUTE_LISTEN_KEY) else {
            return BTreeSet::new();
        };
        entries
            .iter()
            .filter_map(|entry| {
                let parsed = match entry {
                    Value::Number(n) => n.as_u64(),
                    Value::String(s) => s.trim().parse().ok(),
                    _ => None,
                };
                if parsed.is_none() {
                    warn!(
                        path = %self.path.display(),
                        "Ignoring unreadable user id {entry:?} in notify store"
                    );
                }
                parsed
            })
            .collect()
    }
}

#[async_trait]
impl NotifyRepository for YamlNotifyRepository {
    async fn get_users(&self) -> NotifyResult<BTreeSet<u64>> {
        if let Some(document) = self.read_document().await? {
            return Ok(self.parse_users(&document));
        }
        warn!("Unable to find data file {}", self.path.display());
        self.write_document(&Mapping::new()).await?;
        Ok(BTreeSet::new())
    }

    async fn set_users(&self, users: &BTreeSet<u64>) -> NotifyResult<()> {
        let mut document = match self.read_document().await? {
            Some(document) => document,
            None => {
                warn!("Unable to find data file {}", self.path.display());
                Mapping::new()
            }
        };
        // Stored as strings: snowflakes overflow some YAML consumers' integers
        let ids = users
            .iter()
            .map(|id| Value::String(id.to_string()))
            .collect();
        document.insert(Value::String(MUTE_LISTEN_KEY.to_string()), Value::Sequence(ids));
        self.write_document(&document).await
    }

    async fn add_users(&self, users: &[u64]) -> NotifyResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut current = self.get_users().await?;
        current.extend(users.iter().copied());
        self.set_users(&current).await
    }

    async fn remove_users(&self, users: &[u64]) -> NotifyResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut current = self.get_users().await?;
        for user in users {
            current.remove(user);
        }
        self.set_users(&current).await
    }
}

/// Non-persistent repository
#[derive(Debug, Default)]
pub struct MemoryNotifyRepository {
    users: DashSet<u64>,
}

impl MemoryNotifyRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_users(users: impl IntoIterator<Item = u64>) -> Self {
        Self {
            users: users.into_iter().collect(),
        }
    }
}

#[async_trait]
impl NotifyRepository for MemoryNotifyRepository {
    async fn get_users(&self) -> NotifyResult<BTreeSet<u64>> {
        Ok(self.users.iter().map(|entry| *entry).collect())
    }

    async fn set_users(&self, users: &BTreeSet<u64>) -> NotifyResult<()> {
        self.users.retain(|id| users.contains(id));
        for id in users {
            self.users.insert(*id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_missing_file_initializes_empty_store() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("data").join("notify_db.yaml");
        let repo = YamlNotifyRepository::new(&path);

        let users = repo.get_users().await.expect("fails soft");
        assert!(users.is_empty());
        assert!(path.exists(), "store file should be created");
    }

    #[tokio::test]
    async fn test_set_and_get_users() {
        let dir = tempfile::tempdir().expect("tempdir");
        let repo = YamlNotifyRepository::new(dir.path().join("db.yaml"));

        let users = BTreeSet::from([42, 7]);
        repo.set_users(&users).await.expect("write");
        assert_eq!(repo.get_users().await.expect("read"), users);

        let raw = tokio::fs::read_to_string(repo.path()).await.unwrap();
        assert!(raw.contains("mute_listen_users"));
        assert!(raw.contains("'42'") || raw.contains("\"42\""));
    }

    #[tokio::test]
    async fn test_set_users_preserves_other_fields() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("db.yaml");
        tokio::fs::write(&path, "other_setting: keep-me\nmute_listen_users: [1]\n")
            .await
            .unwrap();
        let repo = YamlNotifyRepository::new(&path);

        repo.set_users(&BTreeSet::from([2])).await.expect("write");

        let raw = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(raw.contains("other_setting: keep-me"));
        assert_eq!(repo.get_users().await.unwrap(), BTreeSet::from([2]));
    }

    #[tokio::test]
    async fn test_reads_integer_and_string_ids() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("db.yaml");
        tokio::fs::write(&path, "mute_listen_users: [5, '6', nope]\n")
            .await
            .unwrap();
        let repo = YamlNotifyRepository::new(&path);

        assert_eq!(repo.get_users().await.unwrap(), BTreeSet::from([5, 6]));
    }

    #[tokio::test]
    async fn test_add_and_remove_users() {
        let dir = tempfile::tempdir().expect("tempdir");
        let repo = YamlNotifyRepository::new(dir.path().join("db.yaml"));

        repo.add_users(&[1, 2]).await.unwrap();
        repo.add_users(&[2, 3]).await.unwrap();
        assert_eq!(repo.get_users().await.unwrap(), BTreeSet::from([1, 2, 3]));

        repo.remove_users(&[2, 99]).await.unwrap();
        assert_eq!(repo.get_users().await.unwrap(), BTreeSet::from([1, 3]));
        assert!(repo.contains(1).await.unwrap());
        assert!(!repo.contains(2).await.unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_adds_are_serialized() {
        let dir = tempfile::tempdir().expect("tempdir");
        let repo = Arc::new(YamlNotifyRepository::new(dir.path().join("db.yaml")));

        let mut tasks = tokio::task::JoinSet::new();
        for id in 1..=10u64 {
            let repo = Arc::clone(&repo);
            tasks.spawn(async move { repo.add_users(&[id]).await });
        }
        while let Some(result) = tasks.join_next().await {
            result.expect("task").expect("add");
        }

        assert_eq!(repo.get_users().await.unwrap().len(), 10);
    }

    #[tokio::test]
    async fn test_memory_repository() {
        let repo = MemoryNotifyRepository::with_users([1, 2]);
        repo.add_users(&[3]).await.unwrap();
        repo.remove_users(&[1]).await.unwrap();
        assert_eq!(repo.get_users().await.unwrap(), BTreeSet::from([2, 3]));

        repo.set_users(&BTreeSet::from([9])).await.unwrap();
        assert_eq!(repo.get_users().await.unwrap(), BTreeSet::from([9]));
    }
}
