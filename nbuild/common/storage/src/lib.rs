//! Durable byte-blob key/value storage.
//!
//! This is an external collaborator as far as the graph manager is
//! concerned: only [`Storage`]'s four operations matter to callers. The
//! default [`FileStorage`] implementation exists so the rest of the system
//! has something to run against; production deployments are expected to
//! swap in whatever store fits their durability requirements.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};

/// Durable key/value blob storage, keyed and valued by raw bytes.
///
/// Implementations must be safe to share across threads: the graph manager
/// holds one `Arc<dyn Storage>` for the lifetime of the process.
pub trait Storage: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;
    fn del(&self, key: &[u8]) -> Result<()>;
    fn close(&self) -> Result<()>;
}

/// A `Storage` that keeps one file per key under a root directory, with an
/// in-process write lock. Keys are escaped into filesystem-safe names; this
/// is adequate for the small, low-churn `graph/<spec>` keyspace this system
/// actually uses and makes no attempt at crash-consistency beyond what the
/// underlying filesystem already gives `fs::write`.
pub struct FileStorage {
    root: PathBuf,
    lock: Mutex<()>,
}

impl FileStorage {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .with_context(|| format!("failed to create storage root {}", root.display()))?;
        Ok(Self {
            root,
            lock: Mutex::new(()),
        })
    }

    fn path_for(&self, key: &[u8]) -> PathBuf {
        self.root.join(encode_key(key))
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let _guard = self.lock.lock().unwrap();
        match std::fs::read(self.path_for(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let _guard = self.lock.lock().unwrap();
        std::fs::write(self.path_for(key), value)?;
        Ok(())
    }

    fn del(&self, key: &[u8]) -> Result<()> {
        let _guard = self.lock.lock().unwrap();
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// An in-memory `Storage` used by tests that don't want filesystem
/// round-trips.
#[derive(Default)]
pub struct MemStorage {
    data: Mutex<HashMap<Vec<u8>, Vec<u8>>>,
}

impl MemStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemStorage {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.data.lock().unwrap().get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.data
            .lock()
            .unwrap()
            .insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn del(&self, key: &[u8]) -> Result<()> {
        self.data.lock().unwrap().remove(key);
        Ok(())
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

fn encode_key(key: &[u8]) -> String {
    // Storage keys in this system are always ASCII path-like strings
    // (`graph/host:target`); hex-encode defensively rather than assume that
    // forever.
    key.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path_exists_for_tests(root: &Path, key: &[u8]) -> bool {
        root.join(encode_key(key)).exists()
    }

    #[test]
    fn file_storage_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStorage::open(dir.path()).unwrap();
        store.put(b"graph/x86_64:x86_64", b"payload").unwrap();
        assert_eq!(
            store.get(b"graph/x86_64:x86_64").unwrap(),
            Some(b"payload".to_vec())
        );
        assert!(path_exists_for_tests(dir.path(), b"graph/x86_64:x86_64"));
    }

    #[test]
    fn missing_key_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStorage::open(dir.path()).unwrap();
        assert_eq!(store.get(b"nope").unwrap(), None);
    }

    #[test]
    fn del_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStorage::open(dir.path()).unwrap();
        store.put(b"k", b"v").unwrap();
        store.del(b"k").unwrap();
        store.del(b"k").unwrap();
        assert_eq!(store.get(b"k").unwrap(), None);
    }

    #[test]
    fn mem_storage_round_trips() {
        let store = MemStorage::new();
        store.put(b"k", b"v").unwrap();
        assert_eq!(store.get(b"k").unwrap(), Some(b"v".to_vec()));
        store.del(b"k").unwrap();
        assert_eq!(store.get(b"k").unwrap(), None);
    }
}
