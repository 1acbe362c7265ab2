//! Durable storage adapters for the commitment lock and blocking sessions.
//!
//! - [`MemoryLockStore`]: concurrent in-memory store backed by `DashMap`
//! - [`JsonFileLockStore`]: a single JSON document replaced atomically on
//!   every write (write to a temporary file, then rename)
//!
//! A document that no longer parses is moved aside to `*.corrupt` on the
//! next write and replaced, so one bad file cannot block every later write.

use crate::application::ports::{LockStore, StoreError};
use crate::domain::lock::CommitmentLock;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use tracing::{error, warn};

const STATE_SCHEMA_VERSION: u32 = 1;

/// Thread-safe in-memory store.
///
/// Nothing survives the process. Used as the default store in tests and as
/// a stand-in when the host provides no writable location.
#[derive(Debug, Default)]
pub struct MemoryLockStore {
    lock: Mutex<Option<CommitmentLock>>,
    sessions: DashMap<String, u64>,
    fail_writes: AtomicBool,
}

impl MemoryLockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop everything, as a storage clear by the user would.
    pub fn wipe(&self) {
        *self.slot() = None;
        self.sessions.clear();
    }

    /// Make every subsequent write fail with an I/O error.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Release);
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::Acquire) {
            return Err(StoreError::Io(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "store is read-only",
            )));
        }
        Ok(())
    }

    fn slot(&self) -> MutexGuard<'_, Option<CommitmentLock>> {
        self.lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl LockStore for MemoryLockStore {
    fn load_lock(&self) -> Result<Option<CommitmentLock>, StoreError> {
        Ok(self.slot().clone())
    }

    fn save_lock(&self, lock: &CommitmentLock) -> Result<(), StoreError> {
        self.check_writable()?;
        *self.slot() = Some(lock.clone());
        Ok(())
    }

    fn clear_lock(&self) -> Result<(), StoreError> {
        self.check_writable()?;
        *self.slot() = None;
        Ok(())
    }

    fn blocked_sessions(&self) -> Result<BTreeMap<String, u64>, StoreError> {
        Ok(self
            .sessions
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect())
    }

    fn put_blocked_session(&self, package: &str, end_time_millis: u64) -> Result<(), StoreError> {
        self.check_writable()?;
        self.sessions.insert(package.to_string(), end_time_millis);
        Ok(())
    }

    fn remove_blocked_session(&self, package: &str) -> Result<(), StoreError> {
        self.check_writable()?;
        self.sessions.remove(package);
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StateDocument {
    schema_version: u32,
    #[serde(default)]
    lock: Option<CommitmentLock>,
    #[serde(default)]
    sessions: BTreeMap<String, u64>,
}

impl Default for StateDocument {
    fn default() -> Self {
        Self {
            schema_version: STATE_SCHEMA_VERSION,
            lock: None,
            sessions: BTreeMap::new(),
        }
    }
}

/// File-backed store holding both keyed maps in one JSON document.
#[derive(Debug)]
pub struct JsonFileLockStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles within this process
    write_lock: Mutex<()>,
}

impl JsonFileLockStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_document(&self) -> Result<StateDocument, StoreError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(StateDocument::default()),
            Err(e) => return Err(e.into()),
        };
        if raw.trim().is_empty() {
            return Ok(StateDocument::default());
        }
        Ok(serde_json::from_str(&raw)?)
    }

    fn update<F>(&self, apply: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut StateDocument),
    {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut doc = match self.read_document() {
            Ok(doc) => doc,
            Err(StoreError::Corrupt(e)) => {
                warn!(
                    error = %e,
                    path = %self.path.display(),
                    "state document is corrupt, replacing it"
                );
                self.quarantine();
                StateDocument::default()
            }
            Err(e) => return Err(e),
        };
        apply(&mut doc);
        doc.schema_version = STATE_SCHEMA_VERSION;
        let serialized = serde_json::to_vec_pretty(&doc)?;
        atomic_write(&self.path, &serialized)?;
        Ok(())
    }

    fn quarantine(&self) {
        let aside = self.path.with_extension("corrupt");
        if let Err(e) = fs::rename(&self.path, &aside) {
            error!(
                error = %e,
                path = %aside.display(),
                "failed to move corrupt state document aside"
            );
        }
    }
}

impl LockStore for JsonFileLockStore {
    fn load_lock(&self) -> Result<Option<CommitmentLock>, StoreError> {
        Ok(self.read_document()?.lock)
    }

    fn save_lock(&self, lock: &CommitmentLock) -> Result<(), StoreError> {
        self.update(|doc| doc.lock = Some(lock.clone()))
    }

    fn clear_lock(&self) -> Result<(), StoreError> {
        self.update(|doc| doc.lock = None)
    }

    fn blocked_sessions(&self) -> Result<BTreeMap<String, u64>, StoreError> {
        Ok(self.read_document()?.sessions)
    }

    fn put_blocked_session(&self, package: &str, end_time_millis: u64) -> Result<(), StoreError> {
        self.update(|doc| {
            doc.sessions.insert(package.to_string(), end_time_millis);
        })
    }

    fn remove_blocked_session(&self, package: &str) -> Result<(), StoreError> {
        self.update(|doc| {
            doc.sessions.remove(package);
        })
    }
}

/// Replace `path` with `data` so readers see either the old or the new file.
pub(crate) fn atomic_write(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut tmp = path.to_path_buf();
    tmp.set_extension("tmp");
    fs::write(&tmp, data)?;
    fs::rename(tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lock(end: u64) -> CommitmentLock {
        CommitmentLock {
            end_time_millis: end,
            owner_fingerprint: "fp".into(),
            encrypted_backup: "blob".into(),
        }
    }

    #[test]
    fn test_memory_store_lock_lifecycle() {
        let store = MemoryLockStore::new();
        assert!(store.load_lock().unwrap().is_none());

        store.save_lock(&lock(10)).unwrap();
        assert_eq!(store.load_lock().unwrap(), Some(lock(10)));

        store.clear_lock().unwrap();
        assert!(store.load_lock().unwrap().is_none());
    }

    #[test]
    fn test_memory_store_failing_writes_keep_state() {
        let store = MemoryLockStore::new();
        store.save_lock(&lock(10)).unwrap();
        store.fail_writes(true);

        assert!(store.save_lock(&lock(20)).is_err());
        assert!(store.clear_lock().is_err());
        assert_eq!(store.load_lock().unwrap(), Some(lock(10)));
    }

    #[test]
    fn test_file_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("guard.json");

        let store = JsonFileLockStore::new(&path);
        store.save_lock(&lock(42)).unwrap();
        store.put_blocked_session("com.example.game", 99).unwrap();
        store.put_blocked_session("com.example.other", 7).unwrap();
        store.remove_blocked_session("com.example.other").unwrap();

        let reopened = JsonFileLockStore::new(&path);
        assert_eq!(reopened.load_lock().unwrap(), Some(lock(42)));
        let sessions = reopened.blocked_sessions().unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions.get("com.example.game"), Some(&99));
    }

    #[test]
    fn test_file_store_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileLockStore::new(dir.path().join("absent.json"));
        assert!(store.load_lock().unwrap().is_none());
        assert!(store.blocked_sessions().unwrap().is_empty());
    }

    #[test]
    fn test_file_store_corrupt_document_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("guard.json");
        fs::write(&path, b"{ not json").unwrap();

        let store = JsonFileLockStore::new(&path);
        assert!(matches!(store.load_lock(), Err(StoreError::Corrupt(_))));
    }

    #[test]
    fn test_write_replaces_corrupt_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("guard.json");
        fs::write(&path, b"{ garbage").unwrap();

        let store = JsonFileLockStore::new(&path);
        store.clear_lock().unwrap();
        assert!(store.load_lock().unwrap().is_none());

        store.save_lock(&lock(42)).unwrap();
        assert_eq!(store.load_lock().unwrap(), Some(lock(42)));
        assert_eq!(
            fs::read(dir.path().join("guard.corrupt")).unwrap(),
            b"{ garbage"
        );
    }

    #[test]
    fn test_clear_lock_keeps_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileLockStore::new(dir.path().join("guard.json"));
        store.save_lock(&lock(42)).unwrap();
        store.put_blocked_session("com.example.game", 99).unwrap();

        store.clear_lock().unwrap();
        assert!(store.load_lock().unwrap().is_none());
        assert_eq!(store.blocked_sessions().unwrap().len(), 1);
    }
}
