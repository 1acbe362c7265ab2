//! Secondary backup copy.
//!
//! [`FileBackup`] keeps the copy outside the primary state directory so that
//! clearing the host application's storage leaves it behind. Content is the
//! same `base64(iv || ciphertext)` string stored next to the primary record.

use crate::application::ports::{BackupError, SecondaryBackup};
use crate::infrastructure::storage::atomic_write;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// Backup held in memory only; lost with the process.
#[derive(Debug, Default)]
pub struct MemoryBackup {
    content: Mutex<Option<String>>,
}

impl MemoryBackup {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> MutexGuard<'_, Option<String>> {
        self.content
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl SecondaryBackup for MemoryBackup {
    fn read(&self) -> Result<Option<String>, BackupError> {
        Ok(self.slot().clone())
    }

    fn write(&self, encoded: &str) -> Result<(), BackupError> {
        *self.slot() = Some(encoded.to_string());
        Ok(())
    }

    fn delete(&self) -> Result<(), BackupError> {
        *self.slot() = None;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct FileBackup {
    path: PathBuf,
}

impl FileBackup {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SecondaryBackup for FileBackup {
    fn read(&self) -> Result<Option<String>, BackupError> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => {
                let trimmed = raw.trim();
                Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, encoded: &str) -> Result<(), BackupError> {
        atomic_write(&self.path, encoded.as_bytes())?;
        Ok(())
    }

    fn delete(&self) -> Result<(), BackupError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn exists(&self) -> bool {
        self.path.is_file()
    }
}
