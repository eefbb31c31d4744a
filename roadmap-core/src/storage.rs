use anyhow::{Context, Result};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// How long to wait for another process to release the store file
const LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// On-disk layout of the YAML key-value store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreDocument {
    #[serde(default)]
    pub entries: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LockMode {
    Shared,
    Exclusive,
}

/// Handles saving and loading the store document from disk with file locking,
/// so a CLI invocation never reads a half-written file from another one
pub struct Storage {
    file_path: PathBuf,
    lock_file_path: PathBuf,
}

impl Storage {
    /// Creates a new Storage instance
    pub fn new<P: AsRef<Path>>(file_path: P) -> Self {
        let file_path = file_path.as_ref().to_path_buf();
        let mut lock_name = OsString::from(file_path.as_os_str());
        lock_name.push(".lock");
        Self {
            file_path,
            lock_file_path: PathBuf::from(lock_name),
        }
    }

    /// Acquire a lock on the store; the returned handle must be held during the operation
    fn acquire_lock(&self, mode: LockMode) -> Result<File> {
        if let Some(parent) = self.lock_file_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(mode == LockMode::Exclusive)
            .open(&self.lock_file_path)
            .with_context(|| format!("Failed to open lock file: {:?}", self.lock_file_path))?;

        let start = Instant::now();
        loop {
            let attempt = match mode {
                LockMode::Shared => FileExt::try_lock_shared(&lock_file),
                LockMode::Exclusive => FileExt::try_lock_exclusive(&lock_file),
            };
            match attempt {
                Ok(()) => return Ok(lock_file),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    if start.elapsed() > LOCK_TIMEOUT {
                        anyhow::bail!(
                            "Timeout waiting for file lock - another process is writing: {:?}",
                            self.file_path
                        );
                    }
                    std::thread::sleep(Duration::from_millis(100));
                }
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!("Failed to acquire lock on {:?}", self.lock_file_path)
                    })
                }
            }
        }
    }

    fn read_document(&self) -> Result<StoreDocument> {
        if !self.file_path.exists() {
            return Ok(StoreDocument::default());
        }

        let content = fs::read_to_string(&self.file_path)
            .with_context(|| format!("Failed to read file: {:?}", self.file_path))?;
        if content.trim().is_empty() {
            return Ok(StoreDocument::default());
        }

        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse YAML from {:?}", self.file_path))
    }

    fn write_document(&self, document: &StoreDocument) -> Result<()> {
        if let Some(parent) = self.file_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let yaml = serde_yaml::to_string(document)?;
        fs::write(&self.file_path, yaml)
            .with_context(|| format!("Failed to write store to {:?}", self.file_path))?;
        Ok(())
    }

    /// Loads the store document; a missing file is an empty store
    pub fn load(&self) -> Result<StoreDocument> {
        let _lock = self.acquire_lock(LockMode::Shared)?;
        self.read_document()
    }

    /// Perform an atomic update operation with proper locking.
    /// This reloads the file, applies changes, and saves while holding the lock,
    /// so keys written by another process in the meantime are kept.
    pub fn update_atomically<F, T>(&self, update_fn: F) -> Result<T>
    where
        F: FnOnce(&mut StoreDocument) -> T,
    {
        let mut lock_file = self.acquire_lock(LockMode::Exclusive)?;
        let _ = writeln!(
            lock_file,
            "Locked by PID {} at {}",
            std::process::id(),
            chrono::Utc::now().to_rfc3339()
        );

        let mut document = self.read_document()?;
        let result = update_fn(&mut document);
        self.write_document(&document)?;
        Ok(result)
    }
}
