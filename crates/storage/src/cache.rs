//! Fast synchronous key/value blob cache.
//!
//! Reads and writes complete before returning, which makes this the
//! read-your-writes layer. Keys carry the schema version, so blobs written
//! under an older schema stay untouched next to newer ones.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CacheError {
    #[error("invalid cache key: {0}")]
    InvalidKey(String),

    #[error("cache io error: {0}")]
    Io(#[from] io::Error),

    #[error("cache serialization error: {0}")]
    Serialization(String),

    #[error("cache unavailable: {0}")]
    Unavailable(String),
}

/// Synchronous blob storage keyed by name.
pub trait ProgressCache: Send + Sync {
    /// Returns the blob stored under `key`, or `None` if there is none.
    ///
    /// # Errors
    ///
    /// Returns `CacheError` if the backend cannot be read.
    fn read(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Replaces the blob stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns `CacheError` if the blob cannot be written.
    fn write(&self, key: &str, value: &str) -> Result<(), CacheError>;
}

fn check_key(key: &str) -> Result<(), CacheError> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(CacheError::InvalidKey(key.to_owned()))
    }
}

/// One JSON file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    /// Use `dir` as the cache directory, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Io` if the directory cannot be created.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, CacheError> {
        check_key(key)?;
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl ProgressCache for FileCache {
    fn read(&self, key: &str) -> Result<Option<String>, CacheError> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(raw) => Ok(Some(raw)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<(), CacheError> {
        let path = self.path_for(key)?;
        // Write beside the target and rename so a crash never leaves half a blob.
        let tmp = path.with_extension("json.tmp");
        let written = write_then_rename(&tmp, &path, value.as_bytes());
        if written.is_err() {
            // The write error is reported; a cleanup failure is not.
            let _ = fs::remove_file(&tmp);
        }
        written.map_err(CacheError::from)
    }
}

fn write_then_rename(tmp: &Path, path: &Path, bytes: &[u8]) -> io::Result<()> {
    {
        let mut file = fs::File::create(tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(tmp, path)
}

/// Process-local cache for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate `key`, e.g. with a blob written by an older build.
    #[must_use]
    pub fn with_entry(self, key: &str, value: impl Into<String>) -> Self {
        if let Ok(mut guard) = self.entries.lock() {
            guard.insert(key.to_owned(), value.into());
        }
        self
    }
}

impl ProgressCache for MemoryCache {
    fn read(&self, key: &str) -> Result<Option<String>, CacheError> {
        check_key(key)?;
        let guard = self
            .entries
            .lock()
            .map_err(|e| CacheError::Unavailable(e.to_string()))?;
        Ok(guard.get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<(), CacheError> {
        check_key(key)?;
        let mut guard = self
            .entries
            .lock()
            .map_err(|e| CacheError::Unavailable(e.to_string()))?;
        guard.insert(key.to_owned(), value.to_owned());
        Ok(())
    }
}
