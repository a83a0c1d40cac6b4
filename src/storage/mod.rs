//! Bronze store: immutable, content-addressed raw artifacts on disk.
//!
//! Layout is `{root}/{source}/{item}/{kind}.{ext}`. Writes land in a unique
//! temp file next to the target and are renamed into place, so a reader
//! never observes a partially written artifact under its final name.

mod key;

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

pub use key::{url_hash, BronzeKey, URL_HASH_LEN};

/// Errors from the bronze store.
#[derive(Debug, Error)]
pub enum BronzeError {
    #[error("bronze artifact not found: {0}")]
    NotFound(String),
    #[error("bronze I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("bronze JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Filesystem-backed artifact cache.
#[derive(Debug, Clone)]
pub struct BronzeStore {
    root: PathBuf,
}

impl BronzeStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute location of an artifact.
    pub fn path(&self, key: &BronzeKey) -> PathBuf {
        self.root.join(key.relative_path())
    }

    /// Reference stored in the database (relative to the root, `/`-separated).
    pub fn relative_path(&self, key: &BronzeKey) -> String {
        key.to_string()
    }

    /// Resolve a stored reference back to an absolute path.
    pub fn resolve(&self, reference: &str) -> PathBuf {
        self.root.join(reference)
    }

    pub fn exists(&self, key: &BronzeKey) -> bool {
        self.path(key).is_file()
    }

    pub fn read(&self, key: &BronzeKey) -> Result<Vec<u8>, BronzeError> {
        let path = self.path(key);
        match std::fs::read(&path) {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(BronzeError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn read_text(&self, key: &BronzeKey) -> Result<String, BronzeError> {
        let bytes = self.read(key)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    pub fn read_json<T: DeserializeOwned>(&self, key: &BronzeKey) -> Result<T, BronzeError> {
        let bytes = self.read(key)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Atomically write an artifact, replacing any previous one.
    pub fn write(&self, key: &BronzeKey, data: &[u8]) -> Result<PathBuf, BronzeError> {
        let path = self.path(key);
        let parent = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());
        std::fs::create_dir_all(&parent)?;

        let mut tmp = tempfile::Builder::new()
            .prefix(".bronze-")
            .suffix(".tmp")
            .tempfile_in(&parent)?;
        tmp.write_all(data)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| e.error)?;

        debug!("Wrote bronze artifact {} ({} bytes)", key, data.len());
        Ok(path)
    }

    pub fn write_json<T: Serialize + ?Sized>(
        &self,
        key: &BronzeKey,
        value: &T,
    ) -> Result<PathBuf, BronzeError> {
        let data = serde_json::to_vec(value)?;
        self.write(key, &data)
    }

    /// Write only if nothing is stored under `key` yet.
    ///
    /// Returns `true` when a new artifact was written.
    pub fn write_if_absent(&self, key: &BronzeKey, data: &[u8]) -> Result<bool, BronzeError> {
        if self.exists(key) {
            return Ok(false);
        }
        self.write(key, data)?;
        Ok(true)
    }

    pub fn write_json_if_absent<T: Serialize + ?Sized>(
        &self,
        key: &BronzeKey,
        value: &T,
    ) -> Result<bool, BronzeError> {
        if self.exists(key) {
            return Ok(false);
        }
        self.write_json(key, value)?;
        Ok(true)
    }

    /// Ensure the directory for an artifact exists, for tools that write
    /// the file themselves.
    pub fn prepare_dir(&self, key: &BronzeKey) -> Result<PathBuf, BronzeError> {
        let path = self.path(key);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(path)
    }
}
