//! Load-or-default JSON files.
//!
//! A missing file is created with `T::default()` on first access and the
//! whole file is rewritten on every mutation. Access through one store is
//! serialized, so concurrent updates never lose a write.

use std::fmt;
use std::fs;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

/// Errors from reading or writing a store file.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// A JSON document on disk holding one `T`.
pub struct JsonStore<T> {
    path: PathBuf,
    lock: Mutex<()>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> fmt::Debug for JsonStore<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl<T> JsonStore<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
            _marker: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the document, creating it with defaults if it doesn't exist.
    pub fn load(&self) -> Result<T, StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.load_locked()
    }

    /// Replaces the document.
    pub fn save(&self, value: &T) -> Result<(), StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.save_locked(value)
    }

    /// Loads, mutates and rewrites the document as one step.
    pub fn update<F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut T),
    {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut value = self.load_locked()?;
        f(&mut value);
        self.save_locked(&value)?;
        Ok(value)
    }

    fn load_locked(&self) -> Result<T, StoreError> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "Store missing, writing defaults");
            let created = T::default();
            self.save_locked(&created)?;
            return Ok(created);
        }

        let content = fs::read_to_string(&self.path).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })?;

        // A `null` document falls back to defaults
        let parsed: Option<T> =
            serde_json::from_str(&content).map_err(|source| StoreError::Parse {
                path: self.path.clone(),
                source,
            })?;
        Ok(parsed.unwrap_or_default())
    }

    fn save_locked(&self, value: &T) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let json = serde_json::to_string_pretty(value).map_err(|source| StoreError::Parse {
            path: self.path.clone(),
            source,
        })?;

        fs::write(&self.path, json).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })
    }
}
