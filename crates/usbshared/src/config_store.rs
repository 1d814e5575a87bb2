//! Host configuration persisted as `config.json`.

use std::path::{Path, PathBuf};

use tracing::info;
use usbshare_core::{AppConfig, ConfigPatch, JsonStore, StoreError};

/// Load-or-default store for [`AppConfig`].
///
/// Access is serialized so concurrent patches never lose an update. The
/// file is rewritten on every patch.
#[derive(Debug)]
pub struct ConfigStore {
    store: JsonStore<AppConfig>,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            store: JsonStore::new(path),
        }
    }

    pub fn path(&self) -> &Path {
        self.store.path()
    }

    /// Current configuration, creating the file with defaults if missing.
    pub fn load(&self) -> Result<AppConfig, StoreError> {
        self.store.load()
    }

    /// Applies the fields present in `patch` and returns the full result.
    pub fn patch(&self, patch: &ConfigPatch) -> Result<AppConfig, StoreError> {
        let config = self.store.update(|config| patch.apply(config))?;
        info!(path = %self.path().display(), "Host config updated");
        Ok(config)
    }
}
