//! Guest configuration file (`guest.json`).

use std::path::{Path, PathBuf};

use usbshare_core::{GuestConfig, JsonStore, StoreError};

/// Load-or-default access to the guest configuration.
pub struct GuestConfigStore {
    store: JsonStore<GuestConfig>,
}

impl GuestConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            store: JsonStore::new(path),
        }
    }

    pub fn path(&self) -> &Path {
        self.store.path()
    }

    /// Loads the config, writing defaults on first access.
    pub fn load(&self) -> Result<GuestConfig, StoreError> {
        self.store.load()
    }

    /// Adds devices to the persisted desired set, skipping ones already there.
    pub fn remember<I, S>(&self, devices: I) -> Result<GuestConfig, StoreError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.store.update(|config| {
            for device in devices {
                let device = device.into();
                if !config.devices.contains(&device) {
                    config.devices.push(device);
                }
            }
        })
    }

    /// Removes a device from the persisted desired set.
    pub fn forget(&self, device_id: &str) -> Result<GuestConfig, StoreError> {
        self.store
            .update(|config| config.devices.retain(|d| d != device_id))
    }
}
