//! Persisted host and guest configuration.

use serde::{Deserialize, Serialize};

/// Host application configuration (`config.json`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    pub start_with_windows: bool,
    pub start_minimized_to_tray: bool,
    pub auto_reconnect: bool,
    pub notifications: bool,
    pub psk: Option<String>,
    pub cert_thumbprint: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            start_with_windows: false,
            start_minimized_to_tray: false,
            auto_reconnect: true,
            notifications: true,
            psk: None,
            cert_thumbprint: None,
        }
    }
}

/// Partial update for [`AppConfig`]. Absent fields keep their value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_with_windows: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_minimized_to_tray: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_reconnect: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notifications: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub psk: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cert_thumbprint: Option<String>,
}

impl ConfigPatch {
    /// Returns true if the patch carries no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Applies the present fields onto `config`.
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(v) = self.start_with_windows {
            config.start_with_windows = v;
        }
        if let Some(v) = self.start_minimized_to_tray {
            config.start_minimized_to_tray = v;
        }
        if let Some(v) = self.auto_reconnect {
            config.auto_reconnect = v;
        }
        if let Some(v) = self.notifications {
            config.notifications = v;
        }
        if let Some(v) = &self.psk {
            config.psk = Some(v.clone());
        }
        if let Some(v) = &self.cert_thumbprint {
            config.cert_thumbprint = Some(v.clone());
        }
    }
}

/// Guest agent configuration (`guest.json`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GuestConfig {
    pub host_address: String,
    pub control_port: u16,
    pub auto_reconnect: bool,
    /// Devices the guest keeps attached
    pub devices: Vec<String>,
}

impl Default for GuestConfig {
    fn default() -> Self {
        Self {
            host_address: "127.0.0.1".to_string(),
            control_port: 3240,
            auto_reconnect: true,
            devices: Vec::new(),
        }
    }
}
