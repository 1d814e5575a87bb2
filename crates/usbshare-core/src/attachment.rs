//! Host-side attachment records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status given to attachments created by a successful share.
pub const SHARED_STATUS: &str = "Shared";

/// Record that a device is currently shared to a client.
///
/// Keyed by `device_id` (case-insensitive) in the host registry.
/// `since` is fixed at creation and never changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub device_id: String,
    pub friendly_name: String,
    #[serde(default)]
    pub client_address: Option<String>,
    pub since: DateTime<Utc>,
    pub status: String,
}

impl Attachment {
    /// Creates a shared attachment stamped with the current time.
    ///
    /// The tool does not report a friendly name on bind, so the device id
    /// doubles as the name.
    pub fn shared(device_id: impl Into<String>, client_address: Option<String>) -> Self {
        let device_id = device_id.into();
        Self {
            friendly_name: device_id.clone(),
            device_id,
            client_address,
            since: Utc::now(),
            status: SHARED_STATUS.to_string(),
        }
    }

    /// Returns the registry key for this attachment.
    #[must_use]
    pub fn key(&self) -> String {
        Self::key_for(&self.device_id)
    }

    /// Normalizes a device id into a registry key.
    #[must_use]
    pub fn key_for(device_id: &str) -> String {
        device_id.to_lowercase()
    }
}
