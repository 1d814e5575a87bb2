//! USB device records as reported by the sharing tool.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Marker placed in [`Device::attached_client`] when the tool reports the
/// device as attached.
///
/// The listing output never exposes the remote address, so this is a
/// presence flag only.
pub const ATTACHED_CLIENT_SENTINEL: &str = "external-client";

/// A USB device from one `list` invocation.
///
/// Devices are produced fresh on every listing and carry no identity
/// across calls beyond `device_id` string equality.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    /// Bus identifier (e.g., "2-2"), unique within a listing
    pub device_id: String,

    /// Human-readable device name
    pub friendly_name: String,

    /// Vendor:product pair, uppercase hex (e.g., "046D:C534")
    pub vendor_product_id: String,

    /// Serial number, when the tool reports one
    #[serde(default)]
    pub serial: Option<String>,

    /// Free-text state as reported by the tool ("Shared", "Not shared", ...)
    pub status: String,

    /// Set to [`ATTACHED_CLIENT_SENTINEL`] when the device is attached
    #[serde(default)]
    pub attached_client: Option<String>,
}

impl Device {
    /// Returns true if the tool reported the device as attached to a client.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.attached_client.is_some()
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} [{}]",
            self.device_id, self.vendor_product_id, self.friendly_name, self.status
        )
    }
}
