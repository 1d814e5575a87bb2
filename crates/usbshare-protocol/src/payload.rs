//! Typed request and response payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use usbshare_core::ErrorCode;

/// Number of log entries returned when the request doesn't say.
pub const DEFAULT_RECENT_LOGS: i64 = 200;

/// Payload of `attach-device`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachDeviceRequest {
    pub device_id: String,
    #[serde(default)]
    pub client_address: Option<String>,
}

/// Payload of `detach-device`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetachDeviceRequest {
    pub device_id: String,
}

/// Payload of `get-recent-logs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentLogsRequest {
    pub max: i64,
}

impl RecentLogsRequest {
    /// Reads `max` from a raw payload, falling back to
    /// [`DEFAULT_RECENT_LOGS`] when absent or not an integer.
    pub fn from_payload(payload: Option<&Map<String, Value>>) -> Self {
        let max = payload
            .and_then(|p| p.get("max"))
            .and_then(Value::as_i64)
            .unwrap_or(DEFAULT_RECENT_LOGS);
        Self { max }
    }
}

impl Default for RecentLogsRequest {
    fn default() -> Self {
        Self {
            max: DEFAULT_RECENT_LOGS,
        }
    }
}

/// Reply to `get-service-status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    pub running: bool,
    pub message: String,
    pub utc_now: DateTime<Utc>,
}

impl ServiceStatus {
    pub fn running() -> Self {
        Self {
            running: true,
            message: "Running".to_string(),
            utc_now: Utc::now(),
        }
    }
}

/// Reply to `attach-device`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachedReply {
    pub attached: bool,
}

/// Reply to `detach-device`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetachedReply {
    pub detached: bool,
}

/// Reply to `get-diagnostics`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostics {
    pub service: String,
    /// Driver status message from the tool probe
    pub driver: String,
    pub tool_present: bool,
    pub driver_error_code: ErrorCode,
    pub client_reachable: bool,
    pub version: String,
    pub attachments: usize,
}
