//! Request/response envelopes.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::command::HostCommand;

/// Key used to wrap payloads that are not JSON objects (e.g., sequences).
pub const DATA_KEY: &str = "data";

/// Error converting a payload to or from its typed form.
#[derive(Debug, Error)]
#[error("Invalid payload: {0}")]
pub struct PayloadError(#[from] serde_json::Error);

/// Request sent by a client: one line per connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostRequest {
    pub command: String,
    #[serde(default)]
    pub payload: Option<Map<String, Value>>,
}

impl HostRequest {
    /// Creates a request with no payload.
    pub fn new(command: HostCommand) -> Self {
        Self {
            command: command.as_str().to_string(),
            payload: None,
        }
    }

    /// Creates a request carrying a serialized payload.
    pub fn with_payload<T: Serialize>(command: HostCommand, payload: &T) -> Result<Self, PayloadError> {
        Ok(Self {
            command: command.as_str().to_string(),
            payload: Some(into_object(serde_json::to_value(payload)?)),
        })
    }

    /// Decodes the payload into `T`. Returns `None` when there is no payload.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<Option<T>, PayloadError> {
        self.payload
            .as_ref()
            .map(|p| serde_json::from_value(Value::Object(p.clone())))
            .transpose()
            .map_err(PayloadError::from)
    }
}

/// Response sent by the daemon: one line per connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostResponse {
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub payload: Option<Map<String, Value>>,
}

impl HostResponse {
    /// A successful response.
    ///
    /// Non-object payloads are wrapped as `{"data": ...}`.
    pub fn ok<T: Serialize>(payload: &T) -> Result<Self, PayloadError> {
        Ok(Self {
            success: true,
            error: None,
            payload: Some(into_object(serde_json::to_value(payload)?)),
        })
    }

    /// A failed response carrying `message`.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
            payload: None,
        }
    }

    /// Response to a request line that could not be decoded.
    pub fn invalid_request() -> Self {
        Self::failure("Invalid request")
    }

    /// Stand-in when the daemon closed the connection without answering.
    pub fn no_response() -> Self {
        Self::failure("No response")
    }

    /// Decodes the payload into `T`, unwrapping `{"data": ...}` if present.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<Option<T>, PayloadError> {
        let Some(payload) = &self.payload else {
            return Ok(None);
        };

        let value = match payload.get(DATA_KEY) {
            Some(data) if payload.len() == 1 => data.clone(),
            _ => Value::Object(payload.clone()),
        };

        Ok(Some(serde_json::from_value(value)?))
    }
}

fn into_object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert(DATA_KEY.to_string(), other);
            map
        }
    }
}
