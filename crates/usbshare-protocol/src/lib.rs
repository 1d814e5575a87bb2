//! usbshare Protocol - Wire protocol for daemon communication
//!
//! One request and one response are exchanged per connection, each a
//! single JSON object terminated by a newline.

pub mod command;
pub mod message;
pub mod payload;

pub use command::{HostCommand, UnknownCommand};
pub use message::{HostRequest, HostResponse, PayloadError, DATA_KEY};
pub use payload::{
    AttachDeviceRequest, AttachedReply, DetachDeviceRequest, DetachedReply, Diagnostics,
    RecentLogsRequest, ServiceStatus, DEFAULT_RECENT_LOGS,
};
