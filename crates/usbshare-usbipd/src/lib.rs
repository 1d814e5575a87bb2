//! usbipd CLI wrapper.
//!
//! - `runner` - launches the tool with a hard deadline and kills the
//!   process group on timeout or cancellation
//! - `parse` - turns `usbipd list` text into [`Device`] records
//! - `backend` - the typed [`DeviceBackend`] facade over both
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Tool failures are returned as `BackendResult` / `BackendFailure` values
//!
//! [`Device`]: usbshare_core::Device

pub mod backend;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod parse;
pub mod runner;

pub use backend::{DeviceBackend, UsbipdBackend, DEFAULT_TOOL};
pub use parse::parse_device_list;
pub use runner::{CommandRunner, ProcessOutcome, ProcessRunner, DEFAULT_TIMEOUT};
