//! usbshare Core - Shared types for USB device sharing
//!
//! This crate provides the domain values shared between the host
//! daemon (usbshared), the backend wrapper (usbshare-usbipd) and the
//! guest side (usbshare-guest).
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod attachment;
pub mod config;
pub mod device;
pub mod error;
pub mod log;
pub mod paths;
pub mod result;
pub mod store;

// Re-exports for convenience
pub use attachment::Attachment;
pub use config::{AppConfig, ConfigPatch, GuestConfig};
pub use device::{Device, ATTACHED_CLIENT_SENTINEL};
pub use error::{validate_device_id, DomainError, DomainResult};
pub use log::{LogEntry, LogLevel};
pub use result::{BackendFailure, BackendResult, DriverStatus, ErrorCode};
pub use store::{JsonStore, StoreError};
