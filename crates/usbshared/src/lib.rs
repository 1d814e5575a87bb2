//! usbshare host daemon - attachment registry and IPC server
//!
//! This crate provides the host-side infrastructure:
//! - `registry` - actor owning the attachment map and the operator log ring
//! - `server` - Unix socket server, one request/response per connection
//! - `config_store` - load-or-default host configuration
//! - `monitor` - periodic driver reachability probe
//! - `client` - one-shot IPC client used by the control commands
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                        usbshared                          │
//! ├───────────────────────────────────────────────────────────┤
//! │                                                           │
//! │  ┌─────────────────┐      ┌───────────────────────────┐   │
//! │  │   HostServer    │─────▶│        Dispatcher         │   │
//! │  │  (Unix socket)  │      │     (command table)       │   │
//! │  └────────┬────────┘      └──────┬──────────────┬─────┘   │
//! │           │ per connection       │              │         │
//! │           ▼                      ▼              ▼         │
//! │  ┌─────────────────┐   ┌───────────────┐ ┌─────────────┐  │
//! │  │ConnectionHandler│   │ RegistryActor │ │DeviceBackend│  │
//! │  │ (one exchange)  │   │ (state owner) │ │  (usbipd)   │  │
//! │  └─────────────────┘   └───────────────┘ └─────────────┘  │
//! │                                ▲                          │
//! │                          DriverMonitor                    │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

pub mod client;
pub mod config_store;
pub mod monitor;
pub mod registry;
pub mod server;
