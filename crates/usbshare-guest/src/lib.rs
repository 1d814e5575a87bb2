//! usbshare Guest - the machine that consumes shared devices
//!
//! - `supervisor` - keeps a desired set of devices attached, retrying with
//!   bounded exponential backoff, and detaches them on shutdown
//! - `config` - the persisted `guest.json`
//! - `cli` - the one-shot `list` / `connect` / `disconnect` commands and
//!   their exit-code contract
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Backend failures are values; the supervisor never stops on one

pub mod cli;
pub mod config;
pub mod supervisor;

pub use cli::{run_command, ExitStatus, GuestCommand};
pub use config::GuestConfigStore;
pub use supervisor::{
    backoff_delay, ReconnectSupervisor, SupervisorConfig, SupervisorError, SupervisorHandle,
    MAX_BACKOFF, RECONNECT_INTERVAL,
};
