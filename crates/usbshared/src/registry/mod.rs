//! Host state registry using the Actor pattern.
//!
//! The registry is the single source of truth the IPC server reports
//! from: the current attachments and a bounded ring of operator log
//! entries. It receives commands via a tokio mpsc channel and replies
//! through oneshot channels, so every operation is atomic without any
//! lock visible to callers.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────────────────────┐
//! │   Dispatcher    │────▶│        RegistryActor         │
//! └─────────────────┘     │                              │
//!         │               │  HashMap<key, Attachment>    │
//!         │ RegistryCmd   │  VecDeque<LogEntry> (≤ 500)  │
//! ┌─────────────────┐     │                              │
//! │  DriverMonitor  │────▶│                              │
//! └─────────────────┘     └──────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()` or `.expect()` in production code
//! - Channel operations handle closure gracefully

use tokio::sync::mpsc;

mod actor;
mod commands;
mod handle;

pub use actor::{clamp_recent, RegistryActor, MAX_LOG_ENTRIES, MAX_RECENT_LOGS};
pub use commands::{RegistryCommand, RegistryError};
pub use handle::RegistryHandle;

/// Command channel buffer size
const COMMAND_BUFFER: usize = 100;

/// Spawn the registry actor and return a handle for interaction.
///
/// The actor stops once every handle has been dropped.
///
/// # Example
///
/// ```no_run
/// use usbshared::registry::spawn_registry;
///
/// #[tokio::main]
/// async fn main() {
///     let handle = spawn_registry();
///     handle.info("Host daemon started").await;
///     let attachments = handle.list_attachments().await;
/// }
/// ```
pub fn spawn_registry() -> RegistryHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);

    let actor = RegistryActor::new(cmd_rx);
    tokio::spawn(actor.run());

    RegistryHandle::new(cmd_tx)
}
