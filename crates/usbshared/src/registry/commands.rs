//! Registry actor commands and errors.
//!
//! This module defines the message types for communicating with the `RegistryActor`:
//! - `RegistryCommand`: Commands sent to the actor
//! - `RegistryError`: Errors that can occur during registry operations

use thiserror::Error;
use tokio::sync::oneshot;

use usbshare_core::{Attachment, LogEntry};

// ============================================================================
// Registry Commands
// ============================================================================

/// Commands sent to the registry actor.
///
/// Each query carries a oneshot channel for the reply. Commands are
/// processed strictly in arrival order, so every operation is atomic
/// with respect to every other.
#[derive(Debug)]
pub enum RegistryCommand {
    /// Insert or replace the attachment for its device id.
    UpsertAttachment {
        /// The attachment to store (boxed for size optimization)
        attachment: Box<Attachment>,
        /// Receives the entry that was replaced, if any
        respond_to: oneshot::Sender<Option<Attachment>>,
    },

    /// Remove the attachment for a device id.
    ///
    /// Replies `false` if no attachment existed.
    RemoveAttachment {
        device_id: String,
        respond_to: oneshot::Sender<bool>,
    },

    /// All attachments, most recent `since` first.
    ListAttachments {
        respond_to: oneshot::Sender<Vec<Attachment>>,
    },

    /// Append to the operator log ring. Fire-and-forget.
    AppendLog { entry: LogEntry },

    /// The most recent log entries, newest first.
    ///
    /// `max` is clamped to `[1, MAX_RECENT_LOGS]`.
    RecentLogs {
        max: i64,
        respond_to: oneshot::Sender<Vec<LogEntry>>,
    },
}

// ============================================================================
// Registry Errors
// ============================================================================

/// Errors that can occur during registry operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// The actor has shut down.
    #[error("registry channel closed")]
    ChannelClosed,
}
