//! Client interface for interacting with the RegistryActor.
//!
//! The `RegistryHandle` is cheap to clone and shared by the server, the
//! dispatcher and the driver monitor.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Channel errors are mapped to `RegistryError::ChannelClosed` or to
//!   empty results for read-only queries

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use usbshare_core::{Attachment, LogEntry, LogLevel};

use super::commands::{RegistryCommand, RegistryError};

// ============================================================================
// Registry Handle
// ============================================================================

/// Handle for interacting with the registry actor.
#[derive(Clone)]
pub struct RegistryHandle {
    sender: mpsc::Sender<RegistryCommand>,
}

impl RegistryHandle {
    pub fn new(sender: mpsc::Sender<RegistryCommand>) -> Self {
        Self { sender }
    }

    /// Inserts or replaces the attachment for its device id.
    ///
    /// Returns the attachment that was replaced, if any.
    ///
    /// # Errors
    ///
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn upsert_attachment(
        &self,
        attachment: Attachment,
    ) -> Result<Option<Attachment>, RegistryError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::UpsertAttachment {
                attachment: Box::new(attachment),
                respond_to: tx,
            })
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;

        rx.await.map_err(|_| RegistryError::ChannelClosed)
    }

    /// Removes the attachment for `device_id`.
    ///
    /// Returns `false` if there was none.
    ///
    /// # Errors
    ///
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn remove_attachment(&self, device_id: &str) -> Result<bool, RegistryError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::RemoveAttachment {
                device_id: device_id.to_string(),
                respond_to: tx,
            })
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;

        rx.await.map_err(|_| RegistryError::ChannelClosed)
    }

    /// All attachments, most recent first.
    ///
    /// Returns an empty vector if the actor is gone.
    pub async fn list_attachments(&self) -> Vec<Attachment> {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(RegistryCommand::ListAttachments { respond_to: tx })
            .await
            .is_err()
        {
            return Vec::new();
        }

        rx.await.unwrap_or_default()
    }

    /// Appends an entry to the operator log.
    pub async fn append_log(&self, entry: LogEntry) {
        if self
            .sender
            .send(RegistryCommand::AppendLog { entry })
            .await
            .is_err()
        {
            debug!("Dropping log entry: registry channel closed");
        }
    }

    /// Appends a message stamped with the current time.
    pub async fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.append_log(LogEntry::now(level, message)).await;
    }

    pub async fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message).await;
    }

    pub async fn warning(&self, message: impl Into<String>) {
        self.log(LogLevel::Warning, message).await;
    }

    pub async fn error(&self, message: impl Into<String>) {
        self.log(LogLevel::Error, message).await;
    }

    /// The most recent `max` log entries (clamped to `[1, 200]`), newest first.
    ///
    /// Returns an empty vector if the actor is gone.
    pub async fn recent_logs(&self, max: i64) -> Vec<LogEntry> {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(RegistryCommand::RecentLogs {
                max,
                respond_to: tx,
            })
            .await
            .is_err()
        {
            return Vec::new();
        }

        rx.await.unwrap_or_default()
    }

    /// Returns true while the actor is running.
    pub fn is_connected(&self) -> bool {
        !self.sender.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_closed_actor_maps_to_errors_and_empties() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let handle = RegistryHandle::new(tx);

        assert_eq!(
            handle
                .upsert_attachment(Attachment::shared("1-1", None))
                .await,
            Err(RegistryError::ChannelClosed)
        );
        assert_eq!(
            handle.remove_attachment("1-1").await,
            Err(RegistryError::ChannelClosed)
        );
        assert!(handle.list_attachments().await.is_empty());
        assert!(handle.recent_logs(10).await.is_empty());
        assert!(!handle.is_connected());

        // Logging into a closed registry is silently dropped
        handle.info("nobody listening").await;
    }
}
