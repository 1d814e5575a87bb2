//! Registry actor - owns attachment state and the operator log ring.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Reply send failures are ignored (the caller went away)

use std::collections::{HashMap, VecDeque};

use tokio::sync::mpsc;
use tracing::{debug, info};

use usbshare_core::{Attachment, LogEntry};

use super::commands::RegistryCommand;

// ============================================================================
// Resource Limits
// ============================================================================

/// Log entries retained; the oldest is evicted first.
pub const MAX_LOG_ENTRIES: usize = 500;

/// Upper bound on entries returned by one recent-logs query.
pub const MAX_RECENT_LOGS: usize = 200;

// ============================================================================
// Registry Actor
// ============================================================================

/// The registry actor - single owner of attachment and log state.
///
/// Attachments are keyed by lowercased device id, so lookups and
/// replacement are case-insensitive. The log is a FIFO bounded at
/// [`MAX_LOG_ENTRIES`].
pub struct RegistryActor {
    receiver: mpsc::Receiver<RegistryCommand>,
    attachments: HashMap<String, Attachment>,
    logs: VecDeque<LogEntry>,
}

impl RegistryActor {
    pub fn new(receiver: mpsc::Receiver<RegistryCommand>) -> Self {
        Self {
            receiver,
            attachments: HashMap::new(),
            logs: VecDeque::with_capacity(MAX_LOG_ENTRIES),
        }
    }

    /// Runs the actor event loop until every handle is dropped.
    pub async fn run(mut self) {
        info!("Registry actor starting");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        info!(
            attachments = self.attachments.len(),
            logs = self.logs.len(),
            "Registry actor stopped"
        );
    }

    fn handle_command(&mut self, cmd: RegistryCommand) {
        match cmd {
            RegistryCommand::UpsertAttachment {
                attachment,
                respond_to,
            } => {
                let replaced = self.handle_upsert(*attachment);
                let _ = respond_to.send(replaced);
            }
            RegistryCommand::RemoveAttachment {
                device_id,
                respond_to,
            } => {
                let removed = self.handle_remove(&device_id);
                let _ = respond_to.send(removed);
            }
            RegistryCommand::ListAttachments { respond_to } => {
                let _ = respond_to.send(self.handle_list_attachments());
            }
            RegistryCommand::AppendLog { entry } => {
                self.handle_append_log(entry);
            }
            RegistryCommand::RecentLogs { max, respond_to } => {
                let _ = respond_to.send(self.handle_recent_logs(max));
            }
        }
    }

    // ========================================================================
    // Command Handlers
    // ========================================================================

    fn handle_upsert(&mut self, attachment: Attachment) -> Option<Attachment> {
        debug!(device_id = %attachment.device_id, "Upserting attachment");
        self.attachments.insert(attachment.key(), attachment)
    }

    fn handle_remove(&mut self, device_id: &str) -> bool {
        let removed = self.attachments.remove(&Attachment::key_for(device_id));
        debug!(device_id, found = removed.is_some(), "Removing attachment");
        removed.is_some()
    }

    fn handle_list_attachments(&self) -> Vec<Attachment> {
        let mut list: Vec<Attachment> = self.attachments.values().cloned().collect();
        // Ties broken by key so the order is stable across calls
        list.sort_by(|a, b| {
            b.since
                .cmp(&a.since)
                .then_with(|| a.key().cmp(&b.key()))
        });
        list
    }

    fn handle_append_log(&mut self, entry: LogEntry) {
        while self.logs.len() >= MAX_LOG_ENTRIES {
            self.logs.pop_front();
        }
        self.logs.push_back(entry);
    }

    fn handle_recent_logs(&self, max: i64) -> Vec<LogEntry> {
        let count = clamp_recent(max);
        self.logs.iter().rev().take(count).cloned().collect()
    }
}

/// Clamps a requested recent-log count to `[1, MAX_RECENT_LOGS]`.
pub fn clamp_recent(max: i64) -> usize {
    let upper = i64::try_from(MAX_RECENT_LOGS).unwrap_or(i64::MAX);
    usize::try_from(max.clamp(1, upper)).unwrap_or(MAX_RECENT_LOGS)
}
