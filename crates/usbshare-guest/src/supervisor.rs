//! Reconnect supervisor for the guest.
//!
//! Holds the desired set of devices and re-issues `attach` for each of them
//! on every pass. Per-device failures are logged and skipped. A pass that
//! cannot make progress at all (the tool is missing) backs off
//! exponentially up to [`MAX_BACKOFF`].
//!
//! ```text
//!  pass ok ──▶ sleep RECONNECT_INTERVAL ──┐
//!     ▲                                    │
//!     └────────────────────────────────────┘
//!  pass err ─▶ sleep min(MAX_BACKOFF, 2^retry s)
//! ```
//!
//! Shutdown is observed between passes. On the way out every desired device
//! is detached, best-effort.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - A poisoned desired-set lock is recovered, not propagated

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use usbshare_core::{ErrorCode, GuestConfig};
use usbshare_usbipd::DeviceBackend;

// ============================================================================
// Configuration
// ============================================================================

/// Delay between clean passes.
pub const RECONNECT_INTERVAL: Duration = Duration::from_secs(15);

/// Ceiling for the backoff after failed passes.
pub const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Supervisor settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorConfig {
    /// Address of the sharing host
    pub host: String,

    /// When false, passes are skipped but shutdown still detaches
    pub auto_reconnect: bool,

    pub interval: Duration,
    pub max_backoff: Duration,
}

impl SupervisorConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            auto_reconnect: true,
            interval: RECONNECT_INTERVAL,
            max_backoff: MAX_BACKOFF,
        }
    }
}

impl From<&GuestConfig> for SupervisorConfig {
    fn from(config: &GuestConfig) -> Self {
        Self {
            auto_reconnect: config.auto_reconnect,
            ..Self::new(config.host_address.clone())
        }
    }
}

/// Delay before the next pass after `retry` consecutive failed passes.
pub fn backoff_delay(retry: u32, max_backoff: Duration) -> Duration {
    let secs = 2u64.checked_pow(retry).unwrap_or(u64::MAX);
    Duration::from_secs(secs).min(max_backoff)
}

// ============================================================================
// Errors
// ============================================================================

/// A pass that could not make progress.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SupervisorError {
    /// Every attach would fail the same way until the tool is installed
    #[error("Sharing tool not available: {0}")]
    ToolNotFound(String),
}

// ============================================================================
// Supervisor
// ============================================================================

type DesiredSet = Arc<Mutex<BTreeSet<String>>>;

/// Keeps the desired devices attached to the guest.
pub struct ReconnectSupervisor {
    backend: Arc<dyn DeviceBackend>,
    config: SupervisorConfig,
    desired: DesiredSet,
}

impl ReconnectSupervisor {
    pub fn new(backend: Arc<dyn DeviceBackend>, config: SupervisorConfig) -> Self {
        Self {
            backend,
            config,
            desired: Arc::new(Mutex::new(BTreeSet::new())),
        }
    }

    /// Seeds the desired set.
    pub fn with_devices<I, S>(self, devices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        {
            let mut desired = self.desired.lock().unwrap_or_else(PoisonError::into_inner);
            desired.extend(devices.into_iter().map(Into::into));
        }
        self
    }

    fn snapshot(&self) -> Vec<String> {
        snapshot(&self.desired)
    }

    /// Attaches every desired device once.
    ///
    /// Returns how many attaches succeeded.
    ///
    /// # Errors
    ///
    /// - `SupervisorError::ToolNotFound` if any attach found the tool
    ///   missing, raised after every device has been tried
    pub async fn run_pass(&self) -> Result<usize, SupervisorError> {
        let mut attached = 0;
        let mut tool_missing = None;

        // Attaches are not tied to shutdown; they end by the tool's deadline
        let call_token = CancellationToken::new();

        for device_id in self.snapshot() {
            let result = self
                .backend
                .attach(&self.config.host, &device_id, &call_token)
                .await;

            if result.success() {
                debug!(device_id = %device_id, host = %self.config.host, "Device attached");
                attached += 1;
                continue;
            }

            let message = result.message().unwrap_or_default().to_string();
            if result.error_code() == ErrorCode::ToolNotFound {
                warn!(device_id = %device_id, message = %message, "Attach tool not found");
                tool_missing.get_or_insert(message);
                continue;
            }

            warn!(
                device_id = %device_id,
                error_code = %result.error_code(),
                message = %message,
                "Attach failed, will retry next pass"
            );
        }

        match tool_missing {
            Some(message) => Err(SupervisorError::ToolNotFound(message)),
            None => Ok(attached),
        }
    }

    /// Detaches every desired device, ignoring failures.
    pub async fn detach_all(&self) {
        let call_token = CancellationToken::new();

        for device_id in self.snapshot() {
            let result = self.backend.detach(&device_id, &call_token).await;
            if !result.success() {
                debug!(
                    device_id = %device_id,
                    error_code = %result.error_code(),
                    "Detach on shutdown failed"
                );
            }
        }
    }

    /// Runs passes until `cancel_token` fires, then detaches.
    pub async fn run(self, cancel_token: CancellationToken) {
        let mut retry: u32 = 0;

        info!(
            host = %self.config.host,
            auto_reconnect = self.config.auto_reconnect,
            devices = self.snapshot().len(),
            "Reconnect supervisor started"
        );

        while !cancel_token.is_cancelled() {
            let delay = if self.config.auto_reconnect {
                match self.run_pass().await {
                    Ok(attached) => {
                        debug!(attached, "Reconnect pass complete");
                        retry = 0;
                        self.config.interval
                    }
                    Err(e) => {
                        retry = retry.saturating_add(1);
                        let delay = backoff_delay(retry, self.config.max_backoff);
                        warn!(
                            error = %e,
                            retry,
                            delay_secs = delay.as_secs(),
                            "Reconnect pass failed"
                        );
                        delay
                    }
                }
            } else {
                self.config.interval
            };

            tokio::select! {
                biased;

                _ = cancel_token.cancelled() => break,
                _ = sleep(delay) => {}
            }
        }

        info!("Reconnect supervisor shutting down");
        self.detach_all().await;
        debug!("Reconnect supervisor task completed");
    }

    /// Spawns the supervisor loop.
    pub fn spawn(self) -> SupervisorHandle {
        let cancel_token = CancellationToken::new();
        let desired = Arc::clone(&self.desired);
        let task = tokio::spawn(self.run(cancel_token.clone()));

        SupervisorHandle {
            desired,
            cancel_token,
            task,
        }
    }
}

fn snapshot(desired: &DesiredSet) -> Vec<String> {
    desired
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .iter()
        .cloned()
        .collect()
}

// ============================================================================
// Handle
// ============================================================================

/// Controls a running supervisor.
///
/// Changes to the desired set take effect on the next pass.
pub struct SupervisorHandle {
    desired: DesiredSet,
    cancel_token: CancellationToken,
    task: JoinHandle<()>,
}

impl SupervisorHandle {
    /// Adds a device to the desired set. Returns false if already present.
    pub fn want(&self, device_id: impl Into<String>) -> bool {
        self.desired
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(device_id.into())
    }

    /// Removes a device from the desired set. It is not detached.
    pub fn forget(&self, device_id: &str) -> bool {
        self.desired
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(device_id)
    }

    pub fn desired(&self) -> Vec<String> {
        snapshot(&self.desired)
    }

    /// Stops the loop and waits for the shutdown detaches to finish.
    pub async fn shutdown(self) {
        self.cancel_token.cancel();
        if let Err(e) = self.task.await {
            warn!(error = %e, "Reconnect supervisor task ended abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use usbshare_core::BackendResult;
    use usbshare_usbipd::mock::{MockBackend, MockCall};

    fn supervisor(backend: Arc<MockBackend>, devices: &[&str]) -> ReconnectSupervisor {
        ReconnectSupervisor::new(backend, SupervisorConfig::new("10.0.0.1"))
            .with_devices(devices.iter().copied())
    }

    #[test]
    fn test_backoff_doubles_up_to_ceiling() {
        let max = Duration::from_secs(60);
        assert_eq!(backoff_delay(1, max), Duration::from_secs(2));
        assert_eq!(backoff_delay(2, max), Duration::from_secs(4));
        assert_eq!(backoff_delay(5, max), Duration::from_secs(32));
        assert_eq!(backoff_delay(6, max), max);
        assert_eq!(backoff_delay(200, max), max);
    }

    #[test]
    fn test_config_from_guest_config() {
        let guest = GuestConfig {
            host_address: "192.168.1.20".to_string(),
            auto_reconnect: false,
            ..Default::default()
        };
        let config = SupervisorConfig::from(&guest);

        assert_eq!(config.host, "192.168.1.20");
        assert!(!config.auto_reconnect);
        assert_eq!(config.interval, RECONNECT_INTERVAL);
    }

    #[tokio::test]
    async fn test_pass_skips_failing_device() {
        let backend = Arc::new(MockBackend::new());
        backend.set_attach_result_for(
            "1-1",
            BackendResult::failed(ErrorCode::ProcessFailed, "device busy"),
        );
        let supervisor = supervisor(backend.clone(), &["1-1", "2-2"]);

        assert_eq!(supervisor.run_pass().await, Ok(1));
        assert_eq!(backend.attach_count("1-1"), 1);
        assert_eq!(backend.attach_count("2-2"), 1);
    }

    #[tokio::test]
    async fn test_pass_tries_every_device_when_tool_missing() {
        let backend = Arc::new(MockBackend::new());
        backend.set_attach_result_for(
            "1-1",
            BackendResult::failed(ErrorCode::ToolNotFound, "usbipd: not found"),
        );
        let supervisor = supervisor(backend.clone(), &["1-1", "2-2"]);

        assert_eq!(
            supervisor.run_pass().await,
            Err(SupervisorError::ToolNotFound("usbipd: not found".to_string()))
        );
        assert_eq!(backend.attach_count("1-1"), 1);
        assert_eq!(backend.attach_count("2-2"), 1);
    }

    #[tokio::test]
    async fn test_attach_uses_configured_host() {
        let backend = Arc::new(MockBackend::new());
        supervisor(backend.clone(), &["3-1"]).run_pass().await.unwrap();

        assert_eq!(
            backend.calls(),
            vec![MockCall::Attach {
                host: "10.0.0.1".to_string(),
                device_id: "3-1".to_string(),
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_clean_passes_every_interval() {
        let backend = Arc::new(MockBackend::new());
        let handle = supervisor(backend.clone(), &["2-2"]).spawn();

        sleep(Duration::from_secs(31)).await;
        handle.shutdown().await;

        // Passes at 0s, 15s and 30s
        assert_eq!(backend.attach_count("2-2"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_passes_back_off() {
        let backend = Arc::new(MockBackend::new());
        backend.set_attach_result(BackendResult::failed(ErrorCode::ToolNotFound, "missing"));
        let handle = supervisor(backend.clone(), &["2-2"]).spawn();

        sleep(Duration::from_secs(31)).await;
        handle.shutdown().await;

        // Passes at 0s, 2s, 6s, 14s and 30s
        assert_eq!(backend.attach_count("2-2"), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_detaches_desired_devices() {
        let backend = Arc::new(MockBackend::new());
        backend.set_detach_result(BackendResult::failed(ErrorCode::ProcessFailed, "gone"));
        let handle = supervisor(backend.clone(), &["1-1", "2-2"]).spawn();
        sleep(Duration::from_secs(1)).await;

        handle.shutdown().await;

        let detached: Vec<MockCall> = backend
            .calls()
            .into_iter()
            .filter(|c| matches!(c, MockCall::Detach(_)))
            .collect();
        assert_eq!(
            detached,
            vec![
                MockCall::Detach("1-1".to_string()),
                MockCall::Detach("2-2".to_string()),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_reconnect_disabled_skips_attach() {
        let backend = Arc::new(MockBackend::new());
        let config = SupervisorConfig {
            auto_reconnect: false,
            ..SupervisorConfig::new("10.0.0.1")
        };
        let handle = ReconnectSupervisor::new(backend.clone(), config)
            .with_devices(["2-2"])
            .spawn();

        sleep(Duration::from_secs(40)).await;
        handle.shutdown().await;

        assert_eq!(backend.attach_count("2-2"), 0);
        assert_eq!(backend.calls(), vec![MockCall::Detach("2-2".to_string())]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_handle_changes_apply_next_pass() {
        let backend = Arc::new(MockBackend::new());
        let handle = supervisor(backend.clone(), &[]).spawn();
        sleep(Duration::from_secs(1)).await;

        assert!(handle.want("4-1"));
        assert!(!handle.want("4-1"));
        sleep(Duration::from_secs(16)).await;
        assert_eq!(backend.attach_count("4-1"), 1);

        assert!(handle.forget("4-1"));
        assert!(handle.desired().is_empty());
        sleep(Duration::from_secs(15)).await;
        assert_eq!(backend.attach_count("4-1"), 1);

        handle.shutdown().await;
    }
}
