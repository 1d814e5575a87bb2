//! Driver reachability monitoring for the host daemon.
//!
//! Periodically probes the sharing tool and reports transitions to the
//! operator log:
//! - a warning when the tool becomes unreachable
//! - an info line when it recovers
//!
//! Steady state produces no registry entries, so the 500-entry ring is not
//! flooded by a tool that stays down.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use usbshare_core::DriverStatus;
use usbshare_usbipd::DeviceBackend;

use crate::registry::RegistryHandle;

/// How often the driver is probed.
pub const POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Tracks driver reachability across probes.
pub struct DriverMonitor {
    backend: Arc<dyn DeviceBackend>,
    registry: RegistryHandle,
    last_reachable: Option<bool>,
}

impl DriverMonitor {
    pub fn new(backend: Arc<dyn DeviceBackend>, registry: RegistryHandle) -> Self {
        Self {
            backend,
            registry,
            last_reachable: None,
        }
    }

    /// Probes once and logs a transition if reachability changed.
    ///
    /// The probe is not tied to daemon shutdown; it ends by the tool's own
    /// deadline.
    pub async fn check(&mut self) -> DriverStatus {
        let status = self.backend.driver_status(&CancellationToken::new()).await;
        let reachable = status.installed;

        match (self.last_reachable, reachable) {
            (Some(true) | None, false) => {
                warn!(
                    error_code = %status.error_code,
                    message = %status.message,
                    "Driver unreachable"
                );
                self.registry
                    .warning(format!(
                        "usbipd unreachable ({}): {}",
                        status.error_code, status.message
                    ))
                    .await;
            }
            (Some(false), true) => {
                info!("Driver reachable again");
                self.registry.info("usbipd reachable").await;
            }
            _ => {
                debug!(reachable, "Driver status unchanged");
            }
        }

        self.last_reachable = Some(reachable);
        status
    }

    pub fn last_reachable(&self) -> Option<bool> {
        self.last_reachable
    }
}

/// Spawns the driver polling task.
///
/// The first probe runs immediately. Shutdown is observed between probes,
/// never in the middle of one.
pub fn spawn_driver_monitor(
    backend: Arc<dyn DeviceBackend>,
    registry: RegistryHandle,
    poll_interval: Duration,
    cancel_token: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut monitor = DriverMonitor::new(backend, registry);
        let mut tick = interval(poll_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            interval_secs = poll_interval.as_secs(),
            "Driver monitor started"
        );

        loop {
            tokio::select! {
                biased;

                _ = cancel_token.cancelled() => {
                    info!("Driver monitor shutting down");
                    break;
                }

                _ = tick.tick() => {
                    monitor.check().await;
                }
            }
        }

        debug!("Driver monitor task completed");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::spawn_registry;
    use usbshare_core::{BackendFailure, ErrorCode, LogLevel};
    use usbshare_usbipd::mock::MockBackend;

    fn unreachable() -> DriverStatus {
        DriverStatus::unreachable(BackendFailure::new(
            ErrorCode::ToolNotFound,
            "usbipd: not found",
        ))
    }

    #[tokio::test]
    async fn test_logs_only_transitions() {
        let backend = Arc::new(MockBackend::new());
        let registry = spawn_registry();
        let mut monitor = DriverMonitor::new(backend.clone(), registry.clone());

        // Reachable at startup: nothing to report
        assert!(monitor.check().await.installed);
        assert!(registry.recent_logs(10).await.is_empty());

        backend.set_driver_status(unreachable());
        monitor.check().await;
        monitor.check().await;

        let logs = registry.recent_logs(10).await;
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].level, LogLevel::Warning);
        assert!(logs[0].message.contains("ToolNotFound"));

        backend.set_driver_status(DriverStatus::reachable());
        monitor.check().await;

        let logs = registry.recent_logs(10).await;
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].level, LogLevel::Info);
        assert_eq!(monitor.last_reachable(), Some(true));
    }

    #[tokio::test]
    async fn test_unreachable_at_startup_is_reported() {
        let backend = Arc::new(MockBackend::new());
        backend.set_driver_status(unreachable());
        let registry = spawn_registry();

        DriverMonitor::new(backend, registry.clone()).check().await;

        assert_eq!(registry.recent_logs(10).await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_polls_until_cancelled() {
        let backend = Arc::new(MockBackend::new());
        let registry = spawn_registry();
        let cancel = CancellationToken::new();

        let task = spawn_driver_monitor(
            backend.clone(),
            registry,
            Duration::from_secs(10),
            cancel.clone(),
        );

        tokio::time::sleep(Duration::from_secs(25)).await;
        cancel.cancel();
        task.await.unwrap();

        // Probes at 0s, 10s and 20s
        assert_eq!(backend.calls().len(), 3);
    }
}
