//! Integration tests for the guest agent wiring: persisted config feeding
//! the reconnect supervisor.
//!
//! Tests CAN use `.unwrap()` and `.expect()`.

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use usbshare_core::{BackendResult, ErrorCode};
use usbshare_guest::{GuestConfigStore, ReconnectSupervisor, SupervisorConfig};
use usbshare_usbipd::mock::{MockBackend, MockCall};

#[tokio::test(start_paused = true)]
async fn test_supervisor_runs_from_persisted_config() {
    let dir = TempDir::new().unwrap();
    let store = GuestConfigStore::new(dir.path().join("guest.json"));
    store.remember(["2-2"]).unwrap();
    let config = store.load().unwrap();

    let backend = Arc::new(MockBackend::new());
    let handle = ReconnectSupervisor::new(backend.clone(), SupervisorConfig::from(&config))
        .with_devices(config.devices.iter().cloned())
        .with_devices(["5-1"])
        .spawn();

    tokio::time::sleep(Duration::from_secs(1)).await;
    handle.shutdown().await;

    let calls = backend.calls();
    assert!(calls.contains(&MockCall::Attach {
        host: "127.0.0.1".to_string(),
        device_id: "2-2".to_string(),
    }));
    assert!(calls.contains(&MockCall::Attach {
        host: "127.0.0.1".to_string(),
        device_id: "5-1".to_string(),
    }));
    assert!(calls.contains(&MockCall::Detach("5-1".to_string())));
}

#[tokio::test(start_paused = true)]
async fn test_recovers_after_tool_returns() {
    let backend = Arc::new(MockBackend::new());
    backend.set_attach_result(BackendResult::failed(ErrorCode::ToolNotFound, "missing"));

    let handle = ReconnectSupervisor::new(backend.clone(), SupervisorConfig::new("10.0.0.9"))
        .with_devices(["2-2"])
        .spawn();

    // Failing passes at 0s, 2s and 6s
    tokio::time::sleep(Duration::from_secs(7)).await;
    assert_eq!(backend.attach_count("2-2"), 3);

    // Next pass at 14s succeeds, then the regular interval resumes
    backend.set_attach_result(BackendResult::ok());
    tokio::time::sleep(Duration::from_secs(23)).await;
    handle.shutdown().await;

    // 14s and 29s
    assert_eq!(backend.attach_count("2-2"), 5);
}
