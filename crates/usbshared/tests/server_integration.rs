//! Integration tests for the Unix socket server.
//!
//! These tests run `HostServer` on a real socket inside a temp dir with a
//! `MockBackend`, covering framing, dispatch, concurrency and shutdown.
//!
//! Tests CAN use `.unwrap()` and `.expect()`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use usbshare_core::{BackendResult, ErrorCode};
use usbshare_protocol::HostResponse;
use usbshare_usbipd::mock::MockBackend;
use usbshared::client::HostClient;
use usbshared::config_store::ConfigStore;
use usbshared::registry::{spawn_registry, RegistryHandle};
use usbshared::server::{Dispatcher, HostServer, ServerError};

// ============================================================================
// Constants
// ============================================================================

/// Maximum time to wait for server socket to appear
const SOCKET_WAIT_TIMEOUT: Duration = Duration::from_millis(500);

/// Interval between socket existence checks
const SOCKET_POLL_INTERVAL: Duration = Duration::from_millis(10);

// ============================================================================
// Test Helpers
// ============================================================================

struct TestServer {
    socket_path: PathBuf,
    cancel_token: CancellationToken,
    backend: Arc<MockBackend>,
    registry: RegistryHandle,
    task: JoinHandle<Result<(), ServerError>>,
    _temp_dir: TempDir,
}

impl TestServer {
    async fn spawn() -> Self {
        let temp_dir = tempfile::tempdir().expect("create temp dir");
        let socket_path = temp_dir.path().join("test.sock");

        let backend = Arc::new(MockBackend::new());
        let registry = spawn_registry();
        let config = Arc::new(ConfigStore::new(temp_dir.path().join("config.json")));
        let dispatcher = Dispatcher::new(backend.clone(), registry.clone(), config);
        let cancel_token = CancellationToken::new();

        let server = HostServer::new(socket_path.clone(), dispatcher, cancel_token.clone());
        let task = tokio::spawn(async move { server.run().await });

        let start = tokio::time::Instant::now();
        while start.elapsed() < SOCKET_WAIT_TIMEOUT {
            if socket_path.exists() {
                break;
            }
            sleep(SOCKET_POLL_INTERVAL).await;
        }
        assert!(
            socket_path.exists(),
            "Server socket did not appear within {SOCKET_WAIT_TIMEOUT:?}"
        );

        Self {
            socket_path,
            cancel_token,
            backend,
            registry,
            task,
            _temp_dir: temp_dir,
        }
    }

    /// Writes raw bytes, closes the write side and returns everything read.
    async fn raw_exchange(&self, bytes: &[u8]) -> String {
        let mut stream = UnixStream::connect(&self.socket_path).await.unwrap();
        stream.write_all(bytes).await.unwrap();
        stream.shutdown().await.unwrap();

        let mut output = String::new();
        stream.read_to_string(&mut output).await.unwrap();
        output
    }

    async fn request(&self, command: &str, payload: Value) -> HostResponse {
        let line = json!({"command": command, "payload": payload}).to_string();
        let output = self.raw_exchange(format!("{line}\n").as_bytes()).await;
        serde_json::from_str(output.trim()).unwrap()
    }

    async fn shutdown(self) -> PathBuf {
        self.cancel_token.cancel();
        self.task.await.unwrap().unwrap();
        self.socket_path
    }
}

// ============================================================================
// Framing Tests
// ============================================================================

#[tokio::test]
async fn test_one_response_per_connection() {
    let server = TestServer::spawn().await;

    let output = server
        .raw_exchange(b"{\"command\":\"get-service-status\",\"payload\":null}\n")
        .await;

    assert_eq!(output.lines().count(), 1);
    assert!(output.ends_with('\n'));
    let response: Value = serde_json::from_str(output.trim()).unwrap();
    assert_eq!(response["success"], true);
    assert_eq!(response["payload"]["running"], true);
    assert!(response["payload"]["utcNow"].is_string());

    server.shutdown().await;
}

#[tokio::test]
async fn test_second_line_is_ignored() {
    let server = TestServer::spawn().await;

    let output = server
        .raw_exchange(
            b"{\"command\":\"get-attachments\"}\n{\"command\":\"get-service-status\"}\n",
        )
        .await;

    assert_eq!(output.lines().count(), 1);
    server.shutdown().await;
}

#[tokio::test]
async fn test_invalid_request() {
    let server = TestServer::spawn().await;

    let output = server.raw_exchange(b"{not json\n").await;
    let response: Value = serde_json::from_str(output.trim()).unwrap();

    assert_eq!(response["success"], false);
    assert_eq!(response["error"], "Invalid request");
    server.shutdown().await;
}

#[tokio::test]
async fn test_empty_connection_gets_no_response() {
    let server = TestServer::spawn().await;

    assert_eq!(server.raw_exchange(b"").await, "");
    assert_eq!(server.raw_exchange(b"\n").await, "");

    // The server keeps serving afterwards
    let response = server.request("get-service-status", Value::Null).await;
    assert!(response.success);
    server.shutdown().await;
}

// ============================================================================
// Dispatch Tests
// ============================================================================

#[tokio::test]
async fn test_unknown_command_does_not_mutate_state() {
    let server = TestServer::spawn().await;
    let logs_before = server.registry.recent_logs(200).await.len();

    let response = server.request("format-disk", Value::Null).await;

    assert!(!response.success);
    assert!(response.error.is_some());
    assert!(server.registry.list_attachments().await.is_empty());
    assert_eq!(server.registry.recent_logs(200).await.len(), logs_before);
    assert!(server.backend.calls().is_empty());
    server.shutdown().await;
}

#[tokio::test]
async fn test_attach_visible_in_attachments() {
    let server = TestServer::spawn().await;

    let response = server
        .request("attach-device", json!({"deviceId": "2-2"}))
        .await;
    assert!(response.success);

    let response = server.request("get-attachments", Value::Null).await;
    let data = &response.payload.as_ref().unwrap()["data"];
    assert_eq!(data[0]["deviceId"], "2-2");
    assert_eq!(data[0]["status"], "Shared");

    server.shutdown().await;
}

#[tokio::test]
async fn test_failed_bind_not_in_attachments() {
    let server = TestServer::spawn().await;
    server.backend.set_bind_result(BackendResult::failed(
        ErrorCode::ProcessFailed,
        "usbipd: error: Device with busid '2-2' was not found.",
    ));

    let response = server
        .request("attach-device", json!({"deviceId": "2-2"}))
        .await;
    assert!(!response.success);
    assert_eq!(
        response.error.as_deref(),
        Some("usbipd: error: Device with busid '2-2' was not found.")
    );

    let response = server.request("get-attachments", Value::Null).await;
    assert_eq!(response.payload.as_ref().unwrap()["data"], json!([]));

    server.shutdown().await;
}

#[tokio::test]
async fn test_startup_log_line() {
    let server = TestServer::spawn().await;

    let response = server.request("get-recent-logs", json!({"max": 5})).await;
    let data = response.payload.as_ref().unwrap()["data"].as_array().unwrap().clone();
    assert!(data.iter().any(|e| e["message"] == "IPC server online"));

    server.shutdown().await;
}

// ============================================================================
// Concurrency & Lifecycle Tests
// ============================================================================

#[tokio::test]
async fn test_idle_client_does_not_block_others() {
    let server = TestServer::spawn().await;

    // Connected but silent
    let _idle = UnixStream::connect(&server.socket_path).await.unwrap();

    let response = tokio::time::timeout(
        Duration::from_secs(2),
        server.request("get-service-status", Value::Null),
    )
    .await
    .expect("second client should be served");
    assert!(response.success);

    drop(_idle);
    server.shutdown().await;
}

#[tokio::test]
async fn test_many_concurrent_clients() {
    let server = TestServer::spawn().await;
    let path = server.socket_path.clone();

    let mut tasks = Vec::new();
    for n in 0..20 {
        let path = path.clone();
        tasks.push(tokio::spawn(async move {
            let stream = UnixStream::connect(&path).await.unwrap();
            let (reader, mut writer) = stream.into_split();
            let line = json!({"command": "attach-device", "payload": {"deviceId": format!("1-{n}")}});
            writer
                .write_all(format!("{line}\n").as_bytes())
                .await
                .unwrap();

            let mut response = String::new();
            BufReader::new(reader).read_line(&mut response).await.unwrap();
            serde_json::from_str::<HostResponse>(response.trim()).unwrap()
        }));
    }

    for task in tasks {
        assert!(task.await.unwrap().success);
    }
    assert_eq!(server.registry.list_attachments().await.len(), 20);

    server.shutdown().await;
}

#[tokio::test]
async fn test_host_client_round_trip() {
    let server = TestServer::spawn().await;
    let client = HostClient::new(&server.socket_path);

    client.share("3-1", Some("192.168.0.4".to_string())).await.unwrap();
    let attachments = client.attachments().await.unwrap();
    assert_eq!(attachments.len(), 1);
    assert_eq!(attachments[0].client_address.as_deref(), Some("192.168.0.4"));

    client.unshare("3-1").await.unwrap();
    assert!(client.attachments().await.unwrap().is_empty());

    let diagnostics = client.diagnostics().await.unwrap();
    assert!(diagnostics.tool_present);
    assert_eq!(diagnostics.attachments, 0);

    server.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_removes_socket() {
    let server = TestServer::spawn().await;
    let path = server.shutdown().await;
    assert!(!path.exists());
}
