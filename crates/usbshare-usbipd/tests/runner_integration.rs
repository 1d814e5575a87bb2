//! Integration tests for process execution against real child processes.

#![cfg(unix)]

use std::path::Path;
use std::time::{Duration, Instant};

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use usbshare_core::ErrorCode;
use usbshare_usbipd::{CommandRunner, DeviceBackend, ProcessOutcome, ProcessRunner, UsbipdBackend};

/// A zombie counts as dead; its reaper may not be us.
fn process_alive(pid: i32) -> bool {
    match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        Ok(stat) => stat
            .rsplit_once(')')
            .map(|(_, rest)| !rest.trim_start().starts_with('Z'))
            .unwrap_or(true),
        Err(_) => false,
    }
}

async fn read_pid(path: &Path) -> i32 {
    for _ in 0..50 {
        if let Ok(text) = tokio::fs::read_to_string(path).await {
            if let Ok(pid) = text.trim().parse() {
                return pid;
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("pid file never written: {}", path.display());
}

#[tokio::test]
async fn test_timeout_kills_process() {
    let dir = TempDir::new().unwrap();
    let pid_file = dir.path().join("child.pid");
    let script = format!("echo $$ > {}; exec sleep 30", pid_file.display());

    let runner = ProcessRunner::with_timeout(Duration::from_millis(500));
    let started = Instant::now();
    let outcome = runner
        .run("sh", &["-c".to_string(), script], &CancellationToken::new())
        .await;

    assert_eq!(outcome, ProcessOutcome::TimedOut);
    assert!(started.elapsed() < Duration::from_secs(10));

    let pid = read_pid(&pid_file).await;
    assert!(!process_alive(pid), "process {pid} survived the timeout");
}

#[tokio::test]
async fn test_timeout_kills_grandchildren() {
    let dir = TempDir::new().unwrap();
    let pid_file = dir.path().join("grandchild.pid");
    // The shell backgrounds a sleeper and then waits on it
    let script = format!("sleep 30 & echo $! > {}; wait", pid_file.display());

    let runner = ProcessRunner::with_timeout(Duration::from_millis(500));
    let outcome = runner
        .run("sh", &["-c".to_string(), script], &CancellationToken::new())
        .await;

    assert_eq!(outcome, ProcessOutcome::TimedOut);

    let pid = read_pid(&pid_file).await;
    let mut alive = process_alive(pid);
    for _ in 0..50 {
        if !alive {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        alive = process_alive(pid);
    }
    assert!(!alive, "grandchild {pid} survived the timeout");
}

#[tokio::test]
async fn test_exited_leader_with_open_pipes_kills_group() {
    let dir = TempDir::new().unwrap();
    let pid_file = dir.path().join("orphan.pid");
    // The shell exits at once; its sleeper keeps stdout open
    let script = format!("sleep 30 & echo $! > {}; exit 0", pid_file.display());

    let runner = ProcessRunner::with_timeout(Duration::from_millis(500));
    let started = Instant::now();
    let outcome = runner
        .run("sh", &["-c".to_string(), script], &CancellationToken::new())
        .await;

    assert_eq!(outcome, ProcessOutcome::TimedOut);
    assert!(started.elapsed() < Duration::from_secs(10));

    let pid = read_pid(&pid_file).await;
    let mut alive = process_alive(pid);
    for _ in 0..50 {
        if !alive {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        alive = process_alive(pid);
    }
    assert!(!alive, "background process {pid} outlived its exited leader");
}

#[tokio::test]
async fn test_cancellation_mid_run() {
    let runner = ProcessRunner::new();
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let outcome = runner.run("sleep", &["30".to_string()], &cancel).await;

    assert_eq!(outcome, ProcessOutcome::TimedOut);
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn test_backend_missing_tool() {
    let backend = UsbipdBackend::new("/nonexistent/usbipd");
    let result = backend.bind("2-2", &CancellationToken::new()).await;
    assert_eq!(result.error_code(), ErrorCode::ToolNotFound);

    let status = backend.driver_status(&CancellationToken::new()).await;
    assert!(!status.installed);
    assert_eq!(status.error_code, ErrorCode::ToolNotFound);
}
