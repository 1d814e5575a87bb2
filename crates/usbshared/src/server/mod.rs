//! Unix socket server for the host daemon.
//!
//! The server:
//! - Listens on a Unix socket for client connections
//! - Spawns a ConnectionHandler per connection (one request, one response)
//! - Tracks in-flight handlers so shutdown lets them finish
//! - Supports graceful shutdown via CancellationToken
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   HostServer    │
//! │                 │
//! │  UnixListener   │
//! └───────┬─────────┘
//!         │ accept()
//!         ▼
//! ┌─────────────────┐     ┌─────────────────┐
//! │ConnectionHandler│────▶│   Dispatcher    │
//! │ (per connection)│     │                 │
//! └─────────────────┘     └─────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Accept and connection errors are logged and allow continued operation

mod connection;
mod dispatch;

pub use connection::{ConnectionError, ConnectionHandler, Exchange, MAX_MESSAGE_SIZE};
pub use dispatch::{DispatchError, Dispatcher, INTERNAL_ERROR};

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

pub use usbshare_core::paths::DEFAULT_SOCKET_PATH;

/// Unix socket server for the host daemon.
pub struct HostServer {
    /// Path to the Unix socket
    socket_path: PathBuf,

    /// Routes requests to the backend, registry and config
    dispatcher: Dispatcher,

    /// Cancellation token for graceful shutdown
    cancel_token: CancellationToken,

    /// Connection counter for log correlation
    connection_counter: AtomicU64,

    /// In-flight connection handlers
    tracker: TaskTracker,
}

impl HostServer {
    /// Creates a new server.
    ///
    /// # Arguments
    ///
    /// * `socket_path` - Path where the Unix socket will be created
    /// * `dispatcher` - Command dispatcher shared by all connections
    /// * `cancel_token` - Token for graceful shutdown
    pub fn new(
        socket_path: impl Into<PathBuf>,
        dispatcher: Dispatcher,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            socket_path: socket_path.into(),
            dispatcher,
            cancel_token,
            connection_counter: AtomicU64::new(0),
            tracker: TaskTracker::new(),
        }
    }

    /// Returns the socket path.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Runs the server.
    ///
    /// Accepts connections until the cancellation token is triggered, then
    /// waits for in-flight exchanges to finish and removes the socket.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = self.bind()?;

        info!(socket = %self.socket_path.display(), "Host server listening");
        self.dispatcher.registry().info("IPC server online").await;

        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!("Server shutdown requested");
                    break;
                }

                result = listener.accept() => {
                    match result {
                        Ok((stream, _addr)) => {
                            let conn_num = self.connection_counter.fetch_add(1, Ordering::Relaxed);
                            self.handle_connection(stream, conn_num);
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                        }
                    }
                }
            }
        }

        drop(listener);
        self.tracker.close();
        debug!(in_flight = self.tracker.len(), "Waiting for in-flight requests");
        self.tracker.wait().await;

        self.cleanup();
        Ok(())
    }

    fn bind(&self) -> Result<UnixListener, ServerError> {
        let setup_error = |e: std::io::Error| ServerError::SocketSetup {
            path: self.socket_path.clone(),
            error: e.to_string(),
        };

        // A leftover socket from a crashed daemon blocks bind
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path).map_err(setup_error)?;
        }

        if let Some(parent) = self.socket_path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(setup_error)?;
            }
        }

        UnixListener::bind(&self.socket_path).map_err(setup_error)
    }

    /// Spawns a tracked handler task for one connection.
    fn handle_connection(&self, stream: UnixStream, connection_number: u64) {
        let (reader, writer) = stream.into_split();
        let dispatcher = self.dispatcher.clone();

        self.tracker.spawn(async move {
            let handler = ConnectionHandler::new(reader, writer, dispatcher, connection_number);
            if let Err(e) = handler.run().await {
                debug!(connection = connection_number, error = %e, "Connection closed early");
            }
        });
    }

    fn cleanup(&self) {
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(
                    socket = %self.socket_path.display(),
                    error = %e,
                    "Failed to remove socket file"
                );
            }
        }

        info!("Server cleanup complete");
    }
}

/// Errors that can occur in server operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to setup socket at {path}: {error}")]
    SocketSetup { path: PathBuf, error: String },
}
