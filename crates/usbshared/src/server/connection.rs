//! Connection handler for a single client exchange.
//!
//! Each accepted connection carries exactly one request and one response:
//!
//! ```text
//! Connected → ReadingRequest → Dispatching → WritingResponse → Closed
//! ```
//!
//! An empty line or an immediate EOF closes the connection without a
//! response. A line that is not a valid request gets "Invalid request".
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Connection errors are logged and result in graceful disconnect

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::time::timeout;
use tracing::debug;

use usbshare_protocol::{HostRequest, HostResponse};

use super::dispatch::Dispatcher;

/// Maximum request size (1 MB)
pub const MAX_MESSAGE_SIZE: usize = 1_048_576;

/// How long a client may take to send its request line
const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Write timeout (10 seconds)
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// How one exchange ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exchange {
    /// A response was written.
    Responded,
    /// The client sent nothing; no response was written.
    Empty,
}

/// Handles one client connection.
pub struct ConnectionHandler<R, W> {
    reader: BufReader<R>,
    writer: W,
    dispatcher: Dispatcher,
    connection_number: u64,
}

impl<R, W> ConnectionHandler<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W, dispatcher: Dispatcher, connection_number: u64) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer,
            dispatcher,
            connection_number,
        }
    }

    /// Runs the exchange to completion.
    pub async fn run(mut self) -> Result<Exchange, ConnectionError> {
        debug!(connection = self.connection_number, "Client connected");

        let line = match timeout(READ_TIMEOUT, self.read_line()).await {
            Ok(result) => result?,
            Err(_) => return Err(ConnectionError::Timeout),
        };

        let Some(line) = line else {
            debug!(connection = self.connection_number, "Empty request, closing");
            return Ok(Exchange::Empty);
        };

        let response = match serde_json::from_str::<HostRequest>(&line) {
            Ok(request) => {
                debug!(
                    connection = self.connection_number,
                    command = %request.command,
                    "Received request"
                );
                self.dispatcher.dispatch(request).await
            }
            Err(e) => {
                debug!(connection = self.connection_number, error = %e, "Unparseable request");
                HostResponse::invalid_request()
            }
        };

        self.send_response(&response).await?;
        debug!(
            connection = self.connection_number,
            success = response.success,
            "Response sent"
        );
        Ok(Exchange::Responded)
    }

    /// Reads one line. `None` on EOF or a blank line.
    async fn read_line(&mut self) -> Result<Option<String>, ConnectionError> {
        let mut buf = Vec::new();

        // One byte past the limit is enough to detect an oversized line
        let limit = u64::try_from(MAX_MESSAGE_SIZE + 1).unwrap_or(u64::MAX);
        let bytes_read = (&mut self.reader)
            .take(limit)
            .read_until(b'\n', &mut buf)
            .await
            .map_err(|e| ConnectionError::Io(e.to_string()))?;

        if bytes_read == 0 {
            return Ok(None);
        }

        if buf.len() > MAX_MESSAGE_SIZE {
            return Err(ConnectionError::MessageTooLarge {
                size: buf.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }

        let line = String::from_utf8_lossy(&buf);
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }

        Ok(Some(trimmed.to_string()))
    }

    async fn send_response(&mut self, response: &HostResponse) -> Result<(), ConnectionError> {
        let json = serde_json::to_string(response)
            .map_err(|e| ConnectionError::Serialize(e.to_string()))?;

        let writer = &mut self.writer;
        match timeout(WRITE_TIMEOUT, async {
            writer.write_all(json.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
            Ok::<(), std::io::Error>(())
        })
        .await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(ConnectionError::Io(e.to_string())),
            Err(_) => Err(ConnectionError::WriteTimeout),
        }
    }
}

/// Errors that end a connection early.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("Serialize error: {0}")]
    Serialize(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Read timeout")]
    Timeout,

    #[error("Write timeout")]
    WriteTimeout,

    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use tempfile::TempDir;
    use tokio::io::duplex;
    use usbshare_usbipd::mock::MockBackend;

    use crate::config_store::ConfigStore;
    use crate::registry::spawn_registry;

    fn dispatcher(dir: &TempDir) -> Dispatcher {
        Dispatcher::new(
            Arc::new(MockBackend::new()),
            spawn_registry(),
            Arc::new(ConfigStore::new(dir.path().join("config.json"))),
        )
    }

    async fn exchange(input: &[u8]) -> (Result<Exchange, ConnectionError>, String) {
        let dir = TempDir::new().unwrap();
        let (mut client, server) = duplex(4096);
        let (read_half, write_half) = tokio::io::split(server);

        client.write_all(input).await.unwrap();
        client.shutdown().await.unwrap();

        let handler = ConnectionHandler::new(read_half, write_half, dispatcher(&dir), 0);
        let result = handler.run().await;

        let mut output = String::new();
        client.read_to_string(&mut output).await.unwrap();
        (result, output)
    }

    #[tokio::test]
    async fn test_valid_request_gets_one_response_line() {
        let (result, output) = exchange(b"{\"command\":\"get-service-status\"}\n").await;

        assert_eq!(result.unwrap(), Exchange::Responded);
        assert_eq!(output.lines().count(), 1);
        let response: HostResponse = serde_json::from_str(output.trim()).unwrap();
        assert!(response.success);
    }

    #[tokio::test]
    async fn test_garbage_gets_invalid_request() {
        let (result, output) = exchange(b"this is not json\n").await;

        assert_eq!(result.unwrap(), Exchange::Responded);
        let response: HostResponse = serde_json::from_str(output.trim()).unwrap();
        assert!(!response.success);
        assert_eq!(response.error.as_deref(), Some("Invalid request"));
    }

    #[tokio::test]
    async fn test_empty_input_gets_no_response() {
        let (result, output) = exchange(b"").await;
        assert_eq!(result.unwrap(), Exchange::Empty);
        assert!(output.is_empty());

        let (result, output) = exchange(b"   \n").await;
        assert_eq!(result.unwrap(), Exchange::Empty);
        assert!(output.is_empty());
    }

    #[tokio::test]
    async fn test_request_without_newline_is_accepted() {
        let (result, output) = exchange(b"{\"command\":\"get-attachments\"}").await;
        assert_eq!(result.unwrap(), Exchange::Responded);
        assert!(output.contains("\"data\":[]"));
    }

    #[test]
    fn test_connection_error_display() {
        let err = ConnectionError::MessageTooLarge { size: 10, max: 5 };
        assert_eq!(err.to_string(), "Message too large: 10 bytes (max: 5)");
    }
}
