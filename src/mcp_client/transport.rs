//! JSON-RPC over stdio transport.
//!
//! Handles low-level communication with MCP server child processes:
//! - Writing JSON-RPC requests to stdin
//! - Reading JSON-RPC responses from stdout
//! - Line-delimited JSON protocol (one JSON object per line)
//!
//! Both halves of the pipe live behind one async mutex, so a request holds
//! the channel from the moment it writes until its response arrives. Callers
//! sharing a transport queue in FIFO order and never interleave on the wire.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

use super::errors::McpError;
use super::types::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};

// ─── Request ID Generator ────────────────────────────────────────────────────

/// Global monotonic request ID counter.
static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Generate a unique request ID.
pub fn next_request_id() -> u64 {
    NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed)
}

// ─── Transport ───────────────────────────────────────────────────────────────

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;
type BoxedReader = BufReader<Box<dyn AsyncRead + Send + Unpin>>;

/// The open pipe pair. `None` in the transport once closed.
struct Channel {
    writer: BoxedWriter,
    reader: BoxedReader,
    /// Set while a line is being written; still set on entry if the previous
    /// writer was cancelled mid-line.
    partial_write: bool,
}

/// Bi-directional JSON-RPC transport over a child process's stdio.
pub struct StdioTransport {
    server_name: String,
    channel: Mutex<Option<Channel>>,
}

impl StdioTransport {
    /// Create a new transport from a writable and a readable stream
    /// (normally the child's stdin and stdout).
    pub fn new<W, R>(server_name: &str, writer: W, reader: R) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
        R: AsyncRead + Send + Unpin + 'static,
    {
        let reader: Box<dyn AsyncRead + Send + Unpin> = Box::new(reader);
        Self {
            server_name: server_name.to_string(),
            channel: Mutex::new(Some(Channel {
                writer: Box::new(writer),
                reader: BufReader::new(reader),
                partial_write: false,
            })),
        }
    }

    /// Send a JSON-RPC request and wait for the matching response.
    ///
    /// Writes one line of JSON, then reads lines until a response with a
    /// matching `id` arrives. Non-JSON lines, server-initiated messages, and
    /// responses to earlier abandoned requests are skipped.
    pub async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<JsonRpcResponse, McpError> {
        let id = next_request_id();
        let req = JsonRpcRequest::new(id, method, params);

        let mut guard = self.channel.lock().await;
        let channel = guard.as_mut().ok_or_else(|| McpError::SessionClosed {
            name: self.server_name.clone(),
        })?;

        self.write_message(channel, &req).await?;

        let mut line_buf = String::new();
        loop {
            line_buf.clear();
            let bytes_read = channel
                .reader
                .read_line(&mut line_buf)
                .await
                .map_err(|e| self.transport_error(format!("failed to read from stdout: {e}")))?;

            if bytes_read == 0 {
                return Err(self.transport_error(
                    "server stdout closed (process may have exited)".into(),
                ));
            }

            let trimmed = line_buf.trim();
            if trimmed.is_empty() {
                continue;
            }

            match serde_json::from_str::<JsonRpcResponse>(trimmed) {
                Ok(resp) if resp.method.is_none() && resp.id == id => return Ok(resp),
                Ok(resp) => {
                    tracing::debug!(
                        server = %self.server_name,
                        expected = id,
                        got = resp.id,
                        "skipping unrelated JSON-RPC message"
                    );
                }
                Err(_) => {
                    // Not a response: notifications or log output on stdout.
                    tracing::trace!(
                        server = %self.server_name,
                        line = trimmed,
                        "skipping non-response line"
                    );
                }
            }
        }
    }

    /// Send a JSON-RPC notification (no response expected).
    pub async fn notify(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(), McpError> {
        let notification = JsonRpcNotification::new(method, params);

        let mut guard = self.channel.lock().await;
        let channel = guard.as_mut().ok_or_else(|| McpError::SessionClosed {
            name: self.server_name.clone(),
        })?;

        self.write_message(channel, &notification).await
    }

    /// Close both pipes. Idempotent.
    ///
    /// Waits for any in-flight request to release the channel; callers that
    /// must not wait should cancel those requests first.
    pub async fn close(&self) {
        let channel = self.channel.lock().await.take();
        if let Some(mut channel) = channel {
            // Closing stdin is the MCP stdio shutdown signal.
            let _ = channel.writer.shutdown().await;
        }
    }

    /// Whether [`close`](Self::close) has run.
    pub async fn is_closed(&self) -> bool {
        self.channel.lock().await.is_none()
    }

    async fn write_message<T: Serialize>(
        &self,
        channel: &mut Channel,
        message: &T,
    ) -> Result<(), McpError> {
        let mut json = serde_json::to_string(message)
            .map_err(|e| self.transport_error(format!("failed to serialize message: {e}")))?;
        json.push('\n');

        if channel.partial_write {
            // Terminate the cancelled line so the server can resync.
            channel
                .writer
                .write_all(b"\n")
                .await
                .map_err(|e| self.transport_error(format!("failed to write to stdin: {e}")))?;
        }

        channel.partial_write = true;
        channel
            .writer
            .write_all(json.as_bytes())
            .await
            .map_err(|e| self.transport_error(format!("failed to write to stdin: {e}")))?;
        channel
            .writer
            .flush()
            .await
            .map_err(|e| self.transport_error(format!("failed to flush stdin: {e}")))?;
        channel.partial_write = false;

        Ok(())
    }

    fn transport_error(&self, reason: String) -> McpError {
        McpError::TransportError {
            server: self.server_name.clone(),
            reason,
        }
    }
}

// ─── Response Helpers ────────────────────────────────────────────────────────

/// Extract the result from a JSON-RPC response, converting errors to `McpError`.
pub fn extract_result(response: JsonRpcResponse) -> Result<serde_json::Value, McpError> {
    if let Some(err) = response.error {
        return Err(McpError::ServerError {
            code: err.code,
            message: err.message,
            data: err.data,
        });
    }

    response.result.ok_or(McpError::ServerError {
        code: super::types::error_codes::INTERNAL_ERROR,
        message: "response missing both result and error".into(),
        data: None,
    })
}

// ─── Tests ───────────────────────────────────────────────────────────────────
