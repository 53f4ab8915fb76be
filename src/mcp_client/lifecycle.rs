//! Server process lifecycle management.
//!
//! Spawns MCP server child processes, performs the initialization handshake,
//! and tears them down again. Each server runs as a separate OS process
//! communicating via JSON-RPC over stdio.
//!
//! Resources are released in reverse acquisition order on every exit path:
//! pending calls are cancelled, the pipes are closed, then the process is
//! reaped (or killed). `kill_on_drop` backs this up if a session is dropped
//! without being closed.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::errors::McpError;
use super::session::{SessionId, SessionLauncher, ToolSession};
use super::transport::{extract_result, StdioTransport};
use super::types::{
    BackendSpec, InitializeResult, ListToolsResult, McpToolDefinition, ServerInfo,
    PROTOCOL_VERSION,
};

// ─── Constants ───────────────────────────────────────────────────────────────

/// Default bound on the handshake and on catalog retrieval.
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(30);

/// Default bound on a single `tools/call`.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(60);

/// Timeout for graceful exit after stdin is closed, before force-killing.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// How long to wait for stderr to drain when building an error message.
const STDERR_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Number of stderr lines kept for diagnostics.
const STDERR_TAIL_LINES: usize = 20;

/// Maximum characters of stderr quoted in an error message.
const STDERR_MAX_CHARS: usize = 2000;

/// Upper bound on `tools/list` pages, in case a server keeps returning cursors.
const MAX_LIST_PAGES: usize = 100;

// ─── Timeouts ────────────────────────────────────────────────────────────────

/// Deadlines applied to every session the launcher creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTimeouts {
    /// Handshake and `tools/list`.
    pub startup: Duration,
    /// Each `tools/call`.
    pub call: Duration,
}

impl Default for SessionTimeouts {
    fn default() -> Self {
        Self {
            startup: DEFAULT_STARTUP_TIMEOUT,
            call: DEFAULT_CALL_TIMEOUT,
        }
    }
}

// ─── StdioSession ────────────────────────────────────────────────────────────

/// A running MCP server process with its transport.
pub struct StdioSession {
    id: SessionId,
    name: String,
    transport: StdioTransport,
    /// The child process handle; `None` once reaped.
    process: Mutex<Option<Child>>,
    /// Cancelled by `close`; aborts calls that are waiting on the channel.
    closed: CancellationToken,
    stderr_tail: Arc<StdMutex<VecDeque<String>>>,
    stderr_task: Mutex<Option<JoinHandle<()>>>,
    timeouts: SessionTimeouts,
    server_info: Option<ServerInfo>,
    protocol_version: Option<String>,
}

impl StdioSession {
    /// Spawn a server process and perform the initialization handshake.
    ///
    /// If the handshake fails the process is shut down before returning.
    /// An expired deadline is returned as `McpError::Timeout`; every other
    /// failure becomes `InitFailed` with the server's stderr tail.
    pub async fn spawn(
        id: SessionId,
        spec: &BackendSpec,
        timeouts: SessionTimeouts,
    ) -> Result<Self, McpError> {
        let name = spec.display_name(id);

        let mut cmd = Command::new(&spec.command);
        cmd.args(&spec.args);
        for (key, value) in &spec.env {
            cmd.env(key, value);
        }
        if let Some(dir) = spec.cwd.as_deref() {
            cmd.current_dir(dir);
        }

        // Windows: prevent console window from appearing for child processes
        #[cfg(target_os = "windows")]
        {
            const CREATE_NO_WINDOW: u32 = 0x08000000;
            cmd.creation_flags(CREATE_NO_WINDOW);
        }

        cmd.stdin(std::process::Stdio::piped());
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());
        cmd.kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| McpError::SpawnFailed {
            name: name.clone(),
            reason: format!("{e}"),
        })?;

        let stdin = child.stdin.take().ok_or_else(|| McpError::SpawnFailed {
            name: name.clone(),
            reason: "failed to capture stdin".into(),
        })?;
        let stdout = child.stdout.take().ok_or_else(|| McpError::SpawnFailed {
            name: name.clone(),
            reason: "failed to capture stdout".into(),
        })?;

        let stderr_tail = Arc::new(StdMutex::new(VecDeque::with_capacity(STDERR_TAIL_LINES)));
        let stderr_task = child
            .stderr
            .take()
            .map(|stderr| forward_stderr(&name, stderr, Arc::clone(&stderr_tail)));

        tracing::debug!(
            server = %name,
            command = %spec.command,
            args = ?spec.args,
            pid = child.id(),
            "spawned MCP server"
        );

        let mut session = Self {
            id,
            transport: StdioTransport::new(&name, stdin, stdout),
            name,
            process: Mutex::new(Some(child)),
            closed: CancellationToken::new(),
            stderr_tail,
            stderr_task: Mutex::new(stderr_task),
            timeouts,
            server_info: None,
            protocol_version: None,
        };

        let handshake = session
            .guarded("initialize", timeouts.startup, session.initialize())
            .await;
        match handshake {
            Ok(init) => {
                let server_name = init
                    .server_info
                    .as_ref()
                    .and_then(|i| i.name.as_deref())
                    .unwrap_or("unknown");
                tracing::info!(
                    server = %session.name,
                    server_name,
                    protocol = init.protocol_version.as_deref().unwrap_or("unknown"),
                    "MCP handshake complete"
                );
                session.server_info = init.server_info;
                session.protocol_version = init.protocol_version;
                Ok(session)
            }
            Err(e) => {
                session.close().await;
                let stderr_ctx = session.collect_stderr().await;
                if !stderr_ctx.is_empty() {
                    tracing::warn!(
                        server = %session.name,
                        stderr = %stderr_ctx,
                        "server stderr captured on failure"
                    );
                }
                if e.is_timeout() {
                    return Err(e);
                }
                Err(McpError::InitFailed {
                    name: session.name.clone(),
                    reason: format!("{e}{}", format_stderr_suffix(&stderr_ctx)),
                })
            }
        }
    }

    /// Server identity reported during the handshake.
    pub fn server_info(&self) -> Option<&ServerInfo> {
        self.server_info.as_ref()
    }

    /// Protocol revision the server agreed to.
    pub fn protocol_version(&self) -> Option<&str> {
        self.protocol_version.as_deref()
    }

    /// Perform the MCP initialization handshake.
    async fn initialize(&self) -> Result<InitializeResult, McpError> {
        let params = serde_json::json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
            },
        });
        let response = self.transport.request("initialize", Some(params)).await?;
        let result = extract_result(response)?;

        let init: InitializeResult =
            serde_json::from_value(result).map_err(|e| McpError::ProtocolError {
                server: self.name.clone(),
                reason: format!("failed to parse initialize response: {e}"),
            })?;

        self.transport
            .notify("notifications/initialized", None)
            .await?;

        Ok(init)
    }

    async fn fetch_all_tools(&self) -> Result<Vec<McpToolDefinition>, McpError> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_LIST_PAGES {
            let params = cursor.as_ref().map(|c| serde_json::json!({ "cursor": c }));
            let response = self.transport.request("tools/list", params).await?;
            let result = extract_result(response)?;
            let page: ListToolsResult =
                serde_json::from_value(result).map_err(|e| McpError::ProtocolError {
                    server: self.name.clone(),
                    reason: format!("failed to parse tools/list response: {e}"),
                })?;

            tools.extend(page.tools);
            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => return Ok(tools),
            }
        }

        Err(McpError::ProtocolError {
            server: self.name.clone(),
            reason: format!("tools/list did not finish within {MAX_LIST_PAGES} pages"),
        })
    }

    /// Run `fut` under a deadline, giving up early if the session closes.
    async fn guarded<T, F>(&self, operation: &str, limit: Duration, fut: F) -> Result<T, McpError>
    where
        F: Future<Output = Result<T, McpError>>,
    {
        if self.closed.is_cancelled() {
            return Err(McpError::SessionClosed {
                name: self.name.clone(),
            });
        }

        tokio::select! {
            biased;
            () = self.closed.cancelled() => Err(McpError::SessionClosed {
                name: self.name.clone(),
            }),
            outcome = tokio::time::timeout(limit, fut) => match outcome {
                Ok(result) => result,
                Err(_) => Err(McpError::Timeout {
                    server: self.name.clone(),
                    operation: operation.to_string(),
                    timeout_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                }),
            },
        }
    }

    /// Wait briefly for the stderr forwarder to finish, then return the tail.
    async fn collect_stderr(&self) -> String {
        if let Some(handle) = self.stderr_task.lock().await.take() {
            let _ = tokio::time::timeout(STDERR_DRAIN_TIMEOUT, handle).await;
        }
        let tail = match self.stderr_tail.lock() {
            Ok(lines) => lines.iter().cloned().collect::<Vec<_>>().join("\n"),
            Err(_) => String::new(),
        };
        truncate_chars(tail, STDERR_MAX_CHARS)
    }
}

#[async_trait]
impl ToolSession for StdioSession {
    fn id(&self) -> SessionId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn list_tools(&self) -> Result<Vec<McpToolDefinition>, McpError> {
        self.guarded("tools/list", self.timeouts.startup, self.fetch_all_tools())
            .await
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<serde_json::Value, McpError> {
        let params = serde_json::json!({
            "name": name,
            "arguments": arguments,
        });
        let response = self
            .guarded(
                "tools/call",
                self.timeouts.call,
                self.transport.request("tools/call", Some(params)),
            )
            .await?;
        extract_result(response)
    }

    async fn close(&self) {
        self.closed.cancel();
        self.transport.close().await;

        let child = self.process.lock().await.take();
        let Some(mut child) = child else {
            return;
        };

        match tokio::time::timeout(SHUTDOWN_TIMEOUT, child.wait()).await {
            Ok(Ok(status)) => {
                tracing::debug!(server = %self.name, %status, "MCP server exited");
            }
            _ => {
                // Force kill if graceful shutdown failed/timed out
                if let Err(e) = child.kill().await {
                    tracing::warn!(server = %self.name, error = %e, "failed to kill MCP server");
                } else {
                    tracing::debug!(
                        server = %self.name,
                        "MCP server killed after shutdown timeout"
                    );
                }
            }
        }
    }
}

// ─── Launcher ────────────────────────────────────────────────────────────────

/// Launches [`StdioSession`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdioLauncher {
    pub timeouts: SessionTimeouts,
}

impl StdioLauncher {
    pub fn new(timeouts: SessionTimeouts) -> Self {
        Self { timeouts }
    }
}

#[async_trait]
impl SessionLauncher for StdioLauncher {
    async fn start(
        &self,
        id: SessionId,
        spec: &BackendSpec,
    ) -> Result<Arc<dyn ToolSession>, McpError> {
        let session = StdioSession::spawn(id, spec, self.timeouts).await?;
        Ok(Arc::new(session))
    }
}

// ─── Stderr ──────────────────────────────────────────────────────────────────

/// Forward a child's stderr into the log and keep the last few lines.
///
/// Reading continuously also keeps a chatty server from blocking on a full
/// pipe.
fn forward_stderr(
    server: &str,
    stderr: ChildStderr,
    tail: Arc<StdMutex<VecDeque<String>>>,
) -> JoinHandle<()> {
    let server = server.to_string();
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            tracing::debug!(server = %server, "stderr: {line}");
            if let Ok(mut tail) = tail.lock() {
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
        }
    })
}

/// Format a stderr suffix for error messages (empty string if no stderr).
fn format_stderr_suffix(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!(" | stderr: {}", stderr.trim())
    }
}

fn truncate_chars(mut text: String, max_chars: usize) -> String {
    if let Some((cut, _)) = text.char_indices().nth(max_chars) {
        text.truncate(cut);
        text.push_str("...(truncated)");
    }
    text
}

// ─── Tests ───────────────────────────────────────────────────────────────────
