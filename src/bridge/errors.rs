//! Bridge service error types.
//!
//! Startup failures are collected into the startup report and never abort
//! startup. Request failures are returned to the caller of that one request.

use thiserror::Error;

use crate::mcp_client::McpError;

/// Errors produced by the bridge service.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The backend could not be launched or rejected the handshake.
    #[error("backend '{backend}' failed to start: {source}")]
    StartupFailure {
        backend: String,
        #[source]
        source: McpError,
    },

    /// The backend started but its tool catalog could not be retrieved.
    #[error("backend '{backend}' failed to list tools: {source}")]
    RetrievalFailure {
        backend: String,
        #[source]
        source: McpError,
    },

    /// No session owns the requested tool.
    #[error("Tool '{name}' not found")]
    ToolNotFound { name: String },

    /// The owning backend failed the call.
    #[error("{source}")]
    InvocationFailure {
        tool: String,
        #[source]
        source: McpError,
    },

    /// The service is draining and accepts no new calls.
    #[error("bridge is shutting down")]
    ShuttingDown,
}
