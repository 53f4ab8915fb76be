//! Session handle abstraction.
//!
//! The bridge talks to backends only through [`ToolSession`], and creates
//! them only through [`SessionLauncher`]. The stdio implementation lives in
//! [`super::lifecycle`]; tests substitute in-memory fakes.

use std::sync::Arc;

use async_trait::async_trait;

use super::errors::McpError;
use super::types::{BackendSpec, McpToolDefinition};

/// Identifies a session by its position in the startup order.
pub type SessionId = usize;

/// One live connection to a backend MCP server.
#[async_trait]
pub trait ToolSession: Send + Sync {
    /// Position of this session's spec in the startup order.
    fn id(&self) -> SessionId;

    /// Display name of the backend.
    fn name(&self) -> &str;

    /// Fetch the backend's full tool catalog.
    async fn list_tools(&self) -> Result<Vec<McpToolDefinition>, McpError>;

    /// Forward one tool call and return the raw MCP result.
    ///
    /// A failure here is scoped to the call; the session stays usable.
    async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<serde_json::Value, McpError>;

    /// Release the channel and the process. Safe to call more than once.
    async fn close(&self);
}

/// Creates sessions from launch specs.
#[async_trait]
pub trait SessionLauncher: Send + Sync {
    /// Launch the backend and complete the handshake.
    ///
    /// On error nothing of the partially started session may be left running.
    async fn start(&self, id: SessionId, spec: &BackendSpec)
        -> Result<Arc<dyn ToolSession>, McpError>;
}
