//! MCP Client — JSON-RPC over stdio transport for MCP server sessions.
//!
//! This module handles:
//! - Spawning MCP server child processes and the initialize handshake
//! - JSON-RPC 2.0 communication over process stdio
//! - Schema normalization of advertised tools
//! - Tool aggregation and routing across all sessions

pub mod errors;
pub mod lifecycle;
pub mod registry;
pub mod schema;
pub mod session;
pub mod transport;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports for convenience
pub use errors::McpError;
pub use lifecycle::{SessionTimeouts, StdioLauncher, StdioSession};
pub use registry::{RegistrationConflict, ToolRegistry};
pub use schema::{normalize_schema, to_descriptor};
pub use session::{SessionId, SessionLauncher, ToolSession};
pub use types::{BackendSpec, McpToolDefinition, ToolDescriptor};
