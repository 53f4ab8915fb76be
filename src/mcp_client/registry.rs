//! Tool registry — aggregates tool catalogs across all MCP sessions.
//!
//! Provides:
//! - Routing of a tool name to the one session that owns it
//! - The flat, display-order catalog of every advertised tool
//! - Conflict reporting when two sessions advertise the same name
//!
//! The registry is filled while the bridge starts and then frozen behind an
//! `Arc`; reads need no locking.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::errors::McpError;
use super::session::{SessionId, ToolSession};
use super::types::ToolDescriptor;

/// A tool name that moved from one session to another during registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationConflict {
    pub tool: String,
    pub previous_owner: String,
    pub new_owner: String,
}

// ─── ToolRegistry ────────────────────────────────────────────────────────────

/// Aggregated tool registry across all sessions.
///
/// `routes` is authoritative for invocation: the last session to register a
/// name owns it. `catalog` is append-only and keeps every descriptor, so it
/// may list the same name more than once.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    routes: HashMap<String, Arc<dyn ToolSession>>,
    catalog: Vec<ToolDescriptor>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one session's complete, normalized catalog.
    ///
    /// Names already owned by a different session are taken over; each
    /// takeover is logged as a warning and returned.
    pub fn register(
        &mut self,
        session: &Arc<dyn ToolSession>,
        descriptors: Vec<ToolDescriptor>,
    ) -> Vec<RegistrationConflict> {
        let mut conflicts = Vec::new();

        for descriptor in descriptors {
            let previous = self
                .routes
                .insert(descriptor.name.clone(), Arc::clone(session));

            if let Some(previous) = previous.filter(|p| p.id() != session.id()) {
                tracing::warn!(
                    tool = %descriptor.name,
                    previous_owner = previous.name(),
                    new_owner = session.name(),
                    "tool already registered, overriding"
                );
                conflicts.push(RegistrationConflict {
                    tool: descriptor.name.clone(),
                    previous_owner: previous.name().to_string(),
                    new_owner: session.name().to_string(),
                });
            }

            self.catalog.push(descriptor);
        }

        conflicts
    }

    /// Find the session that owns a tool.
    pub fn lookup(&self, name: &str) -> Result<Arc<dyn ToolSession>, McpError> {
        self.routes
            .get(name)
            .cloned()
            .ok_or_else(|| McpError::UnknownTool {
                name: name.to_string(),
            })
    }

    /// The full catalog, in registration order.
    pub fn snapshot(&self) -> &[ToolDescriptor] {
        &self.catalog
    }

    /// Which session currently owns a tool name.
    pub fn owner_of(&self, name: &str) -> Option<SessionId> {
        self.routes.get(name).map(|s| s.id())
    }

    /// Names routed to a session, sorted.
    pub fn tool_names_for(&self, session: SessionId) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .routes
            .iter()
            .filter(|(_, owner)| owner.id() == session)
            .map(|(name, _)| name.as_str())
            .collect();
        names.sort_unstable();
        names
    }

    /// Number of routable tool names.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether no tool is routable.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let routes: HashMap<&str, &str> = self
            .routes
            .iter()
            .map(|(tool, session)| (tool.as_str(), session.name()))
            .collect();
        f.debug_struct("ToolRegistry")
            .field("routes", &routes)
            .field("catalog_len", &self.catalog.len())
            .finish()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
