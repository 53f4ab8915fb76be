//! In-memory sessions for unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Barrier;

use super::errors::McpError;
use super::session::{SessionId, SessionLauncher, ToolSession};
use super::types::{error_codes, BackendSpec, McpToolDefinition};

/// A scripted session that records what was asked of it.
pub struct FakeSession {
    id: SessionId,
    name: String,
    tools: Vec<McpToolDefinition>,
    list_fails: bool,
    call_error: Option<String>,
    call_barrier: Option<Arc<Barrier>>,
    calls: Mutex<Vec<(String, Value)>>,
    close_count: AtomicUsize,
    closed: AtomicBool,
}

impl FakeSession {
    pub fn new(id: SessionId, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            tools: Vec::new(),
            list_fails: false,
            call_error: None,
            call_barrier: None,
            calls: Mutex::new(Vec::new()),
            close_count: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    pub fn with_tool(mut self, name: &str, input_schema: Value) -> Self {
        self.tools.push(McpToolDefinition {
            name: name.to_string(),
            description: Some(format!("{name} on {}", self.name)),
            input_schema,
        });
        self
    }

    pub fn failing_list(mut self) -> Self {
        self.list_fails = true;
        self
    }

    pub fn failing_calls(mut self, message: &str) -> Self {
        self.call_error = Some(message.to_string());
        self
    }

    /// Every call waits on `barrier` before answering.
    pub fn meeting_at(mut self, barrier: &Arc<Barrier>) -> Self {
        self.call_barrier = Some(Arc::clone(barrier));
        self
    }

    pub fn into_dyn(self) -> Arc<dyn ToolSession> {
        Arc::new(self)
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn close_count(&self) -> usize {
        self.close_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ToolSession for FakeSession {
    fn id(&self) -> SessionId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn list_tools(&self) -> Result<Vec<McpToolDefinition>, McpError> {
        if self.list_fails {
            return Err(McpError::ServerError {
                code: error_codes::METHOD_NOT_FOUND,
                message: "Method not found".into(),
                data: None,
            });
        }
        Ok(self.tools.clone())
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, McpError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(McpError::SessionClosed {
                name: self.name.clone(),
            });
        }
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((name.to_string(), arguments));
        }
        if let Some(barrier) = &self.call_barrier {
            barrier.wait().await;
        }
        match &self.call_error {
            Some(message) => Err(McpError::ServerError {
                code: error_codes::INTERNAL_ERROR,
                message: message.clone(),
                data: None,
            }),
            None => Ok(serde_json::json!({
                "content": [{"type": "text", "text": format!("{} handled {name}", self.name)}],
                "isError": false,
            })),
        }
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.close_count.fetch_add(1, Ordering::SeqCst);
    }
}

/// Hands out pre-built fake sessions keyed by `BackendSpec::command`.
///
/// Commands without a session fail to start.
#[derive(Default)]
pub struct FakeLauncher {
    sessions: HashMap<String, Arc<FakeSession>>,
    started: Mutex<Vec<String>>,
}

impl FakeLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `session` as the result of starting `command`.
    pub fn serve(mut self, command: &str, session: &Arc<FakeSession>) -> Self {
        self.sessions.insert(command.to_string(), Arc::clone(session));
        self
    }

    /// Commands in the order `start` was called.
    pub fn started(&self) -> Vec<String> {
        self.started.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl SessionLauncher for FakeLauncher {
    async fn start(
        &self,
        id: SessionId,
        spec: &BackendSpec,
    ) -> Result<Arc<dyn ToolSession>, McpError> {
        if let Ok(mut started) = self.started.lock() {
            started.push(spec.command.clone());
        }
        match self.sessions.get(&spec.command) {
            Some(session) => Ok(Arc::clone(session) as Arc<dyn ToolSession>),
            None => Err(McpError::SpawnFailed {
                name: spec.display_name(id),
                reason: "No such file or directory (os error 2)".into(),
            }),
        }
    }
}
