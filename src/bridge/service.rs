//! Bridge service — owns every session and the merged registry.
//!
//! Lifecycle: `Initializing → Ready → Draining → Stopped`.
//!
//! Startup is strictly sequential in configuration order; the order decides
//! which session wins a tool-name conflict. The registry is only mutable
//! while the service is being built (`&mut self`); once [`BridgeService::start`]
//! returns it is read without locks by any number of concurrent callers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{watch, Mutex, OnceCell};

use crate::mcp_client::{
    to_descriptor, BackendSpec, McpError, RegistrationConflict, SessionLauncher, ToolDescriptor,
    ToolRegistry, ToolSession,
};

use super::errors::BridgeError;

// ─── State ───────────────────────────────────────────────────────────────────

/// Lifecycle state of the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BridgeState {
    Initializing,
    Ready,
    Draining,
    Stopped,
}

/// What happened while the bridge started.
#[derive(Debug, Default)]
pub struct StartupReport {
    /// Number of backend specs attempted.
    pub attempted: usize,
    /// Backends whose tools were registered, in startup order.
    pub started: Vec<String>,
    /// `StartupFailure` / `RetrievalFailure` per skipped backend.
    pub failures: Vec<BridgeError>,
    /// Tool names taken over by a later backend.
    pub conflicts: Vec<RegistrationConflict>,
}

// ─── BridgeService ───────────────────────────────────────────────────────────

/// The process-wide bridge: sessions, registry, and lifecycle state.
pub struct BridgeService {
    registry: ToolRegistry,
    /// Live sessions, drained exactly once on shutdown.
    sessions: Mutex<Vec<Arc<dyn ToolSession>>>,
    /// Sessions not yet closed; zero once drained.
    live_sessions: AtomicUsize,
    state: watch::Sender<BridgeState>,
    shutdown: OnceCell<()>,
}

impl BridgeService {
    /// Start one session per spec, in order, and build the registry.
    ///
    /// Backends that fail to start or to list their tools are skipped and
    /// reported; the service is `Ready` afterwards even if none started.
    pub async fn start(
        specs: &[BackendSpec],
        launcher: &dyn SessionLauncher,
    ) -> (Self, StartupReport) {
        let (state, _) = watch::channel(BridgeState::Initializing);
        let mut service = Self {
            registry: ToolRegistry::new(),
            sessions: Mutex::new(Vec::new()),
            live_sessions: AtomicUsize::new(0),
            state,
            shutdown: OnceCell::new(),
        };

        let report = service.initialize(specs, launcher).await;
        service.state.send_replace(BridgeState::Ready);

        tracing::info!(
            attempted = report.attempted,
            started = report.started.len(),
            failed = report.failures.len(),
            conflicts = report.conflicts.len(),
            tools = service.registry.snapshot().len(),
            "bridge ready"
        );

        (service, report)
    }

    async fn initialize(
        &mut self,
        specs: &[BackendSpec],
        launcher: &dyn SessionLauncher,
    ) -> StartupReport {
        let mut report = StartupReport {
            attempted: specs.len(),
            ..StartupReport::default()
        };
        let mut sessions = Vec::new();

        for (id, spec) in specs.iter().enumerate() {
            let backend = spec.display_name(id);

            let session = match launcher.start(id, spec).await {
                Ok(session) => session,
                Err(e) => {
                    tracing::warn!(
                        server = %backend,
                        error = %e,
                        "failed to start session, skipping"
                    );
                    report.failures.push(BridgeError::StartupFailure { backend, source: e });
                    continue;
                }
            };

            // Nothing is registered until the whole catalog is in hand.
            let tools = match session.list_tools().await {
                Ok(tools) => tools,
                Err(e) => {
                    tracing::error!(
                        server = %backend,
                        error = %e,
                        "error listing tools, closing session"
                    );
                    session.close().await;
                    report.failures.push(BridgeError::RetrievalFailure { backend, source: e });
                    continue;
                }
            };

            let descriptors: Vec<ToolDescriptor> = tools.iter().map(to_descriptor).collect();
            tracing::info!(
                server = %backend,
                tools = descriptors.len(),
                "registered session tools"
            );

            report
                .conflicts
                .extend(self.registry.register(&session, descriptors));
            report.started.push(backend);
            sessions.push(session);
        }

        self.live_sessions = AtomicUsize::new(sessions.len());
        self.sessions = Mutex::new(sessions);
        report
    }

    /// Current lifecycle state.
    pub fn state(&self) -> BridgeState {
        *self.state.borrow()
    }

    /// Watch lifecycle transitions.
    pub fn subscribe(&self) -> watch::Receiver<BridgeState> {
        self.state.subscribe()
    }

    /// The flat tool catalog.
    pub fn list_tools(&self) -> &[ToolDescriptor] {
        self.registry.snapshot()
    }

    /// The routing table.
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Number of registered sessions still open.
    pub fn live_sessions(&self) -> usize {
        self.live_sessions.load(Ordering::SeqCst)
    }

    /// Route a call to the session that owns `name`.
    ///
    /// Failures are returned to the caller only; neither the registry nor the
    /// session is changed, and nothing is retried.
    pub async fn invoke_tool(&self, name: &str, arguments: Value) -> Result<Value, BridgeError> {
        if self.state() != BridgeState::Ready {
            return Err(BridgeError::ShuttingDown);
        }

        let session = self
            .registry
            .lookup(name)
            .map_err(|_| BridgeError::ToolNotFound {
                name: name.to_string(),
            })?;

        let start = Instant::now();
        match session.call_tool(name, arguments).await {
            Ok(result) => {
                tracing::debug!(
                    tool = name,
                    server = session.name(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "tool call completed"
                );
                Ok(result)
            }
            Err(McpError::SessionClosed { .. }) if self.state() != BridgeState::Ready => {
                Err(BridgeError::ShuttingDown)
            }
            Err(e) => {
                tracing::warn!(
                    tool = name,
                    server = session.name(),
                    timed_out = e.is_timeout(),
                    error = %e,
                    "tool call failed"
                );
                Err(BridgeError::InvocationFailure {
                    tool: name.to_string(),
                    source: e,
                })
            }
        }
    }

    /// Close every session and stop. Runs once; concurrent callers all wait
    /// for the same drain to finish.
    pub async fn shutdown(&self) {
        self.shutdown
            .get_or_init(|| async {
                self.state.send_replace(BridgeState::Draining);
                let sessions = std::mem::take(&mut *self.sessions.lock().await);
                tracing::info!(sessions = sessions.len(), "draining bridge sessions");

                join_all(sessions.iter().map(|session| session.close())).await;
                self.live_sessions.store(0, Ordering::SeqCst);

                self.state.send_replace(BridgeState::Stopped);
                tracing::info!("bridge stopped");
            })
            .await;
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
