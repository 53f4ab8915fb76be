//! Configuration loading.
//!
//! Sources, highest precedence first:
//! 1. command-line flags
//! 2. `MCP_BRIDGE_*` environment variables
//! 3. the optional YAML config file (`--config`; JSON is accepted too)
//! 4. built-in defaults
//!
//! Without a `servers` list in the file, the bridge runs the reference
//! deployment: a fetch server, plus a filesystem server when `--directory`
//! paths are given.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;
use thiserror::Error;

use crate::mcp_client::lifecycle::{DEFAULT_CALL_TIMEOUT, DEFAULT_STARTUP_TIMEOUT};
use crate::mcp_client::{BackendSpec, SessionTimeouts};

/// Listening address when nothing else is configured.
pub const DEFAULT_BIND: &str = "127.0.0.1:9876";

/// Log filter when neither `RUST_LOG` nor a level is configured.
pub const DEFAULT_LOG_LEVEL: &str = "mcp_tool_bridge=info,warn";

// ─── Errors ──────────────────────────────────────────────────────────────────

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid config: {reason}")]
    Invalid { reason: String },
}

// ─── CLI ─────────────────────────────────────────────────────────────────────

/// Command-line arguments.
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "mcp-tool-bridge")]
#[command(version, about = "Serve the tools of several stdio MCP servers over one HTTP endpoint")]
pub struct CliArgs {
    /// Allowed directory for the filesystem MCP server. Repeatable.
    #[arg(short = 'd', long = "directory", value_name = "PATH")]
    pub directories: Vec<String>,

    /// Path to a YAML config file.
    #[arg(short = 'c', long = "config", env = "MCP_BRIDGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// HTTP bind address (host:port).
    #[arg(short = 'b', long, env = "MCP_BRIDGE_BIND")]
    pub bind: Option<String>,

    /// Log level. Supports tracing filter syntax; `RUST_LOG` overrides it.
    #[arg(short = 'l', long = "log-level", env = "MCP_BRIDGE_LOG")]
    pub log_level: Option<String>,

    /// Timeout for individual tool calls (seconds).
    #[arg(long, env = "MCP_BRIDGE_CALL_TIMEOUT")]
    pub call_timeout: Option<u64>,

    /// Timeout for each server's handshake and tool listing (seconds).
    #[arg(long, env = "MCP_BRIDGE_STARTUP_TIMEOUT")]
    pub startup_timeout: Option<u64>,
}

// ─── File Config ─────────────────────────────────────────────────────────────

/// Contents of the config file. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub bind: Option<String>,
    pub log_level: Option<String>,
    pub call_timeout_secs: Option<u64>,
    pub startup_timeout_secs: Option<u64>,
    /// Backends in startup order. Replaces the default fetch server.
    pub servers: Option<Vec<BackendSpec>>,
}

impl FileConfig {
    /// Read and parse a config file.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

// ─── Resolved Config ─────────────────────────────────────────────────────────

/// Fully resolved bridge configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeConfig {
    pub bind: String,
    pub log_level: String,
    pub timeouts: SessionTimeouts,
    /// Backends in startup order; later entries win tool-name conflicts.
    pub backends: Vec<BackendSpec>,
}

impl BridgeConfig {
    /// Load the config file named by the CLI (if any) and merge.
    pub fn load(cli: CliArgs) -> Result<Self, ConfigError> {
        let file = match cli.config.as_deref() {
            Some(path) => FileConfig::from_path(path)?,
            None => FileConfig::default(),
        };
        Self::resolve(cli, file)
    }

    /// Merge CLI arguments over file settings over defaults.
    pub fn resolve(cli: CliArgs, file: FileConfig) -> Result<Self, ConfigError> {
        let bind = cli
            .bind
            .or(file.bind)
            .unwrap_or_else(|| DEFAULT_BIND.to_string());
        if bind.trim().is_empty() {
            return Err(ConfigError::Invalid {
                reason: "bind address is empty".into(),
            });
        }

        let log_level = cli
            .log_level
            .or(file.log_level)
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());

        let timeouts = SessionTimeouts {
            startup: seconds(
                "startup timeout",
                cli.startup_timeout.or(file.startup_timeout_secs),
                DEFAULT_STARTUP_TIMEOUT,
            )?,
            call: seconds(
                "call timeout",
                cli.call_timeout.or(file.call_timeout_secs),
                DEFAULT_CALL_TIMEOUT,
            )?,
        };

        let mut backends = file.servers.unwrap_or_else(|| vec![fetch_backend()]);
        if let Some(filesystem) = filesystem_backend(&cli.directories) {
            backends.push(filesystem);
        }

        for (index, backend) in backends.iter().enumerate() {
            if backend.command.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    reason: format!(
                        "server '{}' has an empty command",
                        backend.display_name(index)
                    ),
                });
            }
        }

        Ok(Self {
            bind,
            log_level,
            timeouts,
            backends,
        })
    }
}

fn seconds(what: &str, value: Option<u64>, default: Duration) -> Result<Duration, ConfigError> {
    match value {
        None => Ok(default),
        Some(0) => Err(ConfigError::Invalid {
            reason: format!("{what} must be at least 1 second"),
        }),
        Some(secs) => Ok(Duration::from_secs(secs)),
    }
}

// ─── Reference Backends ──────────────────────────────────────────────────────

/// The fetch MCP server (`python -m mcp_server_fetch`).
pub fn fetch_backend() -> BackendSpec {
    BackendSpec::new(
        default_python_command(),
        vec!["-m".to_string(), "mcp_server_fetch".to_string()],
    )
    .with_name("fetch")
}

/// The filesystem MCP server, allowed to touch `directories`.
///
/// Returns `None` when no directories are given.
pub fn filesystem_backend(directories: &[String]) -> Option<BackendSpec> {
    if directories.is_empty() {
        return None;
    }
    let mut args = vec![
        "-y".to_string(),
        "@modelcontextprotocol/server-filesystem".to_string(),
    ];
    args.extend(directories.iter().cloned());
    Some(BackendSpec::new(default_npx_command(), args).with_name("filesystem"))
}

/// Platform-correct npx command.
///
/// Windows requires `npx.cmd` because `npx` is a batch script;
/// `Command::new("npx")` fails without the extension on Windows.
fn default_npx_command() -> &'static str {
    if cfg!(target_os = "windows") {
        "npx.cmd"
    } else {
        "npx"
    }
}

/// Platform-correct Python command.
///
/// macOS 12.3+ removed the `python` symlink; only `python3` exists.
fn default_python_command() -> &'static str {
    if cfg!(target_os = "windows") {
        "python"
    } else {
        "python3"
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
