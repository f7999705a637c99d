//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration for the CGI gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address, drain window).
    pub listener: ListenerConfig,

    /// Server identity exported to CGI programs.
    pub server: ServerConfig,

    /// Default limits applied to every execution.
    pub execution: ExecutionConfig,

    /// Route definitions mapping request paths to script directories.
    pub routes: Vec<RouteConfig>,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Request limits.
    pub security: SecurityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// How long in-flight requests may run after a shutdown signal.
    pub drain_timeout_secs: u64,
}

impl ListenerConfig {
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            drain_timeout_secs: 10,
        }
    }
}

/// Server identity and the fixed part of every CGI environment.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Value of `SERVER_NAME`.
    pub name: String,

    /// Value of `SERVER_SOFTWARE`.
    pub software: String,

    /// Exported as `DOCUMENT_ROOT`; also the base of `PATH_TRANSLATED`.
    pub document_root: Option<PathBuf>,

    /// Server environment variables copied into every child environment.
    pub pass_env: Vec<String>,

    /// Content type assumed when a program omits one.
    pub default_content_type: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "localhost".to_string(),
            software: concat!("cgi-gateway/", env!("CARGO_PKG_VERSION")).to_string(),
            document_root: None,
            pass_env: vec!["PATH".to_string()],
            default_content_type: "text/html".to_string(),
        }
    }
}

/// Limits for a single CGI execution.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Wall-clock bound in milliseconds, counted from spawn.
    #[serde(alias = "executionTimeout")]
    pub execution_timeout_ms: u64,

    /// Time between SIGTERM and SIGKILL when terminating a process group.
    pub kill_grace_ms: u64,

    /// Cap on retained stderr bytes.
    #[serde(alias = "maxDiagnosticBytes")]
    pub max_diagnostic_bytes: usize,

    /// Cap on the unterminated header block.
    pub max_header_bytes: usize,

    /// Body bytes kept in memory before spilling to a temp file.
    pub spool_threshold_bytes: usize,

    /// Treat a program closing stdin before the whole body was written as an I/O failure.
    pub strict_body_delivery: bool,

    /// Include category and diagnostic in client-facing error bodies.
    pub verbose_errors: bool,

    /// Maximum number of live child processes.
    pub max_concurrent_executions: usize,
}

impl ExecutionConfig {
    pub fn execution_timeout(&self) -> Duration {
        Duration::from_millis(self.execution_timeout_ms)
    }

    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_ms)
    }

    /// Apply the per-route overrides on top of these defaults.
    pub fn overridden_by(&self, route: &RouteConfig) -> ExecutionConfig {
        let mut merged = self.clone();
        if let Some(timeout) = route.execution_timeout_ms {
            merged.execution_timeout_ms = timeout;
        }
        if let Some(max) = route.max_diagnostic_bytes {
            merged.max_diagnostic_bytes = max;
        }
        merged
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            execution_timeout_ms: 30_000,
            kill_grace_ms: 1_000,
            max_diagnostic_bytes: 8 * 1024,
            max_header_bytes: 64 * 1024,
            spool_threshold_bytes: 1024 * 1024,
            strict_body_delivery: true,
            verbose_errors: false,
            max_concurrent_executions: 64,
        }
    }
}

/// Route configuration mapping a path prefix to a script directory.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Route identifier for logging/metrics.
    pub name: String,

    /// Host header to match (case-insensitive, port ignored).
    pub host: Option<String>,

    /// Path prefix to match, e.g. "/cgi-bin".
    pub path_prefix: String,

    /// Directory the prefix maps onto.
    pub root: PathBuf,

    /// Script extension (".py") to interpreter path.
    #[serde(default)]
    pub interpreters: BTreeMap<String, PathBuf>,

    /// Run files without a registered extension directly.
    #[serde(default)]
    pub allow_executables: bool,

    /// Route priority (higher = checked first).
    #[serde(default)]
    pub priority: u32,

    #[serde(default)]
    pub execution_timeout_ms: Option<u64>,

    #[serde(default)]
    pub max_diagnostic_bytes: Option<usize>,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable the Prometheus endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Request limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum request body size in bytes.
    pub max_body_size: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 2 * 1024 * 1024, // 2MB
        }
    }
}
