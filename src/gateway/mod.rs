//! CGI execution gateway.
//!
//! # Data Flow
//! ```text
//! RequestContext + ScriptCommand
//!     → environment.rs (build the variable set)
//!     → launcher.rs (spawn, own the process group)
//!     → supervisor.rs (arm deadline, race against cancellation)
//!         → execution.rs (stdin feed ∥ stdout parse ∥ stderr capture)
//!     → translator.rs (decide the outcome)
//!     → ExecutionOutcome (exactly one per request)
//! ```
//!
//! # Design Decisions
//! - Limits arrive as an explicit `ExecutionConfig` per call so routes can
//!   override them; nothing is process-global
//! - A semaphore bounds live children; waiting for a slot happens before
//!   spawn and does not consume the deadline
//! - Every failure is folded into an outcome; nothing propagates to the caller

pub mod context;
pub mod diagnostic;
pub mod environment;
pub mod execution;
pub mod launcher;
pub mod outcome;
pub mod parser;
pub mod spool;
pub mod supervisor;
pub mod translator;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::http::HeaderValue;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::{ExecutionConfig, GatewayConfig};
use crate::observability::metrics;

pub use context::{RequestContext, ServerMetadata};
pub use launcher::ScriptCommand;
pub use outcome::{ExecutionOutcome, FailureCategory, ParsedResponse, ProcessError};
pub use translator::TranslateOptions;

use environment::build_environment;
use outcome::Channel;
use supervisor::Supervisor;

/// Entry point for running CGI programs.
#[derive(Debug, Clone)]
pub struct Gateway {
    metadata: Arc<ServerMetadata>,
    limits: ExecutionConfig,
    options: TranslateOptions,
    slots: Arc<Semaphore>,
    active: Arc<AtomicU64>,
}

impl Gateway {
    pub fn new(metadata: ServerMetadata, limits: ExecutionConfig) -> Self {
        let options = TranslateOptions {
            verbose_errors: limits.verbose_errors,
            ..TranslateOptions::default()
        };
        Self {
            metadata: Arc::new(metadata),
            slots: Arc::new(Semaphore::new(limits.max_concurrent_executions.max(1))),
            active: Arc::new(AtomicU64::new(0)),
            limits,
            options,
        }
    }

    /// Build a gateway from a validated configuration.
    pub fn from_config(config: &GatewayConfig) -> Self {
        let mut gateway = Self::new(
            ServerMetadata::from_config(&config.server),
            config.execution.clone(),
        );
        if let Ok(value) = HeaderValue::from_str(&config.server.default_content_type) {
            gateway.options.default_content_type = value;
        }
        gateway
    }

    /// Default limits for executions without a route override.
    pub fn limits(&self) -> &ExecutionConfig {
        &self.limits
    }

    pub fn metadata(&self) -> &ServerMetadata {
        &self.metadata
    }

    pub fn translate_options(&self) -> &TranslateOptions {
        &self.options
    }

    /// Children spawned by this gateway that have not been released yet.
    pub fn active_executions(&self) -> u64 {
        self.active.load(Ordering::SeqCst)
    }

    /// Run `command` for `ctx` with the default limits and no external cancellation.
    pub async fn execute(&self, ctx: &RequestContext, command: &ScriptCommand) -> ExecutionOutcome {
        self.run(ctx, command, &self.limits, &CancellationToken::new())
            .await
    }

    /// Run `command` for `ctx` under `limits`, stopping early if `cancel` fires.
    pub async fn run(
        &self,
        ctx: &RequestContext,
        command: &ScriptCommand,
        limits: &ExecutionConfig,
        cancel: &CancellationToken,
    ) -> ExecutionOutcome {
        let span = tracing::info_span!(
            "cgi_execution",
            execution_id = %Uuid::new_v4(),
            script = %command.script_filename().display(),
            method = %ctx.method(),
        );
        self.run_inner(ctx, command, limits, cancel)
            .instrument(span)
            .await
    }

    async fn run_inner(
        &self,
        ctx: &RequestContext,
        command: &ScriptCommand,
        limits: &ExecutionConfig,
        cancel: &CancellationToken,
    ) -> ExecutionOutcome {
        let _slot = tokio::select! {
            biased;
            _ = cancel.cancelled() => return ExecutionOutcome::Cancelled,
            slot = self.slots.acquire() => match slot {
                Ok(slot) => slot,
                Err(_) => return ExecutionOutcome::Cancelled,
            },
        };

        let env = build_environment(ctx, command, &self.metadata);
        let started = Instant::now();

        let mut handle = match launcher::spawn(command, &env) {
            Ok(handle) => handle,
            Err(err) => {
                let outcome = ExecutionOutcome::ProcessError(err);
                metrics::record_outcome(outcome.label(), started.elapsed());
                log_outcome(&outcome, started);
                return outcome;
            }
        };
        let mut supervisor = Supervisor::arm(limits.execution_timeout(), limits.kill_grace());
        let tracked = metrics::execution_started(&self.active);

        let outcome = match handle.take_pipes() {
            Some(pipes) => {
                let work = execution::drive(&mut handle, pipes, ctx.body().clone(), limits);
                let supervised = supervisor.supervise(work, cancel).await;
                translator::decide(supervised, limits.strict_body_delivery)
            }
            None => ExecutionOutcome::ProcessError(ProcessError::Io {
                channel: Channel::Process,
                source: std::io::Error::other("process channels already taken"),
            }),
        };
        supervisor.release(&mut handle).await;

        tracked.finish(outcome.label());
        log_outcome(&outcome, started);
        outcome
    }
}

fn log_outcome(outcome: &ExecutionOutcome, started: Instant) {
    let elapsed_ms = started.elapsed().as_millis() as u64;
    match outcome {
        ExecutionOutcome::Success(parsed) => tracing::info!(
            elapsed_ms,
            body_bytes = parsed.body.len(),
            spooled = parsed.body.is_spooled(),
            "CGI execution succeeded"
        ),
        ExecutionOutcome::ProcessError(ProcessError::NonZeroExit { status, diagnostic }) => {
            tracing::warn!(
                elapsed_ms,
                status = %status,
                stderr_bytes = diagnostic.total_bytes(),
                stderr = %diagnostic,
                "CGI program exited unsuccessfully"
            )
        }
        failure => tracing::warn!(
            elapsed_ms,
            outcome = failure.label(),
            detail = %failure.detail(),
            "CGI execution failed"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Method;
    use std::time::Duration;

    /// Gone, or a zombie still waiting for the runtime's background reaper.
    fn exited(pid: i32) -> bool {
        if nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid), None)
            == Err(nix::errno::Errno::ESRCH)
        {
            return true;
        }
        std::fs::read_to_string(format!("/proc/{pid}/stat"))
            .map(|stat| stat.contains(") Z "))
            .unwrap_or(true)
    }

    #[tokio::test]
    async fn test_cancelled_before_slot_is_acquired() {
        let gateway = Gateway::new(ServerMetadata::default(), ExecutionConfig::default());
        let token = CancellationToken::new();
        token.cancel();

        let ctx = RequestContext::builder(Method::GET, "/cgi-bin/x.sh").build();
        let command = ScriptCommand::interpreted("/bin/sh", "/nonexistent/x.sh");
        let outcome = gateway
            .run(&ctx, &command, gateway.limits(), &token)
            .await;
        assert!(matches!(outcome, ExecutionOutcome::Cancelled));
    }

    #[tokio::test]
    async fn test_dropped_execution_releases_its_slot() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("forever.sh");
        let pid_file = dir.path().join("pid");
        std::fs::write(&script, "echo $$ > \"$1\"\nwhile :; do sleep 1; done\n").unwrap();
        let command = ScriptCommand::interpreted("/bin/sh", &script).arg(&pid_file);

        let gateway = Gateway::new(
            ServerMetadata::from_config(&crate::config::ServerConfig::default()),
            ExecutionConfig::default(),
        );
        let ctx = RequestContext::builder(Method::GET, "/cgi-bin/forever.sh").build();

        let running = gateway.execute(&ctx, &command);
        let dropped = tokio::time::timeout(Duration::from_millis(500), running).await;
        assert!(dropped.is_err());
        assert_eq!(gateway.active_executions(), 0);

        let pid: i32 = std::fs::read_to_string(&pid_file).unwrap().trim().parse().unwrap();
        let mut gone = false;
        for _ in 0..100 {
            if exited(pid) {
                gone = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(gone, "child {pid} outlived its dropped execution");
    }

    #[tokio::test]
    async fn test_from_config_uses_server_settings() {
        let mut config = GatewayConfig::default();
        config.server.default_content_type = "text/plain; charset=utf-8".to_string();
        config.execution.verbose_errors = true;

        let gateway = Gateway::from_config(&config);
        assert!(gateway.translate_options().verbose_errors);
        assert_eq!(
            gateway.translate_options().default_content_type,
            "text/plain; charset=utf-8"
        );
        assert_eq!(gateway.metadata().gateway_interface, "CGI/1.1");
    }
}
