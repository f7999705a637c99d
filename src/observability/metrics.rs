//! Metrics collection and exposition.
//!
//! # Metrics
//! - `cgi_active_executions` (gauge): child processes currently running
//! - `cgi_executions_total` (counter): finished executions by outcome, `abandoned`
//!   when the caller dropped the execution mid-flight
//! - `cgi_execution_duration_seconds` (histogram): spawn-to-outcome latency by outcome
//! - `cgi_http_requests_total` (counter): HTTP requests by method, status, route
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade and is a no-op until an
//!   exporter is installed, so library users and tests pay nothing
//! - Histogram buckets stretch to a minute since CGI programs are slow

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder};

const DURATION_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
];

/// Install the Prometheus recorder and its scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(
            Matcher::Full("cgi_execution_duration_seconds".to_string()),
            DURATION_BUCKETS,
        )?
        .install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

/// Tracks one spawned child for as long as it may be running.
///
/// Dropping the guard without [`ExecutionGuard::finish`] (the caller's future
/// was dropped, e.g. on client disconnect) still decrements the gauge and
/// counts the execution as `abandoned`.
#[derive(Debug)]
pub struct ExecutionGuard {
    active: Arc<AtomicU64>,
    started: Instant,
    outcome: Option<&'static str>,
}

impl ExecutionGuard {
    /// Record how the execution ended and release the slot.
    pub fn finish(mut self, outcome: &'static str) {
        self.outcome = Some(outcome);
    }
}

impl Drop for ExecutionGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
        ::metrics::gauge!("cgi_active_executions").decrement(1.0);
        let outcome = match self.outcome {
            Some(outcome) => outcome,
            None => {
                tracing::warn!(
                    elapsed_ms = self.started.elapsed().as_millis() as u64,
                    "CGI execution abandoned before completion"
                );
                ABANDONED
            }
        };
        record_outcome(outcome, self.started.elapsed());
    }
}

/// Outcome label for executions whose caller went away.
pub const ABANDONED: &str = "abandoned";

/// A child process was spawned. `active` counts live children alongside the gauge.
pub fn execution_started(active: &Arc<AtomicU64>) -> ExecutionGuard {
    active.fetch_add(1, Ordering::SeqCst);
    ::metrics::gauge!("cgi_active_executions").increment(1.0);
    ExecutionGuard {
        active: Arc::clone(active),
        started: Instant::now(),
        outcome: None,
    }
}

/// Count an outcome, including ones that never spawned a process.
pub fn record_outcome(outcome: &'static str, elapsed: Duration) {
    ::metrics::counter!("cgi_executions_total", "outcome" => outcome).increment(1);
    ::metrics::histogram!("cgi_execution_duration_seconds", "outcome" => outcome)
        .record(elapsed.as_secs_f64());
}

/// Count one HTTP request.
pub fn record_request(method: &str, status: u16, route: &str, start: Instant) {
    ::metrics::counter!(
        "cgi_http_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "route" => route.to_string()
    )
    .increment(1);
    tracing::trace!(
        method,
        status,
        route,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Request recorded"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_releases_on_drop() {
        let active = Arc::new(AtomicU64::new(0));
        let first = execution_started(&active);
        let second = execution_started(&active);
        assert_eq!(active.load(Ordering::SeqCst), 2);

        first.finish("success");
        assert_eq!(active.load(Ordering::SeqCst), 1);

        drop(second);
        assert_eq!(active.load(Ordering::SeqCst), 0);
    }
}
