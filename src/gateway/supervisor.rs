//! Wall-clock supervision of one execution.
//!
//! # Responsibilities
//! - Arm a deadline when the process is spawned
//! - Race the execution against the deadline and an external cancellation token
//! - Terminate the process group once the race is decided
//!
//! # Design Decisions
//! - The deadline is fixed at arm time; waiting for output does not extend it
//! - Cancellation is checked first, then the deadline, then the work, so a
//!   deadline that has passed wins over output that arrived at the same moment
//! - Losing the race drops the work future, which closes every pipe it held

use std::future::Future;
use std::process::ExitStatus;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::gateway::launcher::ProcessHandle;

/// Supervisor state machine: `Running` moves to exactly one terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Running,
    Completed,
    TimedOut,
    Cancelled,
}

/// Result of a supervised execution.
#[derive(Debug)]
pub enum Supervised<T> {
    Completed(T),
    TimedOut(Duration),
    Cancelled,
}

/// Deadline and termination policy for one process.
#[derive(Debug)]
pub struct Supervisor {
    timeout: Duration,
    deadline: Instant,
    grace: Duration,
    state: SupervisorState,
}

impl Supervisor {
    /// Arm the deadline now. Call immediately after spawning.
    pub fn arm(timeout: Duration, grace: Duration) -> Self {
        Self {
            timeout,
            deadline: Instant::now() + timeout,
            grace,
            state: SupervisorState::Running,
        }
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    /// Time left before the deadline.
    #[cfg(test)]
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Run `work` until it finishes, the deadline passes, or `cancel` fires.
    pub async fn supervise<F>(&mut self, work: F, cancel: &CancellationToken) -> Supervised<F::Output>
    where
        F: Future,
    {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Supervised::Cancelled,
            _ = tokio::time::sleep_until(self.deadline) => Supervised::TimedOut(self.timeout),
            output = work => Supervised::Completed(output),
        };

        self.state = match result {
            Supervised::Completed(_) => SupervisorState::Completed,
            Supervised::TimedOut(_) => SupervisorState::TimedOut,
            Supervised::Cancelled => SupervisorState::Cancelled,
        };
        result
    }

    /// Release the process: terminate whatever is left of its group and reap it.
    ///
    /// Safe on every path, including after a natural exit.
    pub async fn release(&self, handle: &mut ProcessHandle) -> Option<ExitStatus> {
        if self.state != SupervisorState::Completed {
            tracing::debug!(
                pid = ?handle.id(),
                state = ?self.state,
                "Terminating process group"
            );
        }
        handle.terminate(self.grace).await
    }
}
