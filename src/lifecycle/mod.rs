//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Drain in-flight requests
//!     → Deadline passed → Cancel remaining executions → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//!     SIGHUP → Trigger config reload
//! ```
//!
//! # Design Decisions
//! - Ordered shutdown: stop accept, drain, cancel, close
//! - Cancelled executions take the same termination path as timeouts,
//!   so no child outlives the server

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
