//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! gateway / http:
//!     → logging.rs (structured events, one span per execution)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout (pretty or JSON)
//!     → Prometheus scrape endpoint
//! ```
//!
//! # Design Decisions
//! - Every execution span carries a UUID so its log lines can be correlated
//! - Request IDs flow in from the `x-request-id` header
//! - Captured stderr is logged, never returned to clients by default

pub mod logging;
pub mod metrics;
