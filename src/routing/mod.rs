//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (host, path)
//!     → router.rs (route lookup, priority order)
//!     → matcher.rs (evaluate match conditions)
//!     → resolve.rs (walk segments to the script, split off PATH_INFO)
//!     → Return: Script, NoRoute, NotFound or Forbidden
//!
//! Route Compilation (at startup and on reload):
//!     RouteConfig[]
//!     → Sort by priority
//!     → Compile matchers, merge per-route execution limits
//!     → Freeze as immutable CgiRouter
//! ```
//!
//! # Design Decisions
//! - Routes compiled up front, immutable at runtime
//! - No regex in hot path (prefix matching only)
//! - Deterministic: same input always matches same route
//! - First match wins (ordered by priority)
//! - `.` and `..` segments are rejected before touching the filesystem

pub mod matcher;
pub mod resolve;
pub mod router;

pub use matcher::RouteRequest;
pub use resolve::{Resolution, ResolvedScript};
pub use router::{CgiRouter, CompiledRoute};
