//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → body size limit (tower-http layer, `security.max_body_size`)
//!     → environment builder drops the `Proxy` header
//!
//! Program response:
//!     → headers.rs (strip hop-by-hop headers)
//!     → client
//! ```
//!
//! # Design Decisions
//! - Fail closed: output that cannot be validated is never forwarded
//! - No trust in program output beyond what the header grammar allows

pub mod headers;
