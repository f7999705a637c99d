//! Header filtering between CGI programs and clients.
//!
//! # Design Decisions
//! - Hop-by-hop headers describe one connection, so a program cannot set
//!   them on the client connection
//! - Matching is on the normalized (lowercase) header name

use axum::http::HeaderName;

/// Headers meaningful only for a single transport-level connection.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Returns true if `name` must not be forwarded across the gateway.
pub fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(&name.as_str())
}
