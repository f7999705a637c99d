//! Request handling and transformation.
//!
//! # Responsibilities
//! - Extract routing-relevant information (host, path)
//! - Turn an HTTP request plus a resolved script into a `RequestContext`
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing (tower-http layer)
//! - The protocol string comes from the negotiated HTTP version
//! - Host falls back to the URI authority for HTTP/2 requests

use std::net::SocketAddr;

use axum::http::{header, request::Parts};
use bytes::Bytes;

use crate::gateway::RequestContext;
use crate::routing::ResolvedScript;

/// Name of the correlation header set by the request-id layers.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Host the client addressed, without any change to case or port.
pub fn request_host(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .or_else(|| parts.uri.host())
}

/// Correlation ID of the request, if the layer assigned one.
pub fn request_id(parts: &Parts) -> &str {
    parts
        .headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
}

/// Build the execution input for `script` from the request.
pub fn build_request_context(
    parts: &Parts,
    body: Bytes,
    script: &ResolvedScript<'_>,
    remote_addr: Option<SocketAddr>,
    server_name: &str,
    server_port: u16,
) -> RequestContext {
    let mut builder = RequestContext::builder(parts.method.clone(), script.script_name.as_str())
        .path_info(script.path_info.as_str())
        .query(parts.uri.query().unwrap_or(""))
        .protocol(format!("{:?}", parts.version))
        .headers(parts.headers.clone())
        .body(body)
        .server(server_name, server_port);
    if let Some(addr) = remote_addr {
        builder = builder.remote_addr(addr);
    }
    builder.build()
}
