//! Per-request input to an execution.
//!
//! A [`RequestContext`] is assembled once by the HTTP layer (or the `exec`
//! command) and then only read. [`ServerMetadata`] holds the values that are
//! identical for every request served by one configuration.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;

use axum::http::{HeaderMap, HeaderName, HeaderValue, Method};
use bytes::Bytes;

use crate::config::ServerConfig;

/// Everything a CGI program is told about one request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    method: Method,
    script_name: String,
    path_info: String,
    query_string: String,
    protocol: String,
    headers: HeaderMap,
    body: Bytes,
    remote_addr: Option<SocketAddr>,
    server_name: String,
    server_port: u16,
}

impl RequestContext {
    /// Start building a context for `method` on the script at URL path `script_name`.
    pub fn builder(method: Method, script_name: impl Into<String>) -> RequestContextBuilder {
        RequestContextBuilder {
            ctx: RequestContext {
                method,
                script_name: script_name.into(),
                path_info: String::new(),
                query_string: String::new(),
                protocol: "HTTP/1.1".to_string(),
                headers: HeaderMap::new(),
                body: Bytes::new(),
                remote_addr: None,
                server_name: "localhost".to_string(),
                server_port: 80,
            },
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn script_name(&self) -> &str {
        &self.script_name
    }

    pub fn path_info(&self) -> &str {
        &self.path_info
    }

    pub fn query_string(&self) -> &str {
        &self.query_string
    }

    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    pub fn server_port(&self) -> u16 {
        self.server_port
    }

    /// The request target as the client sent it.
    pub fn request_uri(&self) -> String {
        let mut uri = format!("{}{}", self.script_name, self.path_info);
        if !self.query_string.is_empty() {
            uri.push('?');
            uri.push_str(&self.query_string);
        }
        uri
    }
}

/// Builder for [`RequestContext`].
#[derive(Debug)]
pub struct RequestContextBuilder {
    ctx: RequestContext,
}

impl RequestContextBuilder {
    #[must_use]
    pub fn path_info(mut self, path_info: impl Into<String>) -> Self {
        self.ctx.path_info = path_info.into();
        self
    }

    #[must_use]
    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.ctx.query_string = query.into();
        self
    }

    #[must_use]
    pub fn protocol(mut self, protocol: impl Into<String>) -> Self {
        self.ctx.protocol = protocol.into();
        self
    }

    /// Append one header; repeated names are kept.
    #[must_use]
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.ctx.headers.append(name, value);
        self
    }

    #[must_use]
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.ctx.headers = headers;
        self
    }

    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.ctx.body = body.into();
        self
    }

    #[must_use]
    pub fn remote_addr(mut self, addr: SocketAddr) -> Self {
        self.ctx.remote_addr = Some(addr);
        self
    }

    #[must_use]
    pub fn server(mut self, name: impl Into<String>, port: u16) -> Self {
        self.ctx.server_name = name.into();
        self.ctx.server_port = port;
        self
    }

    pub fn build(self) -> RequestContext {
        self.ctx
    }
}

/// Fixed server identity shared by all executions of one configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerMetadata {
    pub software: String,
    pub gateway_interface: String,
    pub document_root: Option<PathBuf>,
    /// Server environment values copied into every child environment.
    pub passthrough: BTreeMap<String, String>,
}

impl ServerMetadata {
    /// Snapshot the configured identity and the `pass_env` variables of this process.
    pub fn from_config(config: &ServerConfig) -> Self {
        let passthrough = config
            .pass_env
            .iter()
            .filter_map(|name| std::env::var(name).ok().map(|value| (name.clone(), value)))
            .collect();
        Self {
            software: config.software.clone(),
            document_root: config.document_root.clone(),
            passthrough,
            ..Self::default()
        }
    }
}

impl Default for ServerMetadata {
    fn default() -> Self {
        Self {
            software: concat!("cgi-gateway/", env!("CARGO_PKG_VERSION")).to_string(),
            gateway_interface: "CGI/1.1".to_string(),
            document_root: None,
            passthrough: BTreeMap::new(),
        }
    }
}
