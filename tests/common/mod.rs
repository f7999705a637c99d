//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use axum::http::Method;
use cgi_gateway::config::{ExecutionConfig, GatewayConfig, RouteConfig, ServerConfig};
use cgi_gateway::gateway::{Gateway, RequestContext, ScriptCommand, ServerMetadata};
use cgi_gateway::http::HttpServer;
use cgi_gateway::lifecycle::Shutdown;
use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Directory holding the CGI fixture scripts.
pub fn cgi_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/cgi-bin")
}

/// A fixture script run through `/bin/sh`.
pub fn sh(name: &str) -> ScriptCommand {
    ScriptCommand::interpreted("/bin/sh", cgi_bin().join(name))
}

/// A gateway with the default server identity (PATH passed through).
pub fn gateway(limits: ExecutionConfig) -> Gateway {
    Gateway::new(ServerMetadata::from_config(&ServerConfig::default()), limits)
}

/// Limits suited to tests: short deadline, short grace.
pub fn limits(timeout_ms: u64) -> ExecutionConfig {
    ExecutionConfig {
        execution_timeout_ms: timeout_ms,
        kill_grace_ms: 200,
        ..ExecutionConfig::default()
    }
}

pub fn get(script_name: &str) -> RequestContext {
    RequestContext::builder(Method::GET, script_name).build()
}

/// Poll until `pid` no longer exists. Returns false if it is still alive after `within`.
pub async fn process_gone(pid: i32, within: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    loop {
        if kill(Pid::from_raw(pid), None) == Err(Errno::ESRCH) {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Read the pid a fixture wrote to `path`, waiting for the file to appear.
pub async fn read_pid(path: &std::path::Path) -> i32 {
    for _ in 0..100 {
        if let Ok(text) = std::fs::read_to_string(path) {
            if let Ok(pid) = text.trim().parse() {
                return pid;
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("fixture never wrote its pid to {}", path.display());
}

/// Gateway configuration with one `/cgi-bin` route over the fixtures.
pub fn server_config(execution: ExecutionConfig) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.listener.drain_timeout_secs = 1;
    config.execution = execution;
    config.routes.push(RouteConfig {
        name: "cgi".into(),
        host: None,
        path_prefix: "/cgi-bin".into(),
        root: cgi_bin(),
        interpreters: BTreeMap::from([(".sh".to_string(), PathBuf::from("/bin/sh"))]),
        allow_executables: false,
        priority: 0,
        execution_timeout_ms: None,
        max_diagnostic_bytes: None,
    });
    config
}

/// A running server on an ephemeral port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub updates: mpsc::UnboundedSender<GatewayConfig>,
    pub handle: JoinHandle<Result<(), std::io::Error>>,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

pub async fn start_server(config: GatewayConfig) -> TestServer {
    let listener = TcpListener::bind(&config.listener.bind_address).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let (updates, update_rx) = mpsc::unbounded_channel();

    let server = HttpServer::new(config);
    let server_shutdown = shutdown.clone();
    let handle = tokio::spawn(async move { server.run(listener, update_rx, server_shutdown).await });

    TestServer {
        addr,
        shutdown,
        updates,
        handle,
    }
}

/// A client that does not pool connections between tests.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .timeout(Duration::from_secs(20))
        .build()
        .unwrap()
}
