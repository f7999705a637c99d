//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the CGI handler
//! - Wire up middleware (tracing, body limit, request ID)
//! - Resolve requests to scripts and dispatch them to the gateway
//! - Swap the compiled runtime when a new configuration arrives
//! - Drain in-flight requests on shutdown, then cancel what is left

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    response::Response,
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::config::GatewayConfig;
use crate::gateway::{translator, Gateway};
use crate::http::request::{build_request_context, request_host, request_id};
use crate::http::response::error_page;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::routing::{CgiRouter, Resolution, RouteRequest};

/// Everything compiled from one configuration version.
#[derive(Debug)]
pub struct GatewayRuntime {
    pub router: CgiRouter,
    pub gateway: Gateway,
    pub server_name: String,
    pub max_body_size: usize,
}

impl GatewayRuntime {
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self {
            router: CgiRouter::from_config(&config.routes, &config.execution),
            gateway: Gateway::from_config(config),
            server_name: config.server.name.clone(),
            max_body_size: config.security.max_body_size,
        }
    }
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub runtime: Arc<ArcSwap<GatewayRuntime>>,
    pub shutdown: Shutdown,
    pub local_port: u16,
}

/// HTTP server hosting the CGI gateway.
pub struct HttpServer {
    config: GatewayConfig,
    runtime: Arc<ArcSwap<GatewayRuntime>>,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: GatewayConfig) -> Self {
        let runtime = Arc::new(ArcSwap::from_pointee(GatewayRuntime::from_config(&config)));
        Self { config, runtime }
    }

    /// Build the Axum router with all middleware layers.
    ///
    /// The body limit is enforced in the handler from the live runtime, so a
    /// reload can change it.
    fn build_router(state: AppState) -> Router {
        Router::new()
            .route("/", any(cgi_handler))
            .route("/{*path}", any(cgi_handler))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::x_request_id()),
            )
    }

    /// Run the server, accepting connections on the given listener.
    ///
    /// New configurations received on `config_updates` replace the runtime for
    /// subsequent requests. After `shutdown` fires, in-flight requests get
    /// `drain_timeout_secs` before their executions are cancelled.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<GatewayConfig>,
        shutdown: Shutdown,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            routes = self.runtime.load().router.len(),
            "HTTP server starting"
        );

        let state = AppState {
            runtime: self.runtime.clone(),
            shutdown: shutdown.clone(),
            local_port: addr.port(),
        };
        let app = Self::build_router(state)
            .into_make_service_with_connect_info::<SocketAddr>();

        // Apply configuration updates until shutdown.
        let runtime = self.runtime.clone();
        let mut reload_rx = shutdown.subscribe();
        let reloader = tokio::spawn(async move {
            loop {
                tokio::select! {
                    update = config_updates.recv() => match update {
                        Some(config) => {
                            let next = GatewayRuntime::from_config(&config);
                            tracing::info!(routes = next.router.len(), "Configuration reloaded");
                            runtime.store(Arc::new(next));
                        }
                        None => break,
                    },
                    _ = reload_rx.recv() => break,
                }
            }
        });

        // Cancel executions still running once the drain window has passed.
        let drain = self.config.listener.drain_timeout();
        let mut watchdog_rx = shutdown.subscribe();
        let watchdog_shutdown = shutdown.clone();
        let watchdog_runtime = self.runtime.clone();
        let watchdog = tokio::spawn(async move {
            if watchdog_rx.recv().await.is_ok() {
                tokio::time::sleep(drain).await;
                tracing::warn!(
                    drain_secs = drain.as_secs(),
                    active = watchdog_runtime.load().gateway.active_executions(),
                    "Drain window elapsed, cancelling in-flight executions"
                );
                watchdog_shutdown.abort_executions();
            }
        });

        let mut shutdown_rx = shutdown.subscribe();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                tracing::info!("Shutdown signal received, draining connections");
            })
            .await?;

        watchdog.abort();
        reloader.abort();
        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Main CGI handler.
/// Resolves the script, runs it through the gateway and translates the outcome.
async fn cgi_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start_time = Instant::now();
    let remote_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let runtime = state.runtime.load_full();

    let (parts, body) = request.into_parts();
    let method_str = parts.method.to_string();
    let path = parts.uri.path().to_string();

    let script = match runtime
        .router
        .resolve(&RouteRequest::new(request_host(&parts), &path))
    {
        Resolution::Script(script) => script,
        Resolution::NoRoute | Resolution::NotFound => {
            tracing::debug!(request_id = %request_id(&parts), path = %path, "No script found");
            metrics::record_request(&method_str, 404, "none", start_time);
            return error_page(StatusCode::NOT_FOUND, None);
        }
        Resolution::Forbidden => {
            tracing::warn!(request_id = %request_id(&parts), path = %path, "Rejected path traversal");
            metrics::record_request(&method_str, 403, "none", start_time);
            return error_page(StatusCode::FORBIDDEN, None);
        }
    };
    let route_name = script.route.name();

    let body = match axum::body::to_bytes(body, runtime.max_body_size).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::debug!(request_id = %request_id(&parts), error = %e, "Request body rejected");
            metrics::record_request(&method_str, 413, route_name, start_time);
            return error_page(StatusCode::PAYLOAD_TOO_LARGE, None);
        }
    };

    tracing::debug!(
        request_id = %request_id(&parts),
        route = %route_name,
        script = %script.script_name,
        "Dispatching CGI request"
    );

    let ctx = build_request_context(
        &parts,
        body,
        &script,
        remote_addr,
        &runtime.server_name,
        state.local_port,
    );
    let cancel = state.shutdown.execution_token();
    let outcome = runtime
        .gateway
        .run(&ctx, &script.command, script.route.limits(), &cancel)
        .await;

    let response = translator::into_response(outcome, runtime.gateway.translate_options());
    metrics::record_request(&method_str, response.status().as_u16(), route_name, start_time);
    response
}
