//! CGI execution gateway (v1)
//!
//! # Architecture Overview
//!
//! ```text
//!                  ┌──────────────────────────────────────────────────────────┐
//!                  │                      CGI GATEWAY                          │
//!                  │                                                           │
//!  Client Request  │  ┌─────────┐    ┌──────────┐    ┌──────────────────────┐  │
//!  ────────────────┼─▶│  http   │───▶│ routing  │───▶│       gateway        │  │
//!                  │  │ server  │    │ resolve  │    │ env → spawn → parse  │──┼──▶ CGI program
//!                  │  └─────────┘    └──────────┘    │ supervise → decide   │◀─┼─── (process group)
//!  Client Response │  ┌─────────┐                    └──────────┬───────────┘  │
//!  ◀───────────────┼──│response │◀───────────────────────────────┘              │
//!                  │  └─────────┘                                               │
//!                  │  ┌──────────────────────────────────────────────────────┐  │
//!                  │  │ config (+reload) │ lifecycle │ observability │ security│  │
//!                  │  └──────────────────────────────────────────────────────┘  │
//!                  └──────────────────────────────────────────────────────────┘
//! ```

use std::error::Error;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use axum::http::Method;
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use cgi_gateway::config::watcher::ConfigWatcher;
use cgi_gateway::config::{load_config, ConfigError, ExecutionConfig, GatewayConfig, ServerConfig};
use cgi_gateway::gateway::{ExecutionOutcome, Gateway, RequestContext, ScriptCommand, ServerMetadata};
use cgi_gateway::http::HttpServer;
use cgi_gateway::lifecycle::{signals, Shutdown};
use cgi_gateway::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "cgi-gateway")]
#[command(version, about = "Run CGI programs behind an HTTP server", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve HTTP requests
    Serve {
        /// Configuration file (TOML); built-in defaults when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Reload the configuration file when it changes
        #[arg(long, requires = "config")]
        watch: bool,
    },
    /// Validate a configuration file
    Check {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Run one program through the gateway and print the outcome
    Exec(ExecArgs),
}

#[derive(Args)]
struct ExecArgs {
    /// Script or executable to run
    program: PathBuf,

    /// Run the program through this interpreter
    #[arg(short, long)]
    interpreter: Option<PathBuf>,

    #[arg(short, long, default_value = "GET")]
    method: String,

    /// Query string, without the leading `?`
    #[arg(short, long)]
    query: Option<String>,

    /// File whose contents become the request body
    #[arg(long)]
    body_file: Option<PathBuf>,

    /// Override the execution timeout
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Print a JSON summary instead of the raw response
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn Error>> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Serve { config, watch } => serve(config, watch).await,
        Commands::Check { config } => Ok(check(&config)),
        Commands::Exec(args) => exec(args).await,
    }
}

async fn serve(config_path: Option<PathBuf>, watch: bool) -> Result<ExitCode, Box<dyn Error>> {
    let config = match &config_path {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };
    logging::init_logging(&config.observability)?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "cgi-gateway starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        routes = config.routes.len(),
        execution_timeout_ms = config.execution.execution_timeout_ms,
        max_concurrent_executions = config.execution.max_concurrent_executions,
        "Configuration loaded"
    );
    if config.routes.is_empty() {
        tracing::warn!("No routes configured, every request will be answered with 404");
    }

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let (update_tx, update_rx) = mpsc::unbounded_channel();

    let _watcher = match (&config_path, watch) {
        (Some(path), true) => Some(ConfigWatcher::new(path, update_tx.clone()).run()?),
        _ => None,
    };
    if let Some(path) = config_path {
        let reload_tx = update_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = signals::reload_on_hangup(path, reload_tx).await {
                tracing::error!(error = %e, "Failed to install SIGHUP handler");
            }
        });
    }
    drop(update_tx);

    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        match signals::wait_for_termination().await {
            Ok(()) => signal_shutdown.trigger(),
            Err(e) => tracing::error!(error = %e, "Failed to install shutdown signal handlers"),
        }
    });

    HttpServer::new(config).run(listener, update_rx, shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(ExitCode::SUCCESS)
}

fn check(path: &Path) -> ExitCode {
    match load_config(path) {
        Ok(config) => {
            println!(
                "{}: ok ({} routes, execution timeout {}ms)",
                path.display(),
                config.routes.len(),
                config.execution.execution_timeout_ms
            );
            ExitCode::SUCCESS
        }
        Err(ConfigError::Validation(errors)) => {
            eprintln!("{}: {} problem(s)", path.display(), errors.len());
            for error in errors {
                eprintln!("  - {error}");
            }
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn exec(args: ExecArgs) -> Result<ExitCode, Box<dyn Error>> {
    let command = match &args.interpreter {
        Some(interpreter) => ScriptCommand::interpreted(interpreter, &args.program),
        None => ScriptCommand::direct(&args.program),
    };

    let mut limits = ExecutionConfig::default();
    if let Some(timeout_ms) = args.timeout_ms {
        limits.execution_timeout_ms = timeout_ms;
    }

    let body = match &args.body_file {
        Some(path) => tokio::fs::read(path).await?,
        None => Vec::new(),
    };
    let script_name = format!(
        "/{}",
        args.program
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    );
    let ctx = RequestContext::builder(Method::from_bytes(args.method.as_bytes())?, script_name)
        .query(args.query.clone().unwrap_or_default())
        .body(body)
        .build();

    let gateway = Gateway::new(ServerMetadata::from_config(&ServerConfig::default()), limits);
    let outcome = gateway.execute(&ctx, &command).await;
    let succeeded = outcome.is_success();

    if args.json {
        let summary = match outcome {
            ExecutionOutcome::Success(parsed) => {
                let status = parsed.status().map_or(200, |s| s.as_u16());
                let headers: Vec<_> = parsed
                    .headers
                    .iter()
                    .map(|h| json!({ "name": h.name, "value": h.value }))
                    .collect();
                let body = parsed.body.into_bytes().await?;
                json!({
                    "outcome": "success",
                    "status": status,
                    "headers": headers,
                    "body": String::from_utf8_lossy(&body),
                })
            }
            failure => json!({
                "outcome": failure.label(),
                "status": failure.category().map(|c| c.status_code().as_u16()),
                "detail": failure.detail(),
                "diagnostic": failure.diagnostic().map(|d| d.text().into_owned()),
            }),
        };
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        match outcome {
            ExecutionOutcome::Success(parsed) => {
                let body = parsed.body.into_bytes().await?;
                let mut stdout = std::io::stdout().lock();
                for header in &parsed.headers {
                    write!(stdout, "{}: {}\r\n", header.name, header.value)?;
                }
                stdout.write_all(b"\r\n")?;
                stdout.write_all(&body)?;
                stdout.flush()?;
            }
            failure => {
                eprintln!("{}: {}", failure.label(), failure.detail());
                if let Some(diagnostic) = failure.diagnostic().filter(|d| !d.is_empty()) {
                    eprintln!("{diagnostic}");
                }
            }
        }
    }

    Ok(if succeeded {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
