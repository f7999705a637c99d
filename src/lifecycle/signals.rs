//! OS signal handling.
//!
//! # Responsibilities
//! - Register signal handlers (SIGTERM, SIGINT, SIGHUP)
//! - Translate signals to internal events
//! - Trigger appropriate actions (shutdown, reload)
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - SIGHUP triggers config reload, not shutdown
//! - A reload that fails to load or validate is logged and dropped

use std::io;
use std::path::PathBuf;

use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;

use crate::config::{load_config, GatewayConfig};

/// Resolve when SIGINT or SIGTERM arrives.
pub async fn wait_for_termination() -> io::Result<()> {
    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result?,
        _ = terminate.recv() => {}
    }
    tracing::info!("Shutdown signal received");
    Ok(())
}

/// Reload `path` on every SIGHUP and publish valid configurations.
///
/// Runs until the receiving side of `updates` is dropped.
pub async fn reload_on_hangup(
    path: PathBuf,
    updates: mpsc::UnboundedSender<GatewayConfig>,
) -> io::Result<()> {
    let mut hangup = signal(SignalKind::hangup())?;
    while hangup.recv().await.is_some() {
        match load_config(&path) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "SIGHUP received, reloading configuration");
                if updates.send(config).is_err() {
                    break;
                }
            }
            Err(e) => tracing::error!(
                path = %path.display(),
                error = %e,
                "Reload rejected, keeping current configuration"
            ),
        }
    }
    Ok(())
}
