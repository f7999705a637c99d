//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → compiled into the HTTP runtime (routes + gateway limits)
//!
//! On reload (file change or SIGHUP):
//!     watcher.rs / lifecycle::signals detect it
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → runtime rebuilt and swapped atomically
//!     → new executions observe new limits; running ones keep theirs
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Execution limits are an explicit value handed to every execution,
//!   never a process-wide global, so routes can override them

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::ExecutionConfig;
pub use schema::GatewayConfig;
pub use schema::ListenerConfig;
pub use schema::ObservabilityConfig;
pub use schema::RouteConfig;
pub use schema::ServerConfig;
