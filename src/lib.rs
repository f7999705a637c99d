//! CGI execution gateway library.
//!
//! Runs external programs per HTTP request under the CGI/1.1 convention:
//! builds their environment, streams the request body to them, enforces a
//! wall-clock deadline on the whole process group, and turns their output
//! into an HTTP response or a well-defined error.

pub mod config;
pub mod gateway;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod routing;
pub mod security;

pub use config::schema::GatewayConfig;
pub use gateway::{ExecutionOutcome, Gateway, RequestContext, ScriptCommand};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
