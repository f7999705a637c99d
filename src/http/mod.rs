//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware, request ID)
//!     → routing (resolve script + PATH_INFO)
//!     → request.rs (build RequestContext)
//!     → gateway (run the program, decide the outcome)
//!     → translator / response.rs (HTTP response or error page)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::X_REQUEST_ID;
pub use server::{GatewayRuntime, HttpServer};
