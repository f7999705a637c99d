//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, limits > 0, addresses parse)
//! - Check route definitions (unique names, well-formed prefixes and extensions)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use axum::http::HeaderValue;
use thiserror::Error;

use crate::config::schema::{ExecutionConfig, GatewayConfig, RouteConfig};

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: invalid socket address {value:?}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{field} must be greater than zero")]
    Zero { field: String },

    #[error("server.default_content_type {0:?} is not a valid header value")]
    InvalidContentType(String),

    #[error("duplicate route name {0:?}")]
    DuplicateRoute(String),

    #[error("route {route:?}: path_prefix {prefix:?} must start with '/'")]
    InvalidPrefix { route: String, prefix: String },

    #[error("route {route:?}: extension {extension:?} must start with '.'")]
    InvalidExtension { route: String, extension: String },

    #[error("route {route:?}: interpreter for {extension:?} is empty")]
    EmptyInterpreter { route: String, extension: String },

    #[error("route {route:?}: neither interpreters nor allow_executables are configured")]
    NoHandlers { route: String },
}

/// Validate a configuration, collecting every error.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address(
        &mut errors,
        "listener.bind_address",
        &config.listener.bind_address,
    );
    if config.observability.metrics_enabled {
        check_address(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    if HeaderValue::from_str(&config.server.default_content_type).is_err() {
        errors.push(ValidationError::InvalidContentType(
            config.server.default_content_type.clone(),
        ));
    }

    check_execution(&mut errors, "execution", &config.execution);
    if config.security.max_body_size == 0 {
        errors.push(ValidationError::Zero {
            field: "security.max_body_size".to_string(),
        });
    }

    let mut names = HashSet::new();
    for route in &config.routes {
        if !names.insert(route.name.as_str()) {
            errors.push(ValidationError::DuplicateRoute(route.name.clone()));
        }
        check_route(&mut errors, route);
        let effective = config.execution.overridden_by(route);
        check_execution(&mut errors, &format!("routes.{}", route.name), &effective);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}

fn check_execution(errors: &mut Vec<ValidationError>, scope: &str, execution: &ExecutionConfig) {
    let limits = [
        ("execution_timeout_ms", execution.execution_timeout_ms as usize),
        ("max_header_bytes", execution.max_header_bytes),
        ("max_concurrent_executions", execution.max_concurrent_executions),
    ];
    for (name, value) in limits {
        if value == 0 {
            errors.push(ValidationError::Zero {
                field: format!("{scope}.{name}"),
            });
        }
    }
}

fn check_route(errors: &mut Vec<ValidationError>, route: &RouteConfig) {
    if !route.path_prefix.starts_with('/') {
        errors.push(ValidationError::InvalidPrefix {
            route: route.name.clone(),
            prefix: route.path_prefix.clone(),
        });
    }
    if route.interpreters.is_empty() && !route.allow_executables {
        errors.push(ValidationError::NoHandlers {
            route: route.name.clone(),
        });
    }
    for (extension, interpreter) in &route.interpreters {
        if !extension.starts_with('.') || extension.len() < 2 {
            errors.push(ValidationError::InvalidExtension {
                route: route.name.clone(),
                extension: extension.clone(),
            });
        }
        if interpreter.as_os_str().is_empty() {
            errors.push(ValidationError::EmptyInterpreter {
                route: route.name.clone(),
                extension: extension.clone(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    fn route(name: &str, prefix: &str) -> RouteConfig {
        let mut interpreters = BTreeMap::new();
        interpreters.insert(".py".to_string(), PathBuf::from("/usr/bin/python3"));
        RouteConfig {
            name: name.to_string(),
            host: None,
            path_prefix: prefix.to_string(),
            root: PathBuf::from("/srv/cgi-bin"),
            interpreters,
            allow_executables: false,
            priority: 0,
            execution_timeout_ms: None,
            max_diagnostic_bytes: None,
        }
    }

    #[test]
    fn default_config_is_valid() {
        assert_eq!(validate_config(&GatewayConfig::default()), Ok(()));
    }

    #[test]
    fn collects_every_error() {
        let mut config = GatewayConfig::default();
        config.listener.bind_address = "not-an-address".to_string();
        config.execution.execution_timeout_ms = 0;
        config.routes.push(route("cgi", "cgi-bin"));
        config.routes.push(route("cgi", "/other"));

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::InvalidAddress {
            field: "listener.bind_address",
            value: "not-an-address".to_string(),
        }));
        assert!(errors.contains(&ValidationError::Zero {
            field: "execution.execution_timeout_ms".to_string(),
        }));
        assert!(errors.contains(&ValidationError::DuplicateRoute("cgi".to_string())));
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::InvalidPrefix { .. })));
    }

    #[test]
    fn route_override_of_zero_timeout_is_rejected() {
        let mut config = GatewayConfig::default();
        let mut r = route("slow", "/slow");
        r.execution_timeout_ms = Some(0);
        config.routes.push(r);

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::Zero {
                field: "routes.slow.execution_timeout_ms".to_string(),
            }]
        );
    }

    #[test]
    fn extensions_need_a_leading_dot() {
        let mut config = GatewayConfig::default();
        let mut r = route("cgi", "/cgi-bin");
        r.interpreters.insert("php".to_string(), PathBuf::new());
        config.routes.push(r);

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::InvalidExtension {
            route: "cgi".to_string(),
            extension: "php".to_string(),
        }));
        assert!(errors.contains(&ValidationError::EmptyInterpreter {
            route: "cgi".to_string(),
            extension: "php".to_string(),
        }));
    }
}
