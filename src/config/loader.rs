//! Configuration loading from disk.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::schema::GatewayConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot parse config{}: {source}", origin(.path))]
    Parse {
        /// File the text came from; `None` for in-memory text.
        path: Option<PathBuf>,
        source: toml::de::Error,
    },

    #[error("validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn origin(path: &Option<PathBuf>) -> String {
    path.as_ref()
        .map(|p| format!(" {}", p.display()))
        .unwrap_or_default()
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&content).map_err(|err| match err {
        ConfigError::Parse { source, .. } => ConfigError::Parse {
            path: Some(path.to_path_buf()),
            source,
        },
        other => other,
    })
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<GatewayConfig, ConfigError> {
    let config: GatewayConfig =
        toml::from_str(content).map_err(|source| ConfigError::Parse { path: None, source })?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;

    #[test]
    fn empty_file_yields_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.execution.execution_timeout_ms, 30_000);
        assert!(config.routes.is_empty());
    }

    #[test]
    fn recognizes_camel_case_execution_options() {
        let config = parse_config(
            r#"
            [execution]
            executionTimeout = 2000
            maxDiagnosticBytes = 512
            "#,
        )
        .unwrap();
        assert_eq!(config.execution.execution_timeout_ms, 2000);
        assert_eq!(config.execution.max_diagnostic_bytes, 512);
    }

    #[test]
    fn parses_routes_with_interpreters() {
        let config = parse_config(
            r#"
            [server]
            name = "probe.local"

            [[routes]]
            name = "cgi"
            path_prefix = "/cgi-bin"
            root = "/srv/www/cgi-bin"
            priority = 5
            execution_timeout_ms = 2000

            [routes.interpreters]
            ".py" = "/usr/bin/python3"
            ".php" = "/usr/bin/php-cgi"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.name, "probe.local");
        let route = &config.routes[0];
        assert_eq!(route.priority, 5);
        assert_eq!(
            route.interpreters.get(".php"),
            Some(&PathBuf::from("/usr/bin/php-cgi"))
        );
        assert_eq!(
            config.execution.overridden_by(route).execution_timeout_ms,
            2000
        );
    }

    #[test]
    fn validation_errors_are_reported() {
        let err = parse_config(
            r#"
            [execution]
            max_header_bytes = 0
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(ref e) if e.len() == 1));
        assert!(err.to_string().contains("max_header_bytes"));
    }

    #[test]
    fn loads_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[listener]\nbind_address = \"127.0.0.1:9000\"").unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.listener.bind_address, "127.0.0.1:9000");
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_config(Path::new("/nonexistent/gateway.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
        assert!(err.to_string().contains("/nonexistent/gateway.toml"));
    }

    #[test]
    fn parse_errors_name_the_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[listener\nbind_address = 1").unwrap();

        let err = load_config(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { path: Some(ref p), .. } if p == file.path()));
        assert!(err.to_string().contains(&file.path().display().to_string()));
    }
}
