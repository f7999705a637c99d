//! Terminal results of an execution.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;

use axum::http::StatusCode;
use thiserror::Error;

use crate::gateway::diagnostic::Diagnostic;
use crate::gateway::parser::{parse_status, CgiHeader, MalformedKind, MalformedOutput};
use crate::gateway::spool::ResponseBody;

/// The standard channel (or helper) an I/O failure happened on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Stdin,
    Stdout,
    Stderr,
    /// The on-disk body buffer.
    Spool,
    /// Waiting for the exit status.
    Process,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Channel::Stdin => "stdin",
            Channel::Stdout => "stdout",
            Channel::Stderr => "stderr",
            Channel::Spool => "body spool",
            Channel::Process => "process",
        };
        f.write_str(name)
    }
}

/// Failures attributed to the program or its channels.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to launch {}: {source}", program.display())]
    LaunchFailure {
        program: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("program exited unsuccessfully ({status})")]
    NonZeroExit {
        status: ExitStatus,
        diagnostic: Diagnostic,
    },

    #[error("i/o failure on {channel}: {source}")]
    Io {
        channel: Channel,
        #[source]
        source: io::Error,
    },
}

/// A successfully parsed program response.
#[derive(Debug)]
pub struct ParsedResponse {
    /// Header lines in emission order, duplicates kept.
    pub headers: Vec<CgiHeader>,
    pub body: ResponseBody,
}

impl ParsedResponse {
    /// First value of `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.is(name))
            .map(|h| h.value.as_str())
    }

    /// Status requested through a `Status` header.
    pub fn status(&self) -> Option<StatusCode> {
        self.header("status").and_then(parse_status)
    }
}

/// Exactly one of these is produced per request.
#[derive(Debug)]
pub enum ExecutionOutcome {
    Success(ParsedResponse),
    MalformedOutput(MalformedOutput),
    ProcessError(ProcessError),
    Timeout { after: Duration },
    /// Stopped by an external cancellation (shutdown) before completing.
    Cancelled,
}

/// Failure categories; each maps to a fixed HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureCategory {
    LaunchFailure,
    MissingTerminator,
    InvalidHeaderSyntax,
    NonZeroExit,
    IoFailure,
    Timeout,
    Cancelled,
}

impl FailureCategory {
    /// Stable label used in logs, metrics and verbose error pages.
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureCategory::LaunchFailure => "launch_failure",
            FailureCategory::MissingTerminator => "malformed_no_terminator",
            FailureCategory::InvalidHeaderSyntax => "malformed_invalid_header",
            FailureCategory::NonZeroExit => "non_zero_exit",
            FailureCategory::IoFailure => "io_failure",
            FailureCategory::Timeout => "timeout",
            FailureCategory::Cancelled => "cancelled",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            FailureCategory::LaunchFailure | FailureCategory::NonZeroExit => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            FailureCategory::MissingTerminator
            | FailureCategory::InvalidHeaderSyntax
            | FailureCategory::IoFailure => StatusCode::BAD_GATEWAY,
            FailureCategory::Timeout => StatusCode::GATEWAY_TIMEOUT,
            FailureCategory::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionOutcome::Success(_))
    }

    /// The failure category, or `None` for success.
    pub fn category(&self) -> Option<FailureCategory> {
        let category = match self {
            ExecutionOutcome::Success(_) => return None,
            ExecutionOutcome::MalformedOutput(reason) => match reason.kind() {
                MalformedKind::NoTerminator => FailureCategory::MissingTerminator,
                MalformedKind::InvalidSyntax => FailureCategory::InvalidHeaderSyntax,
            },
            ExecutionOutcome::ProcessError(ProcessError::LaunchFailure { .. }) => {
                FailureCategory::LaunchFailure
            }
            ExecutionOutcome::ProcessError(ProcessError::NonZeroExit { .. }) => {
                FailureCategory::NonZeroExit
            }
            ExecutionOutcome::ProcessError(ProcessError::Io { .. }) => FailureCategory::IoFailure,
            ExecutionOutcome::Timeout { .. } => FailureCategory::Timeout,
            ExecutionOutcome::Cancelled => FailureCategory::Cancelled,
        };
        Some(category)
    }

    /// `success` or the failure category label.
    pub fn label(&self) -> &'static str {
        self.category().map_or("success", |c| c.as_str())
    }

    /// Captured stderr, when the outcome carries one.
    pub fn diagnostic(&self) -> Option<&Diagnostic> {
        match self {
            ExecutionOutcome::ProcessError(ProcessError::NonZeroExit { diagnostic, .. }) => {
                Some(diagnostic)
            }
            _ => None,
        }
    }

    /// One-line description for logs and verbose error pages.
    pub fn detail(&self) -> String {
        match self {
            ExecutionOutcome::Success(_) => "success".to_string(),
            ExecutionOutcome::MalformedOutput(reason) => format!("malformed output: {reason}"),
            ExecutionOutcome::ProcessError(err) => err.to_string(),
            ExecutionOutcome::Timeout { after } => {
                format!("execution timed out after {}ms", after.as_millis())
            }
            ExecutionOutcome::Cancelled => "execution cancelled".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::parser::HeaderSyntax;
    use bytes::Bytes;

    #[test]
    fn test_categories_map_to_fixed_statuses() {
        let timeout = ExecutionOutcome::Timeout {
            after: Duration::from_secs(2),
        };
        assert_eq!(timeout.category(), Some(FailureCategory::Timeout));
        assert_eq!(
            FailureCategory::Timeout.status_code(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(timeout.detail(), "execution timed out after 2000ms");

        let malformed =
            ExecutionOutcome::MalformedOutput(MalformedOutput::MissingTerminator { header_lines: 0 });
        assert_eq!(malformed.label(), "malformed_no_terminator");
        assert_eq!(
            malformed.category().map(|c| c.status_code()),
            Some(StatusCode::BAD_GATEWAY)
        );

        let syntax = ExecutionOutcome::MalformedOutput(MalformedOutput::InvalidHeader {
            line: 1,
            reason: HeaderSyntax::MissingColon,
        });
        assert_eq!(syntax.category(), Some(FailureCategory::InvalidHeaderSyntax));

        let launch = ExecutionOutcome::ProcessError(ProcessError::LaunchFailure {
            program: PathBuf::from("/missing"),
            source: io::Error::from(io::ErrorKind::NotFound),
        });
        assert_eq!(
            launch.category().map(|c| c.status_code()),
            Some(StatusCode::INTERNAL_SERVER_ERROR)
        );
        assert_eq!(
            FailureCategory::Cancelled.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_parsed_response_header_lookup() {
        let response = ParsedResponse {
            headers: vec![
                CgiHeader::new("Content-Type", "text/plain"),
                CgiHeader::new("STATUS", "404 Not Found"),
            ],
            body: ResponseBody::Memory(Bytes::new()),
        };
        assert_eq!(response.header("content-type"), Some("text/plain"));
        assert_eq!(response.status(), Some(StatusCode::NOT_FOUND));

        let outcome = ExecutionOutcome::Success(response);
        assert!(outcome.is_success());
        assert_eq!(outcome.label(), "success");
        assert!(outcome.category().is_none());
    }
}
