//! Response translation.
//!
//! # Responsibilities
//! - Decide the single outcome from supervisor state, parser result and exit status
//! - Render an outcome as an HTTP response
//!
//! # Design Decisions
//! - Precedence: Timeout > Cancelled > MalformedOutput > IoFailure > NonZeroExit > Success
//! - Output of a timed-out or cancelled program is discarded unseen
//! - Failure pages are generic unless verbose errors are enabled

use std::io;

use axum::body::Body;
use axum::http::{header, HeaderName, HeaderValue, Response, StatusCode};

use crate::gateway::execution::{Completion, StageFailure};
use crate::gateway::launcher::BodyDelivery;
use crate::gateway::outcome::{Channel, ExecutionOutcome, ParsedResponse, ProcessError};
use crate::gateway::parser::parse_status;
use crate::gateway::supervisor::Supervised;
use crate::http::response::error_page;
use crate::security::headers::is_hop_by_hop;

/// Rendering options taken from configuration.
#[derive(Debug, Clone)]
pub struct TranslateOptions {
    pub verbose_errors: bool,
    pub default_content_type: HeaderValue,
}

impl Default for TranslateOptions {
    fn default() -> Self {
        Self {
            verbose_errors: false,
            default_content_type: HeaderValue::from_static("text/html"),
        }
    }
}

/// Fold everything observed during one execution into its outcome.
///
/// With `strict_body_delivery`, a program that stopped reading its input
/// before the whole body was written is an I/O failure.
pub fn decide(supervised: Supervised<Completion>, strict_body_delivery: bool) -> ExecutionOutcome {
    let completion = match supervised {
        Supervised::TimedOut(after) => return ExecutionOutcome::Timeout { after },
        Supervised::Cancelled => return ExecutionOutcome::Cancelled,
        Supervised::Completed(completion) => completion,
    };

    match completion {
        Completion::Failed(StageFailure::Malformed(reason)) => {
            ExecutionOutcome::MalformedOutput(reason)
        }
        Completion::Failed(StageFailure::Io { channel, source }) => {
            ExecutionOutcome::ProcessError(ProcessError::Io { channel, source })
        }
        Completion::Exited {
            headers,
            body,
            delivery,
            diagnostic,
            status,
        } => {
            if let (true, BodyDelivery::Partial { written, total }) =
                (strict_body_delivery, delivery)
            {
                return ExecutionOutcome::ProcessError(ProcessError::Io {
                    channel: Channel::Stdin,
                    source: io::Error::new(
                        io::ErrorKind::BrokenPipe,
                        format!("program closed its input after {written} of {total} body bytes"),
                    ),
                });
            }
            if !status.success() {
                return ExecutionOutcome::ProcessError(ProcessError::NonZeroExit {
                    status,
                    diagnostic,
                });
            }
            ExecutionOutcome::Success(ParsedResponse { headers, body })
        }
    }
}

/// Render `outcome` as the response sent to the client.
pub fn into_response(outcome: ExecutionOutcome, options: &TranslateOptions) -> Response<Body> {
    match outcome {
        ExecutionOutcome::Success(parsed) => success_response(parsed, options),
        failure => failure_response(&failure, options),
    }
}

fn success_response(parsed: ParsedResponse, options: &TranslateOptions) -> Response<Body> {
    let has_location = parsed.header("location").is_some();
    let status = match parsed.header("status").and_then(parse_status) {
        Some(status) => status,
        None if has_location => StatusCode::FOUND,
        None => StatusCode::OK,
    };

    let mut response = Response::new(Body::empty());
    *response.status_mut() = status;
    let headers = response.headers_mut();

    for cgi_header in &parsed.headers {
        if cgi_header.is("status") || cgi_header.is("content-length") {
            continue;
        }
        let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(cgi_header.name.as_bytes()),
            HeaderValue::from_str(&cgi_header.value),
        ) else {
            continue;
        };
        if is_hop_by_hop(&name) {
            continue;
        }
        headers.append(name, value);
    }

    if !headers.contains_key(header::CONTENT_TYPE) && !has_location {
        headers.insert(header::CONTENT_TYPE, options.default_content_type.clone());
    }
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(parsed.body.len()));

    *response.body_mut() = parsed.body.into_http_body();
    response
}

fn failure_response(outcome: &ExecutionOutcome, options: &TranslateOptions) -> Response<Body> {
    let Some(category) = outcome.category() else {
        return error_page(StatusCode::INTERNAL_SERVER_ERROR, None);
    };
    if !options.verbose_errors {
        return error_page(category.status_code(), None);
    }

    let mut detail = format!("{category}: {}", outcome.detail());
    if let Some(diagnostic) = outcome.diagnostic().filter(|d| !d.is_empty()) {
        detail.push('\n');
        detail.push_str(&diagnostic.to_string());
    }
    error_page(category.status_code(), Some(&detail))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::diagnostic::Diagnostic;
    use crate::gateway::parser::{CgiHeader, MalformedOutput};
    use crate::gateway::spool::ResponseBody;
    use bytes::Bytes;
    use std::os::unix::process::ExitStatusExt;
    use std::process::ExitStatus;
    use std::time::Duration;

    fn exited(headers: Vec<CgiHeader>, code: i32, delivery: BodyDelivery) -> Completion {
        Completion::Exited {
            headers,
            body: ResponseBody::Memory(Bytes::from_static(b"<html>ok</html>")),
            delivery,
            diagnostic: Diagnostic::default(),
            status: ExitStatus::from_raw(code << 8),
        }
    }

    fn html() -> Vec<CgiHeader> {
        vec![CgiHeader::new("Content-Type", "text/html")]
    }

    async fn body_text(response: Response<Body>) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn test_precedence() {
        let complete = BodyDelivery::Complete { bytes: 0 };
        let partial = BodyDelivery::Partial {
            written: 10,
            total: 100,
        };

        let outcome = decide(Supervised::Completed(exited(html(), 0, complete)), true);
        assert!(outcome.is_success());

        let outcome = decide(Supervised::Completed(exited(html(), 1, complete)), true);
        assert_eq!(outcome.label(), "non_zero_exit");

        // A broken input channel outranks the exit status.
        let outcome = decide(Supervised::Completed(exited(html(), 1, partial)), true);
        assert_eq!(outcome.label(), "io_failure");

        let outcome = decide(Supervised::Completed(exited(html(), 0, partial)), false);
        assert!(outcome.is_success());

        let outcome = decide(
            Supervised::Completed(Completion::Failed(StageFailure::Malformed(
                MalformedOutput::MissingTerminator { header_lines: 0 },
            ))),
            true,
        );
        assert_eq!(outcome.label(), "malformed_no_terminator");

        let outcome = decide(Supervised::TimedOut(Duration::from_secs(2)), true);
        assert_eq!(outcome.label(), "timeout");

        let outcome = decide(Supervised::Cancelled, true);
        assert_eq!(outcome.label(), "cancelled");
    }

    #[tokio::test]
    async fn test_success_is_forwarded() {
        let outcome = ExecutionOutcome::Success(ParsedResponse {
            headers: vec![
                CgiHeader::new("Content-Type", "text/html"),
                CgiHeader::new("Set-Cookie", "a=1"),
                CgiHeader::new("Set-Cookie", "b=2"),
                CgiHeader::new("Content-Length", "9999"),
                CgiHeader::new("Connection", "close"),
            ],
            body: ResponseBody::Memory(Bytes::from_static(b"<html>ok</html>")),
        });
        let response = into_response(outcome, &TranslateOptions::default());

        assert_eq!(response.status(), StatusCode::OK);
        let cookies: Vec<_> = response.headers().get_all(header::SET_COOKIE).iter().collect();
        assert_eq!(cookies, ["a=1", "b=2"]);
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "15");
        assert!(response.headers().get(header::CONNECTION).is_none());
        assert_eq!(body_text(response).await, "<html>ok</html>");
    }

    #[test]
    fn test_status_and_location() {
        let with_status = ExecutionOutcome::Success(ParsedResponse {
            headers: vec![CgiHeader::new("Status", "404 Not Found")],
            body: ResponseBody::Memory(Bytes::new()),
        });
        let response = into_response(with_status, &TranslateOptions::default());
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.headers().get("status").is_none());
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/html");

        let redirect = ExecutionOutcome::Success(ParsedResponse {
            headers: vec![CgiHeader::new("Location", "/elsewhere")],
            body: ResponseBody::Memory(Bytes::new()),
        });
        let response = into_response(redirect, &TranslateOptions::default());
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[header::LOCATION], "/elsewhere");
        assert!(response.headers().get(header::CONTENT_TYPE).is_none());
    }

    #[tokio::test]
    async fn test_failure_pages() {
        let failing = || {
            ExecutionOutcome::ProcessError(ProcessError::NonZeroExit {
                status: ExitStatus::from_raw(3 << 8),
                diagnostic: Diagnostic::default(),
            })
        };

        let response = into_response(failing(), &TranslateOptions::default());
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let text = body_text(response).await;
        assert!(!text.contains("non_zero_exit"));

        let verbose = TranslateOptions {
            verbose_errors: true,
            ..TranslateOptions::default()
        };
        let text = body_text(into_response(failing(), &verbose)).await;
        assert!(text.contains("non_zero_exit"));

        let timeout = ExecutionOutcome::Timeout {
            after: Duration::from_secs(2),
        };
        let response = into_response(timeout, &TranslateOptions::default());
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    }
}
