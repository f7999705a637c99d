//! Streaming parser for CGI program output.
//!
//! # Responsibilities
//! - Split output into header block and body at the first blank line
//! - Validate every header line as `Name: Value`
//! - Hand body bytes through untouched as soon as the split is known
//!
//! # Design Decisions
//! - Sans-IO: the caller feeds chunks, so the parser is testable without processes
//! - Fails closed: a first line that cannot be a header, or output ending before
//!   the terminator, is malformed, never a guessed partial response
//! - An invalid header name is reported as soon as it is visible, without
//!   waiting for the end of the line
//! - Only the unterminated header portion is buffered, capped by `max_header_bytes`
//! - `\n` and `\r\n` line endings are both accepted, also mixed

use std::fmt;

use axum::http::{HeaderName, HeaderValue, StatusCode};
use bytes::{Bytes, BytesMut};
use thiserror::Error;

/// One header line as emitted by the program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CgiHeader {
    pub name: String,
    pub value: String,
}

impl CgiHeader {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

/// Why a header line was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderSyntax {
    /// The first line was blank; there is no header block.
    EmptyHeaderBlock,
    MissingColon,
    InvalidName,
    InvalidValue,
    /// `Status` does not start with a three-digit code.
    InvalidStatus,
}

impl fmt::Display for HeaderSyntax {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            HeaderSyntax::EmptyHeaderBlock => "output starts with a blank line",
            HeaderSyntax::MissingColon => "missing ':' separator",
            HeaderSyntax::InvalidName => "invalid header name",
            HeaderSyntax::InvalidValue => "invalid header value",
            HeaderSyntax::InvalidStatus => "invalid Status value",
        };
        f.write_str(reason)
    }
}

/// Output that could not be split into a valid header block and body.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedOutput {
    #[error("output ended before the header block was terminated ({header_lines} header lines read)")]
    MissingTerminator { header_lines: usize },

    #[error("header block exceeds {limit} bytes without a terminator")]
    HeaderBlockTooLarge { limit: usize },

    #[error("line {line}: {reason}")]
    InvalidHeader { line: usize, reason: HeaderSyntax },
}

/// The two diagnostic categories of malformed output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MalformedKind {
    NoTerminator,
    InvalidSyntax,
}

impl MalformedOutput {
    pub fn kind(&self) -> MalformedKind {
        match self {
            MalformedOutput::MissingTerminator { .. }
            | MalformedOutput::HeaderBlockTooLarge { .. } => MalformedKind::NoTerminator,
            MalformedOutput::InvalidHeader { .. } => MalformedKind::InvalidSyntax,
        }
    }
}

/// Result of feeding one chunk.
#[derive(Debug, PartialEq, Eq)]
pub enum Progress {
    /// Still inside the header block.
    Headers,
    /// Header block complete; these bytes belong to the body (possibly empty).
    Body(Bytes),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Headers,
    Body,
}

/// Incremental header/body splitter.
#[derive(Debug)]
pub struct OutputParser {
    state: State,
    pending: BytesMut,
    headers: Vec<CgiHeader>,
    consumed: usize,
    max_header_bytes: usize,
}

impl OutputParser {
    pub fn new(max_header_bytes: usize) -> Self {
        Self {
            state: State::Headers,
            pending: BytesMut::new(),
            headers: Vec::new(),
            consumed: 0,
            max_header_bytes,
        }
    }

    #[cfg(test)]
    pub fn in_body(&self) -> bool {
        self.state == State::Body
    }

    /// Consume the next chunk of output.
    pub fn feed(&mut self, chunk: Bytes) -> Result<Progress, MalformedOutput> {
        if self.state == State::Body {
            return Ok(Progress::Body(chunk));
        }
        self.pending.extend_from_slice(&chunk);

        while let Some(newline) = self.pending.iter().position(|&b| b == b'\n') {
            let mut line = self.pending.split_to(newline + 1);
            self.consumed += line.len();
            if self.consumed > self.max_header_bytes {
                return Err(MalformedOutput::HeaderBlockTooLarge {
                    limit: self.max_header_bytes,
                });
            }
            line.truncate(newline);
            if line.last() == Some(&b'\r') {
                line.truncate(newline - 1);
            }

            let line_no = self.headers.len() + 1;
            if line.is_empty() {
                if self.headers.is_empty() {
                    return Err(invalid(line_no, HeaderSyntax::EmptyHeaderBlock));
                }
                self.state = State::Body;
                return Ok(Progress::Body(self.pending.split().freeze()));
            }
            let header = parse_header_line(&line).map_err(|reason| invalid(line_no, reason))?;
            self.headers.push(header);
        }

        if self.consumed + self.pending.len() > self.max_header_bytes {
            return Err(MalformedOutput::HeaderBlockTooLarge {
                limit: self.max_header_bytes,
            });
        }
        check_partial_line(&self.pending)
            .map_err(|reason| invalid(self.headers.len() + 1, reason))?;
        Ok(Progress::Headers)
    }

    /// Signal end of output and return the header block.
    pub fn finish(self) -> Result<Vec<CgiHeader>, MalformedOutput> {
        match self.state {
            State::Body => Ok(self.headers),
            State::Headers => Err(MalformedOutput::MissingTerminator {
                header_lines: self.headers.len(),
            }),
        }
    }
}

fn invalid(line: usize, reason: HeaderSyntax) -> MalformedOutput {
    MalformedOutput::InvalidHeader { line, reason }
}

/// Parse one complete header line (terminator already stripped).
pub fn parse_header_line(line: &[u8]) -> Result<CgiHeader, HeaderSyntax> {
    let colon = line
        .iter()
        .position(|&b| b == b':')
        .ok_or(HeaderSyntax::MissingColon)?;
    let (raw_name, rest) = (&line[..colon], &line[colon + 1..]);

    HeaderName::from_bytes(raw_name).map_err(|_| HeaderSyntax::InvalidName)?;
    let raw_value = trim_whitespace(rest);
    HeaderValue::from_bytes(raw_value).map_err(|_| HeaderSyntax::InvalidValue)?;

    // Token characters are ASCII, so the name is always valid UTF-8.
    let name = String::from_utf8_lossy(raw_name).into_owned();
    let value = std::str::from_utf8(raw_value)
        .map_err(|_| HeaderSyntax::InvalidValue)?
        .to_string();

    if name.eq_ignore_ascii_case("status") && parse_status(&value).is_none() {
        return Err(HeaderSyntax::InvalidStatus);
    }
    Ok(CgiHeader { name, value })
}

/// Parse the code out of a `Status` value such as `404 Not Found`.
pub fn parse_status(value: &str) -> Option<StatusCode> {
    let code = value.split_whitespace().next()?;
    if code.len() != 3 {
        return None;
    }
    StatusCode::from_bytes(code.as_bytes()).ok()
}

/// Reject an unterminated line whose name part already contains invalid bytes.
fn check_partial_line(pending: &[u8]) -> Result<(), HeaderSyntax> {
    let name = match pending.iter().position(|&b| b == b':') {
        Some(colon) => &pending[..colon],
        None => pending.strip_suffix(b"\r").unwrap_or(pending),
    };
    if name.is_empty() || HeaderName::from_bytes(name).is_ok() {
        Ok(())
    } else {
        Err(HeaderSyntax::InvalidName)
    }
}

fn trim_whitespace(bytes: &[u8]) -> &[u8] {
    let is_ws = |b: &u8| *b == b' ' || *b == b'\t';
    let start = bytes.iter().position(|b| !is_ws(b)).unwrap_or(bytes.len());
    let end = bytes.iter().rposition(|b| !is_ws(b)).map_or(start, |i| i + 1);
    &bytes[start..end]
}
