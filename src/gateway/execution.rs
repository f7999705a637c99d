//! The three concurrent operations of one execution.
//!
//! # Data Flow
//! ```text
//! request body ──► feed_stdin ──► child stdin
//! child stdout ──► OutputParser ──► BodySpool
//! child stderr ──► diagnostic::capture
//!                     │
//!                     ▼  all three done
//!               wait for exit status ──► Completion
//! ```
//!
//! The operations are joined with `try_join!`: the first one to fail ends the
//! join, which drops the other two and their pipes. The whole future is in
//! turn raced against the deadline by the supervisor.

use std::io;
use std::process::ExitStatus;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::config::ExecutionConfig;
use crate::gateway::diagnostic::{self, Diagnostic};
use crate::gateway::launcher::{feed_stdin, BodyDelivery, ProcessHandle, ProcessPipes};
use crate::gateway::outcome::Channel;
use crate::gateway::parser::{CgiHeader, MalformedOutput, OutputParser, Progress};
use crate::gateway::spool::{BodySpool, ResponseBody};

const READ_CHUNK: usize = 16 * 1024;

/// A failure in one of the concurrent operations.
#[derive(Debug)]
pub enum StageFailure {
    Malformed(MalformedOutput),
    Io { channel: Channel, source: io::Error },
}

impl From<MalformedOutput> for StageFailure {
    fn from(reason: MalformedOutput) -> Self {
        StageFailure::Malformed(reason)
    }
}

fn on(channel: Channel) -> impl FnOnce(io::Error) -> StageFailure {
    move |source| StageFailure::Io { channel, source }
}

/// Everything known once an unsupervised execution ends.
#[derive(Debug)]
pub enum Completion {
    Failed(StageFailure),
    Exited {
        headers: Vec<CgiHeader>,
        body: ResponseBody,
        delivery: BodyDelivery,
        diagnostic: Diagnostic,
        status: ExitStatus,
    },
}

/// Feed the body, parse stdout and capture stderr concurrently, then reap.
pub async fn drive(
    handle: &mut ProcessHandle,
    pipes: ProcessPipes,
    body: Bytes,
    limits: &ExecutionConfig,
) -> Completion {
    let ProcessPipes {
        stdin,
        stdout,
        stderr,
    } = pipes;

    let feeding = async { feed_stdin(stdin, body).await.map_err(on(Channel::Stdin)) };
    let output = collect_output(stdout, limits.max_header_bytes, limits.spool_threshold_bytes);
    let errors = async {
        diagnostic::capture(stderr, limits.max_diagnostic_bytes)
            .await
            .map_err(on(Channel::Stderr))
    };

    let (delivery, (headers, body), diagnostic) = match tokio::try_join!(feeding, output, errors) {
        Ok(joined) => joined,
        Err(failure) => return Completion::Failed(failure),
    };

    match handle.wait().await {
        Ok(status) => Completion::Exited {
            headers,
            body,
            delivery,
            diagnostic,
            status,
        },
        Err(source) => Completion::Failed(StageFailure::Io {
            channel: Channel::Process,
            source,
        }),
    }
}

/// Read stdout to EOF through the parser, spooling body bytes.
pub async fn collect_output<R>(
    mut stdout: R,
    max_header_bytes: usize,
    spool_threshold: usize,
) -> Result<(Vec<CgiHeader>, ResponseBody), StageFailure>
where
    R: AsyncRead + Unpin,
{
    let mut parser = OutputParser::new(max_header_bytes);
    let mut spool = BodySpool::new(spool_threshold);
    let mut buf = BytesMut::with_capacity(READ_CHUNK);

    loop {
        buf.reserve(READ_CHUNK);
        let n = stdout.read_buf(&mut buf).await.map_err(on(Channel::Stdout))?;
        if n == 0 {
            break;
        }
        if let Progress::Body(bytes) = parser.feed(buf.split().freeze())? {
            spool.write(&bytes).await.map_err(on(Channel::Spool))?;
        }
    }

    let headers = parser.finish()?;
    let body = spool.finish().await.map_err(on(Channel::Spool))?;
    Ok((headers, body))
}
