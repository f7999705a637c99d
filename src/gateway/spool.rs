//! Body buffering with bounded memory.
//!
//! A response body cannot be released before the program's exit status is
//! known, so it is held here. Small bodies stay in memory; once the threshold
//! is crossed everything moves to an anonymous temp file that disappears when
//! the last handle is closed.

use std::io::{self, SeekFrom};

use axum::body::Body;
use bytes::{Bytes, BytesMut};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio_util::io::ReaderStream;

/// Accumulates body bytes, spilling to disk above a threshold.
#[derive(Debug)]
pub struct BodySpool {
    threshold: usize,
    memory: BytesMut,
    file: Option<File>,
    len: u64,
}

impl BodySpool {
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold,
            memory: BytesMut::new(),
            file: None,
            len: 0,
        }
    }

    /// Append a chunk.
    pub async fn write(&mut self, chunk: &[u8]) -> io::Result<()> {
        if chunk.is_empty() {
            return Ok(());
        }
        self.len += chunk.len() as u64;

        if let Some(file) = self.file.as_mut() {
            return file.write_all(chunk).await;
        }
        if self.memory.len() + chunk.len() <= self.threshold {
            self.memory.extend_from_slice(chunk);
            return Ok(());
        }

        let std_file = tokio::task::spawn_blocking(tempfile::tempfile)
            .await
            .map_err(io::Error::other)??;
        let mut file = File::from_std(std_file);
        file.write_all(&self.memory).await?;
        file.write_all(chunk).await?;
        tracing::debug!(bytes = self.len, "Response body spilled to disk");

        self.memory = BytesMut::new();
        self.file = Some(file);
        Ok(())
    }

    /// Bytes written so far.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Seal the spool into a readable body.
    pub async fn finish(self) -> io::Result<ResponseBody> {
        match self.file {
            None => Ok(ResponseBody::Memory(self.memory.freeze())),
            Some(mut file) => {
                file.flush().await?;
                file.seek(SeekFrom::Start(0)).await?;
                Ok(ResponseBody::Spooled {
                    file,
                    len: self.len,
                })
            }
        }
    }
}

/// A complete response body.
#[derive(Debug)]
pub enum ResponseBody {
    Memory(Bytes),
    Spooled { file: File, len: u64 },
}

impl ResponseBody {
    pub fn len(&self) -> u64 {
        match self {
            ResponseBody::Memory(bytes) => bytes.len() as u64,
            ResponseBody::Spooled { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_spooled(&self) -> bool {
        matches!(self, ResponseBody::Spooled { .. })
    }

    /// Read the whole body into memory.
    pub async fn into_bytes(self) -> io::Result<Bytes> {
        match self {
            ResponseBody::Memory(bytes) => Ok(bytes),
            ResponseBody::Spooled { mut file, len } => {
                let mut buf = Vec::with_capacity(len as usize);
                file.read_to_end(&mut buf).await?;
                Ok(Bytes::from(buf))
            }
        }
    }

    /// Convert into a streaming HTTP body.
    pub fn into_http_body(self) -> Body {
        match self {
            ResponseBody::Memory(bytes) => Body::from(bytes),
            ResponseBody::Spooled { file, .. } => Body::from_stream(ReaderStream::new(file)),
        }
    }
}
