//! Bounded capture of a program's error channel.

use std::borrow::Cow;
use std::fmt;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

const READ_CHUNK: usize = 4096;

/// The retained prefix of everything a program wrote to stderr.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostic {
    retained: Bytes,
    total_bytes: u64,
}

impl Diagnostic {
    pub fn as_bytes(&self) -> &[u8] {
        &self.retained
    }

    /// Retained bytes decoded lossily.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.retained)
    }

    pub fn is_empty(&self) -> bool {
        self.total_bytes == 0
    }

    /// Bytes the program wrote, including the discarded tail.
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn truncated(&self) -> bool {
        self.total_bytes > self.retained.len() as u64
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text())?;
        if self.truncated() {
            write!(f, " [truncated, {} bytes total]", self.total_bytes)?;
        }
        Ok(())
    }
}

/// Read `reader` to EOF, keeping at most `limit` bytes.
///
/// The remainder is drained and dropped so the writer never blocks on a full pipe.
pub async fn capture<R>(mut reader: R, limit: usize) -> std::io::Result<Diagnostic>
where
    R: AsyncRead + Unpin,
{
    let mut retained = BytesMut::with_capacity(limit.min(READ_CHUNK));
    let mut total_bytes = 0u64;
    let mut buf = [0u8; READ_CHUNK];

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        total_bytes += n as u64;
        let room = limit.saturating_sub(retained.len());
        retained.extend_from_slice(&buf[..n.min(room)]);
    }

    Ok(Diagnostic {
        retained: retained.freeze(),
        total_bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn keeps_everything_under_the_limit() {
        let diagnostic = capture(&b"ZeroDivisionError: division by zero\n"[..], 1024)
            .await
            .unwrap();
        assert!(!diagnostic.truncated());
        assert_eq!(diagnostic.text(), "ZeroDivisionError: division by zero\n");
    }

    #[tokio::test]
    async fn truncates_but_counts_the_tail() {
        let input = vec![b'x'; 10_000];
        let diagnostic = capture(&input[..], 100).await.unwrap();

        assert_eq!(diagnostic.as_bytes().len(), 100);
        assert_eq!(diagnostic.total_bytes(), 10_000);
        assert!(diagnostic.truncated());
        assert!(diagnostic.to_string().ends_with("[truncated, 10000 bytes total]"));
    }

    #[tokio::test]
    async fn zero_limit_retains_nothing() {
        let diagnostic = capture(&b"trace"[..], 0).await.unwrap();
        assert!(diagnostic.as_bytes().is_empty());
        assert!(!diagnostic.is_empty());
    }
}
