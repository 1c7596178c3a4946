//! Separator-framed byte channel used between the server and the
//! shell-integration extension (Finder/Explorer overlay process).
//!
//! Messages are plain delimited byte runs, not the length-prefixed JSON
//! envelope: the extension side speaks a colon-delimited command syntax
//! such as `STATUS:0:100:1:relative/path`.

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::warn;

/// Byte terminating every message on the channel.
pub const MESSAGE_SEPARATOR: u8 = b'\n';

/// Longest message excerpt written to the logs.
pub const LOG_EXCERPT_MAX: usize = 2048;

const READ_CHUNK: usize = 4096;

/// Truncate a message for logging. Strictly a logging safeguard; the
/// wire payload is never cut.
pub fn log_excerpt(payload: &[u8]) -> String {
    if payload.len() <= LOG_EXCERPT_MAX {
        String::from_utf8_lossy(payload).into_owned()
    } else {
        let mut text = String::from_utf8_lossy(&payload[..LOG_EXCERPT_MAX]).into_owned();
        text.push_str(" (truncated)");
        text
    }
}

/// Buffered, separator-framed wrapper over any byte stream.
pub struct CommChannel<S> {
    stream: S,
    read_buf: BytesMut,
}

impl<S: AsyncRead + AsyncWrite + Unpin> CommChannel<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            read_buf: BytesMut::with_capacity(READ_CHUNK),
        }
    }

    /// Write one message, appending the separator if the payload lacks it.
    ///
    /// A short write is logged but not retried; the extension channel is
    /// advisory and the next status push supersedes a lost one.
    pub async fn send_message(&mut self, payload: &[u8]) -> std::io::Result<()> {
        let mut msg = BytesMut::with_capacity(payload.len() + 1);
        msg.extend_from_slice(payload);
        if msg.last() != Some(&MESSAGE_SEPARATOR) {
            msg.extend_from_slice(&[MESSAGE_SEPARATOR]);
        }

        let written = self.stream.write(&msg).await?;
        if written != msg.len() {
            warn!(
                expected = msg.len(),
                written,
                message = %log_excerpt(payload),
                "short write on comm channel"
            );
        }
        Ok(())
    }

    /// Return the next full message, or `None` when the peer closed and
    /// no complete message remains buffered. Bytes after the separator
    /// stay buffered for the next call.
    pub async fn read_line(&mut self) -> std::io::Result<Option<Bytes>> {
        loop {
            if let Some(pos) = self
                .read_buf
                .iter()
                .position(|&b| b == MESSAGE_SEPARATOR)
            {
                let line = self.read_buf.split_to(pos).freeze();
                let _ = self.read_buf.split_to(1); // drop the separator
                return Ok(Some(line));
            }

            let n = self.stream.read_buf(&mut self.read_buf).await?;
            if n == 0 {
                return Ok(None);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_appends_missing_separator() {
        let (client, mut server) = tokio::io::duplex(256);
        let mut channel = CommChannel::new(client);
        channel.send_message(b"STATUS:1:50:0:a.txt").await.unwrap();

        let mut received = vec![0u8; 20];
        server.read_exact(&mut received).await.unwrap();
        assert_eq!(&received, b"STATUS:1:50:0:a.txt\n");
    }

    #[tokio::test]
    async fn send_does_not_double_separator() {
        let (client, mut server) = tokio::io::duplex(256);
        let mut channel = CommChannel::new(client);
        channel.send_message(b"PING\n").await.unwrap();

        let mut received = vec![0u8; 5];
        server.read_exact(&mut received).await.unwrap();
        assert_eq!(&received, b"PING\n");
    }

    #[tokio::test]
    async fn read_line_keeps_remainder_buffered() {
        let (mut client, server) = tokio::io::duplex(256);
        let mut channel = CommChannel::new(server);

        client.write_all(b"first\nsecond\nthird-par").await.unwrap();

        assert_eq!(channel.read_line().await.unwrap().unwrap(), "first");
        assert_eq!(channel.read_line().await.unwrap().unwrap(), "second");

        client.write_all(b"tial\n").await.unwrap();
        assert_eq!(channel.read_line().await.unwrap().unwrap(), "third-partial");
    }

    #[tokio::test]
    async fn read_line_returns_none_on_eof_without_full_line() {
        let (mut client, server) = tokio::io::duplex(256);
        let mut channel = CommChannel::new(server);

        client.write_all(b"dangling").await.unwrap();
        drop(client);

        assert!(channel.read_line().await.unwrap().is_none());
    }

    #[test]
    fn log_excerpt_truncates_long_messages() {
        let long = vec![b'x'; LOG_EXCERPT_MAX + 100];
        let text = log_excerpt(&long);
        assert!(text.ends_with(" (truncated)"));
        assert_eq!(text.len(), LOG_EXCERPT_MAX + " (truncated)".len());

        let short = b"STATUS:0:0:1:b.txt";
        assert_eq!(log_excerpt(short), "STATUS:0:0:1:b.txt");
    }
}
