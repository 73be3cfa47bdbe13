//! Request-head peeking.
//!
//! # Responsibilities
//! - Read just enough of a new connection to see its first request line
//! - Enforce the header size limit before any body is read
//! - Leave the bytes in place so they can be replayed or discarded
//!
//! # Design Decisions
//! - Only the method and target are kept; hyper re-parses forwarded heads
//! - A connection that closes before sending anything is not an error

use std::io;

use axum::http::Method;
use tokio::io::AsyncRead;

use crate::net::Prebuffered;

/// Enough header slots for any realistic client.
const MAX_HEADERS: usize = 128;

/// The request line of the first request on a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    pub method: Method,
    /// The request target as sent: authority-form for CONNECT, usually
    /// absolute-form otherwise.
    pub target: String,
    /// Length of the whole head, including the blank line.
    pub len: usize,
}

/// Reasons a request head could not be read.
#[derive(Debug, thiserror::Error)]
pub enum HeadError {
    #[error("read request head: {0}")]
    Io(#[from] io::Error),
    #[error("malformed request head: {0}")]
    Malformed(#[from] httparse::Error),
    #[error("invalid method `{0}`")]
    Method(String),
    #[error("request head exceeds {0} bytes")]
    TooLarge(usize),
    #[error("connection closed mid request head")]
    Truncated,
}

impl RequestHead {
    /// Parses a complete head from `buf`, or returns `None` if more bytes
    /// are needed.
    pub fn parse(buf: &[u8]) -> Result<Option<Self>, HeadError> {
        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut req = httparse::Request::new(&mut headers);
        let len = match req.parse(buf)? {
            httparse::Status::Partial => return Ok(None),
            httparse::Status::Complete(len) => len,
        };

        // A complete parse always fills in method and path.
        let method = req.method.unwrap_or_default();
        let method = Method::from_bytes(method.as_bytes())
            .map_err(|_| HeadError::Method(method.to_string()))?;

        Ok(Some(Self {
            method,
            target: req.path.unwrap_or_default().to_string(),
            len,
        }))
    }

    /// Buffers from `reader` until a full head is available, without
    /// consuming it.
    ///
    /// Returns `None` if the peer closed before sending a byte.
    pub async fn peek<R>(reader: &mut Prebuffered<R>) -> Result<Option<Self>, HeadError>
    where
        R: AsyncRead + Unpin,
    {
        loop {
            if let Some(head) = Self::parse(reader.buffer())? {
                return Ok(Some(head));
            }
            if reader.is_full() {
                return Err(HeadError::TooLarge(reader.buffer().len()));
            }
            if reader.buffer_more().await? == 0 {
                return if reader.buffer().is_empty() {
                    Ok(None)
                } else {
                    Err(HeadError::Truncated)
                };
            }
        }
    }

    pub fn is_connect(&self) -> bool {
        self.method == Method::CONNECT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_connect_head() {
        let buf = b"CONNECT example.com:443 HTTP/1.1\r\nHost: example.com:443\r\n\r\n\x16\x03\x01";
        let head = RequestHead::parse(buf).unwrap().unwrap();
        assert!(head.is_connect());
        assert_eq!(head.target, "example.com:443");
        assert_eq!(&buf[head.len..], b"\x16\x03\x01");
    }

    #[test]
    fn partial_head_needs_more() {
        assert!(RequestHead::parse(b"GET http://example.com/ HTTP/1.1\r\nHost: ex")
            .unwrap()
            .is_none());
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(matches!(
            RequestHead::parse(b"\x16\x03\x01\x02\x00\r\n\r\n"),
            Err(HeadError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn peek_leaves_bytes_in_place() {
        let data: &[u8] = b"GET http://example.com/ HTTP/1.1\r\nHost: example.com\r\n\r\n";
        let mut reader = Prebuffered::new(data, 1024);

        let head = RequestHead::peek(&mut reader).await.unwrap().unwrap();
        assert_eq!(head.method, Method::GET);
        assert_eq!(head.target, "http://example.com/");
        assert_eq!(reader.buffer(), data);
    }

    #[tokio::test]
    async fn peek_enforces_limit() {
        let mut data = b"GET / HTTP/1.1\r\n".to_vec();
        data.extend(std::iter::repeat(b"X-Filler: aaaaaaaaaaaaaaaa\r\n").take(64).flatten());
        let mut reader = Prebuffered::new(&data[..], 256);

        assert!(matches!(
            RequestHead::peek(&mut reader).await,
            Err(HeadError::TooLarge(256))
        ));
    }

    #[tokio::test]
    async fn peek_distinguishes_silent_and_truncated_peers() {
        let mut silent = Prebuffered::new(&b""[..], 1024);
        assert!(RequestHead::peek(&mut silent).await.unwrap().is_none());

        let mut truncated = Prebuffered::new(&b"GET / HTTP/1.1\r\n"[..], 1024);
        assert!(matches!(
            RequestHead::peek(&mut truncated).await,
            Err(HeadError::Truncated)
        ));
    }
}
