//! Prebuffered reads and hijacked-connection recombination.
//!
//! The serving layer reads ahead of the request head it parses. When the
//! socket is taken over, whatever it already pulled off the wire has to be
//! replayed ahead of the live connection, otherwise the client's first bytes
//! (typically a TLS ClientHello) are lost.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, ReadBuf};

/// Initial capacity for the read-ahead buffer.
const INITIAL_CAPACITY: usize = 4 * 1024;

/// A reader that accumulates input for inspection before it is consumed.
pub struct Prebuffered<R> {
    inner: R,
    buf: BytesMut,
    max_len: usize,
}

impl<R: AsyncRead + Unpin> Prebuffered<R> {
    pub fn new(inner: R, max_len: usize) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_CAPACITY.min(max_len)),
            max_len,
        }
    }

    /// Returns the unconsumed buffered bytes.
    pub fn buffer(&self) -> &[u8] {
        &self.buf[..]
    }

    pub fn is_full(&self) -> bool {
        self.buf.len() >= self.max_len
    }

    /// Discards `n` bytes from the front of the buffer.
    pub fn discard(&mut self, n: usize) {
        let n = n.min(self.buf.len());
        self.buf.advance(n);
    }

    /// Reads more data from the inner reader, up to the buffer limit.
    ///
    /// Returns `0` at end of stream.
    pub async fn buffer_more(&mut self) -> io::Result<usize> {
        let max = self.max_len.saturating_sub(self.buf.len());
        (&mut self.inner)
            .take(max as u64)
            .read_buf(&mut self.buf)
            .await
    }

    /// Splits into the buffered bytes and the inner reader.
    pub fn into_parts(self) -> (Bytes, R) {
        (self.buf.freeze(), self.inner)
    }

    /// Hands the reader over as a single stream that replays the buffer first.
    pub fn into_peeked(self) -> PeekedConn<R> {
        let (buffered, inner) = self.into_parts();
        PeekedConn::new(buffered, inner)
    }
}

/// A taken-over connection combined with the bytes already read from it.
///
/// Reads drain `buffered` before touching `inner`; writes and shutdown go
/// straight to `inner`.
#[derive(Debug)]
pub struct PeekedConn<S> {
    buffered: Bytes,
    inner: S,
}

impl<S> PeekedConn<S> {
    pub fn new(buffered: Bytes, inner: S) -> Self {
        Self { buffered, inner }
    }

    /// Bytes still waiting to be replayed.
    pub fn buffered(&self) -> &[u8] {
        &self.buffered
    }

}

impl<S: AsyncRead + Unpin> AsyncRead for PeekedConn<S> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        out: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if !out.has_remaining_mut() {
            return Poll::Ready(Ok(()));
        }
        if !self.buffered.is_empty() {
            let n = self.buffered.len().min(out.remaining());
            let chunk = self.buffered.split_to(n);
            out.put_slice(&chunk);
            return Poll::Ready(Ok(()));
        }
        Pin::new(&mut self.inner).poll_read(cx, out)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for PeekedConn<S> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_write_vectored(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write_vectored(cx, bufs)
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;

    #[tokio::test]
    async fn buffer_more_respects_max() {
        let mut p = Prebuffered::new(Cursor::new(&b"abcdefgh"[..]), 5);
        assert_eq!(p.buffer_more().await.unwrap(), 5);
        assert_eq!(p.buffer(), b"abcde");
        assert!(p.is_full());
        assert_eq!(p.buffer_more().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn discard_beyond_len_is_ok() {
        let mut p = Prebuffered::new(Cursor::new(&b"abc"[..]), 64);
        p.buffer_more().await.unwrap();
        p.discard(10);
        assert_eq!(p.buffer(), b"");
    }

    #[tokio::test]
    async fn peeked_replays_buffer_then_inner() {
        let mut p = Prebuffered::new(Cursor::new(&b"CONNECT x\r\n\r\nhello world"[..]), 16);
        p.buffer_more().await.unwrap();
        p.discard(13);
        assert_eq!(p.buffer(), b"hel");

        let mut conn = p.into_peeked();
        let mut out = Vec::new();
        conn.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"hello world");
    }

    #[tokio::test]
    async fn small_reads_drain_buffer_in_order() {
        let mut conn = PeekedConn::new(Bytes::from_static(b"abcd"), Cursor::new(&b"ef"[..]));

        let mut two = [0u8; 2];
        conn.read_exact(&mut two).await.unwrap();
        assert_eq!(&two, b"ab");
        assert_eq!(conn.buffered(), b"cd");

        let mut rest = Vec::new();
        conn.read_to_end(&mut rest).await.unwrap();
        assert_eq!(rest, b"cdef");
    }

    #[tokio::test]
    async fn writes_bypass_buffer() {
        let (client, mut server) = tokio::io::duplex(64);
        let mut conn = PeekedConn::new(Bytes::from_static(b"early"), client);

        conn.write_all(b"reply").await.unwrap();
        conn.shutdown().await.unwrap();

        let mut seen = Vec::new();
        server.read_to_end(&mut seen).await.unwrap();
        assert_eq!(seen, b"reply");

        let mut early = [0u8; 5];
        conn.read_exact(&mut early).await.unwrap();
        assert_eq!(&early, b"early");
    }

    #[tokio::test]
    async fn empty_buffer_falls_through() {
        let mut conn = PeekedConn::new(Bytes::new(), Cursor::new(&b"xyz"[..]));
        let mut out = Vec::new();
        conn.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"xyz");
    }
}
