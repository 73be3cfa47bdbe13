//! Unidirectional byte pipes and the tunnels built from them.
//!
//! # Responsibilities
//! - Copy bytes from a source to a destination until EOF or error
//! - Close both ends when the copy stops, however it stops
//! - Pair two pipes into a tunnel whose halves tear each other down
//!
//! # Design Decisions
//! - Each direction runs in its own task; neither waits for the other
//! - Ending one direction cancels a shared token, which unblocks the peer
//!   direction's pending read/write so both sockets are released
//! - The cancel fires from a drop guard, so a panicking copy still cascades
//! - Optional idle timeout counts traffic in either direction

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

const COPY_BUF_SIZE: usize = 16 * 1024;

/// Last-traffic timestamp shared by both directions of a tunnel.
#[derive(Debug, Clone)]
pub struct Activity {
    origin: Instant,
    last_ms: Arc<AtomicU64>,
    limit: Duration,
}

impl Activity {
    pub fn new(limit: Duration) -> Self {
        Self {
            origin: Instant::now(),
            last_ms: Arc::new(AtomicU64::new(0)),
            limit,
        }
    }

    fn touch(&self) {
        let now = self.origin.elapsed().as_millis() as u64;
        self.last_ms.store(now, Ordering::Relaxed);
    }

    fn idle_for(&self) -> Duration {
        let last = Duration::from_millis(self.last_ms.load(Ordering::Relaxed));
        self.origin.elapsed().saturating_sub(last)
    }
}

/// Shared state linking the two pipes of one tunnel.
#[derive(Debug, Clone, Default)]
pub struct PipeLink {
    closer: CancellationToken,
    activity: Option<Activity>,
}

impl PipeLink {
    pub fn new(idle_timeout: Option<Duration>) -> Self {
        Self {
            closer: CancellationToken::new(),
            activity: idle_timeout.map(Activity::new),
        }
    }

    /// Closes every pipe sharing this link.
    pub fn close(&self) {
        self.closer.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closer.is_cancelled()
    }
}

/// Copies `source` into `destination` until EOF, error, idle timeout or the
/// link is closed by the opposite direction.
///
/// Both ends are shut down and dropped before returning, and the link is
/// closed so the opposite direction stops too. Returns the bytes copied.
pub async fn pipe<W, R>(mut destination: W, mut source: R, link: PipeLink) -> io::Result<u64>
where
    W: AsyncWrite + Unpin,
    R: AsyncRead + Unpin,
{
    let _cascade = link.closer.clone().drop_guard();
    let mut copied = 0u64;

    let result = tokio::select! {
        res = copy(&mut source, &mut destination, link.activity.as_ref(), &mut copied) => res,
        _ = link.closer.cancelled() => Ok(()),
    };

    let _ = destination.shutdown().await;
    drop(destination);
    drop(source);

    result.map(|()| copied)
}

async fn copy<R, W>(
    source: &mut R,
    destination: &mut W,
    activity: Option<&Activity>,
    copied: &mut u64,
) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; COPY_BUF_SIZE];
    loop {
        let n = match activity {
            None => source.read(&mut buf).await?,
            Some(activity) => match tokio::time::timeout(activity.limit, source.read(&mut buf)).await {
                Ok(read) => read?,
                Err(_) if activity.idle_for() >= activity.limit => {
                    return Err(io::Error::new(io::ErrorKind::TimedOut, "tunnel idle timeout"));
                }
                Err(_) => continue,
            },
        };
        if n == 0 {
            return Ok(());
        }
        destination.write_all(&buf[..n]).await?;
        *copied += n as u64;
        if let Some(activity) = activity {
            activity.touch();
        }
    }
}

/// Join handles for the two directions of a running tunnel.
#[derive(Debug)]
pub struct Tunnel {
    pub client_to_upstream: JoinHandle<io::Result<u64>>,
    pub upstream_to_client: JoinHandle<io::Result<u64>>,
}

impl Tunnel {
    /// Splits both streams and launches one pipe per direction.
    ///
    /// `guard` is held until both directions have finished.
    pub fn spawn<C, U, G>(client: C, upstream: U, idle_timeout: Option<Duration>, guard: G) -> Self
    where
        C: AsyncRead + AsyncWrite + Send + 'static,
        U: AsyncRead + AsyncWrite + Send + 'static,
        G: Send + Sync + 'static,
    {
        let (client_read, client_write) = tokio::io::split(client);
        let (upstream_read, upstream_write) = tokio::io::split(upstream);
        let link = PipeLink::new(idle_timeout);
        let guard = Arc::new(guard);

        let up_guard = Arc::clone(&guard);
        let up_link = link.clone();
        let client_to_upstream = tokio::spawn(async move {
            let res = pipe(upstream_write, client_read, up_link).await;
            tracing::trace!(?res, "tunnel client->upstream finished");
            drop(up_guard);
            res
        });

        let down_link = link;
        let upstream_to_client = tokio::spawn(async move {
            let res = pipe(client_write, upstream_read, down_link).await;
            tracing::trace!(?res, "tunnel upstream->client finished");
            drop(guard);
            res
        });

        Self {
            client_to_upstream,
            upstream_to_client,
        }
    }

    /// Waits for both directions and returns `(sent, received)` byte counts.
    pub async fn join(self) -> (io::Result<u64>, io::Result<u64>) {
        let sent = flatten(self.client_to_upstream.await);
        let received = flatten(self.upstream_to_client.await);
        (sent, received)
    }
}

fn flatten(res: Result<io::Result<u64>, tokio::task::JoinError>) -> io::Result<u64> {
    res.unwrap_or_else(|e| Err(io::Error::other(e)))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;

    use tokio::io::duplex;

    use super::*;

    #[tokio::test]
    async fn pipe_copies_until_eof_and_closes_destination() {
        let (mut writer, source) = duplex(64);
        let (destination, mut reader) = duplex(64);

        let task = tokio::spawn(pipe(destination, source, PipeLink::default()));
        writer.write_all(b"hello ").await.unwrap();
        writer.write_all(b"world").await.unwrap();
        drop(writer);

        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"hello world");
        assert_eq!(task.await.unwrap().unwrap(), 11);
    }

    #[tokio::test]
    async fn pipe_stops_when_link_closed() {
        let (_writer, source) = duplex(64);
        let (destination, mut reader) = duplex(64);
        let link = PipeLink::default();

        let task = tokio::spawn(pipe(destination, source, link.clone()));
        link.close();

        assert_eq!(task.await.unwrap().unwrap(), 0);
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn finished_pipe_closes_link() {
        let (writer, source) = duplex(64);
        let (destination, _reader) = duplex(64);
        let link = PipeLink::default();

        drop(writer);
        pipe(destination, source, link.clone()).await.unwrap();
        assert!(link.is_closed());
    }

    #[tokio::test]
    async fn tunnel_relays_both_directions_in_order() {
        let (mut client, client_side) = duplex(1024);
        let (upstream_side, mut upstream) = duplex(1024);
        let tunnel = Tunnel::spawn(client_side, upstream_side, None, ());

        client.write_all(b"\x16\x03\x01 client hello").await.unwrap();
        let mut buf = [0u8; 16];
        upstream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"\x16\x03\x01 client hello");

        upstream.write_all(b"server hello").await.unwrap();
        let mut buf = [0u8; 12];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"server hello");

        drop(client);
        let (sent, received) = tunnel.join().await;
        assert_eq!(sent.unwrap(), 16);
        assert_eq!(received.unwrap(), 12);

        let mut rest = Vec::new();
        upstream.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn closing_upstream_closes_client() {
        let (mut client, client_side) = duplex(64);
        let (upstream_side, upstream) = duplex(64);
        let tunnel = Tunnel::spawn(client_side, upstream_side, None, ());

        drop(upstream);
        let mut out = Vec::new();
        client.read_to_end(&mut out).await.unwrap();
        assert!(out.is_empty());
        tunnel.join().await;
    }

    #[tokio::test]
    async fn guard_released_after_both_directions() {
        struct Flag(Arc<AtomicBool>);
        impl Drop for Flag {
            fn drop(&mut self) {
                self.0.store(true, Ordering::SeqCst);
            }
        }

        let dropped = Arc::new(AtomicBool::new(false));
        let (client, client_side) = duplex(64);
        let (upstream_side, _upstream) = duplex(64);
        let tunnel = Tunnel::spawn(client_side, upstream_side, None, Flag(dropped.clone()));

        assert!(!dropped.load(Ordering::SeqCst));
        drop(client);
        tunnel.join().await;
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_tunnel_times_out() {
        let (_client, client_side) = duplex(64);
        let (upstream_side, _upstream) = duplex(64);
        let tunnel = Tunnel::spawn(client_side, upstream_side, Some(Duration::from_secs(5)), ());

        let (sent, received) = tunnel.join().await;
        let timed_out = [sent, received]
            .into_iter()
            .any(|r| matches!(r, Err(e) if e.kind() == io::ErrorKind::TimedOut));
        assert!(timed_out);
    }
}
