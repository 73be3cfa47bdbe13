//! HTTP server setup and connection dispatch.
//!
//! # Responsibilities
//! - Accept connections with backpressure and track them for shutdown
//! - Peek the first request head of each connection
//! - CONNECT: take the socket over, acknowledge when the gateway owns the
//!   handshake, and hand it to a tunnel
//! - Everything else: serve HTTP/1.1 with keep-alive through an Axum
//!   `Router` wrapped in `TraceLayer`
//! - Stop accepting on shutdown and drain within the grace period
//!
//! # Design Decisions
//! - The takeover decision is made before hyper sees the connection, so
//!   the gateway fully controls what status line (if any) precedes tunnel
//!   bytes
//! - A CONNECT arriving later on a keep-alive connection is answered by
//!   hyper and the socket is handed over through its upgrade mechanism
//! - hyper writes its own status line before an upgrade, so an HTTP-proxy
//!   winner cannot be tunneled there and gets 500

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::State;
use axum::http::{Method, Request, Response, StatusCode};
use axum::{Extension, Router};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;
use tower::ServiceExt;
use tower_http::trace::TraceLayer;

use crate::config::GatewayConfig;
use crate::gateway::{ConnectTarget, Gateway, GatewayError};
use crate::http::request::{HeadError, RequestHead};
use crate::http::response;
use crate::lifecycle::ShutdownSignal;
use crate::net::{
    ConnectionGuard, ConnectionPermit, ConnectionTracker, Listener, PeekedConn, Prebuffered, Tunnel,
};
use crate::observability::metrics;

/// Pause after a failed accept (e.g. out of file descriptors).
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// hyper refuses read buffers smaller than this.
const MIN_HYPER_BUF: usize = 8 * 1024;

/// The gateway's front door.
pub struct HttpServer {
    handler: Arc<ConnectionHandler>,
    tracker: ConnectionTracker,
    shutdown_grace: Duration,
}

struct ConnectionHandler {
    gateway: Gateway,
    router: Router,
    max_header_bytes: usize,
}

/// A connection slot, held for as long as the connection or its tunnel lives.
///
/// Shared once hyper serves the connection, since a tunnel upgraded from a
/// later request outlives the hyper task.
struct Slot {
    peer: SocketAddr,
    guard: ConnectionGuard,
    _permit: ConnectionPermit,
}

impl HttpServer {
    pub fn new(gateway: Gateway, config: &GatewayConfig) -> Self {
        let router = build_router(gateway.clone());
        Self {
            handler: Arc::new(ConnectionHandler {
                gateway,
                router,
                max_header_bytes: config.limits.max_header_bytes,
            }),
            tracker: ConnectionTracker::new(),
            shutdown_grace: config.timeouts.shutdown_grace(),
        }
    }

    /// Serves `listener` until `shutdown` fires, then drains.
    pub async fn run(self, listener: Listener, shutdown: ShutdownSignal) {
        match listener.local_addr() {
            Ok(addr) => tracing::info!(address = %addr, "HTTP server starting"),
            Err(e) => tracing::warn!(error = %e, "HTTP server starting on unknown address"),
        }

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer, permit)) => {
                        let slot = Slot {
                            peer,
                            guard: self.tracker.track(),
                            _permit: permit,
                        };
                        let handler = Arc::clone(&self.handler);
                        let shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            handler.serve(stream, slot, shutdown).await;
                        });
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Accept failed");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
                _ = shutdown.recv() => break,
            }
        }

        drop(listener);
        tracing::info!(
            active = self.tracker.active_count(),
            grace = ?self.shutdown_grace,
            "Listener closed, draining connections"
        );

        if tokio::time::timeout(self.shutdown_grace, self.tracker.wait_idle())
            .await
            .is_err()
        {
            tracing::warn!(
                remaining = self.tracker.active_count(),
                "Grace period elapsed, abandoning open connections"
            );
        }

        tracing::info!("HTTP server stopped");
    }
}

impl ConnectionHandler {
    async fn serve(&self, stream: TcpStream, slot: Slot, shutdown: ShutdownSignal) {
        let mut reader = Prebuffered::new(stream, self.max_header_bytes);

        let head = match RequestHead::peek(&mut reader).await {
            Ok(Some(head)) => head,
            Ok(None) => return,
            Err(e) => {
                tracing::debug!(peer = %slot.peer, error = %e, "Rejecting unreadable request");
                let status = match &e {
                    HeadError::TooLarge(_) => StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE,
                    HeadError::Io(_) | HeadError::Truncated => return,
                    _ => StatusCode::BAD_REQUEST,
                };
                let (_, mut stream) = reader.into_parts();
                let _ = response::write_status(&mut stream, status, &e.to_string()).await;
                return;
            }
        };

        if head.is_connect() {
            reader.discard(head.len);
            self.serve_connect(&head.target, reader.into_peeked(), slot).await;
        } else {
            self.serve_http(reader.into_peeked(), slot, shutdown).await;
        }
    }

    /// Routes a CONNECT on a connection the gateway owns outright.
    async fn serve_connect(&self, target: &str, mut client: PeekedConn<TcpStream>, slot: Slot) {
        let start = Instant::now();
        let peer = slot.peer;

        let target = match ConnectTarget::parse(target) {
            Ok(target) => target,
            Err(e) => {
                tracing::warn!(peer = %peer, error = %e, "Rejecting CONNECT");
                metrics::record_request("connect", e.outcome(), start);
                let _ = response::write_error(&mut client, &e).await;
                return;
            }
        };

        let (candidate, upstream) = match self.gateway.establish(&target, start).await {
            Ok(established) => established,
            Err(e) => {
                let _ = response::write_error(&mut client, &e).await;
                return;
            }
        };

        if candidate.capability().acknowledges_connect() {
            if let Err(e) = response::write_established(&mut client).await {
                // Dropping `upstream` here closes it.
                tracing::warn!(
                    peer = %peer,
                    target = %target.addr(),
                    error = %e,
                    "Client gone before tunnel start"
                );
                return;
            }
        }

        metrics::record_request("connect", "established", start);
        let guard = TunnelGuard::new(Arc::new(slot), target.addr());
        // Detached: the tunnel tears itself down when either side ends.
        let _ = Tunnel::spawn(client, upstream, self.gateway.tunnel_idle(), guard);

        tracing::info!(
            peer = %peer,
            target = %target.addr(),
            candidate = %candidate,
            "Tunnel established"
        );
    }

    /// Serves the connection with hyper, the first request replayed from
    /// the peek buffer.
    async fn serve_http(&self, client: PeekedConn<TcpStream>, slot: Slot, shutdown: ShutdownSignal) {
        let slot = Arc::new(slot);
        let peer = slot.peer;
        let router = self.router.clone();
        let request_slot = Arc::clone(&slot);
        let service = hyper::service::service_fn(move |mut request: Request<Incoming>| {
            request.extensions_mut().insert(Arc::clone(&request_slot));
            router.clone().oneshot(request)
        });

        let conn = http1::Builder::new()
            .keep_alive(true)
            .max_buf_size(self.max_header_bytes.max(MIN_HYPER_BUF))
            .serve_connection(TokioIo::new(client), service)
            .with_upgrades();
        let mut conn = std::pin::pin!(conn);

        let mut draining = false;
        loop {
            tokio::select! {
                result = conn.as_mut() => {
                    if let Err(e) = result {
                        tracing::debug!(peer = %peer, connection = %slot.guard.id(), error = %e, "Connection ended with error");
                    }
                    break;
                }
                _ = shutdown.recv(), if !draining => {
                    draining = true;
                    conn.as_mut().graceful_shutdown();
                }
            }
        }
    }
}

/// Keeps the connection slot for the tunnel's lifetime.
struct TunnelGuard {
    slot: Arc<Slot>,
    target: String,
    opened: Instant,
}

impl TunnelGuard {
    fn new(slot: Arc<Slot>, target: String) -> Self {
        metrics::tunnel_opened();
        Self {
            slot,
            target,
            opened: Instant::now(),
        }
    }
}

impl Drop for TunnelGuard {
    fn drop(&mut self) {
        metrics::tunnel_closed();
        tracing::debug!(
            peer = %self.slot.peer,
            target = %self.target,
            connection = %self.slot.guard.id(),
            duration = ?self.opened.elapsed(),
            "Tunnel closed"
        );
    }
}

fn build_router(gateway: Gateway) -> Router {
    Router::new()
        .fallback(proxy_handler)
        .with_state(gateway)
        .layer(TraceLayer::new_for_http())
}

/// Handles every request hyper parses.
async fn proxy_handler(
    State(gateway): State<Gateway>,
    Extension(slot): Extension<Arc<Slot>>,
    request: Request<Body>,
) -> Response<Body> {
    if request.method() == Method::CONNECT {
        return connect_with_upgrade(&gateway, slot, request).await;
    }

    match gateway.forward(request).await {
        Ok(response) => response,
        Err(e) => response::error_response(&e),
    }
}

/// A CONNECT on a hyper-served connection: route and dial as usual, answer
/// 200 and take the socket over once hyper hands it out.
async fn connect_with_upgrade(gateway: &Gateway, slot: Arc<Slot>, request: Request<Body>) -> Response<Body> {
    let start = Instant::now();
    let peer = slot.peer;
    let uri = request.uri();
    let target = uri
        .authority()
        .map(|authority| authority.to_string())
        .unwrap_or_else(|| uri.to_string());

    let target = match ConnectTarget::parse(&target) {
        Ok(target) => target,
        Err(e) => {
            tracing::warn!(peer = %peer, error = %e, "Rejecting CONNECT");
            metrics::record_request("connect", e.outcome(), start);
            return response::error_response(&e);
        }
    };

    let (candidate, upstream) = match gateway.establish(&target, start).await {
        Ok(established) => established,
        Err(e) => return response::error_response(&e),
    };

    if !candidate.capability().acknowledges_connect() {
        drop(upstream);
        let err = GatewayError::TakeoverUnsupported;
        tracing::error!(
            peer = %peer,
            target = %target.addr(),
            candidate = %candidate,
            "CONNECT through an HTTP proxy needs a fresh connection"
        );
        metrics::record_request("connect", err.outcome(), start);
        return response::error_response(&err);
    }

    metrics::record_request("connect", "established", start);
    let idle = gateway.tunnel_idle();
    let addr = target.addr();
    tokio::spawn(async move {
        match hyper::upgrade::on(request).await {
            Ok(upgraded) => {
                let guard = TunnelGuard::new(slot, addr.clone());
                // Detached, as on a fresh connection.
                let _ = Tunnel::spawn(TokioIo::new(upgraded), upstream, idle, guard);
                tracing::info!(
                    peer = %peer,
                    target = %addr,
                    candidate = %candidate,
                    "Tunnel established"
                );
            }
            Err(e) => tracing::warn!(peer = %peer, target = %addr, error = %e, "Upgrade failed"),
        }
    });

    response::established_response()
}
