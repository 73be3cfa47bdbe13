//! Upstream candidates: the ways a request can leave the gateway.
//!
//! # Data Flow
//! ```text
//! rule source → "PROXY a:3128; SOCKS5 b:1080; DIRECT"
//!     → parse_proxy_list → [HttpProxy(a), Socks(b), Direct]
//!     → gateway tries each in order:
//!         CONNECT     → Upstream::dial(host:port)   → raw TcpStream
//!         other verbs → Upstream::round_trip(req)  → Response
//! ```
//!
//! # Design Decisions
//! - Candidates are immutable and hold no per-request state; rule sources
//!   build them once and hand out `Arc` clones
//! - Deadlines are applied by the caller, not by the transports

use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use tokio::net::TcpStream;

pub mod direct;
pub mod exchange;
pub mod http_proxy;
pub mod socks;

pub use direct::Direct;
pub use http_proxy::HttpProxy;
pub use socks::Socks;

/// How a candidate reaches its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Direct,
    HttpProxy,
    Socks,
}

impl Capability {
    /// Whether the gateway acknowledges a CONNECT itself.
    ///
    /// HTTP proxies answer the CONNECT they were sent during dial, and that
    /// answer reaches the client through the tunnel.
    pub fn acknowledges_connect(self) -> bool {
        matches!(self, Capability::Direct | Capability::Socks)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Capability::Direct => "direct",
            Capability::HttpProxy => "http",
            Capability::Socks => "socks",
        }
    }
}

/// Errors from dialing or exchanging through a candidate.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("{0}")]
    Io(#[from] io::Error),
    #[error("socks: {0}")]
    Socks(#[from] tokio_socks::Error),
    #[error("http: {0}")]
    Http(#[from] hyper::Error),
    #[error("invalid target: {0}")]
    InvalidTarget(String),
    #[error("{0} timed out after {1:?}")]
    Timeout(&'static str, Duration),
}

/// One upstream option for reaching a target.
#[async_trait]
pub trait Upstream: Send + Sync + fmt::Debug + fmt::Display {
    fn capability(&self) -> Capability;

    /// Opens a raw byte stream to `addr` (`host:port`) through this upstream.
    async fn dial(&self, addr: &str) -> Result<TcpStream, TransportError>;

    /// Performs one HTTP/1.1 exchange for an absolute-form request.
    async fn round_trip(&self, request: Request<Body>) -> Result<Response<Body>, TransportError>;
}

/// A shareable upstream handle, as produced by rule resolution.
pub type Candidate = Arc<dyn Upstream>;

/// Errors parsing a proxy list.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProxySpecError {
    #[error("unknown proxy type `{0}`")]
    UnknownType(String),
    #[error("`{0}` requires a host:port address")]
    MissingAddress(String),
    #[error("invalid proxy address `{0}`")]
    InvalidAddress(String),
}

/// Parses a PAC-style proxy list such as `PROXY a:3128; SOCKS5 b:1080; DIRECT`.
///
/// Keywords are case-insensitive and empty entries are skipped, so an empty
/// string yields an empty list.
pub fn parse_proxy_list(list: &str) -> Result<Vec<Candidate>, ProxySpecError> {
    list.split(';')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(parse_proxy_entry)
        .collect()
}

fn parse_proxy_entry(entry: &str) -> Result<Candidate, ProxySpecError> {
    let mut parts = entry.split_whitespace();
    let kind = parts.next().unwrap_or_default().to_ascii_uppercase();
    let addr = parts.next();

    if kind == "DIRECT" {
        return Ok(Arc::new(Direct));
    }

    let addr = addr.ok_or_else(|| ProxySpecError::MissingAddress(kind.clone()))?;
    validate_address(addr)?;

    match kind.as_str() {
        "PROXY" | "HTTP" => Ok(Arc::new(HttpProxy::new(addr))),
        "SOCKS" | "SOCKS5" => Ok(Arc::new(Socks::new(addr))),
        _ => Err(ProxySpecError::UnknownType(kind)),
    }
}

fn validate_address(addr: &str) -> Result<(), ProxySpecError> {
    let invalid = || ProxySpecError::InvalidAddress(addr.to_string());
    let authority: axum::http::uri::Authority = addr.parse().map_err(|_| invalid())?;
    if authority.host().is_empty() || authority.port_u16().is_none() {
        return Err(invalid());
    }
    Ok(())
}
