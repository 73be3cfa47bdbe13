//! SOCKS5 upstreams.

use std::fmt;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use tokio::net::TcpStream;
use tokio_socks::tcp::Socks5Stream;

use super::exchange::{into_origin_form, origin_address, send_request};
use super::{Capability, TransportError, Upstream};

/// A SOCKS5 proxy at `addr` (`host:port`). No authentication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Socks {
    addr: String,
}

impl Socks {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }
}

#[async_trait]
impl Upstream for Socks {
    fn capability(&self) -> Capability {
        Capability::Socks
    }

    async fn dial(&self, addr: &str) -> Result<TcpStream, TransportError> {
        let stream = Socks5Stream::connect(self.addr.as_str(), addr).await?;
        Ok(stream.into_inner())
    }

    async fn round_trip(&self, request: Request<Body>) -> Result<Response<Body>, TransportError> {
        let target = origin_address(request.uri())?;
        let stream = self.dial(&target).await?;
        send_request(stream, into_origin_form(request)).await
    }
}

impl fmt::Display for Socks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SOCKS5 {}", self.addr)
    }
}
