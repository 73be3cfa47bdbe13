//! Chaining through an upstream HTTP proxy.

use std::fmt;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use super::exchange::{ensure_host, send_request};
use super::{Capability, TransportError, Upstream};

/// An HTTP proxy at `addr` (`host:port`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpProxy {
    addr: String,
}

impl HttpProxy {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }
}

/// Request head asking an HTTP proxy to open a tunnel to `target`.
pub fn connect_request(target: &str) -> String {
    format!("CONNECT {target} HTTP/1.1\r\nHost: {target}\r\n\r\n")
}

#[async_trait]
impl Upstream for HttpProxy {
    fn capability(&self) -> Capability {
        Capability::HttpProxy
    }

    /// Sends the CONNECT head and returns the stream without reading the
    /// proxy's reply; the reply is relayed to the client as tunnel data.
    async fn dial(&self, addr: &str) -> Result<TcpStream, TransportError> {
        let mut stream = TcpStream::connect(&self.addr).await?;
        stream.write_all(connect_request(addr).as_bytes()).await?;
        Ok(stream)
    }

    async fn round_trip(&self, mut request: Request<Body>) -> Result<Response<Body>, TransportError> {
        if request.uri().authority().is_none() {
            return Err(TransportError::InvalidTarget(format!(
                "{}: proxy requests need an absolute URI",
                request.uri()
            )));
        }
        ensure_host(&mut request);
        let stream = TcpStream::connect(&self.addr).await?;
        send_request(stream, request).await
    }
}

impl fmt::Display for HttpProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PROXY {}", self.addr)
    }
}
