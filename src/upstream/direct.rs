//! Direct connections to the target.

use std::fmt;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use tokio::net::TcpStream;

use super::exchange::{into_origin_form, origin_address, send_request};
use super::{Capability, TransportError, Upstream};

/// Connects to targets without an intermediary.
#[derive(Debug, Clone, Copy, Default)]
pub struct Direct;

#[async_trait]
impl Upstream for Direct {
    fn capability(&self) -> Capability {
        Capability::Direct
    }

    async fn dial(&self, addr: &str) -> Result<TcpStream, TransportError> {
        Ok(TcpStream::connect(addr).await?)
    }

    async fn round_trip(&self, request: Request<Body>) -> Result<Response<Body>, TransportError> {
        let addr = origin_address(request.uri())?;
        let stream = TcpStream::connect(&addr).await?;
        send_request(stream, into_origin_form(request)).await
    }
}

impl fmt::Display for Direct {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DIRECT")
    }
}
