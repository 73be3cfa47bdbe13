//! Responses the gateway produces itself.
//!
//! # Responsibilities
//! - Write raw status responses on taken-over connections, where no HTTP
//!   server is left to do it
//! - Render [`GatewayError`]s as responses on hyper-served connections
//!
//! # Design Decisions
//! - Raw responses always close the connection
//! - Error bodies are plain text carrying the error message

use axum::body::Body;
use axum::http::{header, HeaderValue, Response, StatusCode};
use hyper::ext::ReasonPhrase;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::gateway::GatewayError;

const ESTABLISHED_REASON: &[u8] = b"Connection established";

/// Acknowledgement for a CONNECT answered by the gateway itself.
pub const CONNECTION_ESTABLISHED: &[u8] = b"HTTP/1.1 200 Connection established\r\n\r\n";

pub async fn write_established<W>(writer: &mut W) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(CONNECTION_ESTABLISHED).await?;
    writer.flush().await
}

/// Writes a complete `text/plain` response and flushes it.
pub async fn write_status<W>(writer: &mut W, status: StatusCode, message: &str) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let head = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        status.as_u16(),
        status.canonical_reason().unwrap_or(""),
        message.len(),
    );
    writer.write_all(head.as_bytes()).await?;
    writer.write_all(message.as_bytes()).await?;
    writer.flush().await
}

/// Writes `err` as a raw response.
pub async fn write_error<W>(writer: &mut W, err: &GatewayError) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    write_status(writer, err.status(), &err.to_string()).await
}

/// The same acknowledgement for hyper to send ahead of an upgrade.
pub fn established_response() -> Response<Body> {
    let mut response = Response::new(Body::empty());
    response
        .extensions_mut()
        .insert(ReasonPhrase::from_static(ESTABLISHED_REASON));
    response
}

/// Renders `err` for hyper to send.
pub fn error_response(err: &GatewayError) -> Response<Body> {
    let mut response = Response::new(Body::from(err.to_string()));
    *response.status_mut() = err.status();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    if matches!(err, GatewayError::TakeoverUnsupported) {
        headers.insert(header::CONNECTION, HeaderValue::from_static("close"));
    }
    response
}
