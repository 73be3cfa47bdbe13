//! HTTP/1.1 exchange over a stream a candidate has already opened.

use axum::body::Body;
use axum::http::uri::{Scheme, Uri};
use axum::http::{header, HeaderValue, Request, Response};
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncWrite};

use super::TransportError;

/// Sends `request` over `io` and returns the response with a streaming body.
///
/// The connection driver runs in its own task and ends once the response
/// body has been consumed or dropped.
pub async fn send_request<S>(io: S, request: Request<Body>) -> Result<Response<Body>, TransportError>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(io)).await?;
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            tracing::debug!(error = %e, "upstream connection closed with error");
        }
    });

    let response = sender.send_request(request).await?;
    Ok(response.map(Body::new))
}

/// Returns the `host:port` an absolute `http` URI points at.
pub fn origin_address(uri: &Uri) -> Result<String, TransportError> {
    if uri.scheme() != Some(&Scheme::HTTP) {
        return Err(TransportError::InvalidTarget(format!(
            "{uri}: only http:// targets can be forwarded"
        )));
    }
    let authority = uri
        .authority()
        .ok_or_else(|| TransportError::InvalidTarget(format!("{uri}: missing host")))?;
    Ok(format!("{}:{}", authority.host(), authority.port_u16().unwrap_or(80)))
}

/// Sets `Host` from the URI authority when the client left it out.
pub fn ensure_host(request: &mut Request<Body>) {
    if request.headers().contains_key(header::HOST) {
        return;
    }
    let host = request
        .uri()
        .authority()
        .and_then(|authority| HeaderValue::from_str(authority.as_str()).ok());
    if let Some(host) = host {
        request.headers_mut().insert(header::HOST, host);
    }
}

/// Rewrites an absolute-form request into origin-form for a direct hop.
pub fn into_origin_form(mut request: Request<Body>) -> Request<Body> {
    ensure_host(&mut request);
    let path = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let origin: Uri = path.parse().unwrap_or_else(|_| Uri::from_static("/"));
    *request.uri_mut() = origin;
    request
}
