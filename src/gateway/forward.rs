//! Forwarding: resolve, sanitize, then round trip candidates in order.

use std::time::Instant;

use axum::body::Body;
use axum::http::{request, Request, Response};
use bytes::Bytes;
use http_body_util::{BodyExt, LengthLimitError, Limited};

use super::{exhausted, Gateway, GatewayError};
use crate::http::headers;
use crate::observability::metrics;
use crate::resilience::with_timeout;

impl Gateway {
    /// Forwards `request` through the first candidate that answers.
    ///
    /// Any upstream response, whatever its status, ends the failover. The
    /// body is streamed back; an error partway through can only be logged.
    pub async fn forward(&self, request: Request<Body>) -> Result<Response<Body>, GatewayError> {
        let start = Instant::now();
        let method = request.method().clone();
        let url = request.uri().to_string();

        let result = self.forward_candidates(&url, request).await;
        match &result {
            Ok(response) => {
                metrics::record_request("forward", "forwarded", start);
                tracing::debug!(method = %method, url = %url, status = %response.status(), "Relaying response");
            }
            Err(e) => {
                tracing::error!(method = %method, url = %url, error = %e, "Forward failed");
                metrics::record_request("forward", e.outcome(), start);
            }
        }
        result
    }

    async fn forward_candidates(
        &self,
        url: &str,
        request: Request<Body>,
    ) -> Result<Response<Body>, GatewayError> {
        let candidates = self.table.current().find_proxy(url)?;

        let (mut parts, body) = request.into_parts();
        headers::prune(&mut parts.headers);
        let body = self.buffer_body(body).await?;

        let mut last_error = None;
        for candidate in candidates {
            let attempt = rebuild(&parts, body.clone());
            match with_timeout(self.response_timeout, "round trip", candidate.round_trip(attempt)).await {
                Ok(response) => {
                    tracing::info!(
                        method = %parts.method,
                        url = %url,
                        candidate = %candidate,
                        status = %response.status(),
                        "Forwarded request"
                    );
                    let name = candidate.to_string();
                    return Ok(response.map(|body| relay_body(body, name)));
                }
                Err(e) => {
                    tracing::warn!(
                        url = %url,
                        candidate = %candidate,
                        error = %e,
                        "Round trip failed, trying next candidate"
                    );
                    metrics::record_candidate_failure(candidate.capability().as_str());
                    last_error = Some(e);
                }
            }
        }

        Err(exhausted(last_error))
    }

    /// Reads the whole body so it can be replayed to every candidate.
    async fn buffer_body(&self, body: Body) -> Result<Bytes, GatewayError> {
        match Limited::new(body, self.max_body_bytes).collect().await {
            Ok(collected) => Ok(collected.to_bytes()),
            Err(e) if e.is::<LengthLimitError>() => Err(GatewayError::BodyTooLarge(self.max_body_bytes)),
            Err(e) => Err(GatewayError::Body(e.to_string())),
        }
    }
}

/// Builds one attempt's request from the sanitized head and buffered body.
fn rebuild(parts: &request::Parts, body: Bytes) -> Request<Body> {
    let mut request = Request::new(Body::from(body));
    *request.method_mut() = parts.method.clone();
    *request.uri_mut() = parts.uri.clone();
    *request.version_mut() = parts.version;
    *request.headers_mut() = parts.headers.clone();
    request
}

/// Streams the upstream body, logging a failure that happens after the
/// status line has been committed.
fn relay_body(body: Body, candidate: String) -> Body {
    Body::new(body.map_err(move |e| {
        tracing::warn!(candidate = %candidate, error = %e, "Upstream body failed midstream");
        e
    }))
}
