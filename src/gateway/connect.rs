//! CONNECT routing: resolve, then dial candidates in order.

use std::time::Instant;

use axum::http::uri::Authority;
use tokio::net::TcpStream;

use super::{exhausted, Gateway, GatewayError};
use crate::observability::metrics;
use crate::resilience::with_timeout;
use crate::upstream::Candidate;

const HTTPS_PORT: u16 = 443;

/// The `host:port` a CONNECT asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectTarget {
    host: String,
    port: u16,
}

impl ConnectTarget {
    /// Parses a CONNECT request target. A missing port means 443.
    pub fn parse(target: &str) -> Result<Self, GatewayError> {
        let bad = || GatewayError::BadTarget(target.to_string());
        let authority: Authority = target.parse().map_err(|_| bad())?;
        if authority.host().is_empty() || authority.as_str().contains('@') {
            return Err(bad());
        }
        Ok(Self {
            host: authority.host().to_string(),
            port: authority.port_u16().unwrap_or(HTTPS_PORT),
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// The lookup key handed to the rule source. The port is left out only
    /// when it is the HTTPS default.
    pub fn url(&self) -> String {
        if self.port == HTTPS_PORT {
            format!("https://{}/", self.host)
        } else {
            format!("https://{}:{}/", self.host, self.port)
        }
    }

    /// The address candidates dial.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Gateway {
    /// Resolves candidates for `target` and returns the first one that
    /// dials, together with its open stream.
    ///
    /// Failures are recorded here. On success the caller records the
    /// outcome, since it still decides whether the tunnel can start.
    pub async fn establish(
        &self,
        target: &ConnectTarget,
        start: Instant,
    ) -> Result<(Candidate, TcpStream), GatewayError> {
        let url = target.url();

        let result = self.dial_candidates(&url, &target.addr()).await;
        if let Err(e) = &result {
            tracing::error!(method = "CONNECT", url = %url, error = %e, "CONNECT failed");
            metrics::record_request("connect", e.outcome(), start);
        }
        result
    }

    async fn dial_candidates(
        &self,
        url: &str,
        addr: &str,
    ) -> Result<(Candidate, TcpStream), GatewayError> {
        let candidates = self.table.current().find_proxy(url)?;

        let mut last_error = None;
        for candidate in candidates {
            match with_timeout(self.dial_timeout, "dial", candidate.dial(addr)).await {
                Ok(stream) => return Ok((candidate, stream)),
                Err(e) => {
                    tracing::warn!(
                        url = %url,
                        candidate = %candidate,
                        error = %e,
                        "Dial failed, trying next candidate"
                    );
                    metrics::record_candidate_failure(candidate.capability().as_str());
                    last_error = Some(e);
                }
            }
        }

        Err(exhausted(last_error))
    }
}
