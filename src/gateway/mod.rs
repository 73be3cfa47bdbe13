//! Request router: picks candidates for each request and drives failover.
//!
//! # Data Flow
//! ```text
//! CONNECT host:port (connect.rs):
//!     ConnectTarget::parse → url "https://host[:port]/"
//!     → RoutingTable::current().find_proxy(url)
//!     → dial each candidate in order against host:port
//!     → first success: (candidate, upstream stream)
//!     → caller acknowledges (Direct/SOCKS only) and spawns the tunnel
//!
//! Any other method (forward.rs):
//!     → find_proxy(full URL) → prune hop-by-hop headers once
//!     → buffer body (bounded) → round trip each candidate in order
//!     → first response wins and is relayed as-is
//! ```
//!
//! # Design Decisions
//! - Candidates are tried strictly in resolution order, one at a time
//! - Every failed candidate logs one WARN line; the request's outcome logs
//!   one INFO (success) or ERROR (failure) line
//! - The routing table lock is held only to clone the active source

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;

use crate::config::GatewayConfig;
use crate::routing::{ResolveError, RoutingTable};
use crate::upstream::TransportError;

pub mod connect;
pub mod forward;

pub use connect::ConnectTarget;

/// Why a request could not be routed. Each variant maps to one status code.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("invalid CONNECT target `{0}`")]
    BadTarget(String),
    #[error("{0}")]
    Resolve(#[from] ResolveError),
    #[error("No Proxy Available")]
    NoCandidates,
    #[error("No Proxy Available: {0}")]
    Exhausted(#[source] TransportError),
    #[error("request body exceeds {0} bytes")]
    BodyTooLarge(usize),
    #[error("failed to read request body: {0}")]
    Body(String),
    #[error("Hijacking not supported")]
    TakeoverUnsupported,
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::BadTarget(_) | GatewayError::Body(_) => StatusCode::BAD_REQUEST,
            GatewayError::BodyTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::Resolve(_) | GatewayError::NoCandidates | GatewayError::Exhausted(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            GatewayError::TakeoverUnsupported => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Metric label for this failure.
    pub fn outcome(&self) -> &'static str {
        match self {
            GatewayError::BadTarget(_) | GatewayError::Body(_) | GatewayError::BodyTooLarge(_) => {
                "client_error"
            }
            GatewayError::Resolve(_) => "unresolved",
            GatewayError::NoCandidates | GatewayError::Exhausted(_) => "exhausted",
            GatewayError::TakeoverUnsupported => "unsupported",
        }
    }
}

/// Shared routing state and per-attempt limits.
#[derive(Debug, Clone)]
pub struct Gateway {
    table: Arc<RoutingTable>,
    dial_timeout: Option<Duration>,
    response_timeout: Option<Duration>,
    tunnel_idle: Option<Duration>,
    max_body_bytes: usize,
}

impl Gateway {
    pub fn new(table: Arc<RoutingTable>, config: &GatewayConfig) -> Self {
        Self {
            table,
            dial_timeout: config.timeouts.dial(),
            response_timeout: config.timeouts.response(),
            tunnel_idle: config.timeouts.tunnel_idle(),
            max_body_bytes: config.limits.max_body_bytes,
        }
    }

    pub fn table(&self) -> &Arc<RoutingTable> {
        &self.table
    }

    /// Idle limit for tunnels this gateway opens.
    pub fn tunnel_idle(&self) -> Option<Duration> {
        self.tunnel_idle
    }
}

/// Folds the attempt results into the error reported to the client.
fn exhausted(last_error: Option<TransportError>) -> GatewayError {
    match last_error {
        Some(e) => GatewayError::Exhausted(e),
        None => GatewayError::NoCandidates,
    }
}
