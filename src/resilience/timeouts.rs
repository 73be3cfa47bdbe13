//! Timeout enforcement.
//!
//! # Responsibilities
//! - Bound each candidate dial by `dial_secs`
//! - Bound each round trip (until the response head arrives) by `response_secs`
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - A zero limit means "no deadline", configured as `None`
//! - A timeout is a candidate failure like any other, so failover moves on

use std::future::Future;
use std::time::Duration;

use crate::upstream::TransportError;

/// Runs `fut` under `limit`, turning expiry into [`TransportError::Timeout`].
pub async fn with_timeout<T, F>(
    limit: Option<Duration>,
    operation: &'static str,
    fut: F,
) -> Result<T, TransportError>
where
    F: Future<Output = Result<T, TransportError>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| TransportError::Timeout(operation, limit))?,
        None => fut.await,
    }
}

/// Converts a seconds setting where zero disables the deadline.
pub fn from_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}
