//! Shutdown coordination for the gateway.

use tokio_util::sync::CancellationToken;

/// Coordinator for graceful shutdown.
///
/// Every long-running task holds a [`ShutdownSignal`]. Subscribing after the
/// trigger still observes it.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    token: CancellationToken,
}

impl Shutdown {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            token: self.token.clone(),
        }
    }

    /// Trigger the shutdown signal. Idempotent.
    pub fn trigger(&self) {
        self.token.cancel();
    }

    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// A task's view of the shutdown signal.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    token: CancellationToken,
}

impl ShutdownSignal {
    /// Completes once shutdown has been triggered.
    pub async fn recv(&self) {
        self.token.cancelled().await
    }

    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }
}
