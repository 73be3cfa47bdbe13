//! TCP listener implementation with backpressure.
//!
//! # Responsibilities
//! - Bind to the configured address
//! - Accept incoming TCP connections
//! - Enforce max_connections limit via semaphore

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::config::ListenerConfig;

/// Error type for listener operations.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error("invalid bind address `{0}`")]
    Address(String),
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to accept: {0}")]
    Accept(#[source] std::io::Error),
    #[error("connection limit closed")]
    Closed,
}

/// A bounded TCP listener that limits concurrent connections.
///
/// When `max_connections` slots are taken, `accept` waits for one to free
/// up before taking the next connection off the backlog.
#[derive(Debug)]
pub struct Listener {
    inner: TcpListener,
    connection_limit: Arc<Semaphore>,
}

impl Listener {
    /// Bind to the configured address with connection limits.
    pub async fn bind(config: &ListenerConfig) -> Result<Self, ListenerError> {
        let addr: SocketAddr = config
            .bind_address
            .parse()
            .map_err(|_| ListenerError::Address(config.bind_address.clone()))?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ListenerError::Bind { addr, source })?;

        let local_addr = listener
            .local_addr()
            .map_err(|source| ListenerError::Bind { addr, source })?;

        tracing::info!(
            address = %local_addr,
            max_connections = config.max_connections,
            "Listener bound"
        );

        Ok(Self {
            inner: listener,
            connection_limit: Arc::new(Semaphore::new(config.max_connections)),
        })
    }

    /// Accept a new connection, respecting the connection limit.
    ///
    /// Returns the stream and a permit that must be held for the
    /// connection's lifetime, tunnel included.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr, ConnectionPermit), ListenerError> {
        // Acquire permit first (backpressure)
        let permit = self
            .connection_limit
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ListenerError::Closed)?;

        let (stream, addr) = self.inner.accept().await.map_err(ListenerError::Accept)?;

        tracing::debug!(
            peer_addr = %addr,
            available_permits = self.connection_limit.available_permits(),
            "Connection accepted"
        );

        Ok((stream, addr, ConnectionPermit { _permit: permit }))
    }

    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.inner.local_addr()
    }

    pub fn available_permits(&self) -> usize {
        self.connection_limit.available_permits()
    }
}

/// A permit representing a connection slot.
///
/// When dropped, the slot is released back to the listener, even if the
/// connection task panicked.
#[derive(Debug)]
pub struct ConnectionPermit {
    _permit: OwnedSemaphorePermit,
}
