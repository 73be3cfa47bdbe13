//! Startup orchestration.
//!
//! # Responsibilities
//! - Load the initial rule source
//! - Initialize subsystems in dependency order
//! - Start background tasks (metrics endpoint, rule reload)
//! - Bind the listener and begin accepting traffic
//!
//! # Design Decisions
//! - Fail fast: a rule source that does not load or a listener that does not
//!   bind is fatal
//! - A metrics endpoint that fails to start is logged and skipped
//! - The listener starts last (traffic only when ready)

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::config::GatewayConfig;
use crate::gateway::Gateway;
use crate::http::HttpServer;
use crate::lifecycle::Shutdown;
use crate::net::{Listener, ListenerError};
use crate::observability::metrics;
use crate::routing::{LoadError, Origin, ReloadLoop, RoutingTable, RuleLoader, SourceLoader};

/// Errors that stop the gateway from starting.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("initial rule load from {origin} failed: {source}")]
    Rules {
        origin: Origin,
        #[source]
        source: LoadError,
    },
    #[error(transparent)]
    Listener(#[from] ListenerError),
    #[error("listener has no local address: {0}")]
    LocalAddr(#[source] std::io::Error),
}

/// A started gateway.
#[derive(Debug)]
pub struct Running {
    pub local_addr: SocketAddr,
    pub table: Arc<RoutingTable>,
    server: JoinHandle<()>,
    reload: Option<JoinHandle<()>>,
}

impl Running {
    /// Waits for the server to drain and the reload loop to stop. Both end
    /// once `shutdown` is triggered.
    pub async fn wait(self) {
        if let Err(e) = self.server.await {
            tracing::error!(error = %e, "HTTP server task failed");
        }
        if let Some(reload) = self.reload {
            if let Err(e) = reload.await {
                tracing::error!(error = %e, "Rule reload task failed");
            }
        }
    }
}

/// Brings the gateway up and returns once it is accepting connections.
pub async fn start(config: &GatewayConfig, shutdown: &Shutdown) -> Result<Running, StartupError> {
    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics endpoint");
                }
            }
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let origin = Origin::parse(&config.rules.origin);
    let loader = Arc::new(RuleLoader::new(origin.clone()));
    let source = loader
        .load()
        .await
        .map_err(|source| StartupError::Rules { origin, source })?;
    tracing::info!(origin = %loader.origin(), "Rules loaded");

    let table = Arc::new(RoutingTable::new(source));
    let gateway = Gateway::new(Arc::clone(&table), config);

    let listener = Listener::bind(&config.listener).await?;
    let local_addr = listener.local_addr().map_err(StartupError::LocalAddr)?;

    let reload = config.rules.refresh().map(|period| {
        let reload = ReloadLoop::new(Arc::clone(&table), loader, period);
        tokio::spawn(reload.run(shutdown.subscribe()))
    });

    let server = HttpServer::new(gateway, config);
    let server = tokio::spawn(server.run(listener, shutdown.subscribe()));

    tracing::info!(
        address = %local_addr,
        origin = %config.rules.origin,
        refresh = ?config.rules.refresh(),
        "Gateway ready"
    );

    Ok(Running {
        local_addr,
        table,
        server,
        reload,
    })
}
