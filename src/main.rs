//! PAC-style forwarding gateway (v1)
//!
//! A local forward proxy built with Tokio, Hyper and Axum. Every request is
//! matched against a rule file that yields an ordered list of upstreams;
//! the gateway tries them in order until one answers.
//!
//! # Architecture Overview
//!
//! ```text
//!                              ┌──────────────────────────────────────────────────────┐
//!                              │                      GATEWAY                          │
//!                              │                                                       │
//!     Client Request           │  ┌─────────┐    ┌─────────┐    ┌──────────────┐      │
//!     ─────────────────────────┼─▶│   net   │───▶│  http   │───▶│   routing    │      │
//!                              │  │listener │    │ server  │    │    table     │      │
//!                              │  └─────────┘    └────┬────┘    └──────┬───────┘      │
//!                              │                      │                │ candidates   │
//!                              │             CONNECT  │                ▼              │
//!                              │              ┌───────┴──────┐  ┌──────────────┐      │
//!                              │              │ tunnel pipe  │◀─│   gateway    │      │
//!                              │              │ (net::pipe)  │  │  failover    │      │
//!                              │              └──────────────┘  └──────┬───────┘      │
//!                              │                                       ▼              │
//!     Client Response          │                               ┌──────────────┐      │
//!     ◀────────────────────────┼───────────────────────────────│   upstream   │◀─────┼──── DIRECT /
//!                              │                               │ direct/proxy │      │     PROXY /
//!                              │                               └──────────────┘      │     SOCKS
//!                              │                                                       │
//!                              │  ┌─────────────────────────────────────────────────┐ │
//!                              │  │              Cross-Cutting Concerns              │ │
//!                              │  │  config · observability · resilience · lifecycle │ │
//!                              │  └─────────────────────────────────────────────────┘ │
//!                              └──────────────────────────────────────────────────────┘
//! ```

use std::process::ExitCode;

use clap::Parser;

use pac_gateway::config::Cli;
use pac_gateway::lifecycle::{self, wait_for_signal, Shutdown};
use pac_gateway::observability::logging::init_logging;

#[tokio::main]
async fn main() -> ExitCode {
    let config = match Cli::parse().into_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("pac-gateway: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_logging(&config.observability) {
        eprintln!("pac-gateway: failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    tracing::info!("pac-gateway v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_connections = config.listener.max_connections,
        origin = %config.rules.origin,
        refresh_secs = config.rules.refresh_secs,
        dial_secs = config.timeouts.dial_secs,
        "Configuration loaded"
    );

    let shutdown = Shutdown::new();
    let running = match lifecycle::start(&config, &shutdown).await {
        Ok(running) => running,
        Err(e) => {
            tracing::error!(error = %e, "Gateway failed to start");
            return ExitCode::FAILURE;
        }
    };

    let trigger = shutdown.clone();
    tokio::spawn(async move {
        let signal = wait_for_signal().await;
        tracing::info!(signal, "Shutdown signal received");
        trigger.trigger();
    });

    running.wait().await;

    tracing::info!("Shutdown complete");
    ExitCode::SUCCESS
}
