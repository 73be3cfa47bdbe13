//! OS signal handling.
//!
//! # Responsibilities
//! - Wait for SIGINT (Ctrl+C) or SIGTERM
//! - Report which one arrived so the caller can log it
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - A handler that fails to register is logged and treated as never firing,
//!   so the other one still works
//! - Non-Unix platforms only get Ctrl+C

/// Waits for a termination signal and returns its name.
pub async fn wait_for_signal() -> &'static str {
    tokio::select! {
        _ = ctrl_c() => "SIGINT",
        _ = sigterm() => "SIGTERM",
    }
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
}

#[cfg(unix)]
async fn sigterm() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to register SIGTERM handler");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn sigterm() {
    std::future::pending::<()>().await
}
