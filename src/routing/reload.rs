//! Periodic rule reload.
//!
//! # Responsibilities
//! - Re-load the rule source from its origin on a fixed period
//! - Install it only when its fingerprint differs from the active one
//! - Keep serving the active source when a load fails
//!
//! # Design Decisions
//! - The first tick fires one period after start; the initial load happens
//!   during startup
//! - Fingerprints are compared only after a successful load
//! - Missed ticks are delayed rather than bursted, so a slow remote origin
//!   is never hammered
//! - The loop is cancelled by the shutdown signal, even mid-load

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::lifecycle::ShutdownSignal;
use crate::observability::metrics;
use crate::routing::source::SourceLoader;
use crate::routing::table::RoutingTable;

/// What one reload tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// The loaded source has the active fingerprint; it was discarded.
    Unchanged,
    /// A new source was installed.
    Reloaded,
    /// Loading failed; the active source stays.
    Failed,
}

impl ReloadOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            ReloadOutcome::Unchanged => "unchanged",
            ReloadOutcome::Reloaded => "reloaded",
            ReloadOutcome::Failed => "failed",
        }
    }
}

/// Background task that keeps a [`RoutingTable`] in step with its origin.
pub struct ReloadLoop {
    table: Arc<RoutingTable>,
    loader: Arc<dyn SourceLoader>,
    period: Duration,
}

impl ReloadLoop {
    pub fn new(table: Arc<RoutingTable>, loader: Arc<dyn SourceLoader>, period: Duration) -> Self {
        Self {
            table,
            loader,
            period,
        }
    }

    /// Loads once and installs the result if it changed.
    pub async fn reload_once(&self) -> ReloadOutcome {
        let origin = self.loader.origin();

        let outcome = match self.loader.load().await {
            Err(e) => {
                tracing::error!(origin = %origin, error = %e, "Rule reload failed, keeping active rules");
                ReloadOutcome::Failed
            }
            Ok(loaded) => {
                if loaded.fingerprint() == self.table.current().fingerprint() {
                    tracing::debug!(origin = %origin, "Rule source unchanged");
                    ReloadOutcome::Unchanged
                } else {
                    self.table.replace(loaded);
                    tracing::info!(origin = %origin, "Rule reload succeeded");
                    ReloadOutcome::Reloaded
                }
            }
        };

        metrics::record_reload(outcome.as_str());
        outcome
    }

    /// Runs until `shutdown` fires.
    pub async fn run(self, shutdown: ShutdownSignal) {
        if self.period.is_zero() {
            return;
        }

        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            origin = %self.loader.origin(),
            period = ?self.period,
            "Rule reload loop started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.recv() => break,
            }
            tokio::select! {
                _ = self.reload_once() => {}
                _ = shutdown.recv() => break,
            }
        }

        tracing::info!("Rule reload loop stopped");
    }
}
