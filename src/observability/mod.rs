//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events via `tracing`)
//!     → metrics.rs (counters, gauges, histograms via `metrics`)
//!
//! Consumers:
//!     → stdout (pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape), when enabled
//! ```
//!
//! # Design Decisions
//! - One outcome line per request; one WARN line per failed candidate
//! - Metrics are cheap (atomic increments) and off by default

pub mod logging;
pub mod metrics;

pub use logging::init_logging;
