//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the global `tracing` subscriber
//! - Pick pretty or JSON output from config
//!
//! # Design Decisions
//! - `RUST_LOG` wins over the configured level when set
//! - JSON format for production, pretty format for development

use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, ObservabilityConfig};

/// Installs the global subscriber. Fails if one is already installed.
pub fn init_logging(config: &ObservabilityConfig) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_directives(&config.log_level).into());
    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
        LogFormat::Pretty => registry.with(fmt::layer()).try_init(),
    }
}

fn default_directives(level: &str) -> String {
    format!("pac_gateway={level},tower_http={level}")
}
