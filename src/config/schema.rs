//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files, and
//! every field has a default so an empty file (or no file) is valid.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::resilience::timeouts;

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct GatewayConfig {
    /// Listener configuration (bind address, connection limit).
    pub listener: ListenerConfig,

    /// Where routing rules come from and how often they are refreshed.
    pub rules: RulesConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Size limits applied to client requests.
    pub limits: LimitsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ListenerConfig {
    /// Bind address (e.g., "127.0.0.1:8080").
    pub bind_address: String,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8080".to_string(),
            max_connections: 10_000,
        }
    }
}

/// Rule source configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RulesConfig {
    /// Local path or `http(s)://` URL of the rule document.
    pub origin: String,

    /// Reload period in seconds. 0 disables reloading.
    pub refresh_secs: u64,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            origin: "wpad.dat".to_string(),
            refresh_secs: 0,
        }
    }
}

impl RulesConfig {
    pub fn refresh(&self) -> Option<Duration> {
        timeouts::from_secs(self.refresh_secs)
    }
}

/// Timeout configuration. A value of 0 disables that deadline.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct TimeoutConfig {
    /// Per-candidate dial timeout in seconds.
    pub dial_secs: u64,

    /// Per-candidate time to receive the upstream response head, in seconds.
    pub response_secs: u64,

    /// Tunnel idle timeout in seconds.
    pub tunnel_idle_secs: u64,

    /// How long shutdown waits for connections to drain, in seconds.
    pub shutdown_grace_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            dial_secs: 30,
            response_secs: 60,
            tunnel_idle_secs: 0,
            shutdown_grace_secs: 5,
        }
    }
}

impl TimeoutConfig {
    pub fn dial(&self) -> Option<Duration> {
        timeouts::from_secs(self.dial_secs)
    }

    pub fn response(&self) -> Option<Duration> {
        timeouts::from_secs(self.response_secs)
    }

    pub fn tunnel_idle(&self) -> Option<Duration> {
        timeouts::from_secs(self.tunnel_idle_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

/// Request size limits.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct LimitsConfig {
    /// Largest request head accepted, in bytes.
    pub max_header_bytes: usize,

    /// Largest request body buffered for forwarding, in bytes.
    pub max_body_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_header_bytes: 64 * 1024,
            max_body_bytes: 8 * 1024 * 1024,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable output for development.
    #[default]
    Pretty,
    /// One JSON object per line for log aggregation.
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` overrides it.
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
