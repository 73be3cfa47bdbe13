//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! command line (cli.rs)
//!     → optional config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → CLI overrides (-p, -l, -r)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; only the rule source reloads at runtime
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod cli;
pub mod loader;
pub mod schema;
pub mod validation;

pub use cli::Cli;
pub use loader::{load_config, ConfigError};
pub use schema::{
    GatewayConfig, LimitsConfig, ListenerConfig, LogFormat, ObservabilityConfig, RulesConfig,
    TimeoutConfig,
};
pub use validation::{validate_config, ValidationError};
