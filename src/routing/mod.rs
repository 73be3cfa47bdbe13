//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     Origin (path or http(s) URL)
//!     → rules.rs RuleLoader::load (fetch + parse + compile)
//!     → table.rs RoutingTable::new
//!
//! Per request:
//!     RoutingTable::current() (lock, clone handle, unlock)
//!     → RoutingSource::find_proxy(url)
//!     → matcher.rs (first matching rule, else default)
//!     → ordered candidate list
//!
//! Every refresh period (reload.rs):
//!     RuleLoader::load → fingerprint differs? → RoutingTable::replace
//! ```
//!
//! # Design Decisions
//! - The gateway depends only on the `RoutingSource` / `SourceLoader` traits
//! - Sources are compiled once per load and immutable afterwards
//! - First match wins, in document order

pub mod matcher;
pub mod reload;
pub mod rules;
pub mod source;
pub mod table;

pub use reload::{ReloadLoop, ReloadOutcome};
pub use rules::{RuleLoader, RuleSet};
pub use source::{LoadError, Origin, ResolveError, RoutingSource, SharedSource, SourceLoader};
pub use table::RoutingTable;
