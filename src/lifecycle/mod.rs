//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load rules → Metrics endpoint → Bind listener → Reload loop → Serve
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Drain connections and tunnels → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered shutdown: stop accept, stop reloads, drain, close
//! - Draining has a deadline: remaining connections are dropped after it

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::{Shutdown, ShutdownSignal};
pub use signals::wait_for_signal;
pub use startup::{start, Running, StartupError};
