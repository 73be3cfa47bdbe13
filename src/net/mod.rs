//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limits)
//!     → connection.rs (lifecycle tracking for shutdown drain)
//!     → peeked.rs (read ahead to the first request head)
//!     → Hand off to HTTP layer, or take the socket over for a tunnel
//!
//! Tunnel (pipe.rs):
//!     client ⇄ upstream, one task per direction, closing together
//! ```
//!
//! # Design Decisions
//! - Bounded accept prevents resource exhaustion
//! - Each connection and tunnel is tracked for graceful shutdown
//! - Bytes read ahead are never dropped: a taken-over socket replays them

pub mod connection;
pub mod listener;
pub mod peeked;
pub mod pipe;

pub use connection::{ConnectionGuard, ConnectionId, ConnectionTracker};
pub use listener::{ConnectionPermit, Listener, ListenerError};
pub use peeked::{PeekedConn, Prebuffered};
pub use pipe::{pipe, PipeLink, Tunnel};
