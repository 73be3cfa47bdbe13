//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → request.rs (peek first request head)
//!     → server.rs
//!         CONNECT  → take socket over → gateway::establish → response.rs
//!                    (ack or error line) → tunnel
//!         other    → hyper http1 → Axum fallback → gateway::forward
//!                    (headers.rs prunes hop-by-hop headers)
//!     → Send to client
//! ```

pub mod headers;
pub mod request;
pub mod response;
pub mod server;

pub use request::{HeadError, RequestHead};
pub use server::HttpServer;
