//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Candidate attempt:
//!     → timeouts.rs (dial or response deadline)
//!     → On failure: gateway moves to the next candidate in resolution order
//! ```
//!
//! # Design Decisions
//! - No retries of the same candidate and no backoff; the candidate list is
//!   the retry policy
//! - Deadlines are optional and configured per operation

pub mod timeouts;

pub use timeouts::with_timeout;
