//! Holder for the active rule source.
//!
//! # Design Decisions
//! - A plain mutex around an `Arc`: readers clone the handle and release the
//!   lock before resolving, so a reload never waits on a routing decision
//! - The lock never leaves this type
//! - A poisoned lock still holds a fully-formed handle, so it is recovered

use std::sync::{Mutex, PoisonError};

use crate::routing::source::SharedSource;

/// The single active [`RoutingSource`](crate::routing::RoutingSource).
#[derive(Debug)]
pub struct RoutingTable {
    active: Mutex<SharedSource>,
}

impl RoutingTable {
    pub fn new(source: SharedSource) -> Self {
        Self {
            active: Mutex::new(source),
        }
    }

    /// Returns the active source. Callers resolve on the returned handle.
    pub fn current(&self) -> SharedSource {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Installs `source`, returning the one it replaced.
    pub fn replace(&self, source: SharedSource) -> SharedSource {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *active, source)
    }
}
