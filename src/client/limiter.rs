//! Connection limits shared by all workers
//!
//! The HTTP pool itself is owned by reqwest; these semaphores cap how many
//! exchanges may be open at once, in total and per route (host root).

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Held for the duration of one HTTP exchange
#[derive(Debug)]
pub struct ConnectionPermit {
    _route: OwnedSemaphorePermit,
    _total: OwnedSemaphorePermit,
}

#[derive(Debug)]
pub struct ConnectionLimiter {
    total: Arc<Semaphore>,
    per_route: DashMap<String, Arc<Semaphore>>,
    max_per_route: usize,
}

impl ConnectionLimiter {
    pub fn new(max_total: usize, max_per_route: usize) -> Self {
        Self {
            total: Arc::new(Semaphore::new(max_total)),
            per_route: DashMap::new(),
            max_per_route,
        }
    }

    /// Waits for a route slot, then for a global slot
    ///
    /// Returns `None` only if a semaphore was closed, which never happens
    /// while the limiter is alive.
    pub async fn acquire(&self, route: &str) -> Option<ConnectionPermit> {
        let route_semaphore = Arc::clone(
            self.per_route
                .entry(route.to_string())
                .or_insert_with(|| Arc::new(Semaphore::new(self.max_per_route)))
                .value(),
        );

        let route_permit = route_semaphore.acquire_owned().await.ok()?;
        let total_permit = Arc::clone(&self.total).acquire_owned().await.ok()?;
        Some(ConnectionPermit {
            _route: route_permit,
            _total: total_permit,
        })
    }

    pub fn available_total(&self) -> usize {
        self.total.available_permits()
    }

    pub fn available_for(&self, route: &str) -> usize {
        self.per_route
            .get(route)
            .map_or(self.max_per_route, |s| s.available_permits())
    }
}
