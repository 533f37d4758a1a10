//! Per-fetch deadline enforcement
//!
//! A guard owns a cancellation token and a timer task that cancels it when
//! the deadline passes. The fetch future is raced against the token, so an
//! expired fetch is dropped at its next await point, which closes the
//! underlying connection instead of letting the exchange finish in the
//! background.

use crate::{FetchError, FetchResult};
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Deadline of one fetch
///
/// The timer is aborted when the guard is dropped, so a finished fetch never
/// leaves a stale timer behind.
#[derive(Debug)]
pub struct AccessTimeoutGuard {
    timeout: Option<Duration>,
    token: CancellationToken,
    timer: Option<JoinHandle<()>>,
}

impl AccessTimeoutGuard {
    /// Starts the timer; `None` disables the deadline
    ///
    /// Must be called from within a tokio runtime when a timeout is given.
    pub fn start(timeout: Option<Duration>) -> Self {
        let token = CancellationToken::new();
        let timer = timeout.map(|timeout| {
            let token = token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                debug!("Access timeout of {:?} expired", timeout);
                token.cancel();
            })
        });
        Self {
            timeout,
            token,
            timer,
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_expired(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Runs `future` until it completes or the deadline passes
    ///
    /// # Errors
    ///
    /// Returns `FetchError::AccessTimeout` if the deadline passed first, and
    /// otherwise whatever `future` returned.
    pub async fn run<F, T>(&self, url: &str, future: F) -> FetchResult<T>
    where
        F: Future<Output = FetchResult<T>>,
    {
        let Some(timeout) = self.timeout else {
            return future.await;
        };

        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(FetchError::AccessTimeout {
                url: url.to_string(),
                timeout,
            }),
            result = future => result,
        }
    }

    /// Stops the timer
    pub fn stop(self) {}
}

impl Drop for AccessTimeoutGuard {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}
