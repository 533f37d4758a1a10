//! Per-session shared state
//!
//! - `CrawlerContext`: URL filter, robots.txt bookkeeping, sitemaps and limits
//! - `UrlQueueCoordinator`: deduplicating queue access shared by all workers
//! - `CrawlStats`: outcome counters reported at the end of a session

mod context;
mod coordinator;
mod stats;

pub use context::CrawlerContext;
pub use coordinator::{InFlightGuard, PollResult, UrlQueueCoordinator};
pub use stats::CrawlStats;

/// Generates a session id from the current time
pub fn generate_session_id() -> String {
    chrono::Utc::now().format("%Y%m%d%H%M%S%3f").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_session_id_is_numeric() {
        let id = generate_session_id();
        assert_eq!(id.len(), 17);
        assert!(id.chars().all(|c| c.is_ascii_digit()));
    }
}
