//! Crawler module: session bootstrap and the worker pool
//!
//! A [`Crawler`] owns one crawl session. It builds the shared components
//! from the configuration, seeds the queue, runs `thread-count` workers
//! until the queue is drained and nothing is in flight, and reports the
//! aggregate counts of the session.

mod worker;

pub use worker::{CrawlWorker, StepOutcome};

use crate::client::FetchClient;
use crate::config::{validate, Config};
use crate::session::{generate_session_id, CrawlStats, CrawlerContext, UrlQueueCoordinator};
use crate::state::{AccessStatus, FailureKind};
use crate::storage::{
    DataService, MemoryDataService, MemoryUrlQueueService, SessionStatus, SqliteDataService,
    UrlQueueEntry, UrlQueueService,
};
use crate::transformer::TransformerRegistry;
use crate::{ConfigError, CrawlerError, Result};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Data service shared by all workers of a session
pub type SharedDataService = Arc<Mutex<Box<dyn DataService>>>;

/// Aggregate outcome of a finished session
#[derive(Debug, Clone)]
pub struct CrawlReport {
    pub session_id: String,
    pub success: u64,
    pub failure: u64,
    pub redirect: u64,
    pub not_modified: u64,
    pub child_urls_queued: u64,
    pub access_count: u64,
    pub failures_by_kind: HashMap<FailureKind, u64>,
    pub elapsed: Duration,
}

impl CrawlReport {
    fn from_stats(session_id: &str, stats: &CrawlStats, access_count: u64, elapsed: Duration) -> Self {
        Self {
            session_id: session_id.to_string(),
            success: stats.count(AccessStatus::Success),
            failure: stats.count(AccessStatus::Failure),
            redirect: stats.count(AccessStatus::Redirect),
            not_modified: stats.count(AccessStatus::NotModified),
            child_urls_queued: stats.child_urls_queued(),
            access_count,
            failures_by_kind: stats.failures_by_kind(),
            elapsed,
        }
    }

    /// Number of stored access results
    pub fn total(&self) -> u64 {
        self.success + self.failure + self.redirect + self.not_modified
    }
}

/// One crawl session with its worker pool
pub struct Crawler {
    config: Arc<Config>,
    config_hash: String,
    context: Arc<CrawlerContext>,
    queue: Arc<UrlQueueCoordinator>,
    client: Arc<FetchClient>,
    registry: Arc<TransformerRegistry>,
    data: SharedDataService,
    stats: Arc<CrawlStats>,
}

impl Crawler {
    /// Creates a session backed by the in-memory queue
    ///
    /// Access results go to SQLite when `output.database-path` is set and
    /// are kept in memory otherwise.
    ///
    /// # Arguments
    ///
    /// * `config` - Validated configuration
    /// * `config_hash` - Hash of the configuration file, stored with the session
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, no seed URL is
    /// configured, or a component cannot be built.
    pub fn new(config: Arc<Config>, config_hash: impl Into<String>) -> Result<Self> {
        let data: Box<dyn DataService> = match &config.output.database_path {
            Some(path) => {
                info!("Storing access results in {}", path);
                Box::new(SqliteDataService::new(Path::new(path))?)
            }
            None => Box::new(MemoryDataService::new()),
        };
        Self::with_services(
            config,
            config_hash,
            Box::new(MemoryUrlQueueService::new()),
            data,
        )
    }

    /// Creates a session on top of the given queue and data service
    ///
    /// # Errors
    ///
    /// Same as [`Crawler::new`].
    pub fn with_services(
        config: Arc<Config>,
        config_hash: impl Into<String>,
        queue: Box<dyn UrlQueueService>,
        data: Box<dyn DataService>,
    ) -> Result<Self> {
        validate(&config)?;
        if config.crawler.seeds.is_empty() {
            return Err(ConfigError::Validation("No seed URLs configured".to_string()).into());
        }

        let session_id = config
            .crawler
            .session_id
            .clone()
            .unwrap_or_else(generate_session_id);
        let context = Arc::new(CrawlerContext::from_config(session_id, &config)?);
        let queue = Arc::new(UrlQueueCoordinator::new(queue));
        let client = Arc::new(FetchClient::new(Arc::clone(&config))?);
        let registry = Arc::new(TransformerRegistry::from_config(&config)?);
        info!("Transformers: {}", registry.names().join(", "));

        let crawler = Self {
            config,
            config_hash: config_hash.into(),
            context,
            queue,
            client,
            registry,
            data: Arc::new(Mutex::new(data)),
            stats: Arc::new(CrawlStats::new()),
        };
        crawler.seed()?;
        Ok(crawler)
    }

    fn seed(&self) -> Result<()> {
        let session_id = self.context.session_id();
        let mut seeded = 0;
        for seed in &self.config.crawler.seeds {
            if self.queue.offer(UrlQueueEntry::seed(session_id, seed.trim()))? {
                seeded += 1;
            } else {
                warn!("Seed URL {} was not queued", seed);
            }
        }
        info!("Session {} seeded with {} URLs", session_id, seeded);
        Ok(())
    }

    pub fn session_id(&self) -> &str {
        self.context.session_id()
    }

    pub fn context(&self) -> &Arc<CrawlerContext> {
        &self.context
    }

    pub fn queue(&self) -> &Arc<UrlQueueCoordinator> {
        &self.queue
    }

    pub fn stats(&self) -> &Arc<CrawlStats> {
        &self.stats
    }

    pub fn data_service(&self) -> &SharedDataService {
        &self.data
    }

    /// Creates a worker sharing this session's components
    pub fn worker(&self, id: usize) -> CrawlWorker {
        CrawlWorker::new(
            id,
            Arc::clone(&self.config),
            Arc::clone(&self.context),
            Arc::clone(&self.queue),
            Arc::clone(&self.client),
            Arc::clone(&self.registry),
            Arc::clone(&self.data),
            Arc::clone(&self.stats),
        )
    }

    /// Runs the session to completion
    ///
    /// The session ends when the queue is empty and no worker has an entry
    /// in flight, or when the access budget is used up. One bad URL never
    /// ends the session; only queue or data service failures do. Entries
    /// left in the queue and the session's dedup index are released once
    /// the workers have stopped.
    ///
    /// # Errors
    ///
    /// Returns the first worker error; the session is then marked failed.
    pub async fn run(&self) -> Result<CrawlReport> {
        let started = Instant::now();
        let session_id = self.session_id().to_string();
        self.lock_data().begin_session(&session_id, &self.config_hash)?;
        info!(
            "Starting session {} with {} workers",
            session_id, self.config.crawler.thread_count
        );

        let handles: Vec<_> = (0..self.config.crawler.thread_count as usize)
            .map(|id| tokio::spawn(self.worker(id).run()))
            .collect();

        let mut first_error = None;
        for handle in handles {
            let outcome = match handle.await {
                Ok(result) => result,
                Err(e) => Err(CrawlerError::Worker(e.to_string())),
            };
            if let Err(e) = outcome {
                error!("Worker failed: {}", e);
                first_error.get_or_insert(e);
            }
        }

        if let Err(e) = self.queue.clear(&session_id) {
            error!("Could not clear the queue of session {}: {}", session_id, e);
            first_error.get_or_insert(e.into());
        }

        let status = if first_error.is_some() {
            SessionStatus::Failed
        } else {
            SessionStatus::Completed
        };
        self.lock_data().finish_session(&session_id, status)?;

        if let Some(e) = first_error {
            return Err(e);
        }

        let report = CrawlReport::from_stats(
            &session_id,
            &self.stats,
            self.context.access_count(),
            started.elapsed(),
        );
        info!(
            "Session {} finished: {} results in {:?}",
            session_id,
            report.total(),
            report.elapsed
        );
        Ok(report)
    }

    fn lock_data(&self) -> std::sync::MutexGuard<'_, Box<dyn DataService>> {
        self.data.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;

    fn create_test_config(seeds: &[&str]) -> Arc<Config> {
        let mut config = parse_config("[crawler]\nthread-count = 2\n").unwrap();
        config.crawler.seeds = seeds.iter().map(|s| s.to_string()).collect();
        config.crawler.session_id = Some("test-session".to_string());
        Arc::new(config)
    }

    #[test]
    fn test_new_requires_seeds() {
        let err = Crawler::new(create_test_config(&[]), "hash").err().unwrap();
        assert!(matches!(err, CrawlerError::Config(ConfigError::Validation(_))));
    }

    #[tokio::test]
    async fn test_new_seeds_queue() {
        let crawler = Crawler::new(
            create_test_config(&["http://h/", "http://h/#top", "http://h/other"]),
            "hash",
        )
        .unwrap();
        assert_eq!(crawler.session_id(), "test-session");
        assert_eq!(crawler.queue().pending("test-session").unwrap(), 2);
    }

    #[test]
    fn test_report_total() {
        let stats = CrawlStats::new();
        stats.record(AccessStatus::Success, None);
        stats.record(AccessStatus::Failure, Some(FailureKind::Socket));
        stats.record(AccessStatus::Redirect, None);
        let report = CrawlReport::from_stats("s", &stats, 3, Duration::from_secs(1));
        assert_eq!(report.total(), 3);
        assert_eq!(report.failures_by_kind.get(&FailureKind::Socket), Some(&1));
    }
}
