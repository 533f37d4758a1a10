//! Crawl worker loop
//!
//! Each worker independently polls the session queue, fetches the entry,
//! hands the captured response to the matching transformer on the blocking
//! pool, offers discovered URLs back to the queue and stores exactly one
//! access result per fetch attempt.

use super::SharedDataService;
use crate::client::{CapturedResponse, FetchClient};
use crate::config::Config;
use crate::session::{CrawlStats, CrawlerContext, PollResult, UrlQueueCoordinator};
use crate::state::{AccessStatus, FailureKind, UrlState};
use crate::storage::{AccessResultData, AccessResultRecord, UrlQueueEntry};
use crate::transformer::TransformerRegistry;
use crate::url::normalize_url;
use crate::{error_chain, CrawlerError, Result, TransformError};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// What a single [`CrawlWorker::step`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// An entry was fetched and its result stored
    Processed,
    /// An entry was dropped without fetching (invalid, too deep, filtered)
    Skipped,
    /// The queue is momentarily empty while other workers are busy
    Idle,
    /// The session has no more work or its access budget is used up
    Finished,
}

/// Tracks the state of the entry a worker is processing
struct Progress<'a> {
    url: &'a str,
    state: UrlState,
}

impl<'a> Progress<'a> {
    fn new(url: &'a str) -> Self {
        debug!("{}: {}", url, UrlState::Dequeued);
        Self {
            url,
            state: UrlState::Dequeued,
        }
    }

    fn advance(&mut self, next: UrlState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(CrawlerError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        debug!("{}: {} -> {}", self.url, self.state, next);
        self.state = next;
        Ok(())
    }
}

/// Response metadata kept for the access result once the body is consumed
struct ResponseSummary {
    http_status_code: u16,
    mime_type: String,
    content_length: Option<u64>,
    last_modified: DateTime<Utc>,
}

impl From<&CapturedResponse> for ResponseSummary {
    fn from(response: &CapturedResponse) -> Self {
        Self {
            http_status_code: response.http_status_code,
            mime_type: response.mime_type.clone(),
            content_length: response.content_length,
            last_modified: response.last_modified,
        }
    }
}

/// Failure kinds that are worth another attempt within the run
fn is_retryable(kind: FailureKind) -> bool {
    !matches!(kind, FailureKind::InvalidUrl | FailureKind::NoTransformer)
}

/// One member of a session's worker pool
pub struct CrawlWorker {
    id: usize,
    config: Arc<Config>,
    context: Arc<CrawlerContext>,
    queue: Arc<UrlQueueCoordinator>,
    client: Arc<FetchClient>,
    registry: Arc<TransformerRegistry>,
    data: SharedDataService,
    stats: Arc<CrawlStats>,
}

impl CrawlWorker {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: usize,
        config: Arc<Config>,
        context: Arc<CrawlerContext>,
        queue: Arc<UrlQueueCoordinator>,
        client: Arc<FetchClient>,
        registry: Arc<TransformerRegistry>,
        data: SharedDataService,
        stats: Arc<CrawlStats>,
    ) -> Self {
        Self {
            id,
            config,
            context,
            queue,
            client,
            registry,
            data,
            stats,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Runs steps until the session is finished
    ///
    /// # Returns
    ///
    /// * `Ok(u64)` - Number of entries this worker fetched
    /// * `Err(CrawlerError)` - The queue or data service failed
    pub async fn run(self) -> Result<u64> {
        info!("Worker {} started for session {}", self.id, self.context.session_id());
        let interval = Duration::from_millis(self.config.crawler.interval_ms);
        let wait_new_url = Duration::from_millis(self.config.crawler.wait_new_url_ms);

        let mut processed = 0;
        loop {
            match self.step().await? {
                StepOutcome::Processed => {
                    processed += 1;
                    if !interval.is_zero() {
                        tokio::time::sleep(interval).await;
                    }
                }
                StepOutcome::Skipped => {}
                StepOutcome::Idle => tokio::time::sleep(wait_new_url).await,
                StepOutcome::Finished => break,
            }
        }

        info!("Worker {} finished after {} URLs", self.id, processed);
        Ok(processed)
    }

    /// Takes one entry from the queue and processes it
    ///
    /// The entry stays in flight until its children and any sitemaps found
    /// on the way have been offered.
    pub async fn step(&self) -> Result<StepOutcome> {
        if self.context.is_access_limit_reached() {
            return Ok(StepOutcome::Finished);
        }

        let (entry, _in_flight) = match self.queue.poll(self.context.session_id())? {
            PollResult::Entry(entry, guard) => (entry, guard),
            PollResult::Wait => return Ok(StepOutcome::Idle),
            PollResult::Empty => return Ok(StepOutcome::Finished),
        };

        if !self.is_valid(&entry) {
            return Ok(StepOutcome::Skipped);
        }

        let outcome = self.process(&entry).await?;
        self.offer_sitemaps(&entry)?;
        Ok(outcome)
    }

    fn is_valid(&self, entry: &UrlQueueEntry) -> bool {
        if entry.url.trim().is_empty() {
            debug!("Skipping blank URL");
            return false;
        }
        if !self.context.is_within_depth(entry.depth) {
            debug!("Skipping {}: depth {} is over the limit", entry.url, entry.depth);
            return false;
        }
        if !self.context.url_filter().should_process(&entry.url) {
            debug!("Skipping {}: rejected by the URL filter", entry.url);
            return false;
        }
        true
    }

    async fn process(&self, entry: &UrlQueueEntry) -> Result<StepOutcome> {
        let started = Instant::now();
        let mut progress = Progress::new(&entry.url);

        if let Err(e) = self.client.check_robots_txt(&self.context, &entry.url).await {
            self.fail(entry, &mut progress, started, FailureKind::from(&e), error_chain(&e), None)?;
            return Ok(StepOutcome::Processed);
        }
        progress.advance(UrlState::RobotsChecked)?;

        if !self.context.url_filter().should_process(&entry.url) {
            info!("{} is disallowed by robots.txt", entry.url);
            return Ok(StepOutcome::Skipped);
        }
        if !self.context.try_acquire_access() {
            debug!("Access limit reached before {}", entry.url);
            return Ok(StepOutcome::Finished);
        }

        progress.advance(UrlState::Fetching)?;
        if let Some(since) = entry.last_modified {
            match self
                .client
                .check_not_modified(&self.context, &entry.url, since)
                .await
            {
                Ok(Some(response)) => {
                    progress.advance(UrlState::Stored)?;
                    let summary = ResponseSummary::from(&response);
                    let mut record =
                        self.new_record(entry, AccessStatus::NotModified, started, Some(&summary));
                    record.http_status_code = Some(304);
                    self.store(record)?;
                    return Ok(StepOutcome::Processed);
                }
                Ok(None) => {}
                Err(e) => debug!("Modification check of {} failed: {}", entry.url, e),
            }
        }

        let response = match self
            .client
            .fetch(&self.context, &entry.url, entry.method)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                self.fail(entry, &mut progress, started, FailureKind::from(&e), error_chain(&e), None)?;
                return Ok(StepOutcome::Processed);
            }
        };
        let summary = ResponseSummary::from(&response);

        if let Some(location) = &response.redirect_location {
            progress.advance(UrlState::Redirected)?;
            info!("{} redirects to {}", entry.url, location);
            self.offer_url(entry, location, entry.depth)?;

            let mut record = self.new_record(entry, AccessStatus::Redirect, started, Some(&summary));
            record.error_message = Some(format!("Redirect to {}", location));
            self.store(record)?;
            return Ok(StepOutcome::Processed);
        }

        if !response.is_success() {
            let message = format!("HTTP status {} for {}", summary.http_status_code, entry.url);
            self.fail(entry, &mut progress, started, FailureKind::HttpStatus, message, Some(&summary))?;
            return Ok(StepOutcome::Processed);
        }
        progress.advance(UrlState::Fetched)?;

        let transformer = if entry.is_sitemap() {
            self.registry.get("sitemap")
        } else {
            self.registry.find(&response.mime_type)
        };
        let Some(transformer) = transformer else {
            let message = format!("No transformer for {} ({})", summary.mime_type, entry.url);
            self.fail(entry, &mut progress, started, FailureKind::NoTransformer, message, Some(&summary))?;
            return Ok(StepOutcome::Processed);
        };

        progress.advance(UrlState::Transforming)?;
        let transformed = match tokio::task::spawn_blocking(move || transformer.transform(response)).await {
            Ok(result) => result,
            Err(e) => Err(TransformError::Join(e.to_string())),
        };
        let result = match transformed {
            Ok(result) => result,
            Err(e) => {
                self.fail(entry, &mut progress, started, FailureKind::from(&e), error_chain(&e), Some(&summary))?;
                return Ok(StepOutcome::Processed);
            }
        };

        let child_depth = entry.depth + 1;
        if self.context.is_within_depth(child_depth) {
            let mut queued = 0;
            for child in &result.child_urls {
                if self.offer_url(entry, child, child_depth)? {
                    queued += 1;
                }
            }
            for sitemap in &result.sitemap_urls {
                if self.offer_sitemap(entry, sitemap, child_depth)? {
                    queued += 1;
                }
            }
            self.stats.record_queued(queued);
            debug!(
                "{} of {} child URLs of {} queued",
                queued,
                result.child_urls.len() + result.sitemap_urls.len(),
                entry.url
            );
        }

        progress.advance(UrlState::Stored)?;
        let mut record = self.new_record(entry, AccessStatus::Success, started, Some(&summary));
        record.rule_id = Some(result.transformer_name.clone());
        record.data = Some(AccessResultData {
            transformer_name: result.transformer_name,
            encoding: result.encoding,
            payload: result.payload,
        });
        self.store(record)?;
        Ok(StepOutcome::Processed)
    }

    /// Normalizes, filters and offers a URL found while processing `entry`
    fn offer_url(&self, entry: &UrlQueueEntry, url: &str, depth: u32) -> Result<bool> {
        match self.accept(entry, url, depth) {
            Some(candidate) => Ok(self.queue.offer(candidate)?),
            None => Ok(false),
        }
    }

    /// Like [`Self::offer_url`], marking the new entry as a sitemap
    fn offer_sitemap(&self, entry: &UrlQueueEntry, url: &str, depth: u32) -> Result<bool> {
        match self.accept(entry, url, depth) {
            Some(candidate) => Ok(self.queue.offer(candidate.as_sitemap())?),
            None => Ok(false),
        }
    }

    fn accept(&self, entry: &UrlQueueEntry, url: &str, depth: u32) -> Option<UrlQueueEntry> {
        let Some(normalized) = normalize_url(url) else {
            debug!("Dropping unnormalizable URL {}", url);
            return None;
        };
        if !self.context.url_filter().should_process(&normalized) {
            debug!("Dropping {}: rejected by the URL filter", normalized);
            return None;
        }
        Some(entry.at_depth(&normalized, depth))
    }

    fn offer_sitemaps(&self, entry: &UrlQueueEntry) -> Result<()> {
        let sitemaps = self.context.drain_sitemaps();
        if sitemaps.is_empty() {
            return Ok(());
        }
        let depth = entry.depth + 1;
        if !self.context.is_within_depth(depth) {
            debug!("Dropping {} sitemaps beyond the depth limit", sitemaps.len());
            return Ok(());
        }
        for sitemap in sitemaps {
            if self.offer_sitemap(entry, &sitemap, depth)? {
                info!("Queued sitemap {}", sitemap);
            }
        }
        Ok(())
    }

    fn fail(
        &self,
        entry: &UrlQueueEntry,
        progress: &mut Progress<'_>,
        started: Instant,
        kind: FailureKind,
        message: String,
        response: Option<&ResponseSummary>,
    ) -> Result<()> {
        progress.advance(UrlState::Failed)?;
        warn!("Failed to crawl {} ({}): {}", entry.url, kind, message);

        let mut record = self.new_record(entry, AccessStatus::Failure, started, response);
        record.failure_kind = Some(kind);
        record.error_message = Some(message);
        self.store(record)?;

        if is_retryable(kind) && entry.retry_count < self.config.crawler.max_retries {
            self.queue.requeue(entry.retry())?;
        }
        Ok(())
    }

    fn new_record(
        &self,
        entry: &UrlQueueEntry,
        status: AccessStatus,
        started: Instant,
        response: Option<&ResponseSummary>,
    ) -> AccessResultRecord {
        AccessResultRecord {
            session_id: entry.session_id.clone(),
            url: entry.url.clone(),
            parent_url: entry.parent_url.clone(),
            depth: entry.depth,
            rule_id: None,
            status,
            http_status_code: response.map(|r| r.http_status_code),
            mime_type: response.map(|r| r.mime_type.clone()),
            content_length: response.and_then(|r| r.content_length),
            execution_time_ms: started.elapsed().as_millis() as u64,
            last_modified: response.map(|r| r.last_modified),
            create_time: Utc::now(),
            failure_kind: None,
            error_message: None,
            data: None,
        }
    }

    fn store(&self, record: AccessResultRecord) -> Result<()> {
        debug!(
            "Storing {} result for {} in {} ms",
            record.status, record.url, record.execution_time_ms
        );
        self.stats.record(record.status, record.failure_kind);
        let mut data = self.data.lock().unwrap_or_else(|e| e.into_inner());
        data.store(record)?;
        Ok(())
    }
}
