use crate::config::Config;
use crate::url::UrlFilter;
use crate::ConfigError;
use dashmap::DashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::{debug, info};

/// Shared state of one crawl session
///
/// Every worker of a session holds the same context (behind an `Arc`) and
/// passes it explicitly into fetch and enqueue calls.
#[derive(Debug)]
pub struct CrawlerContext {
    session_id: String,
    url_filter: UrlFilter,
    /// Host roots whose robots.txt has been requested this session
    robots_visited: DashSet<String>,
    sitemaps: Mutex<Vec<String>>,
    max_depth: Option<u32>,
    max_access_count: Option<u64>,
    access_count: AtomicU64,
}

impl CrawlerContext {
    /// Creates a context with an empty filter and no limits
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            url_filter: UrlFilter::new(),
            robots_visited: DashSet::new(),
            sitemaps: Mutex::new(Vec::new()),
            max_depth: None,
            max_access_count: None,
            access_count: AtomicU64::new(0),
        }
    }

    /// Creates a context seeded with the configured filter patterns and limits
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidPattern` if a filter pattern does not compile.
    pub fn from_config(session_id: impl Into<String>, config: &Config) -> Result<Self, ConfigError> {
        let context = Self {
            url_filter: UrlFilter::with_patterns(&config.filter.include, &config.filter.exclude)?,
            max_depth: config.crawler.max_depth,
            max_access_count: config.crawler.max_access_count,
            ..Self::new(session_id)
        };
        info!(
            "Session {} created ({} include / {} exclude patterns)",
            context.session_id,
            context.url_filter.include_count(),
            context.url_filter.exclude_count()
        );
        Ok(context)
    }

    pub fn with_max_depth(mut self, max_depth: Option<u32>) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_max_access_count(mut self, max_access_count: Option<u64>) -> Self {
        self.max_access_count = max_access_count;
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn url_filter(&self) -> &UrlFilter {
        &self.url_filter
    }

    /// Marks a host root as visited for robots.txt
    ///
    /// Returns true only for the first caller; concurrent callers racing on
    /// the same host observe `false` and must skip the fetch.
    pub fn mark_robots_visited(&self, host_root: &str) -> bool {
        self.robots_visited.insert(host_root.to_string())
    }

    pub fn is_robots_visited(&self, host_root: &str) -> bool {
        self.robots_visited.contains(host_root)
    }

    /// Records sitemap URLs announced by a robots.txt
    pub fn add_sitemaps<I>(&self, urls: I)
    where
        I: IntoIterator<Item = String>,
    {
        let mut sitemaps = self.sitemaps.lock().unwrap_or_else(|e| e.into_inner());
        for url in urls {
            debug!("Sitemap discovered: {}", url);
            sitemaps.push(url);
        }
    }

    /// Takes every sitemap URL recorded so far
    pub fn drain_sitemaps(&self) -> Vec<String> {
        let mut sitemaps = self.sitemaps.lock().unwrap_or_else(|e| e.into_inner());
        std::mem::take(&mut *sitemaps)
    }

    /// Returns true if an entry at `depth` may still be crawled
    pub fn is_within_depth(&self, depth: u32) -> bool {
        self.max_depth.map_or(true, |max| depth <= max)
    }

    /// Reserves one access against the session's access budget
    ///
    /// Returns false once `max_access_count` fetches have been reserved.
    pub fn try_acquire_access(&self) -> bool {
        match self.max_access_count {
            None => {
                self.access_count.fetch_add(1, Ordering::SeqCst);
                true
            }
            Some(max) => self
                .access_count
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |count| {
                    (count < max).then_some(count + 1)
                })
                .is_ok(),
        }
    }

    /// Returns true once the access budget is used up
    pub fn is_access_limit_reached(&self) -> bool {
        self.max_access_count
            .map_or(false, |max| self.access_count() >= max)
    }

    pub fn access_count(&self) -> u64 {
        self.access_count.load(Ordering::SeqCst)
    }
}
