//! Storage module for queue entries and access results
//!
//! This module holds the records exchanged with persistence collaborators:
//! - `UrlQueueEntry`: a URL waiting in a session's queue
//! - `AccessResultRecord`: the write-once outcome of one fetch attempt
//! - `UrlQueueService` / `DataService`: the traits backends implement
//! - in-memory implementations and a SQLite `DataService`

mod memory;
mod schema;
mod sqlite;
mod traits;

pub use memory::{MemoryDataService, MemoryUrlQueueService};
pub use sqlite::{SessionRecord, SqliteDataService};
pub use traits::{DataService, StorageError, StorageResult, UrlQueueService};

use crate::client::RequestMethod;
use crate::state::{AccessStatus, FailureKind};
use chrono::{DateTime, Utc};

/// `meta_data` of entries whose body is a sitemap
pub const SITEMAP_META_DATA: &str = "sitemap";

/// A URL waiting to be fetched within a crawl session
#[derive(Debug, Clone, PartialEq)]
pub struct UrlQueueEntry {
    pub session_id: String,
    pub method: RequestMethod,
    pub url: String,
    pub parent_url: Option<String>,
    /// Hops from a seed URL (seeds have depth 0)
    pub depth: u32,
    pub meta_data: Option<String>,
    pub encoding: Option<String>,
    /// Modification time observed by a previous crawl, if any
    pub last_modified: Option<DateTime<Utc>>,
    pub create_time: DateTime<Utc>,
    /// Number of earlier failed attempts within this run
    pub retry_count: u32,
}

impl UrlQueueEntry {
    /// Creates a depth-0 entry for a seed URL
    pub fn seed(session_id: &str, url: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            method: RequestMethod::Get,
            url: url.to_string(),
            parent_url: None,
            depth: 0,
            meta_data: None,
            encoding: None,
            last_modified: None,
            create_time: Utc::now(),
            retry_count: 0,
        }
    }

    /// Creates an entry for a URL discovered on this entry's page
    pub fn child(&self, url: &str) -> Self {
        self.at_depth(url, self.depth + 1)
    }

    /// Creates an entry for a URL discovered on this entry's page at an explicit depth
    ///
    /// Redirect targets keep the depth of the redirecting entry.
    pub fn at_depth(&self, url: &str, depth: u32) -> Self {
        Self {
            session_id: self.session_id.clone(),
            method: RequestMethod::Get,
            url: url.to_string(),
            parent_url: Some(self.url.clone()),
            depth,
            meta_data: None,
            encoding: None,
            last_modified: None,
            create_time: Utc::now(),
            retry_count: 0,
        }
    }

    /// Marks the entry as a sitemap, routing its body to the sitemap transformer
    pub fn as_sitemap(mut self) -> Self {
        self.meta_data = Some(SITEMAP_META_DATA.to_string());
        self
    }

    pub fn is_sitemap(&self) -> bool {
        self.meta_data.as_deref() == Some(SITEMAP_META_DATA)
    }

    /// Creates the next attempt of a failed entry
    pub fn retry(&self) -> Self {
        Self {
            retry_count: self.retry_count + 1,
            create_time: Utc::now(),
            ..self.clone()
        }
    }
}

/// Extracted content kept with a successful access result
#[derive(Debug, Clone, PartialEq)]
pub struct AccessResultData {
    pub transformer_name: String,
    pub encoding: Option<String>,
    pub payload: Vec<u8>,
}

/// Outcome of one fetch attempt
///
/// Built once by the crawl worker and never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct AccessResultRecord {
    pub session_id: String,
    pub url: String,
    pub parent_url: Option<String>,
    pub depth: u32,
    /// Name of the transformer that handled the response
    pub rule_id: Option<String>,
    pub status: AccessStatus,
    pub http_status_code: Option<u16>,
    pub mime_type: Option<String>,
    pub content_length: Option<u64>,
    pub execution_time_ms: u64,
    pub last_modified: Option<DateTime<Utc>>,
    pub create_time: DateTime<Utc>,
    pub failure_kind: Option<FailureKind>,
    /// Rendered error chain of a failed attempt
    pub error_message: Option<String>,
    pub data: Option<AccessResultData>,
}

/// Status of a crawl session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Running,
    Completed,
    Interrupted,
    Failed,
}

impl SessionStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "interrupted" => Some(Self::Interrupted),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_status_roundtrip() {
        for status in &[
            SessionStatus::Running,
            SessionStatus::Completed,
            SessionStatus::Interrupted,
            SessionStatus::Failed,
        ] {
            let db_str = status.to_db_string();
            assert_eq!(Some(*status), SessionStatus::from_db_string(db_str));
        }
        assert_eq!(SessionStatus::from_db_string("invalid"), None);
    }

    #[test]
    fn test_child_depth() {
        let seed = UrlQueueEntry::seed("s1", "http://h/");
        assert_eq!(seed.depth, 0);
        assert!(seed.parent_url.is_none());

        let child = seed.child("http://h/a");
        assert_eq!(child.depth, 1);
        assert_eq!(child.parent_url.as_deref(), Some("http://h/"));
        assert_eq!(child.session_id, "s1");

        let grandchild = child.child("http://h/a/b");
        assert_eq!(grandchild.depth, 2);
    }

    #[test]
    fn test_redirect_keeps_depth() {
        let child = UrlQueueEntry::seed("s1", "http://h/").child("http://h/old");
        let target = child.at_depth("http://h/new", child.depth);
        assert_eq!(target.depth, 1);
        assert_eq!(target.parent_url.as_deref(), Some("http://h/old"));
    }

    #[test]
    fn test_retry_increments_count() {
        let entry = UrlQueueEntry::seed("s1", "http://h/");
        let retry = entry.retry().retry();
        assert_eq!(retry.retry_count, 2);
        assert_eq!(retry.url, entry.url);
        assert_eq!(retry.depth, entry.depth);
    }

    #[test]
    fn test_sitemap_marker_survives_retry() {
        let seed = UrlQueueEntry::seed("s1", "http://h/");
        assert!(!seed.is_sitemap());

        let sitemap = seed.child("http://h/sitemap.xml").as_sitemap();
        assert!(sitemap.is_sitemap());
        assert!(sitemap.retry().is_sitemap());
        assert!(!sitemap.child("http://h/page").is_sitemap());
    }
}
