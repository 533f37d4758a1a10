//! Sumi-Crawler: the fetch → transform → enqueue core of a web crawler
//!
//! This crate fetches pages over HTTP while honoring robots.txt, bounds the
//! resources spent on every fetch (size, time, connections), extracts links and
//! structured content from the captured responses, and feeds discovered URLs
//! back into a per-session work queue shared by a pool of workers.

pub mod client;
pub mod config;
pub mod crawler;
pub mod output;
pub mod robots;
pub mod session;
pub mod state;
pub mod storage;
pub mod transformer;
pub mod url;

use std::time::Duration;
use thiserror::Error;

/// Main error type for Sumi-Crawler operations
///
/// Only fatal conditions surface through this type. Per-URL failures are
/// converted into failed access results by the crawl worker.
#[derive(Debug, Error)]
pub enum CrawlerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Invalid state transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: state::UrlState,
        to: state::UrlState,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Worker task failed: {0}")]
    Worker(String),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL: {0}")]
    MissingHost(String),
}

/// Recoverable failure raised while fetching a single URL
///
/// Every variant keeps the underlying cause so the worker can render the
/// complete chain into the access result.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("The url may not be valid: {url}")]
    InvalidUrl {
        url: String,
        #[source]
        source: ::url::ParseError,
    },

    #[error("Unknown host: {url}")]
    UnknownHost {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("No route to host: {url}")]
    NoRoute {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Connection failed: {url}")]
    Connection {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Socket error: {url}")]
    Socket {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP error for {url}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("I/O error while reading {url}")]
    Io {
        url: String,
        #[source]
        source: std::io::Error,
    },

    #[error("The content length ({length} byte) is over {max} byte. The url is {url}")]
    MaxLengthExceeded { url: String, length: u64, max: u64 },

    #[error("Access timeout ({timeout:?}) exceeded for {url}")]
    AccessTimeout { url: String, timeout: Duration },
}

/// Recoverable failure raised while transforming a captured response
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("No response body: {0}")]
    NoBody(String),

    #[error("Could not read response body of {url}")]
    Read {
        url: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not parse {url}: {message}")]
    Parse { url: String, message: String },

    #[error("Could not extract text from {url}: {message}")]
    Extraction { url: String, message: String },

    #[error("Could not store {path}")]
    Store {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Destination already exists: {0}")]
    AlreadyExists(String),

    #[error("Blocking transform task failed: {0}")]
    Join(String),
}

/// Result type alias for Sumi-Crawler operations
pub type Result<T> = std::result::Result<T, CrawlerError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

/// Result type alias for fetch operations
pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// Result type alias for transformer operations
pub type TransformResult<T> = std::result::Result<T, TransformError>;

/// Renders an error and all of its sources as a single line
///
/// # Examples
///
/// ```
/// use sumi_crawler::error_chain;
///
/// let err = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
/// assert_eq!(error_chain(&err), "disk full");
/// ```
pub fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut rendered = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let message = cause.to_string();
        if !rendered.contains(&message) {
            rendered.push_str(": ");
            rendered.push_str(&message);
        }
        source = cause.source();
    }
    rendered
}

// Re-export commonly used types
pub use client::{CapturedResponse, FetchClient};
pub use config::Config;
pub use crawler::{CrawlReport, Crawler};
pub use session::{CrawlerContext, UrlQueueCoordinator};
pub use state::{AccessStatus, FailureKind, UrlState};
pub use storage::{AccessResultRecord, DataService, UrlQueueEntry, UrlQueueService};
pub use transformer::{ResultData, Transformer, TransformerRegistry};
pub use url::{normalize_url, UrlFilter};
