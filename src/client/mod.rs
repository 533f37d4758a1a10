//! HTTP fetch client
//!
//! This module performs the HTTP side of a crawl:
//! - robots.txt fetch-and-apply, once per host and session
//! - GET/HEAD requests with redirects left to the caller
//! - basic auth, proxy, cookie policy and extra request headers
//! - streaming capture with spill-to-disk and per-mime size ceilings
//! - per-fetch deadlines through [`AccessTimeoutGuard`]

mod body;
mod credentials;
mod error;
mod fetch;
mod limiter;
mod timeout;

pub use body::{ResponseBody, SpillBuffer, TempBody};
pub use credentials::{parse_basic_realm, AuthScope, CredentialStore, Credentials};
pub use error::classify_reqwest_error;
pub use fetch::FetchClient;
pub use limiter::{ConnectionLimiter, ConnectionPermit};
pub use timeout::AccessTimeoutGuard;

use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use std::fmt;

/// HTTP method of a queue entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestMethod {
    Get,
    Head,
}

impl RequestMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "GET" => Some(Self::Get),
            "HEAD" => Some(Self::Head),
            _ => None,
        }
    }
}

impl fmt::Display for RequestMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<RequestMethod> for reqwest::Method {
    fn from(method: RequestMethod) -> Self {
        match method {
            RequestMethod::Get => reqwest::Method::GET,
            RequestMethod::Head => reqwest::Method::HEAD,
        }
    }
}

/// One captured HTTP response
///
/// Owned by exactly one consumer. A spilled body's temporary file is removed
/// when the response is dropped.
#[derive(Debug)]
pub struct CapturedResponse {
    pub url: String,
    pub method: RequestMethod,
    pub http_status_code: u16,
    /// Content-Type without parameters, lowercased
    pub mime_type: String,
    pub charset: Option<String>,
    pub headers: HeaderMap,
    /// Measured body length, or the header value when nothing was read
    pub content_length: Option<u64>,
    pub body: Option<ResponseBody>,
    pub last_modified: DateTime<Utc>,
    /// Absolute redirect target for 3xx responses
    pub redirect_location: Option<String>,
}

impl CapturedResponse {
    /// Builds the body-less response returned for a redirect
    pub fn redirect(url: &str, http_status_code: u16, location: String) -> Self {
        Self {
            url: url.to_string(),
            method: RequestMethod::Get,
            http_status_code,
            mime_type: String::new(),
            charset: None,
            headers: HeaderMap::new(),
            content_length: None,
            body: None,
            last_modified: Utc::now(),
            redirect_location: Some(location),
        }
    }

    pub fn is_redirect(&self) -> bool {
        self.redirect_location.is_some()
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.http_status_code)
    }

    /// Returns the first value of a header as text
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Reads the complete body (blocking for spilled bodies)
    pub fn body_bytes(&self) -> crate::TransformResult<Vec<u8>> {
        let body = self
            .body
            .as_ref()
            .ok_or_else(|| crate::TransformError::NoBody(self.url.clone()))?;
        body.to_bytes().map_err(|source| crate::TransformError::Read {
            url: self.url.clone(),
            source,
        })
    }
}

/// Splits a Content-Type value into its lowercased mime type and charset
///
/// # Examples
///
/// ```
/// use sumi_crawler::client::parse_content_type;
///
/// let (mime, charset) = parse_content_type("text/html; charset=Shift_JIS");
/// assert_eq!(mime, "text/html");
/// assert_eq!(charset.as_deref(), Some("Shift_JIS"));
/// ```
pub fn parse_content_type(value: &str) -> (String, Option<String>) {
    let mut parts = value.split(';');
    let mime = parts
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    let charset = parts.find_map(|param| {
        let (key, value) = param.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches('"').to_string())
            .filter(|v| !v.is_empty())
    });
    (mime, charset)
}

/// Resolves the mime type of a response, falling back to `default_mime_type`
///
/// A missing or empty Content-Type falls back, and so does
/// `application/octet-stream` carrying parameters, which servers commonly
/// send for content they could not classify.
pub fn resolve_mime_type(content_type: Option<&str>, default_mime_type: &str) -> (String, Option<String>) {
    let Some(value) = content_type.map(str::trim).filter(|v| !v.is_empty()) else {
        return (default_mime_type.to_string(), None);
    };
    let (mime, charset) = parse_content_type(value);
    if mime.is_empty() || (mime == "application/octet-stream" && value.contains(';')) {
        return (default_mime_type.to_string(), charset);
    }
    (mime, charset)
}

/// Parses an HTTP date, e.g. a `Last-Modified` value
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
