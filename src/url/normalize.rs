use crate::UrlError;
use url::Url;

/// Schemes that never lead to a crawlable document
const INVALID_SCHEMES: &[&str] = &[
    "javascript:",
    "mailto:",
    "irc:",
    "skype:",
    "about:",
    "fscommand:",
    "aim:",
    "msnim:",
    "news:",
    "tel:",
    "unsaved:",
    "data:",
    "android-app:",
    "ios-app:",
    "callto:",
];

/// Session identifier marker appended to paths by some servlet containers
const SESSION_ID_MARKER: &str = ";jsessionid";

/// Normalizes a URL string before it is queued or compared
///
/// # Normalization Steps
///
/// 1. Trim surrounding whitespace
/// 2. Drop the fragment (everything from the first `#`)
/// 3. Drop a `;jsessionid` path parameter and everything after it
/// 4. Reject the URL if it still contains a `/../` segment or a space
///
/// The check is purely textual; no percent-decoding or host rewriting takes place.
///
/// # Arguments
///
/// * `url` - The URL string to normalize
///
/// # Returns
///
/// * `Some(String)` - Normalized URL
/// * `None` - The URL must not be crawled
///
/// # Examples
///
/// ```
/// use sumi_crawler::url::normalize_url;
///
/// assert_eq!(normalize_url("http://h/a#frag").as_deref(), Some("http://h/a"));
/// assert_eq!(normalize_url("http://h/a;jsessionid=XYZ").as_deref(), Some("http://h/a"));
/// assert_eq!(normalize_url("http://h/a/../b"), None);
/// ```
pub fn normalize_url(url: &str) -> Option<String> {
    let mut normalized = url.trim();

    if let Some(pos) = normalized.find('#') {
        normalized = &normalized[..pos];
    }

    if let Some(pos) = normalized.find(SESSION_ID_MARKER) {
        normalized = &normalized[..pos];
    }

    if normalized.contains("/../") || normalized.contains(' ') {
        return None;
    }

    Some(normalized.to_string())
}

/// Resolves a possibly relative reference against a base URL
///
/// Standard RFC 3986 resolution as implemented by [`Url::join`].
///
/// # Examples
///
/// ```
/// use sumi_crawler::url::resolve_url;
/// use url::Url;
///
/// let base = Url::parse("http://h/dir/page.html").unwrap();
/// assert_eq!(resolve_url(&base, "other.html").unwrap().as_str(), "http://h/dir/other.html");
/// assert_eq!(resolve_url(&base, "/root").unwrap().as_str(), "http://h/root");
/// ```
pub fn resolve_url(base: &Url, reference: &str) -> Result<Url, UrlError> {
    base.join(reference.trim())
        .map_err(|e| UrlError::Parse(format!("{} (reference '{}')", e, reference)))
}

/// Returns true if the value starts with a scheme that cannot be fetched
///
/// Matching is case-insensitive and ignores leading whitespace.
pub fn is_invalid_scheme(value: &str) -> bool {
    let value = value.trim_start();
    INVALID_SCHEMES.iter().any(|scheme| {
        value.len() >= scheme.len()
            && value.is_char_boundary(scheme.len())
            && value[..scheme.len()].eq_ignore_ascii_case(scheme)
    })
}
