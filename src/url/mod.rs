//! URL handling module for Sumi-Crawler
//!
//! This module provides URL normalization, relative reference resolution,
//! host-root extraction and the per-session [`UrlFilter`].

mod domain;
mod filter;
mod normalize;

// Re-export main functions
pub use domain::{extract_host, host_root};
pub use filter::UrlFilter;
pub use normalize::{is_invalid_scheme, normalize_url, resolve_url};

/// Normalizes `reference` after resolving it against `base`
///
/// Returns `None` when the reference cannot be resolved, uses an invalid
/// scheme, or is rejected by [`normalize_url`].
///
/// # Examples
///
/// ```
/// use sumi_crawler::url::absolutize;
/// use url::Url;
///
/// let base = Url::parse("http://h/dir/").unwrap();
/// assert_eq!(absolutize(&base, "a#top").as_deref(), Some("http://h/dir/a"));
/// assert_eq!(absolutize(&base, "mailto:x@y.z"), None);
/// ```
pub fn absolutize(base: &::url::Url, reference: &str) -> Option<String> {
    if reference.trim().is_empty() || is_invalid_scheme(reference) {
        return None;
    }
    let resolved = resolve_url(base, reference).ok()?;
    normalize_url(resolved.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ::url::Url;

    #[test]
    fn test_absolutize_blank() {
        let base = Url::parse("http://h/").unwrap();
        assert_eq!(absolutize(&base, "   "), None);
    }

    #[test]
    fn test_absolutize_strips_session() {
        let base = Url::parse("http://h/").unwrap();
        assert_eq!(
            absolutize(&base, "/cart;jsessionid=1").as_deref(),
            Some("http://h/cart")
        );
    }
}
