use url::Url;

/// Extracts the lowercase host from a URL
///
/// # Examples
///
/// ```
/// use url::Url;
/// use sumi_crawler::url::extract_host;
///
/// let url = Url::parse("https://EXAMPLE.COM/path").unwrap();
/// assert_eq!(extract_host(&url), Some("example.com".to_string()));
/// ```
pub fn extract_host(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Returns `scheme://host[:port]` for a URL
///
/// The default port of the scheme is omitted. This is the prefix under which
/// robots.txt is looked up and against which robots patterns are anchored.
///
/// # Arguments
///
/// * `url` - The URL to extract the host root from
///
/// # Returns
///
/// * `Some(String)` - The host root without a trailing slash
/// * `None` - If the URL has no host
///
/// # Examples
///
/// ```
/// use url::Url;
/// use sumi_crawler::url::host_root;
///
/// let url = Url::parse("http://example.com:8080/a/b?c").unwrap();
/// assert_eq!(host_root(&url), Some("http://example.com:8080".to_string()));
/// ```
pub fn host_root(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    let root = match url.port() {
        Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
        None => format!("{}://{}", url.scheme(), host),
    };
    Some(root)
}
