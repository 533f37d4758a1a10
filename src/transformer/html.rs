//! HTML transformer
//!
//! The body is read once and feeds three consumers: the charset sniffer, the
//! stored payload (raw bytes plus detected encoding) and, for HTML mime
//! types, the link extractor.

use super::{is_html, ResultData, Transformer};
use crate::client::CapturedResponse;
use crate::config::{ChildUrlRule, TransformerConfig};
use crate::url::{absolutize, normalize_url};
use crate::TransformResult;
use encoding_rs::{Encoding, UTF_8};
use regex::Regex;
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::sync::OnceLock;
use tracing::{debug, warn};
use url::Url;

fn charset_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r#"(?i)charset\s*=\s*["']?([a-zA-Z0-9\-_]+)"#).ok())
        .as_ref()
}

/// Determines the charset of a document
///
/// A `charset=` declaration within the first `preload_size` bytes wins, then
/// the charset announced by the server, then `default_encoding`, then UTF-8.
/// Labels the decoder does not know fall back to UTF-8. The canonical
/// encoding name is returned.
///
/// # Examples
///
/// ```
/// use sumi_crawler::transformer::detect_charset;
///
/// let html = br#"<meta http-equiv="Content-Type" content="text/html; charset=Shift_JIS">"#;
/// assert_eq!(detect_charset(html, 2048, None, None), "Shift_JIS");
/// assert_eq!(detect_charset(b"<p>plain</p>", 2048, None, None), "UTF-8");
/// ```
pub fn detect_charset(
    bytes: &[u8],
    preload_size: usize,
    declared: Option<&str>,
    default_encoding: Option<&str>,
) -> String {
    let prefix = &bytes[..bytes.len().min(preload_size)];
    let head = String::from_utf8_lossy(prefix);
    let sniffed = charset_pattern()
        .and_then(|pattern| pattern.captures(&head))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string());

    let label = sniffed
        .or_else(|| declared.map(str::to_string))
        .or_else(|| default_encoding.map(str::to_string));

    label
        .as_deref()
        .and_then(|l| Encoding::for_label(l.as_bytes()))
        .unwrap_or(UTF_8)
        .name()
        .to_string()
}

/// Decodes bytes with the named encoding (BOM takes precedence)
pub(crate) fn decode_bytes(bytes: &[u8], charset: &str) -> String {
    let encoding = Encoding::for_label(charset.as_bytes()).unwrap_or(UTF_8);
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        debug!("Malformed {} sequences replaced while decoding", encoding.name());
    }
    text.into_owned()
}

/// Returns the document's `<base href>`, prefixing bare `www.` hosts with http
fn base_href(document: &Html) -> Option<String> {
    let selector = Selector::parse("base[href]").ok()?;
    let href = document
        .select(&selector)
        .next()?
        .value()
        .attr("href")?
        .trim();
    if href.is_empty() {
        return None;
    }
    if href.starts_with("www.") {
        return Some(format!("http://{}", href));
    }
    Some(href.to_string())
}

/// Collects child URLs from the configured (tag, attribute) rules
///
/// Values are resolved against `<base href>` (or the page URL), filtered and
/// normalized, and deduplicated in document order. The page itself and its
/// trailing-slash variant are removed.
pub(crate) fn extract_child_urls(document: &Html, page_url: &str, rules: &[ChildUrlRule]) -> Vec<String> {
    let Ok(page) = Url::parse(page_url) else {
        warn!("Cannot extract links from unparsable URL {}", page_url);
        return Vec::new();
    };
    let base = base_href(document)
        .and_then(|href| page.join(&href).ok())
        .unwrap_or_else(|| page.clone());
    debug!("Base URL: {}", base);

    let mut seen = HashSet::new();
    let mut urls = Vec::new();
    for rule in rules {
        let query = format!("{}[{}]", rule.tag, rule.attribute);
        let selector = match Selector::parse(&query) {
            Ok(selector) => selector,
            Err(e) => {
                warn!("Invalid child URL rule {}: {:?}", query, e);
                continue;
            }
        };
        for element in document.select(&selector) {
            let Some(value) = element.value().attr(&rule.attribute) else {
                continue;
            };
            if let Some(url) = absolutize(&base, value) {
                if seen.insert(url.clone()) {
                    urls.push(url);
                }
            }
        }
    }

    let own = normalize_url(page_url).unwrap_or_else(|| page_url.to_string());
    let variant = match own.strip_suffix('/') {
        Some(stripped) => stripped.to_string(),
        None => format!("{}/", own),
    };
    urls.retain(|u| *u != own && *u != variant);
    urls
}

/// Stores raw HTML and extracts child URLs
pub struct HtmlTransformer {
    child_url_rules: Vec<ChildUrlRule>,
    default_encoding: Option<String>,
    preload_size_for_charset: usize,
}

impl HtmlTransformer {
    pub fn new(config: &TransformerConfig) -> Self {
        Self {
            child_url_rules: config.child_url_rules.clone(),
            default_encoding: config.default_encoding.clone(),
            preload_size_for_charset: config.preload_size_for_charset,
        }
    }
}

impl Transformer for HtmlTransformer {
    fn name(&self) -> &str {
        "html"
    }

    fn transform(&self, response: CapturedResponse) -> TransformResult<ResultData> {
        let bytes = response.body_bytes()?;
        let charset = detect_charset(
            &bytes,
            self.preload_size_for_charset,
            response.charset.as_deref(),
            self.default_encoding.as_deref(),
        );

        let child_urls = if is_html(&response.mime_type) {
            let document = Html::parse_document(&decode_bytes(&bytes, &charset));
            extract_child_urls(&document, &response.url, &self.child_url_rules)
        } else {
            Vec::new()
        };
        debug!("{} child URLs found in {}", child_urls.len(), response.url);

        Ok(ResultData::new(self.name(), Some(charset), bytes).with_child_urls(child_urls))
    }
}
