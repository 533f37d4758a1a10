//! Sitemap transformer
//!
//! Understands sitemaps.org `<urlset>` documents, `<sitemapindex>` documents
//! and plain text sitemaps (one absolute URL per line). Page locations become
//! child URLs; the locations listed by an index are handed back as further
//! sitemaps so they are routed here again.

use super::html::decode_bytes;
use super::xml::{child_elements, text_of, xml_declared_encoding};
use super::{ResultData, Transformer, XmlEnvelope};
use crate::client::CapturedResponse;
use crate::{TransformError, TransformResult};
use sxd_document::dom::ChildOfRoot;
use tracing::debug;

/// Characters inspected to tell the sitemap formats apart
const PRELOAD_CHARS: usize = 512;

/// What the locations of a sitemap point at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SitemapKind {
    /// Pages (`<urlset>` or a text sitemap)
    UrlSet,
    /// Further sitemaps (`<sitemapindex>`)
    Index,
}

impl SitemapKind {
    fn field_name(&self) -> &'static str {
        match self {
            Self::UrlSet => "urlset",
            Self::Index => "sitemapindex",
        }
    }
}

/// Locations read from one sitemap document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SitemapSet {
    pub kind: SitemapKind,
    pub locations: Vec<String>,
}

/// Parses a decoded sitemap document
///
/// # Errors
///
/// Returns a message if the text is neither XML sitemap, sitemap index nor
/// text sitemap, or if the XML is malformed.
///
/// # Examples
///
/// ```
/// use sumi_crawler::transformer::{parse_sitemap, SitemapKind};
///
/// let set = parse_sitemap("http://h/a\n\nhttp://h/b\n").unwrap();
/// assert_eq!(set.kind, SitemapKind::UrlSet);
/// assert_eq!(set.locations, vec!["http://h/a", "http://h/b"]);
/// ```
pub fn parse_sitemap(text: &str) -> Result<SitemapSet, String> {
    let text = text.trim_start_matches('\u{feff}');
    let head: String = text.chars().take(PRELOAD_CHARS).collect();

    if head.contains("<urlset") {
        parse_xml_sitemap(text, SitemapKind::UrlSet, "url")
    } else if head.contains("<sitemapindex") {
        parse_xml_sitemap(text, SitemapKind::Index, "sitemap")
    } else if is_absolute_http(head.trim_start()) {
        Ok(SitemapSet {
            kind: SitemapKind::UrlSet,
            locations: text
                .lines()
                .map(str::trim)
                .filter(|line| is_absolute_http(line))
                .map(str::to_string)
                .collect(),
        })
    } else {
        Err("No sitemap data".to_string())
    }
}

fn parse_xml_sitemap(text: &str, kind: SitemapKind, entry_name: &str) -> Result<SitemapSet, String> {
    let package = sxd_document::parser::parse(text).map_err(|e| format!("{:?}", e))?;
    let document = package.as_document();

    let mut locations = Vec::new();
    for child in document.root().children() {
        let ChildOfRoot::Element(root) = child else {
            continue;
        };
        for entry in child_elements(root) {
            if entry.name().local_part() != entry_name {
                continue;
            }
            let loc = child_elements(entry)
                .into_iter()
                .find(|e| e.name().local_part() == "loc")
                .map(|e| text_of(e).trim().to_string());
            if let Some(loc) = loc.filter(|l| is_absolute_http(l)) {
                locations.push(loc);
            }
        }
    }
    Ok(SitemapSet { kind, locations })
}

fn is_absolute_http(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

/// Turns sitemaps into child URLs
pub struct SitemapTransformer;

impl Transformer for SitemapTransformer {
    fn name(&self) -> &str {
        "sitemap"
    }

    fn transform(&self, response: CapturedResponse) -> TransformResult<ResultData> {
        let bytes = response.body_bytes()?;
        let charset = response
            .charset
            .clone()
            .or_else(|| xml_declared_encoding(&bytes))
            .unwrap_or_else(|| "UTF-8".to_string());
        let set = parse_sitemap(&decode_bytes(&bytes, &charset)).map_err(|message| {
            TransformError::Parse {
                url: response.url.clone(),
                message,
            }
        })?;
        debug!(
            "{} lists {} locations ({:?})",
            response.url,
            set.locations.len(),
            set.kind
        );

        let mut envelope = XmlEnvelope::new();
        envelope.list(set.kind.field_name(), set.locations.as_slice());
        let result = ResultData::new(
            self.name(),
            Some("UTF-8".to_string()),
            envelope.finish().into_bytes(),
        );
        Ok(match set.kind {
            SitemapKind::UrlSet => result.with_child_urls(set.locations),
            SitemapKind::Index => result.with_sitemap_urls(set.locations),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transformer::{create_test_response, parse_envelope, FieldValue};

    #[test]
    fn test_urlset_with_namespace() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
            <urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
              <url><loc> http://h/a </loc><lastmod>2024-01-01</lastmod></url>
              <url><loc>http://h/b?x=1&amp;y=2</loc></url>
              <url><loc>/relative</loc></url>
            </urlset>"#;
        let set = parse_sitemap(xml).unwrap();
        assert_eq!(set.kind, SitemapKind::UrlSet);
        assert_eq!(set.locations, vec!["http://h/a", "http://h/b?x=1&y=2"]);
    }

    #[test]
    fn test_sitemap_index() {
        let xml = r#"<sitemapindex>
              <sitemap><loc>http://h/sitemap1.xml</loc></sitemap>
              <sitemap><loc>http://h/sitemap2.xml</loc></sitemap>
            </sitemapindex>"#;
        let set = parse_sitemap(xml).unwrap();
        assert_eq!(set.kind, SitemapKind::Index);
        assert_eq!(set.locations.len(), 2);
    }

    #[test]
    fn test_rejects_other_content() {
        assert!(parse_sitemap("<html><body>no</body></html>").is_err());
        assert!(parse_sitemap("<urlset><url><loc>x</url>").is_err());
    }

    #[test]
    fn test_transformer_routes_locations() {
        let urlset = create_test_response(
            "http://h/sitemap.xml",
            "application/xml",
            b"<urlset><url><loc>http://h/listed</loc></url></urlset>",
        );
        let result = SitemapTransformer.transform(urlset).unwrap();
        assert_eq!(result.child_urls, vec!["http://h/listed"]);
        assert!(result.sitemap_urls.is_empty());
        let fields = parse_envelope(&String::from_utf8(result.payload).unwrap()).unwrap();
        assert_eq!(
            fields,
            vec![(
                "urlset".to_string(),
                FieldValue::List(vec!["http://h/listed".to_string()])
            )]
        );

        let index = create_test_response(
            "http://h/index.xml",
            "text/xml",
            b"<sitemapindex><sitemap><loc>http://h/more.xml</loc></sitemap></sitemapindex>",
        );
        let result = SitemapTransformer.transform(index).unwrap();
        assert!(result.child_urls.is_empty());
        assert_eq!(result.sitemap_urls, vec!["http://h/more.xml"]);
    }

    #[test]
    fn test_transformer_parse_error() {
        let response = create_test_response("http://h/sitemap.xml", "text/html", b"<p>moved</p>");
        assert!(matches!(
            SitemapTransformer.transform(response),
            Err(TransformError::Parse { .. })
        ));
    }
}
