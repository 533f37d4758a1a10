//! Plain-text extraction
//!
//! [`TextTransformer`] delegates byte-to-text conversion to an extractor
//! chosen by mime type. Any extraction error becomes a recoverable transform
//! failure.

use super::html::{decode_bytes, detect_charset};
use super::{ResultData, Transformer};
use crate::client::CapturedResponse;
use crate::{TransformError, TransformResult};
use scraper::{Html, Node};
use std::collections::HashMap;
use std::sync::Arc;

/// Converts raw content into plain text
pub trait TextExtractor: Send + Sync {
    /// # Errors
    ///
    /// Returns a description of why the content could not be read as text.
    fn extract(&self, bytes: &[u8], charset: Option<&str>) -> Result<String, String>;
}

/// Decodes text content using its declared charset
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn extract(&self, bytes: &[u8], charset: Option<&str>) -> Result<String, String> {
        Ok(decode_bytes(bytes, charset.unwrap_or("UTF-8")))
    }
}

/// Collects the visible text of an HTML document
pub struct HtmlTextExtractor;

impl TextExtractor for HtmlTextExtractor {
    fn extract(&self, bytes: &[u8], charset: Option<&str>) -> Result<String, String> {
        let charset = detect_charset(bytes, 2048, charset, None);
        let document = Html::parse_document(&decode_bytes(bytes, &charset));

        let mut words: Vec<&str> = Vec::new();
        for node in document.root_element().descendants() {
            let Node::Text(text) = node.value() else {
                continue;
            };
            let hidden = node.ancestors().any(|ancestor| {
                matches!(
                    ancestor.value(),
                    Node::Element(e) if matches!(e.name(), "script" | "style" | "noscript" | "template")
                )
            });
            if !hidden {
                words.extend(text.split_whitespace());
            }
        }
        Ok(words.join(" "))
    }
}

/// Collects the character data of an XML document
pub struct XmlTextExtractor;

impl TextExtractor for XmlTextExtractor {
    fn extract(&self, bytes: &[u8], charset: Option<&str>) -> Result<String, String> {
        let text = decode_bytes(bytes, charset.unwrap_or("UTF-8"));
        let package = sxd_document::parser::parse(&text).map_err(|e| format!("{:?}", e))?;
        let document = package.as_document();
        let value = sxd_xpath::evaluate_xpath(&document, "string(/)").map_err(|e| format!("{:?}", e))?;
        Ok(value.string().split_whitespace().collect::<Vec<_>>().join(" "))
    }
}

/// Mime type → extractor lookup
///
/// Exact mime types take precedence; any other `text/*` type falls back to
/// the plain-text extractor.
#[derive(Default)]
pub struct ExtractorFactory {
    extractors: HashMap<String, Arc<dyn TextExtractor>>,
}

impl ExtractorFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults() -> Self {
        let mut factory = Self::new();
        let plain: Arc<dyn TextExtractor> = Arc::new(PlainTextExtractor);
        let html: Arc<dyn TextExtractor> = Arc::new(HtmlTextExtractor);
        let xml: Arc<dyn TextExtractor> = Arc::new(XmlTextExtractor);

        factory.add("text/plain", Arc::clone(&plain));
        factory.add("text/csv", plain);
        factory.add("text/html", Arc::clone(&html));
        factory.add("application/xhtml+xml", html);
        factory.add("text/xml", Arc::clone(&xml));
        factory.add("application/xml", xml);
        factory
    }

    pub fn add(&mut self, mime_type: &str, extractor: Arc<dyn TextExtractor>) {
        self.extractors.insert(mime_type.to_ascii_lowercase(), extractor);
    }

    pub fn get(&self, mime_type: &str) -> Option<Arc<dyn TextExtractor>> {
        if let Some(extractor) = self.extractors.get(mime_type) {
            return Some(Arc::clone(extractor));
        }
        mime_type
            .starts_with("text/")
            .then(|| Arc::new(PlainTextExtractor) as Arc<dyn TextExtractor>)
    }
}

/// Stores the extracted text of a response
pub struct TextTransformer {
    factory: ExtractorFactory,
}

impl TextTransformer {
    pub fn new(factory: ExtractorFactory) -> Self {
        Self { factory }
    }
}

impl Transformer for TextTransformer {
    fn name(&self) -> &str {
        "text"
    }

    fn transform(&self, response: CapturedResponse) -> TransformResult<ResultData> {
        let extractor = self
            .factory
            .get(&response.mime_type)
            .ok_or_else(|| TransformError::Extraction {
                url: response.url.clone(),
                message: format!("no extractor for {}", response.mime_type),
            })?;

        let bytes = response.body_bytes()?;
        let text = extractor
            .extract(&bytes, response.charset.as_deref())
            .map_err(|message| TransformError::Extraction {
                url: response.url.clone(),
                message,
            })?;

        Ok(ResultData::new(
            self.name(),
            Some("UTF-8".to_string()),
            text.into_bytes(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transformer::create_test_response;

    fn create_test_transformer() -> TextTransformer {
        TextTransformer::new(ExtractorFactory::with_defaults())
    }

    fn payload(result: ResultData) -> String {
        String::from_utf8(result.payload).unwrap()
    }

    #[test]
    fn test_plain_text() {
        let response = create_test_response("http://h/a.txt", "text/plain", b"hello\nworld");
        assert_eq!(payload(create_test_transformer().transform(response).unwrap()), "hello\nworld");
    }

    #[test]
    fn test_plain_text_with_charset() {
        let (encoded, _, _) = encoding_rs::SHIFT_JIS.encode("日本語");
        let mut response = create_test_response("http://h/a.txt", "text/plain", &encoded);
        response.charset = Some("Shift_JIS".to_string());
        assert_eq!(payload(create_test_transformer().transform(response).unwrap()), "日本語");
    }

    #[test]
    fn test_html_text_skips_scripts() {
        let html = b"<html><head><title>T</title><style>p{}</style></head>\
            <body><p>Hello   <b>there</b></p><script>var x;</script></body></html>";
        let response = create_test_response("http://h/", "text/html", html);
        assert_eq!(payload(create_test_transformer().transform(response).unwrap()), "T Hello there");
    }

    #[test]
    fn test_xml_text() {
        let response = create_test_response("http://h/a.xml", "text/xml", b"<a><b>one</b> <c>two</c></a>");
        assert_eq!(payload(create_test_transformer().transform(response).unwrap()), "one two");
    }

    #[test]
    fn test_unknown_text_subtype_falls_back() {
        let response = create_test_response("http://h/a.md", "text/markdown", b"# title");
        assert_eq!(payload(create_test_transformer().transform(response).unwrap()), "# title");
    }

    #[test]
    fn test_no_extractor() {
        let response = create_test_response("http://h/a.pdf", "application/pdf", b"%PDF");
        let err = create_test_transformer().transform(response).unwrap_err();
        assert!(matches!(err, TransformError::Extraction { .. }));
    }

    #[test]
    fn test_extraction_error_is_recoverable() {
        let response = create_test_response("http://h/a.xml", "text/xml", b"<a><b></a>");
        let err = create_test_transformer().transform(response).unwrap_err();
        assert!(matches!(err, TransformError::Extraction { .. }));
    }
}
