//! Content transformers
//!
//! A transformer converts one captured response into a [`ResultData`]: the
//! payload stored with the access result plus the child URLs discovered in
//! the content. The [`TransformerRegistry`] picks a transformer by the
//! response's mime type.
//!
//! Transformers do blocking work (DOM parsing, file I/O) and are run by the
//! crawl worker on tokio's blocking pool.

mod binary;
mod file;
mod html;
mod sitemap;
mod text;
mod xml;

pub use binary::{Base64Transformer, BinaryTransformer};
pub use file::{file_path_for_url, FileTransformer};
pub use html::{detect_charset, HtmlTransformer};
pub use sitemap::{parse_sitemap, SitemapKind, SitemapSet, SitemapTransformer};
pub use text::{ExtractorFactory, HtmlTextExtractor, PlainTextExtractor, TextExtractor, TextTransformer, XmlTextExtractor};
pub use xml::{
    escape_xml, parse_envelope, strip_invalid_xml_chars, FieldValue, XmlEnvelope, XmlTransformer,
    XpathTransformer,
};

use crate::client::CapturedResponse;
use crate::config::Config;
use crate::{ConfigError, TransformResult};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Output of one transformer invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultData {
    pub transformer_name: String,
    pub encoding: Option<String>,
    pub payload: Vec<u8>,
    /// Absolute child URLs in document order, not yet filtered
    pub child_urls: Vec<String>,
    /// Sitemaps listed by a sitemap index
    pub sitemap_urls: Vec<String>,
}

impl ResultData {
    pub fn new(transformer_name: &str, encoding: Option<String>, payload: Vec<u8>) -> Self {
        Self {
            transformer_name: transformer_name.to_string(),
            encoding,
            payload,
            child_urls: Vec::new(),
            sitemap_urls: Vec::new(),
        }
    }

    pub fn with_child_urls(mut self, child_urls: Vec<String>) -> Self {
        self.child_urls = child_urls;
        self
    }

    pub fn with_sitemap_urls(mut self, sitemap_urls: Vec<String>) -> Self {
        self.sitemap_urls = sitemap_urls;
        self
    }
}

/// Converts a captured response into result data
///
/// The response is consumed; a spilled body's temporary file is deleted when
/// the transformer is done with it, whether it succeeded or not.
pub trait Transformer: Send + Sync {
    /// Registry name, e.g. `html`
    fn name(&self) -> &str;

    /// # Errors
    ///
    /// Fails when the body is absent or unreadable, or the content cannot be
    /// parsed or stored.
    fn transform(&self, response: CapturedResponse) -> TransformResult<ResultData>;
}

/// Mime type → transformer dispatch
#[derive(Default)]
pub struct TransformerRegistry {
    transformers: HashMap<String, Arc<dyn Transformer>>,
    mappings: HashMap<String, String>,
}

impl TransformerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers every built-in transformer and the configured mappings
    ///
    /// # Errors
    ///
    /// Returns an error if a mapping names an unknown transformer.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let transformer_config = &config.transformer;
        let mut registry = Self::new();

        registry.register(Arc::new(HtmlTransformer::new(transformer_config)));
        registry.register(Arc::new(XmlTransformer::new(&transformer_config.fields)));
        registry.register(Arc::new(XpathTransformer::new(transformer_config)));
        registry.register(Arc::new(SitemapTransformer));
        registry.register(Arc::new(TextTransformer::new(ExtractorFactory::with_defaults())));
        registry.register(Arc::new(BinaryTransformer));
        registry.register(Arc::new(Base64Transformer));
        registry.register(Arc::new(FileTransformer::new(
            transformer_config
                .file_output_dir
                .clone()
                .unwrap_or_else(|| ".".into()),
        )));

        for mapping in &transformer_config.mappings {
            registry.map(&mapping.mime_type, &mapping.transformer)?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, transformer: Arc<dyn Transformer>) {
        self.transformers
            .insert(transformer.name().to_string(), transformer);
    }

    /// Routes a mime type to a registered transformer
    pub fn map(&mut self, mime_type: &str, name: &str) -> Result<(), ConfigError> {
        if !self.transformers.contains_key(name) {
            return Err(ConfigError::Validation(format!(
                "Unknown transformer '{}' for mime type '{}'",
                name, mime_type
            )));
        }
        let mime_type = normalize_mime_type(mime_type);
        debug!("Mapping {} to transformer {}", mime_type, name);
        self.mappings.insert(mime_type, name.to_string());
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Transformer>> {
        self.transformers.get(name).cloned()
    }

    /// Selects the transformer for a mime type (exact match after normalization)
    pub fn find(&self, mime_type: &str) -> Option<Arc<dyn Transformer>> {
        self.mappings
            .get(&normalize_mime_type(mime_type))
            .and_then(|name| self.get(name))
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.transformers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

fn normalize_mime_type(mime_type: &str) -> String {
    mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

fn is_html(mime_type: &str) -> bool {
    matches!(mime_type, "text/html" | "application/xhtml+xml")
}

#[cfg(test)]
pub(crate) fn create_test_response(url: &str, mime_type: &str, body: &[u8]) -> CapturedResponse {
    use crate::client::{RequestMethod, ResponseBody};

    CapturedResponse {
        url: url.to_string(),
        method: RequestMethod::Get,
        http_status_code: 200,
        mime_type: mime_type.to_string(),
        charset: None,
        headers: reqwest::header::HeaderMap::new(),
        content_length: Some(body.len() as u64),
        body: Some(ResponseBody::InMemory(body.to_vec())),
        last_modified: chrono::Utc::now(),
        redirect_location: None,
    }
}
