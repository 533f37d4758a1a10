//! XML field extraction
//!
//! Both transformers evaluate named XPath rules and serialize the values into
//! a small envelope:
//!
//! ```text
//! <?xml version="1.0"?>
//! <doc>
//! <field name="title">Example</field>
//! <field name="links"><list><item>a</item><item>b</item></list></field>
//! </doc>
//! ```
//!
//! [`XmlTransformer`] parses the body as XML. [`XpathTransformer`] parses it
//! as HTML, converts the tolerant DOM into an XML document for evaluation,
//! and also extracts child URLs like the HTML transformer.

use super::html::{decode_bytes, detect_charset, extract_child_urls};
use super::{is_html, ResultData, Transformer};
use crate::client::CapturedResponse;
use crate::config::{ChildUrlRule, FieldRule, TransformerConfig};
use crate::{TransformError, TransformResult};
use regex::Regex;
use scraper::{ElementRef, Html, Node};
use std::sync::OnceLock;
use sxd_document::dom::{ChildOfElement, ChildOfRoot, Document, Element};
use sxd_document::Package;
use sxd_xpath::{evaluate_xpath, Value};
use tracing::{debug, warn};

const ENVELOPE_HEADER: &str = "<?xml version=\"1.0\"?>\n<doc>\n";
const ENVELOPE_FOOTER: &str = "</doc>";

/// Escapes the five reserved XML characters
///
/// # Examples
///
/// ```
/// use sumi_crawler::transformer::escape_xml;
///
/// assert_eq!(escape_xml(r#"<a href="x">Tom & 'Jerry'</a>"#),
///     "&lt;a href=&quot;x&quot;&gt;Tom &amp; &apos;Jerry&apos;&lt;/a&gt;");
/// ```
pub fn escape_xml(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn is_valid_xml_char(c: char) -> bool {
    matches!(c as u32,
        0x9 | 0xA | 0xD
        | 0x20..=0xD7FF
        | 0xE000..=0xFFFD
        | 0x10000..=0x10FFFF)
}

/// Removes characters that may not appear in an XML document
pub fn strip_invalid_xml_chars(value: &str) -> String {
    value.chars().filter(|&c| is_valid_xml_char(c)).collect()
}

/// Collapses whitespace runs into single spaces and trims
fn trim_space(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Value of one envelope field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Single(String),
    List(Vec<String>),
}

/// Builder for the field envelope
#[derive(Debug, Clone)]
pub struct XmlEnvelope {
    buf: String,
}

impl Default for XmlEnvelope {
    fn default() -> Self {
        Self::new()
    }
}

impl XmlEnvelope {
    pub fn new() -> Self {
        Self {
            buf: String::from(ENVELOPE_HEADER),
        }
    }

    fn clean(value: &str) -> String {
        trim_space(&escape_xml(&strip_invalid_xml_chars(value)))
    }

    pub fn field(&mut self, name: &str, value: &str) {
        self.buf.push_str(&format!(
            "<field name=\"{}\">{}</field>\n",
            escape_xml(&strip_invalid_xml_chars(name)),
            Self::clean(value)
        ));
    }

    pub fn list<S: AsRef<str>>(&mut self, name: &str, values: &[S]) {
        let items: String = values
            .iter()
            .map(|v| format!("<item>{}</item>", Self::clean(v.as_ref())))
            .collect();
        self.buf.push_str(&format!(
            "<field name=\"{}\"><list>{}</list></field>\n",
            escape_xml(&strip_invalid_xml_chars(name)),
            items
        ));
    }

    pub fn finish(mut self) -> String {
        self.buf.push_str(ENVELOPE_FOOTER);
        self.buf.trim().to_string()
    }
}

/// Reads an envelope back into (name, value) pairs in document order
pub fn parse_envelope(xml: &str) -> TransformResult<Vec<(String, FieldValue)>> {
    let package = sxd_document::parser::parse(xml).map_err(|e| TransformError::Parse {
        url: "<envelope>".to_string(),
        message: format!("{:?}", e),
    })?;
    let document = package.as_document();

    let mut fields = Vec::new();
    for child in document.root().children() {
        let ChildOfRoot::Element(doc) = child else {
            continue;
        };
        for field in child_elements(doc) {
            let Some(name) = field.attribute_value("name") else {
                continue;
            };
            let value = match child_elements(field).into_iter().find(|e| e.name().local_part() == "list") {
                Some(list) => FieldValue::List(child_elements(list).into_iter().map(text_of).collect()),
                None => FieldValue::Single(text_of(field)),
            };
            fields.push((name.to_string(), value));
        }
    }
    Ok(fields)
}

pub(super) fn child_elements(element: Element<'_>) -> Vec<Element<'_>> {
    element
        .children()
        .into_iter()
        .filter_map(|child| match child {
            ChildOfElement::Element(e) => Some(e),
            _ => None,
        })
        .collect()
}

pub(super) fn text_of(element: Element<'_>) -> String {
    element
        .children()
        .into_iter()
        .filter_map(|child| match child {
            ChildOfElement::Text(text) => Some(text.text().to_string()),
            _ => None,
        })
        .collect()
}

/// Evaluates every field rule against a document
///
/// A node-set yields a single value for one node and a list for several;
/// fields matching nothing are omitted. Invalid expressions are logged and
/// skipped.
fn evaluate_fields(document: &Document<'_>, fields: &[FieldRule], url: &str) -> String {
    let mut envelope = XmlEnvelope::new();
    for rule in fields {
        match evaluate_xpath(document, &rule.xpath) {
            Ok(Value::Nodeset(nodes)) => {
                let values: Vec<String> = nodes
                    .document_order()
                    .iter()
                    .map(|node| node.string_value())
                    .collect();
                match values.as_slice() {
                    [] => debug!("No value for {} in {}", rule.name, url),
                    [single] => envelope.field(&rule.name, single),
                    many => envelope.list(&rule.name, many),
                }
            }
            Ok(Value::String(value)) => envelope.field(&rule.name, &value),
            Ok(Value::Number(value)) => envelope.field(&rule.name, &value.to_string()),
            Ok(Value::Boolean(value)) => envelope.field(&rule.name, &value.to_string()),
            Err(e) => warn!(
                "Could not evaluate {} ({}) for {}: {:?}",
                rule.name, rule.xpath, url, e
            ),
        }
    }
    envelope.finish()
}

pub(super) fn xml_declared_encoding(bytes: &[u8]) -> Option<String> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    let pattern = PATTERN
        .get_or_init(|| Regex::new(r#"^\s*<\?xml[^>]*encoding\s*=\s*["']([A-Za-z0-9._\-]+)["']"#).ok())
        .as_ref()?;
    let head = String::from_utf8_lossy(&bytes[..bytes.len().min(256)]);
    pattern
        .captures(&head)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Extracts XPath fields from XML documents
pub struct XmlTransformer {
    fields: Vec<FieldRule>,
}

impl XmlTransformer {
    pub fn new(fields: &[FieldRule]) -> Self {
        Self {
            fields: fields.to_vec(),
        }
    }
}

impl Transformer for XmlTransformer {
    fn name(&self) -> &str {
        "xml"
    }

    fn transform(&self, response: CapturedResponse) -> TransformResult<ResultData> {
        let bytes = response.body_bytes()?;
        let charset = response
            .charset
            .clone()
            .or_else(|| xml_declared_encoding(&bytes))
            .unwrap_or_else(|| "UTF-8".to_string());
        let text = decode_bytes(&bytes, &charset);

        let package = sxd_document::parser::parse(&text).map_err(|e| TransformError::Parse {
            url: response.url.clone(),
            message: format!("{:?}", e),
        })?;
        let envelope = evaluate_fields(&package.as_document(), &self.fields, &response.url);

        Ok(ResultData::new(
            self.name(),
            Some("UTF-8".to_string()),
            envelope.into_bytes(),
        ))
    }
}

/// Copies a parsed HTML tree into an XML document
///
/// Elements keep their lowercase local names and attributes; text nodes are
/// copied; comments and doctypes are dropped.
fn html_to_package(html: &Html) -> Package {
    let package = Package::new();
    {
        let document = package.as_document();
        let source_root = html.root_element();
        let target_root = copy_element(&document, source_root);
        document.root().append_child(target_root);

        let mut pending = vec![(source_root, target_root)];
        while let Some((source, target)) = pending.pop() {
            for child in source.children() {
                match child.value() {
                    Node::Element(_) => {
                        if let Some(child_element) = ElementRef::wrap(child) {
                            let copy = copy_element(&document, child_element);
                            target.append_child(copy);
                            pending.push((child_element, copy));
                        }
                    }
                    Node::Text(text) => target.append_child(document.create_text(&text.text)),
                    _ => {}
                }
            }
        }
    }
    package
}

fn copy_element<'d>(document: &Document<'d>, source: ElementRef<'_>) -> Element<'d> {
    let element = document.create_element(source.value().name());
    for (name, value) in source.value().attrs() {
        element.set_attribute_value(name, value);
    }
    element
}

/// Extracts XPath fields and child URLs from HTML documents
pub struct XpathTransformer {
    fields: Vec<FieldRule>,
    child_url_rules: Vec<ChildUrlRule>,
    default_encoding: Option<String>,
    preload_size_for_charset: usize,
}

impl XpathTransformer {
    pub fn new(config: &TransformerConfig) -> Self {
        Self {
            fields: config.fields.clone(),
            child_url_rules: config.child_url_rules.clone(),
            default_encoding: config.default_encoding.clone(),
            preload_size_for_charset: config.preload_size_for_charset,
        }
    }
}

impl Transformer for XpathTransformer {
    fn name(&self) -> &str {
        "xpath"
    }

    fn transform(&self, response: CapturedResponse) -> TransformResult<ResultData> {
        let bytes = response.body_bytes()?;
        let charset = detect_charset(
            &bytes,
            self.preload_size_for_charset,
            response.charset.as_deref(),
            self.default_encoding.as_deref(),
        );
        let html = Html::parse_document(&decode_bytes(&bytes, &charset));

        let package = html_to_package(&html);
        let envelope = evaluate_fields(&package.as_document(), &self.fields, &response.url);

        let child_urls = if is_html(&response.mime_type) {
            extract_child_urls(&html, &response.url, &self.child_url_rules)
        } else {
            Vec::new()
        };

        Ok(
            ResultData::new(self.name(), Some("UTF-8".to_string()), envelope.into_bytes())
                .with_child_urls(child_urls),
        )
    }
}
