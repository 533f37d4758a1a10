use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for Sumi-Crawler
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default, rename = "content-length")]
    pub content_length: ContentLengthConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub transformer: TransformerConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Crawl session and worker pool configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Opaque identifier of the crawl session (generated when absent)
    #[serde(rename = "session-id")]
    pub session_id: Option<String>,

    /// Number of concurrent crawl workers
    #[serde(rename = "thread-count")]
    pub thread_count: u32,

    /// Maximum depth to crawl from seed URLs (unlimited when absent)
    #[serde(rename = "max-depth")]
    pub max_depth: Option<u32>,

    /// Maximum number of URLs fetched in this session (unlimited when absent)
    #[serde(rename = "max-access-count")]
    pub max_access_count: Option<u64>,

    /// Number of times a failed URL is re-queued within the run
    #[serde(rename = "max-retries")]
    pub max_retries: u32,

    /// Delay applied by a worker after each processed URL (milliseconds)
    #[serde(rename = "interval-ms")]
    pub interval_ms: u64,

    /// Delay while the queue is empty but other workers are still busy (milliseconds)
    #[serde(rename = "wait-new-url-ms")]
    pub wait_new_url_ms: u64,

    /// URLs the session starts from (depth 0)
    pub seeds: Vec<String>,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            session_id: None,
            thread_count: 10,
            max_depth: None,
            max_access_count: None,
            max_retries: 0,
            interval_ms: 0,
            wait_new_url_ms: 200,
            seeds: Vec::new(),
        }
    }
}

/// Cookie handling of the shared HTTP client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CookiePolicy {
    Standard,
    Ignore,
}

/// HTTP fetch client configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    #[serde(rename = "user-agent")]
    pub user_agent: String,

    #[serde(rename = "connection-timeout-ms")]
    pub connection_timeout_ms: u64,

    #[serde(rename = "socket-timeout-ms")]
    pub socket_timeout_ms: u64,

    /// Per-fetch deadline enforced by the access timeout guard
    #[serde(rename = "access-timeout-ms")]
    pub access_timeout_ms: Option<u64>,

    #[serde(rename = "max-total-connections")]
    pub max_total_connections: u32,

    #[serde(rename = "max-connections-per-route")]
    pub max_connections_per_route: u32,

    #[serde(rename = "idle-connection-timeout-ms")]
    pub idle_connection_timeout_ms: u64,

    #[serde(rename = "cookie-policy")]
    pub cookie_policy: CookiePolicy,

    #[serde(rename = "robots-txt-enabled")]
    pub robots_txt_enabled: bool,

    #[serde(rename = "use-robots-txt-disallows")]
    pub use_robots_txt_disallows: bool,

    #[serde(rename = "use-robots-txt-allows")]
    pub use_robots_txt_allows: bool,

    /// Response bodies larger than this are spilled to a temporary file
    #[serde(rename = "max-cached-content-size")]
    pub max_cached_content_size: u64,

    #[serde(rename = "temp-dir")]
    pub temp_dir: Option<PathBuf>,

    #[serde(rename = "default-mime-type")]
    pub default_mime_type: String,

    pub proxy: Option<ProxyConfig>,

    pub credentials: Vec<CredentialEntry>,

    #[serde(rename = "request-headers")]
    pub request_headers: Vec<RequestHeader>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("SumiCrawler/{}", env!("CARGO_PKG_VERSION")),
            connection_timeout_ms: 10_000,
            socket_timeout_ms: 30_000,
            access_timeout_ms: None,
            max_total_connections: 200,
            max_connections_per_route: 20,
            idle_connection_timeout_ms: 60_000,
            cookie_policy: CookiePolicy::Standard,
            robots_txt_enabled: true,
            use_robots_txt_disallows: true,
            use_robots_txt_allows: false,
            max_cached_content_size: 1024 * 1024,
            temp_dir: None,
            default_mime_type: "application/octet-stream".to_string(),
            proxy: None,
            credentials: Vec::new(),
            request_headers: Vec::new(),
        }
    }
}

impl ClientConfig {
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    pub fn socket_timeout(&self) -> Duration {
        Duration::from_millis(self.socket_timeout_ms)
    }

    pub fn access_timeout(&self) -> Option<Duration> {
        self.access_timeout_ms.map(Duration::from_millis)
    }

    pub fn idle_connection_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_connection_timeout_ms)
    }

    /// Directory used for spilled response bodies
    pub fn temp_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

/// Outbound proxy
#[derive(Debug, Clone, Deserialize)]
pub struct ProxyConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Basic-auth credential bound to an authentication scope
///
/// Any scope field left unset matches every value.
#[derive(Debug, Clone, Deserialize)]
pub struct CredentialEntry {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub realm: Option<String>,
    pub scheme: Option<String>,
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// Extra header sent with every request
#[derive(Debug, Clone, Deserialize)]
pub struct RequestHeader {
    pub name: String,
    pub value: String,
}

/// Per-mime-type ceilings for response body sizes
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ContentLengthConfig {
    #[serde(rename = "default-max")]
    pub default_max: u64,

    /// mime type → maximum body size in bytes
    pub limits: HashMap<String, u64>,
}

impl Default for ContentLengthConfig {
    fn default() -> Self {
        Self {
            default_max: 10 * 1024 * 1024,
            limits: HashMap::new(),
        }
    }
}

impl ContentLengthConfig {
    /// Returns the ceiling applied to bodies of the given mime type
    pub fn max_length(&self, mime_type: &str) -> u64 {
        self.limits
            .get(mime_type)
            .copied()
            .unwrap_or(self.default_max)
    }
}

/// Session-wide URL include/exclude patterns
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

/// Transformer selection and extraction rules
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransformerConfig {
    /// Charset used when a document does not declare one
    #[serde(rename = "default-encoding")]
    pub default_encoding: Option<String>,

    /// Number of leading bytes searched for a charset declaration
    #[serde(rename = "preload-size-for-charset")]
    pub preload_size_for_charset: usize,

    #[serde(rename = "child-url-rules")]
    pub child_url_rules: Vec<ChildUrlRule>,

    pub fields: Vec<FieldRule>,

    #[serde(rename = "file-output-dir")]
    pub file_output_dir: Option<PathBuf>,

    pub mappings: Vec<MimeMapping>,
}

impl Default for TransformerConfig {
    fn default() -> Self {
        let rules = [
            ("a", "href"),
            ("area", "href"),
            ("frame", "src"),
            ("iframe", "src"),
            ("link", "href"),
            ("img", "src"),
        ];
        let mappings = [
            ("text/html", "html"),
            ("application/xhtml+xml", "html"),
            ("text/xml", "xml"),
            ("application/xml", "xml"),
            ("application/rss+xml", "xml"),
            ("application/atom+xml", "xml"),
            ("text/plain", "text"),
        ];
        Self {
            default_encoding: None,
            preload_size_for_charset: 2048,
            child_url_rules: rules
                .iter()
                .map(|(tag, attribute)| ChildUrlRule {
                    tag: tag.to_string(),
                    attribute: attribute.to_string(),
                })
                .collect(),
            fields: Vec::new(),
            file_output_dir: None,
            mappings: mappings
                .iter()
                .map(|(mime_type, transformer)| MimeMapping {
                    mime_type: mime_type.to_string(),
                    transformer: transformer.to_string(),
                })
                .collect(),
        }
    }
}

/// (tag, attribute) pair whose values are extracted as child URLs
#[derive(Debug, Clone, Deserialize)]
pub struct ChildUrlRule {
    pub tag: String,
    pub attribute: String,
}

/// Named XPath expression evaluated by the XML transformers
#[derive(Debug, Clone, Deserialize)]
pub struct FieldRule {
    pub name: String,
    pub xpath: String,
}

/// Routes a mime type to a registered transformer by name
#[derive(Debug, Clone, Deserialize)]
pub struct MimeMapping {
    #[serde(rename = "mime-type")]
    pub mime_type: String,
    pub transformer: String,
}

/// Output configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Path to the SQLite database file receiving access results
    #[serde(rename = "database-path")]
    pub database_path: Option<String>,
}
