//! Fetch client implementation
//!
//! One [`FetchClient`] is shared by every worker of a crawl. It owns the
//! pooled reqwest client, the credential store and the connection limiter;
//! per-session state (robots.txt bookkeeping, the URL filter, sitemaps) is
//! passed in explicitly through the [`CrawlerContext`].

use super::credentials::{parse_basic_realm, CredentialStore, Credentials};
use super::error::classify_reqwest_error;
use super::limiter::ConnectionLimiter;
use super::{
    parse_http_date, resolve_mime_type, AccessTimeoutGuard, CapturedResponse, RequestMethod,
    SpillBuffer,
};
use crate::config::{ClientConfig, Config, CookiePolicy};
use crate::robots::{self, RobotsDirectives};
use crate::session::CrawlerContext;
use crate::url::host_root;
use crate::{error_chain, ConfigError, FetchError, FetchResult};
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE, LAST_MODIFIED, LOCATION,
    WWW_AUTHENTICATE,
};
use reqwest::{redirect::Policy, Client, Proxy, Response, StatusCode};
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

/// Builds the pooled HTTP client shared by all workers
///
/// Redirects are never followed by the transport; the crawl worker decides
/// whether a redirect target is queued.
///
/// # Errors
///
/// Returns an error if a configured request header is malformed or the
/// proxy URL cannot be built.
pub fn build_http_client(config: &ClientConfig) -> crate::Result<Client> {
    let mut headers = HeaderMap::new();
    for header in &config.request_headers {
        let name = HeaderName::from_bytes(header.name.as_bytes()).map_err(|e| {
            ConfigError::Validation(format!("Invalid request header name '{}': {}", header.name, e))
        })?;
        let value = HeaderValue::from_str(&header.value).map_err(|e| {
            ConfigError::Validation(format!("Invalid value for request header '{}': {}", header.name, e))
        })?;
        headers.append(name, value);
    }

    let mut builder = Client::builder()
        .user_agent(config.user_agent.as_str())
        .connect_timeout(config.connection_timeout())
        .timeout(config.socket_timeout())
        .redirect(Policy::none())
        .pool_idle_timeout(config.idle_connection_timeout())
        .pool_max_idle_per_host(config.max_connections_per_route as usize)
        .cookie_store(config.cookie_policy == CookiePolicy::Standard)
        .default_headers(headers)
        .gzip(true)
        .brotli(true);

    if let Some(proxy) = &config.proxy {
        let mut proxy_config = Proxy::all(format!("http://{}:{}", proxy.host, proxy.port))?;
        if let Some(username) = &proxy.username {
            proxy_config = proxy_config.basic_auth(username, proxy.password.as_deref().unwrap_or(""));
        }
        builder = builder.proxy(proxy_config);
    }

    Ok(builder.build()?)
}

/// HTTP client used by crawl workers
pub struct FetchClient {
    client: Client,
    config: Arc<Config>,
    credentials: CredentialStore,
    limiter: ConnectionLimiter,
}

impl FetchClient {
    /// Creates a client from an immutable configuration
    ///
    /// # Errors
    ///
    /// Fails on malformed header or proxy settings.
    pub fn new(config: Arc<Config>) -> crate::Result<Self> {
        let client = build_http_client(&config.client)?;
        let credentials = CredentialStore::from_config(&config.client.credentials);
        let limiter = ConnectionLimiter::new(
            config.client.max_total_connections as usize,
            config.client.max_connections_per_route as usize,
        );
        Ok(Self {
            client,
            config,
            credentials,
            limiter,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Fetches `url` within the configured access timeout
    ///
    /// robots.txt of the URL's host is processed first if this session has
    /// not seen it yet. A 3xx answer yields a response carrying only the
    /// resolved redirect target.
    ///
    /// # Errors
    ///
    /// Every error is a recoverable per-URL failure: transport problems,
    /// bodies over the mime-specific ceiling, or the access timeout.
    pub async fn fetch(
        &self,
        context: &CrawlerContext,
        url: &str,
        method: RequestMethod,
    ) -> FetchResult<CapturedResponse> {
        let guard = AccessTimeoutGuard::start(self.config.client.access_timeout());
        let result = guard.run(url, self.execute(context, url, method)).await;
        guard.stop();
        result
    }

    /// Processes robots.txt of the URL's host within the access timeout
    ///
    /// Robots handling itself never fails a URL; only a robots.txt fetch
    /// that outlives the deadline does. The host stays marked as visited, so
    /// later URLs of the host are crawled without its directives.
    ///
    /// # Errors
    ///
    /// Returns `FetchError::AccessTimeout` if the deadline passed.
    pub async fn check_robots_txt(&self, context: &CrawlerContext, url: &str) -> FetchResult<()> {
        let Ok(parsed) = Url::parse(url) else {
            return Ok(());
        };
        let guard = AccessTimeoutGuard::start(self.config.client.access_timeout());
        let result = guard
            .run(url, async {
                self.process_robots_txt(context, &parsed).await;
                Ok(())
            })
            .await;
        guard.stop();
        result
    }

    /// Issues a HEAD request and returns it if the resource is unchanged
    ///
    /// The resource counts as unchanged when the server answers 200 with a
    /// `Last-Modified` header not newer than `since`.
    pub async fn check_not_modified(
        &self,
        context: &CrawlerContext,
        url: &str,
        since: DateTime<Utc>,
    ) -> FetchResult<Option<CapturedResponse>> {
        let response = self.fetch(context, url, RequestMethod::Head).await?;
        let unchanged = response.http_status_code == 200
            && response
                .header(LAST_MODIFIED.as_str())
                .and_then(parse_http_date)
                .map_or(false, |modified| modified <= since);
        Ok(unchanged.then_some(response))
    }

    async fn execute(
        &self,
        context: &CrawlerContext,
        url: &str,
        method: RequestMethod,
    ) -> FetchResult<CapturedResponse> {
        let parsed = Url::parse(url).map_err(|source| FetchError::InvalidUrl {
            url: url.to_string(),
            source,
        })?;

        self.process_robots_txt(context, &parsed).await;

        let route = host_root(&parsed).unwrap_or_default();
        let _permit = self.limiter.acquire(&route).await;
        let response = self.send(&parsed, method).await?;
        self.capture(&parsed, method, response).await
    }

    /// Fetches and applies robots.txt for the URL's host, once per session
    ///
    /// Failures are logged and swallowed; a missing robots.txt never blocks
    /// crawling. A concurrent caller for the same host returns immediately.
    pub async fn process_robots_txt(&self, context: &CrawlerContext, url: &Url) {
        if !self.config.client.robots_txt_enabled {
            return;
        }
        let Some(root) = host_root(url) else {
            return;
        };
        if !context.mark_robots_visited(&root) {
            return;
        }

        let robots_url = format!("{}/robots.txt", root);
        info!("Checking robots.txt: {}", robots_url);

        let content = match self.fetch_robots_txt(&robots_url).await {
            Ok(Some(content)) => content,
            Ok(None) => return,
            Err(e) => {
                warn!("Could not process {}: {}", robots_url, error_chain(&e));
                return;
            }
        };

        let directives = RobotsDirectives::parse(&content, &self.config.client.user_agent);
        match robots::apply_directives(
            &directives,
            &root,
            context.url_filter(),
            self.config.client.use_robots_txt_disallows,
            self.config.client.use_robots_txt_allows,
        ) {
            Ok(count) => debug!("Registered {} robots.txt patterns for {}", count, root),
            Err(e) => warn!("Invalid robots.txt pattern in {}: {}", robots_url, e),
        }

        if !directives.sitemaps.is_empty() {
            debug!("Found {} sitemaps in {}", directives.sitemaps.len(), robots_url);
            context.add_sitemaps(directives.sitemaps);
        }
    }

    async fn fetch_robots_txt(&self, robots_url: &str) -> FetchResult<Option<String>> {
        let parsed = Url::parse(robots_url).map_err(|source| FetchError::InvalidUrl {
            url: robots_url.to_string(),
            source,
        })?;
        let route = host_root(&parsed).unwrap_or_default();
        let _permit = self.limiter.acquire(&route).await;

        let response = self.send(&parsed, RequestMethod::Get).await?;
        if !response.status().is_success() {
            debug!("No robots.txt at {} (status {})", robots_url, response.status());
            return Ok(None);
        }

        let max_length = self.config.content_length.max_length("text/plain");
        let mut buffer = SpillBuffer::new(robots_url, max_length, max_length, self.config.client.temp_dir());
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| classify_reqwest_error(robots_url, e))?;
            buffer.push(&chunk).await?;
        }

        let body = buffer.finish().await?;
        let bytes = body.to_bytes().map_err(|source| FetchError::Io {
            url: robots_url.to_string(),
            source,
        })?;
        Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
    }

    /// Sends a request, answering one basic-auth challenge if possible
    async fn send(&self, url: &Url, method: RequestMethod) -> FetchResult<Response> {
        let preemptive = self.credentials.preemptive(url);
        let response = self.request(url, method, preemptive).await?;
        if response.status() != StatusCode::UNAUTHORIZED || self.credentials.is_empty() {
            return Ok(response);
        }

        let realm = response
            .headers()
            .get(WWW_AUTHENTICATE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_basic_realm);
        let Some(realm) = realm else {
            return Ok(response);
        };

        match self.credentials.find(url, Some(&realm)) {
            Some(credentials) if Some(credentials) != preemptive => {
                debug!("Answering basic auth challenge for realm {:?} at {}", realm, url);
                self.request(url, method, Some(credentials)).await
            }
            _ => Ok(response),
        }
    }

    async fn request(
        &self,
        url: &Url,
        method: RequestMethod,
        credentials: Option<&Credentials>,
    ) -> FetchResult<Response> {
        let mut builder = self.client.request(method.into(), url.clone());
        if let Some(credentials) = credentials {
            builder = builder.basic_auth(&credentials.username, Some(&credentials.password));
        }
        builder
            .send()
            .await
            .map_err(|e| classify_reqwest_error(url.as_str(), e))
    }

    async fn capture(
        &self,
        url: &Url,
        method: RequestMethod,
        response: Response,
    ) -> FetchResult<CapturedResponse> {
        let status = response.status();
        let http_status_code = status.as_u16();

        if status.is_redirection() {
            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty());
            if let Some(location) = location {
                let target = url
                    .join(location)
                    .map(|u| u.to_string())
                    .unwrap_or_else(|_| location.to_string());
                debug!("{} redirected ({}) to {}", url, http_status_code, target);
                return Ok(CapturedResponse::redirect(url.as_str(), http_status_code, target));
            }
            warn!("Redirect {} without Location header from {}", http_status_code, url);
        }

        let client_config = &self.config.client;
        let headers = response.headers().clone();
        let content_type = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok());
        let (mime_type, charset) = resolve_mime_type(content_type, &client_config.default_mime_type);
        let last_modified = headers
            .get(LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_http_date)
            .unwrap_or_else(Utc::now);
        let declared_length = headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());

        let (body, content_length) = if method == RequestMethod::Head || !status.is_success() {
            (None, declared_length)
        } else {
            let max_length = self.config.content_length.max_length(&mime_type);
            if let Some(declared) = declared_length.filter(|&d| d > max_length) {
                return Err(FetchError::MaxLengthExceeded {
                    url: url.to_string(),
                    length: declared,
                    max: max_length,
                });
            }

            let mut buffer = SpillBuffer::new(
                url.as_str(),
                client_config.max_cached_content_size,
                max_length,
                client_config.temp_dir(),
            );
            let mut stream = response.bytes_stream();
            while let Some(chunk) = stream.next().await {
                let chunk = chunk.map_err(|e| classify_reqwest_error(url.as_str(), e))?;
                buffer.push(&chunk).await?;
            }
            let body = buffer.finish().await?;
            let measured = body.len();
            (Some(body), Some(measured))
        };

        info!(
            "{} {} -> {} {} ({} bytes)",
            method,
            url,
            http_status_code,
            mime_type,
            content_length.map_or_else(|| "?".to_string(), |l| l.to_string())
        );

        Ok(CapturedResponse {
            url: url.to_string(),
            method,
            http_status_code,
            mime_type,
            charset,
            headers,
            content_length,
            body,
            last_modified,
            redirect_location: None,
        })
    }
}
