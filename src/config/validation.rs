use crate::config::types::{ClientConfig, Config, CrawlerConfig, FilterConfig, TransformerConfig};
use crate::ConfigError;
use regex::Regex;
use url::Url;

/// Names accepted in `[[transformer.mappings]]`
pub const TRANSFORMER_NAMES: &[&str] = &["html", "xml", "xpath", "sitemap", "text", "binary", "base64", "file"];

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_client_config(&config.client)?;
    validate_filter_config(&config.filter)?;
    validate_transformer_config(&config.transformer)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.thread_count < 1 || config.thread_count > 100 {
        return Err(ConfigError::Validation(format!(
            "thread_count must be between 1 and 100, got {}",
            config.thread_count
        )));
    }

    if let Some(session_id) = &config.session_id {
        if session_id.trim().is_empty() {
            return Err(ConfigError::Validation(
                "session_id cannot be blank".to_string(),
            ));
        }
    }

    for seed in &config.seeds {
        let url = Url::parse(seed.trim())
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid seed URL '{}': {}", seed, e)))?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::Validation(format!(
                "Seed URL '{}' must use HTTP or HTTPS scheme",
                seed
            )));
        }
    }

    Ok(())
}

/// Validates HTTP client configuration
fn validate_client_config(config: &ClientConfig) -> Result<(), ConfigError> {
    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }

    if config.max_total_connections < 1 {
        return Err(ConfigError::Validation(
            "max_total_connections must be >= 1".to_string(),
        ));
    }

    if config.max_connections_per_route < 1 {
        return Err(ConfigError::Validation(
            "max_connections_per_route must be >= 1".to_string(),
        ));
    }

    if config.max_cached_content_size < 1 {
        return Err(ConfigError::Validation(
            "max_cached_content_size must be >= 1".to_string(),
        ));
    }

    if let Some(0) = config.access_timeout_ms {
        return Err(ConfigError::Validation(
            "access_timeout_ms must be >= 1 when set".to_string(),
        ));
    }

    for credential in &config.credentials {
        if credential.username.is_empty() {
            return Err(ConfigError::Validation(format!(
                "credential for host {:?} has an empty username",
                credential.host
            )));
        }
    }

    if let Some(proxy) = &config.proxy {
        if proxy.host.trim().is_empty() {
            return Err(ConfigError::Validation(
                "proxy host cannot be empty".to_string(),
            ));
        }
    }

    for header in &config.request_headers {
        if header.name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "request header name cannot be empty".to_string(),
            ));
        }
    }

    Ok(())
}

/// Validates include/exclude patterns by compiling them
fn validate_filter_config(config: &FilterConfig) -> Result<(), ConfigError> {
    for pattern in config.include.iter().chain(config.exclude.iter()) {
        Regex::new(pattern).map_err(|source| ConfigError::InvalidPattern {
            pattern: pattern.clone(),
            source,
        })?;
    }
    Ok(())
}

/// Validates transformer rules and mappings
fn validate_transformer_config(config: &TransformerConfig) -> Result<(), ConfigError> {
    for mapping in &config.mappings {
        if !TRANSFORMER_NAMES.contains(&mapping.transformer.as_str()) {
            return Err(ConfigError::Validation(format!(
                "Unknown transformer '{}' for mime type '{}'",
                mapping.transformer, mapping.mime_type
            )));
        }
    }

    for field in &config.fields {
        if field.name.trim().is_empty() || field.xpath.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "Field rule '{}' must have a name and an xpath",
                field.name
            )));
        }
    }

    for rule in &config.child_url_rules {
        if rule.tag.trim().is_empty() || rule.attribute.trim().is_empty() {
            return Err(ConfigError::Validation(
                "child URL rules need both a tag and an attribute".to_string(),
            ));
        }
    }

    Ok(())
}
