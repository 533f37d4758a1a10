//! Configuration module for Sumi-Crawler
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! The loaded [`Config`] is immutable and shared between components behind an `Arc`.
//!
//! # Example
//!
//! ```no_run
//! use sumi_crawler::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("config.toml")).unwrap();
//! println!("Crawler will run {} workers", config.crawler.thread_count);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    ChildUrlRule, ClientConfig, Config, ContentLengthConfig, CookiePolicy, CrawlerConfig,
    CredentialEntry, FieldRule, FilterConfig, MimeMapping, OutputConfig, ProxyConfig,
    RequestHeader, TransformerConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::{validate, TRANSFORMER_NAMES};
