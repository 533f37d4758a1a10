use crate::ConfigError;
use regex::Regex;
use std::sync::RwLock;
use tracing::trace;

/// Per-session include/exclude pattern set
///
/// Patterns are appended while the crawl runs (robots.txt directives are
/// discovered host by host), so both lists sit behind an `RwLock` and the
/// filter is shared between workers by reference.
#[derive(Debug, Default)]
pub struct UrlFilter {
    includes: RwLock<Vec<Regex>>,
    excludes: RwLock<Vec<Regex>>,
}

impl UrlFilter {
    /// Creates an empty filter that accepts every URL
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a filter from configured include and exclude patterns
    pub fn with_patterns(include: &[String], exclude: &[String]) -> Result<Self, ConfigError> {
        let filter = Self::new();
        for pattern in include {
            filter.add_include(pattern)?;
        }
        for pattern in exclude {
            filter.add_exclude(pattern)?;
        }
        Ok(filter)
    }

    /// Appends an include pattern
    pub fn add_include(&self, pattern: &str) -> Result<(), ConfigError> {
        let regex = compile(pattern)?;
        trace!("Include pattern added: {}", pattern);
        write_list(&self.includes).push(regex);
        Ok(())
    }

    /// Appends an exclude pattern
    pub fn add_exclude(&self, pattern: &str) -> Result<(), ConfigError> {
        let regex = compile(pattern)?;
        trace!("Exclude pattern added: {}", pattern);
        write_list(&self.excludes).push(regex);
        Ok(())
    }

    /// Decides whether a URL may be queued
    ///
    /// Any matching exclude pattern rejects the URL. Otherwise the URL is
    /// accepted when no include pattern is registered or one of them matches.
    pub fn should_process(&self, url: &str) -> bool {
        if read_list(&self.excludes).iter().any(|re| re.is_match(url)) {
            return false;
        }

        let includes = read_list(&self.includes);
        includes.is_empty() || includes.iter().any(|re| re.is_match(url))
    }

    pub fn include_count(&self) -> usize {
        read_list(&self.includes).len()
    }

    pub fn exclude_count(&self) -> usize {
        read_list(&self.excludes).len()
    }
}

fn compile(pattern: &str) -> Result<Regex, ConfigError> {
    Regex::new(pattern).map_err(|source| ConfigError::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })
}

// A poisoned lock still holds a consistent list: patterns are only ever pushed.
fn read_list(lock: &RwLock<Vec<Regex>>) -> std::sync::RwLockReadGuard<'_, Vec<Regex>> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write_list(lock: &RwLock<Vec<Regex>>) -> std::sync::RwLockWriteGuard<'_, Vec<Regex>> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}
