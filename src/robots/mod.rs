//! Robots.txt handling module
//!
//! This module parses robots.txt directives and translates their path globs
//! into the regular expressions registered with a session's [`UrlFilter`].
//! Fetching is done by the [`FetchClient`](crate::client::FetchClient), once
//! per host and session.

mod parser;

pub use parser::RobotsDirectives;

use crate::url::UrlFilter;
use crate::ConfigError;
use tracing::debug;

/// Translates a robots.txt path glob into an anchored regular expression
///
/// `*` matches any sequence and a trailing `$` pins the end of the URL. A
/// pattern that does not start with `/` may match anywhere after the host
/// root, and every pattern is otherwise a prefix match.
///
/// # Arguments
///
/// * `host_root` - `scheme://host[:port]` the directive was served from
/// * `pattern` - The Disallow/Allow value
///
/// # Examples
///
/// ```
/// use sumi_crawler::robots::glob_to_regex;
///
/// assert_eq!(
///     glob_to_regex("http://h", "/private/*"),
///     r"^http://h/private/.*$"
/// );
/// ```
pub fn glob_to_regex(host_root: &str, pattern: &str) -> String {
    let (body, anchored_end) = match pattern.strip_suffix('$') {
        Some(stripped) => (stripped, true),
        None => (pattern, false),
    };

    let mut path = String::with_capacity(body.len() * 2);
    for c in body.chars() {
        if c == '*' {
            path.push_str(".*");
        } else {
            let mut buf = [0u8; 4];
            path.push_str(&regex::escape(c.encode_utf8(&mut buf)));
        }
    }

    if !body.starts_with('/') {
        path.insert_str(0, ".*");
    }
    if !anchored_end && !path.ends_with(".*") {
        path.push_str(".*");
    }
    while path.contains(".*.*") {
        path = path.replace(".*.*", ".*");
    }

    format!("^{}{}$", regex::escape(host_root), path)
}

/// Registers robots directives with a session filter
///
/// Disallows become exclude patterns and allows become include patterns,
/// each only when enabled. Returns the number of patterns added.
pub fn apply_directives(
    directives: &RobotsDirectives,
    host_root: &str,
    filter: &UrlFilter,
    use_disallows: bool,
    use_allows: bool,
) -> Result<usize, ConfigError> {
    let mut added = 0;

    if use_disallows {
        for value in &directives.disallows {
            let regex = glob_to_regex(host_root, value);
            debug!("robots.txt disallow {} -> exclude {}", value, regex);
            filter.add_exclude(&regex)?;
            added += 1;
        }
    }

    if use_allows {
        for value in &directives.allows {
            let regex = glob_to_regex(host_root, value);
            debug!("robots.txt allow {} -> include {}", value, regex);
            filter.add_include(&regex)?;
            added += 1;
        }
    }

    Ok(added)
}
