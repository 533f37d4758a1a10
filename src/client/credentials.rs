//! Basic-auth credentials keyed by authentication scope

use crate::config::CredentialEntry;
use tracing::warn;
use url::Url;

/// Where a credential may be used; unset fields match anything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthScope {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub realm: Option<String>,
    /// Authentication scheme, e.g. `basic`
    pub scheme: Option<String>,
}

impl AuthScope {
    /// Returns the number of fields matched, or `None` on any mismatch
    fn score(&self, host: &str, port: Option<u16>, realm: Option<&str>, scheme: &str) -> Option<u8> {
        let mut score = 0;
        if let Some(expected) = &self.host {
            if !expected.eq_ignore_ascii_case(host) {
                return None;
            }
            score += 1;
        }
        if let Some(expected) = self.port {
            if Some(expected) != port {
                return None;
            }
            score += 1;
        }
        if let Some(expected) = &self.realm {
            if Some(expected.as_str()) != realm {
                return None;
            }
            score += 1;
        }
        if let Some(expected) = &self.scheme {
            if !expected.eq_ignore_ascii_case(scheme) {
                return None;
            }
            score += 1;
        }
        Some(score)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Credential lookup used by the fetch client
#[derive(Debug, Clone, Default)]
pub struct CredentialStore {
    entries: Vec<(AuthScope, Credentials)>,
}

impl CredentialStore {
    pub fn from_config(entries: &[CredentialEntry]) -> Self {
        let entries = entries
            .iter()
            .filter(|entry| {
                let supported = entry
                    .scheme
                    .as_deref()
                    .map_or(true, |s| s.eq_ignore_ascii_case("basic"));
                if !supported {
                    warn!(
                        "Ignoring credential for {:?}: unsupported auth scheme {:?}",
                        entry.host, entry.scheme
                    );
                }
                supported
            })
            .map(|entry| {
                (
                    AuthScope {
                        host: entry.host.clone(),
                        port: entry.port,
                        realm: entry.realm.clone(),
                        scheme: entry.scheme.clone(),
                    },
                    Credentials {
                        username: entry.username.clone(),
                        password: entry.password.clone(),
                    },
                )
            })
            .collect();
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Finds the most specific credential for a URL and an optional realm
    pub fn find(&self, url: &Url, realm: Option<&str>) -> Option<&Credentials> {
        let host = url.host_str()?;
        let port = url.port_or_known_default();
        self.entries
            .iter()
            .filter_map(|(scope, creds)| {
                scope
                    .score(host, port, realm, "basic")
                    .map(|score| (score, creds))
            })
            .max_by_key(|(score, _)| *score)
            .map(|(_, creds)| creds)
    }

    /// Credential to send without waiting for a challenge
    ///
    /// Only scopes without a realm qualify, because the realm is unknown
    /// until the server answers.
    pub fn preemptive(&self, url: &Url) -> Option<&Credentials> {
        let host = url.host_str()?;
        let port = url.port_or_known_default();
        self.entries
            .iter()
            .filter(|(scope, _)| scope.realm.is_none())
            .filter_map(|(scope, creds)| {
                scope
                    .score(host, port, None, "basic")
                    .map(|score| (score, creds))
            })
            .max_by_key(|(score, _)| *score)
            .map(|(_, creds)| creds)
    }
}

/// Extracts the realm of a `WWW-Authenticate: Basic realm="..."` challenge
pub fn parse_basic_realm(header: &str) -> Option<String> {
    let header = header.trim();
    let (scheme, params) = header.split_once(char::is_whitespace)?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    params.split(',').find_map(|param| {
        let (key, value) = param.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("realm")
            .then(|| value.trim().trim_matches('"').to_string())
    })
}
