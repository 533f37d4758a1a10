//! File transformer
//!
//! Writes each body below an output directory at a path derived from its
//! URL. The stored payload is that relative path.

use super::{ResultData, Transformer};
use crate::client::CapturedResponse;
use crate::{TransformError, TransformResult};
use regex::Regex;
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::debug;

fn slash_runs() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new("/+").ok()).as_ref()
}

/// Derives the relative storage path of a URL
///
/// Slash runs collapse, `./` and `../` segments are removed, a trailing
/// slash becomes `index.html`, and `?`, `:`, `;`, `&` are replaced by fixed
/// placeholders.
///
/// # Examples
///
/// ```
/// use sumi_crawler::transformer::file_path_for_url;
///
/// assert_eq!(file_path_for_url("http://h/docs/"), "http_CLN_/h/docs/index.html");
/// assert_eq!(file_path_for_url("http://h/a?x=1&y=2"), "http_CLN_/h/a_QUEST_x=1_AMP_y=2");
/// ```
pub fn file_path_for_url(url: &str) -> String {
    let mut path = match slash_runs() {
        Some(pattern) => pattern.replace_all(url, "/").into_owned(),
        None => url.to_string(),
    };
    path = path.replace("../", "").replace("./", "");
    if path.ends_with('/') {
        path.push_str("index.html");
    }
    path.replace('?', "_QUEST_")
        .replace(':', "_CLN_")
        .replace(';', "_SCLN_")
        .replace('&', "_AMP_")
}

/// Stores bodies as files below `base_dir`
pub struct FileTransformer {
    base_dir: PathBuf,
}

impl FileTransformer {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }
}

impl Transformer for FileTransformer {
    fn name(&self) -> &str {
        "file"
    }

    fn transform(&self, response: CapturedResponse) -> TransformResult<ResultData> {
        let body = response
            .body
            .as_ref()
            .ok_or_else(|| TransformError::NoBody(response.url.clone()))?;

        let relative = file_path_for_url(&response.url);
        let target = self.base_dir.join(&relative);
        let shown_path = target.display().to_string();
        let store_error = |source| TransformError::Store {
            path: shown_path.clone(),
            source,
        };

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(store_error)?;
        }

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&target) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(TransformError::AlreadyExists(shown_path.clone()));
            }
            Err(e) => return Err(store_error(e)),
        };

        let mut reader = body.reader().map_err(|source| TransformError::Read {
            url: response.url.clone(),
            source,
        })?;
        let written = io::copy(&mut reader, &mut file).map_err(store_error)?;
        debug!("Stored {} bytes of {} in {}", written, response.url, shown_path);

        Ok(ResultData::new(
            self.name(),
            Some("UTF-8".to_string()),
            relative.into_bytes(),
        ))
    }
}
