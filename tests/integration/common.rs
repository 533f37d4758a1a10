//! Shared helpers for the integration tests

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use sumi_crawler::config::Config;
use sumi_crawler::storage::{AccessResultRecord, SqliteDataService};
use sumi_crawler::{CrawlReport, Crawler};
use tempfile::TempDir;
use wiremock::ResponseTemplate;

pub const SESSION_ID: &str = "it-session";

/// Creates a configuration crawling `base_url` with results and spilled
/// bodies kept inside `dir`
pub fn create_test_config(base_url: &str, dir: &TempDir) -> Config {
    let spill = spill_dir(dir);
    std::fs::create_dir_all(&spill).unwrap();

    let mut config = Config::default();
    config.crawler.session_id = Some(SESSION_ID.to_string());
    config.crawler.thread_count = 2;
    config.crawler.wait_new_url_ms = 20;
    config.crawler.seeds = vec![format!("{}/", base_url)];
    config.client.user_agent = "TestBot/1.0".to_string();
    config.client.temp_dir = Some(spill);
    config.output.database_path = Some(
        dir.path()
            .join("results.db")
            .to_string_lossy()
            .into_owned(),
    );
    config
}

pub fn spill_dir(dir: &TempDir) -> PathBuf {
    dir.path().join("spill")
}

/// Runs a whole session, failing the test if it does not end in time
pub async fn run_crawl(config: &Config) -> (Crawler, CrawlReport) {
    let crawler = Crawler::new(Arc::new(config.clone()), "test-hash").unwrap();
    let report = tokio::time::timeout(Duration::from_secs(30), crawler.run())
        .await
        .expect("crawl did not finish")
        .unwrap();
    (crawler, report)
}

/// Reads every stored access result of the test session
pub fn load_results(config: &Config) -> Vec<AccessResultRecord> {
    let path = config.output.database_path.as_ref().unwrap();
    SqliteDataService::new(Path::new(path))
        .unwrap()
        .get_results(SESSION_ID)
        .unwrap()
}

pub fn results_for<'a>(records: &'a [AccessResultRecord], url: &str) -> Vec<&'a AccessResultRecord> {
    records.iter().filter(|r| r.url == url).collect()
}

/// Waits until `dir` is empty; spilled bodies are deleted in the background
pub async fn wait_until_empty(dir: &Path) -> bool {
    for _ in 0..40 {
        if std::fs::read_dir(dir).unwrap().next().is_none() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

pub fn html_page(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.to_string(), "text/html")
}
