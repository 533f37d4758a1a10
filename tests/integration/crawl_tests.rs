//! Crawl sessions: link following, depth, redirects, retries

use crate::common::*;
use chrono::Utc;
use std::sync::Arc;
use sumi_crawler::crawler::StepOutcome;
use sumi_crawler::session::PollResult;
use sumi_crawler::{AccessStatus, Crawler, FailureKind, UrlQueueEntry};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_one_cycle_queues_children() {
    let server = MockServer::start().await;
    let base_url = server.uri();
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page(
            r#"<html><body><a href="/a">A</a> <a href="/b">B</a></body></html>"#,
        ))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&base_url, &dir);
    let crawler = Crawler::new(Arc::new(config.clone()), "test-hash").unwrap();

    let outcome = crawler.worker(0).step().await.unwrap();
    assert_eq!(outcome, StepOutcome::Processed);

    let mut queued = Vec::new();
    while let PollResult::Entry(entry, _guard) = crawler.queue().poll(crawler.session_id()).unwrap() {
        queued.push((entry.url, entry.depth));
    }
    assert_eq!(
        queued,
        vec![(format!("{}/a", base_url), 1), (format!("{}/b", base_url), 1)]
    );

    let records = load_results(&config);
    assert_eq!(records.len(), 1);
    let seed = &records[0];
    assert_eq!(seed.url, format!("{}/", base_url));
    assert_eq!(seed.status, AccessStatus::Success);
    assert_eq!(seed.http_status_code, Some(200));
    assert_eq!(seed.depth, 0);
    assert_eq!(seed.rule_id.as_deref(), Some("html"));
    assert_eq!(seed.mime_type.as_deref(), Some("text/html"));
}

#[tokio::test]
async fn test_full_crawl_follows_links() {
    let server = MockServer::start().await;
    let base_url = server.uri();
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page(r#"<a href="/a">A</a><a href="/b">B</a>"#))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(html_page(r#"<a href="/b">B</a><a href="/c.txt">C</a><a href="/">home</a>"#))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/c.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("plain words", "text/plain"))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&base_url, &dir);
    let (_crawler, report) = run_crawl(&config).await;

    assert_eq!(report.success, 3);
    assert_eq!(report.failure, 1);
    assert_eq!(report.failures_by_kind.get(&FailureKind::HttpStatus), Some(&1));

    let records = load_results(&config);
    assert_eq!(records.len(), 4);

    let missing = results_for(&records, &format!("{}/b", base_url));
    assert_eq!(missing.len(), 1);
    assert_eq!(missing[0].status, AccessStatus::Failure);
    assert_eq!(missing[0].http_status_code, Some(404));
    assert_eq!(missing[0].failure_kind, Some(FailureKind::HttpStatus));

    let text = results_for(&records, &format!("{}/c.txt", base_url));
    assert_eq!(text[0].depth, 2);
    assert_eq!(text[0].parent_url.as_deref(), Some(format!("{}/a", base_url).as_str()));
    let data = text[0].data.as_ref().unwrap();
    assert_eq!(data.transformer_name, "text");
    assert_eq!(data.payload, b"plain words".to_vec());
}

#[tokio::test]
async fn test_max_depth_stops_children() {
    let server = MockServer::start().await;
    let base_url = server.uri();
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page(r#"<a href="/a">A</a>"#))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(html_page("<p>a</p>"))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(&base_url, &dir);
    config.crawler.max_depth = Some(0);
    let (_crawler, report) = run_crawl(&config).await;

    assert_eq!(report.success, 1);
    assert_eq!(report.child_urls_queued, 0);
}

#[tokio::test]
async fn test_max_access_count() {
    let server = MockServer::start().await;
    let base_url = server.uri();
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page(r#"<a href="/a">A</a><a href="/b">B</a><a href="/c">C</a>"#))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(&base_url, &dir);
    config.crawler.thread_count = 1;
    config.crawler.max_access_count = Some(2);
    let (crawler, report) = run_crawl(&config).await;

    assert_eq!(report.access_count, 2);
    assert_eq!(report.total(), 2);
    assert_eq!(crawler.context().access_count(), 2);

    // Entries left over by the access limit are released with the session
    let queue = crawler.queue();
    assert_eq!(queue.pending(SESSION_ID).unwrap(), 0);
    assert_eq!(queue.in_flight(SESSION_ID), 0);
    assert!(!queue.is_seen(SESSION_ID, &format!("{}/", base_url)));
    assert!(!queue.is_seen(SESSION_ID, &format!("{}/c", base_url)));
}

#[tokio::test]
async fn test_redirect_keeps_depth() {
    let server = MockServer::start().await;
    let base_url = server.uri();
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page(r#"<a href="/old">old</a>"#))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(ResponseTemplate::new(301).insert_header("location", "/new"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/new"))
        .respond_with(html_page("<p>moved here</p>"))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&base_url, &dir);
    let (_crawler, report) = run_crawl(&config).await;
    assert_eq!(report.redirect, 1);
    assert_eq!(report.success, 2);

    let records = load_results(&config);
    let old = results_for(&records, &format!("{}/old", base_url));
    assert_eq!(old[0].status, AccessStatus::Redirect);
    assert_eq!(old[0].http_status_code, Some(301));

    let new = results_for(&records, &format!("{}/new", base_url));
    assert_eq!(new[0].status, AccessStatus::Success);
    assert_eq!(new[0].depth, 1);
    assert_eq!(new[0].parent_url.as_deref(), Some(format!("{}/old", base_url).as_str()));
}

#[tokio::test]
async fn test_failed_entry_is_retried() {
    let server = MockServer::start().await;
    let base_url = server.uri();
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(&base_url, &dir);
    config.crawler.max_retries = 1;
    let (_crawler, report) = run_crawl(&config).await;

    assert_eq!(report.failure, 2);
    let records = load_results(&config);
    assert!(records
        .iter()
        .all(|r| r.http_status_code == Some(503) && r.failure_kind == Some(FailureKind::HttpStatus)));
}

#[tokio::test]
async fn test_unchanged_resource_is_not_fetched() {
    let server = MockServer::start().await;
    let base_url = server.uri();
    Mock::given(method("HEAD"))
        .and(path("/page"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("last-modified", "Wed, 21 Oct 2015 07:28:00 GMT")
                .insert_header("content-type", "text/html"),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(html_page("<p>unchanged</p>"))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(&base_url, &dir);
    config.crawler.seeds = vec![format!("{}/page", base_url)];
    let crawler = Crawler::new(Arc::new(config.clone()), "test-hash").unwrap();

    // Replace the plain seed with one carrying a previous modification time
    crawler.queue().clear(crawler.session_id()).unwrap();
    let mut entry = UrlQueueEntry::seed(crawler.session_id(), &format!("{}/page", base_url));
    entry.last_modified = Some(Utc::now());
    assert!(crawler.queue().offer(entry).unwrap());

    let outcome = crawler.worker(0).step().await.unwrap();
    assert_eq!(outcome, StepOutcome::Processed);

    let records = load_results(&config);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, AccessStatus::NotModified);
    assert_eq!(records[0].http_status_code, Some(304));
    assert_eq!(crawler.stats().count(AccessStatus::NotModified), 1);
}
