//! robots.txt handling across a crawl session

use crate::common::*;
use std::time::Duration;
use sumi_crawler::{AccessStatus, FailureKind};
use tempfile::TempDir;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_robots_fetched_once_and_disallow_honored() {
    let server = MockServer::start().await;
    let base_url = server.uri();
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw("User-agent: *\nDisallow: /private/*\n", "text/plain"),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page(
            r#"<a href="/public/x">x</a><a href="/public/y">y</a>
               <a href="/private/a">a</a><a href="/private/b">b</a>"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex("^/public/"))
        .respond_with(html_page(r#"<a href="/">home</a><a href="/private/c">c</a>"#))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex("^/private/"))
        .respond_with(html_page("<p>secret</p>"))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(&base_url, &dir);
    config.crawler.thread_count = 4;
    let (crawler, report) = run_crawl(&config).await;

    assert_eq!(report.success, 3);
    assert!(!crawler
        .context()
        .url_filter()
        .should_process(&format!("{}/private/x", base_url)));
    assert!(crawler
        .context()
        .url_filter()
        .should_process(&format!("{}/public/x", base_url)));

    let records = load_results(&config);
    assert!(records.iter().all(|r| !r.url.contains("/private/")));
}

#[tokio::test]
async fn test_sitemap_from_robots_is_crawled() {
    let server = MockServer::start().await;
    let base_url = server.uri();
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            format!("User-agent: *\nDisallow:\nSitemap: {}/sitemap.xml\n", base_url),
            "text/plain",
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page("<p>home</p>"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/sitemap.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            format!(
                r#"<?xml version="1.0" encoding="UTF-8"?>
                <urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
                  <url><loc>{}/listed</loc></url>
                </urlset>"#,
                base_url
            ),
            "application/xml",
        ))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/listed"))
        .respond_with(html_page("<p>listed</p>"))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&base_url, &dir);
    let (_crawler, report) = run_crawl(&config).await;
    assert_eq!(report.success, 3);

    let records = load_results(&config);
    let sitemap_url = format!("{}/sitemap.xml", base_url);
    let sitemap = results_for(&records, &sitemap_url);
    assert_eq!(sitemap.len(), 1);
    assert_eq!(sitemap[0].status, AccessStatus::Success);
    assert_eq!(sitemap[0].depth, 1);
    assert_eq!(sitemap[0].rule_id.as_deref(), Some("sitemap"));

    let listed = results_for(&records, &format!("{}/listed", base_url));
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].status, AccessStatus::Success);
    assert_eq!(listed[0].depth, 2);
    assert_eq!(listed[0].parent_url.as_deref(), Some(sitemap_url.as_str()));
    assert_eq!(listed[0].rule_id.as_deref(), Some("html"));
}

#[tokio::test]
async fn test_sitemap_index_is_followed() {
    let server = MockServer::start().await;
    let base_url = server.uri();
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            format!("User-agent: *\nSitemap: {}/sitemap_index.xml\n", base_url),
            "text/plain",
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page("<p>home</p>"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/sitemap_index.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            format!(
                "<sitemapindex><sitemap><loc>{}/pages.txt</loc></sitemap></sitemapindex>",
                base_url
            ),
            "text/xml",
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/pages.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            format!("{0}/one\n{0}/two\n", base_url),
            "text/plain",
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex("^/(one|two)$"))
        .respond_with(html_page("<p>page</p>"))
        .expect(2)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&base_url, &dir);
    let (_crawler, report) = run_crawl(&config).await;
    assert_eq!(report.success, 5);

    let records = load_results(&config);
    let text_sitemap = results_for(&records, &format!("{}/pages.txt", base_url));
    assert_eq!(text_sitemap[0].rule_id.as_deref(), Some("sitemap"));
    assert_eq!(text_sitemap[0].depth, 2);
    assert_eq!(results_for(&records, &format!("{}/two", base_url))[0].depth, 3);
}

#[tokio::test]
async fn test_stalled_robots_txt_hits_access_timeout() {
    let server = MockServer::start().await;
    let base_url = server.uri();
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw("User-agent: *\nDisallow:\n", "text/plain")
                .set_delay(Duration::from_secs(3)),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page("<p>home</p>"))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(&base_url, &dir);
    config.client.access_timeout_ms = Some(1000);
    config.crawler.max_retries = 1;
    let (_crawler, report) = run_crawl(&config).await;

    // The first attempt times out on robots.txt; the retry crawls without it
    assert_eq!(report.failure, 1);
    assert_eq!(report.success, 1);
    assert!(report.elapsed < Duration::from_millis(2900));

    let records = load_results(&config);
    let failed: Vec<_> = records
        .iter()
        .filter(|r| r.status == AccessStatus::Failure)
        .collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].failure_kind, Some(FailureKind::AccessTimeout));
    assert!(failed[0].execution_time_ms < 3000);
}

#[tokio::test]
async fn test_robots_disabled() {
    let server = MockServer::start().await;
    let base_url = server.uri();
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("User-agent: *\nDisallow: /\n", "text/plain"))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page("<p>home</p>"))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(&base_url, &dir);
    config.client.robots_txt_enabled = false;
    let (_crawler, report) = run_crawl(&config).await;
    assert_eq!(report.success, 1);
}
