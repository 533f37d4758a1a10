//! Fetch failures and resource limits seen through stored access results

use crate::common::*;
use std::time::Duration;
use sumi_crawler::config::{CredentialEntry, MimeMapping};
use sumi_crawler::{AccessStatus, FailureKind};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_access_timeout_records_failure() {
    let server = MockServer::start().await;
    let base_url = server.uri();
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page("<p>late</p>").set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(&base_url, &dir);
    config.client.access_timeout_ms = Some(1000);
    let (_crawler, report) = run_crawl(&config).await;

    assert_eq!(report.failure, 1);
    let records = load_results(&config);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, AccessStatus::Failure);
    assert_eq!(records[0].failure_kind, Some(FailureKind::AccessTimeout));
    assert!(records[0].execution_time_ms < 3000);
    assert!(records[0]
        .error_message
        .as_deref()
        .unwrap()
        .contains("Access timeout"));
}

#[tokio::test]
async fn test_declared_oversized_body_leaves_no_temp_file() {
    let server = MockServer::start().await;
    let base_url = server.uri();
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page(&"x".repeat(1000)))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(&base_url, &dir);
    config.client.max_cached_content_size = 10;
    config
        .content_length
        .limits
        .insert("text/html".to_string(), 100);
    let (_crawler, report) = run_crawl(&config).await;

    assert_eq!(report.failures_by_kind.get(&FailureKind::MaxLengthExceeded), Some(&1));
    let records = load_results(&config);
    assert_eq!(records[0].failure_kind, Some(FailureKind::MaxLengthExceeded));
    assert!(records[0]
        .error_message
        .as_deref()
        .unwrap()
        .contains("is over 100 byte"));
    assert!(wait_until_empty(&spill_dir(&dir)).await);
}

/// Answers every request with `pieces` flushed writes of `piece` bytes and
/// neither Content-Length nor chunked framing, so the body ends at close
async fn start_unannounced_body_server(piece: usize, pieces: usize) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }
                let head = "HTTP/1.1 200 OK\r\nContent-Type: application/octet-stream\r\nConnection: close\r\n\r\n";
                if socket.write_all(head.as_bytes()).await.is_err() {
                    return;
                }
                for _ in 0..pieces {
                    if socket.write_all(&vec![b'x'; piece]).await.is_err() {
                        return;
                    }
                    let _ = socket.flush().await;
                    tokio::time::sleep(Duration::from_millis(30)).await;
                }
                let _ = socket.shutdown().await;
            });
        }
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_streamed_body_over_limit_is_aborted() {
    let base_url = start_unannounced_body_server(200, 20).await;

    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(&base_url, &dir);
    config.client.robots_txt_enabled = false;
    config.client.max_cached_content_size = 100;
    config
        .content_length
        .limits
        .insert("application/octet-stream".to_string(), 1000);

    // The body spills to disk before the ceiling is crossed
    let spill = spill_dir(&dir);
    let watcher = tokio::spawn(async move {
        for _ in 0..1000 {
            let spilled = std::fs::read_dir(&spill)
                .map(|mut entries| entries.next().is_some())
                .unwrap_or(false);
            if spilled {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        false
    });
    let (_crawler, report) = run_crawl(&config).await;

    assert_eq!(report.failures_by_kind.get(&FailureKind::MaxLengthExceeded), Some(&1));
    let records = load_results(&config);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].failure_kind, Some(FailureKind::MaxLengthExceeded));
    let message = records[0].error_message.as_deref().unwrap();
    assert!(message.contains("is over 1000 byte"), "{}", message);
    assert!(watcher.await.unwrap());
    assert!(wait_until_empty(&spill_dir(&dir)).await);
}

#[tokio::test]
async fn test_spilled_body_is_transformed_and_deleted() {
    let server = MockServer::start().await;
    let base_url = server.uri();
    let body: Vec<u8> = (0..4096u32).map(|i| (i % 251) as u8).collect();
    Mock::given(method("GET"))
        .and(path("/archive.zip"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body.clone(), "application/zip"))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(&base_url, &dir);
    config.crawler.seeds = vec![format!("{}/archive.zip", base_url)];
    config.client.max_cached_content_size = 1024;
    config.transformer.mappings.push(MimeMapping {
        mime_type: "application/zip".to_string(),
        transformer: "binary".to_string(),
    });
    let (_crawler, report) = run_crawl(&config).await;

    assert_eq!(report.success, 1);
    let records = load_results(&config);
    assert_eq!(records[0].content_length, Some(4096));
    let data = records[0].data.as_ref().unwrap();
    assert_eq!(data.transformer_name, "binary");
    assert_eq!(data.payload, body);
    assert!(wait_until_empty(&spill_dir(&dir)).await);
}

#[tokio::test]
async fn test_unmapped_mime_type_fails() {
    let server = MockServer::start().await;
    let base_url = server.uri();
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("%PDF-1.4", "application/pdf"))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&base_url, &dir);
    let (_crawler, report) = run_crawl(&config).await;

    assert_eq!(report.failures_by_kind.get(&FailureKind::NoTransformer), Some(&1));
    let records = load_results(&config);
    assert_eq!(records[0].http_status_code, Some(200));
    assert_eq!(records[0].mime_type.as_deref(), Some("application/pdf"));
}

#[tokio::test]
async fn test_basic_auth_challenge_is_answered() {
    let server = MockServer::start().await;
    let base_url = server.uri();
    // "user:secret"
    Mock::given(method("GET"))
        .and(path("/"))
        .and(header("authorization", "Basic dXNlcjpzZWNyZXQ="))
        .respond_with(html_page("<p>welcome</p>"))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(401).insert_header("www-authenticate", r#"Basic realm="members""#),
        )
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(&base_url, &dir);
    config.client.credentials.push(CredentialEntry {
        host: None,
        port: None,
        realm: Some("members".to_string()),
        scheme: Some("basic".to_string()),
        username: "user".to_string(),
        password: "secret".to_string(),
    });
    let (_crawler, report) = run_crawl(&config).await;

    assert_eq!(report.success, 1);
    let records = load_results(&config);
    assert_eq!(records[0].http_status_code, Some(200));
}

#[tokio::test]
async fn test_connection_refused() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&format!("http://127.0.0.1:{}", port), &dir);
    let (_crawler, report) = run_crawl(&config).await;

    assert_eq!(report.failure, 1);
    let records = load_results(&config);
    assert_eq!(records[0].failure_kind, Some(FailureKind::Connection));
    assert_eq!(records[0].http_status_code, None);
}
