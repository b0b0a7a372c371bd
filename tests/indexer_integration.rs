//! Integration tests for the catalog indexer against a mock HTTP catalog.

use std::sync::Arc;
use std::time::Duration;

use catalog_mirror_core::catalog::CatalogStore;
use catalog_mirror_core::headers::{HttpTimeouts, RequestHeaders};
use catalog_mirror_core::indexer::{CatalogIndexer, HttpCatalogSource, IndexError, SourceError};
use catalog_mirror_core::retry::RetryPolicy;
use catalog_mirror_core::Database;
use serde_json::{Value, json};
use tempfile::TempDir;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PAGE_SIZE: usize = 2;

/// Newest-first keys `k{n-1}..k0`, split into pages.
fn catalog_pages(items: usize) -> Vec<Value> {
    let keys: Vec<String> = (0..items).rev().map(|i| format!("k{i}")).collect();
    let last_page = items.div_ceil(PAGE_SIZE) - 1;
    keys.chunks(PAGE_SIZE)
        .map(|chunk| {
            let docs: Vec<Value> = chunk
                .iter()
                .map(|key| {
                    json!({
                        "key": key,
                        "metadata": {"songName": format!("song {key}"), "levelAuthorName": "mapper"},
                        "directDownload": format!("/cdn/{key}.zip"),
                        "uploaded": "2020-01-01T00:00:00Z"
                    })
                })
                .collect();
            json!({"docs": docs, "lastPage": last_page, "totalDocs": items})
        })
        .collect()
}

async fn mount_catalog(server: &MockServer, items: usize) {
    server.reset().await;
    for (page, body) in catalog_pages(items).into_iter().enumerate() {
        Mock::given(method("GET"))
            .and(path(format!("/api/maps/latest/{page}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }
}

fn indexer(server: &MockServer, store: &CatalogStore) -> CatalogIndexer {
    let source = HttpCatalogSource::new(
        Url::parse(&server.uri()).unwrap(),
        &RequestHeaders::default(),
        HttpTimeouts::default(),
    )
    .unwrap();
    CatalogIndexer::new(store.clone(), Arc::new(source))
        .with_page_delay(Duration::ZERO)
        .with_retry_policy(
            RetryPolicy::new(3, Duration::from_millis(5), Duration::from_millis(10), 2.0)
                .without_jitter(),
        )
}

async fn file_store(dir: &TempDir) -> CatalogStore {
    CatalogStore::new(Database::new(&dir.path().join("catalog.db")).await.unwrap())
}

#[tokio::test]
async fn test_first_run_indexes_every_item_once() {
    let server = MockServer::start().await;
    mount_catalog(&server, 10).await;
    let dir = TempDir::new().unwrap();
    let store = file_store(&dir).await;

    let report = indexer(&server, &store).run().await.unwrap();

    assert_eq!(report.pages_indexed, 5);
    assert_eq!(report.inserted, 10);
    assert_eq!(store.count_all().await.unwrap(), 10);

    let cursor = store.cursor().await.unwrap().unwrap();
    assert_eq!(cursor.initial_page_count, 4);
    assert_eq!(cursor.last_fetched_page, Some(0));

    let item = store.get_by_key("k3").await.unwrap().unwrap();
    assert_eq!(item.title, "song k3");
    assert_eq!(item.download_url, "/cdn/k3.zip");
}

#[tokio::test]
async fn test_second_run_after_growth_picks_up_new_items() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let store = file_store(&dir).await;

    mount_catalog(&server, 10).await;
    indexer(&server, &store).run().await.unwrap();

    // Four new items push every page back by two.
    mount_catalog(&server, 14).await;
    let report = indexer(&server, &store).run().await.unwrap();

    assert_eq!(report.drift_corrections, 1);
    assert_eq!(report.inserted, 4);
    // Resumes at the old page 0, now page 2, and walks down to 0.
    assert_eq!(report.pages_indexed, 3);
    assert_eq!(store.count_all().await.unwrap(), 14);

    let cursor = store.cursor().await.unwrap().unwrap();
    assert_eq!(cursor.initial_page_count, 6);
    assert_eq!(cursor.last_fetched_page, Some(0));
}

#[tokio::test]
async fn test_rerun_without_growth_is_idempotent() {
    let server = MockServer::start().await;
    mount_catalog(&server, 6).await;
    let dir = TempDir::new().unwrap();
    let store = file_store(&dir).await;

    indexer(&server, &store).run().await.unwrap();
    let report = indexer(&server, &store).run().await.unwrap();

    assert_eq!(report.inserted, 0);
    assert_eq!(report.known, 2);
    assert_eq!(report.drift_corrections, 0);
    assert_eq!(store.count_all().await.unwrap(), 6);
}

#[tokio::test]
async fn test_transient_server_errors_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .with_priority(1)
        .mount(&server)
        .await;
    for (page, body) in catalog_pages(4).into_iter().enumerate() {
        Mock::given(method("GET"))
            .and(path(format!("/api/maps/latest/{page}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;
    }
    let dir = TempDir::new().unwrap();
    let store = file_store(&dir).await;

    let report = indexer(&server, &store).run().await.unwrap();

    assert_eq!(report.inserted, 4);
}

#[tokio::test]
async fn test_malformed_response_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/maps/latest/0"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>blocked</html>"))
        .expect(1)
        .mount(&server)
        .await;
    let dir = TempDir::new().unwrap();
    let store = file_store(&dir).await;

    let err = indexer(&server, &store).run().await.unwrap_err();

    assert!(matches!(
        err,
        IndexError::Fetch {
            page: 0,
            source: SourceError::Malformed { .. }
        }
    ));
    assert!(store.cursor().await.unwrap().is_none());
}

#[tokio::test]
async fn test_persistent_server_errors_exhaust_retries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502))
        .expect(3)
        .mount(&server)
        .await;
    let dir = TempDir::new().unwrap();
    let store = file_store(&dir).await;

    let err = indexer(&server, &store).run().await.unwrap_err();

    assert!(matches!(
        err,
        IndexError::FetchExhausted { attempts: 3, .. }
    ));
}
