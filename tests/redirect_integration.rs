//! Redirect integration tests
//!
//! Drive the redirect router end to end: status codes, click recording,
//! source tags and client address selection behind proxies.

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::connect_info::MockConnectInfo,
    http::{header, Request, StatusCode},
    Router,
};
use chrono::{Duration as ChronoDuration, Utc};
use linkstash::config::ShortenerConfig;
use linkstash::location::{
    CoarseLocation, LocationLookupError, LocationProvider, TrustedProxyMode,
};
use linkstash::models::{CreateUrlRequest, UrlRecord};
use linkstash::redirect::{create_redirect_router, RedirectState};
use linkstash::resolver::{Resolver, DEFAULT_LOOKUP_TIMEOUT};
use linkstash::shortener::ShortenService;
use linkstash::storage::{RecordStore, SqliteStorage, Storage, DEFAULT_NAMESPACE};
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;
use uuid::Uuid;

const PEER: ([u8; 4], u16) = ([10, 0, 0, 7], 40000);

/// Records every address it is asked about
#[derive(Default)]
struct RecordingLocator {
    seen: Mutex<Vec<Option<IpAddr>>>,
}

#[async_trait]
impl LocationProvider for RecordingLocator {
    async fn locate(
        &self,
        client_ip: Option<IpAddr>,
    ) -> Result<Option<CoarseLocation>, LocationLookupError> {
        self.seen.lock().unwrap().push(client_ip);
        Ok(Some(CoarseLocation {
            city: Some("Oslo".into()),
            country: Some("Norway".into()),
        }))
    }
}

/// Helper to create a store on an in-memory SQLite medium
async fn create_test_store() -> Arc<RecordStore> {
    let storage = SqliteStorage::new("sqlite::memory:", 1).await.unwrap();
    storage.init().await.unwrap();
    Arc::new(RecordStore::new(
        Arc::new(storage),
        DEFAULT_NAMESPACE,
        Duration::from_secs(3),
    ))
}

fn router(
    store: Arc<RecordStore>,
    locator: Option<Arc<dyn LocationProvider>>,
    mode: TrustedProxyMode,
    trusted_hops: usize,
) -> Router {
    let resolver = Arc::new(Resolver::new(store, locator, DEFAULT_LOOKUP_TIMEOUT));
    create_redirect_router(Arc::new(RedirectState {
        resolver,
        trusted_proxy_mode: mode,
        trusted_hops,
    }))
    .layer(MockConnectInfo(SocketAddr::from(PEER)))
}

async fn shorten(store: &Arc<RecordStore>, url: &str, code: &str) {
    ShortenService::new(Arc::clone(store), ShortenerConfig::default())
        .shorten(vec![CreateUrlRequest::new(url).with_custom_code(code)])
        .await
        .unwrap();
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_active_code_redirects_temporarily() {
    let store = create_test_store().await;
    shorten(&store, "https://example.com/docs", "docs").await;
    let app = router(store.clone(), None, TrustedProxyMode::None, 0);

    let response = app.oneshot(get("/docs")).await.unwrap();

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(
        response.headers().get(header::LOCATION).unwrap(),
        "https://example.com/docs"
    );

    let clicks = store.get_clicks_by_code("docs").await;
    assert_eq!(clicks.len(), 1);
    assert_eq!(clicks[0].source, "direct");
    assert_eq!(clicks[0].location, None);
}

#[tokio::test]
async fn test_non_ascii_target_is_percent_encoded() {
    let store = create_test_store().await;
    shorten(&store, "https://example.com/café", "cafe").await;
    let app = router(store, None, TrustedProxyMode::None, 0);

    let response = app.oneshot(get("/cafe")).await.unwrap();

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(
        response.headers().get(header::LOCATION).unwrap().to_str().unwrap(),
        "https://example.com/caf%C3%A9"
    );
}

#[tokio::test]
async fn test_unknown_code_is_404() {
    let store = create_test_store().await;
    let app = router(store.clone(), None, TrustedProxyMode::None, 0);

    let response = app.oneshot(get("/missing")).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_text(response).await, "Short URL not found");
    assert!(store.load().await.clicks.is_empty());
}

#[tokio::test]
async fn test_expired_code_is_410_without_click() {
    let store = create_test_store().await;
    let now = Utc::now();
    store
        .insert_records(vec![UrlRecord {
            id: Uuid::new_v4(),
            code: "gone".into(),
            long_url: "https://example.com/old".into(),
            created_at: (now - ChronoDuration::minutes(31)).into(),
            expires_at: (now - ChronoDuration::minutes(1)).into(),
            custom: true,
        }])
        .await
        .unwrap();
    let app = router(store.clone(), None, TrustedProxyMode::None, 0);

    let response = app.oneshot(get("/gone")).await.unwrap();

    assert_eq!(response.status(), StatusCode::GONE);
    assert_eq!(body_text(response).await, "This short URL has expired");
    assert!(store.get_clicks_by_code("gone").await.is_empty());
}

#[tokio::test]
async fn test_source_query_is_recorded() {
    let store = create_test_store().await;
    shorten(&store, "https://example.com/a", "tagged").await;
    let app = router(store.clone(), None, TrustedProxyMode::None, 0);

    app.clone().oneshot(get("/tagged?src=stats")).await.unwrap();
    app.oneshot(get("/tagged?src=")).await.unwrap();

    let sources: Vec<String> = store
        .get_clicks_by_code("tagged")
        .await
        .into_iter()
        .map(|c| c.source)
        .collect();
    assert_eq!(sources, vec!["stats", "direct"]);
}

#[tokio::test]
async fn test_location_is_attached_to_click() {
    let store = create_test_store().await;
    shorten(&store, "https://example.com/a", "where").await;
    let locator = Arc::new(RecordingLocator::default());
    let app = router(
        store.clone(),
        Some(locator.clone()),
        TrustedProxyMode::None,
        0,
    );

    let response = app
        .oneshot(
            Request::builder()
                .uri("/where")
                .header("x-forwarded-for", "203.0.113.9")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    // Headers are ignored without a trusted proxy
    assert_eq!(
        locator.seen.lock().unwrap().as_slice(),
        &[Some(IpAddr::from(PEER.0))]
    );
    let clicks = store.get_clicks_by_code("where").await;
    assert_eq!(clicks[0].location.as_deref(), Some("Oslo, Norway"));
}

#[tokio::test]
async fn test_forwarded_for_behind_trusted_proxy() {
    let store = create_test_store().await;
    shorten(&store, "https://example.com/a", "proxied").await;
    let locator = Arc::new(RecordingLocator::default());
    let app = router(
        store.clone(),
        Some(locator.clone()),
        TrustedProxyMode::Standard,
        1,
    );

    app.oneshot(
        Request::builder()
            .uri("/proxied")
            .header("x-forwarded-for", "198.51.100.1, 203.0.113.9, 10.0.0.2")
            .body(Body::empty())
            .unwrap(),
    )
    .await
    .unwrap();

    assert_eq!(
        locator.seen.lock().unwrap().as_slice(),
        &[Some("203.0.113.9".parse::<IpAddr>().unwrap())]
    );
}

#[tokio::test]
async fn test_concurrent_redirects_record_every_click() {
    let store = create_test_store().await;
    shorten(&store, "https://example.com/hot", "hot").await;
    let app = router(store.clone(), None, TrustedProxyMode::None, 0);

    let mut handles = Vec::new();
    for _ in 0..20 {
        let app = app.clone();
        handles.push(tokio::spawn(async move {
            app.oneshot(get("/hot")).await.unwrap().status()
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap(), StatusCode::TEMPORARY_REDIRECT);
    }

    assert_eq!(store.get_clicks_by_code("hot").await.len(), 20);
}

#[tokio::test]
async fn test_root_is_health_check() {
    let store = create_test_store().await;
    let app = router(store, None, TrustedProxyMode::None, 0);

    let response = app.oneshot(get("/")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("OK"));
}
