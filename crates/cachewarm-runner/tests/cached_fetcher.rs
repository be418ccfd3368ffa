//! Foreground cached fetch over real HTTP.

use std::sync::Arc;
use std::time::Duration;

use cachewarm_core::{CacheKey, Clock, ContentFormat, ManualClock, ResponseTest};
use cachewarm_fetch::{FetchError, FetchRequest, HttpFetcher};
use cachewarm_runner::{CachedFetcher, Failure};
use cachewarm_store::CacheStore;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fetcher(store: CacheStore, clock: &Arc<ManualClock>) -> CachedFetcher<HttpFetcher> {
    let http = HttpFetcher::new(Duration::from_secs(1), "cachewarm-test/0.1").unwrap();
    CachedFetcher::new(http, store, Duration::from_secs(2))
        .with_clock(Arc::clone(clock) as Arc<dyn Clock>)
}

#[tokio::test]
async fn stale_payload_is_served_when_remote_is_unreachable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"p":1}"#))
        .mount(&server)
        .await;

    let dir = tempfile::TempDir::new().unwrap();
    let store = CacheStore::new(dir.path());
    let clock = Arc::new(ManualClock::new(10_000));
    let cached = fetcher(store.clone(), &clock);
    let key = CacheKey::parse("p.json").unwrap();

    let up = FetchRequest::get(server.uri(), Duration::from_secs(2));
    let first = cached
        .get(&key, &up, 60, ContentFormat::Json, &ResponseTest::None)
        .await;
    assert_eq!(first.text().as_deref(), Some(r#"{"p":1}"#));
    assert!(first.error.is_none());

    clock.advance(120);
    let down = FetchRequest::get("http://127.0.0.1:1/", Duration::from_secs(2));
    let second = cached
        .get(&key, &down, 60, ContentFormat::Json, &ResponseTest::None)
        .await;

    assert_eq!(second.text().as_deref(), Some(r#"{"p":1}"#));
    assert_eq!(second.from_cache_age_secs, Some(120));
    assert!(matches!(
        second.error,
        Some(Failure::Fetch(FetchError::Transport(_)))
    ));
    assert_eq!(store.get(&key).unwrap().unwrap().payload, br#"{"p":1}"#);
}

#[tokio::test]
async fn get_url_derives_key_and_serves_from_cache() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("status: ok"))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(10_000));
    let cached = fetcher(CacheStore::new(dir.path()), &clock);
    let test = ResponseTest::Contains("ok".into());

    let first = cached.get_url(&server.uri(), 300, &test).await;
    clock.advance(10);
    let second = cached.get_url(&server.uri(), 300, &test).await;

    assert!(first.error.is_none());
    assert_eq!(second.text().as_deref(), Some("status: ok"));
    assert_eq!(second.from_cache_age_secs, Some(10));
    let key = CacheKey::derived(&server.uri(), &test);
    assert!(dir.path().join(key.as_str()).exists());
}

#[tokio::test]
async fn http_error_without_cache_returns_no_data() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let dir = tempfile::TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(0));
    let cached = fetcher(CacheStore::new(dir.path()), &clock);

    let response = cached.get_url(&server.uri(), 60, &ResponseTest::None).await;

    assert!(response.data.is_none());
    assert_eq!(response.status_code, 502);
    assert_eq!(
        response.error,
        Some(Failure::Fetch(FetchError::HttpStatus { status: 502 }))
    );
}
