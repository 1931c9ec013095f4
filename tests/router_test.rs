//! Fetch routing against an activated generation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use reqwest::{Method, Url};

use muninn::cache::{CacheGeneration, CacheStorage, MemoryCacheStorage};
use muninn::fallback::OFFLINE_CONTENT_TYPE;
use muninn::network::Network;
use muninn::{
    AssetManifest, CachedResponse, Destination, Muninn, MuninnError, OfflineGateway, Request,
    RequestKey, Response, ResponseSource, Result,
};

const ORIGIN: &str = "https://vardi.example";
const VOCABULARY: &str = "/data/vocabulary.json";

/// Site whose responses can be changed and that can go offline.
struct MockSite {
    files: Mutex<HashMap<String, (u16, String)>>,
    online: AtomicBool,
    calls: AtomicU32,
}

impl MockSite {
    fn new() -> Arc<Self> {
        let files = [
            ("/", "home"),
            ("/index.html", "home"),
            ("/styles.css", "body {}"),
            ("/app.js", "main()"),
            ("/week1.html", "week one"),
            (VOCABULARY, r#"{"words":1}"#),
        ]
        .into_iter()
        .map(|(p, b)| (p.to_string(), (200, b.to_string())))
        .collect();
        Arc::new(Self {
            files: Mutex::new(files),
            online: AtomicBool::new(true),
            calls: AtomicU32::new(0),
        })
    }

    fn publish(&self, path: &str, status: u16, body: &str) {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_string(), (status, body.to_string()));
    }

    fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Network for MockSite {
    fn name(&self) -> &str {
        "mock-site"
    }

    async fn fetch(&self, request: &Request) -> Result<Response> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.online.load(Ordering::SeqCst) {
            return Err(MuninnError::Network {
                url: request.url.to_string(),
                message: "network unreachable".to_string(),
            });
        }
        match self.files.lock().unwrap().get(request.url.path()) {
            Some((status, body)) => Ok(Response::new(*status, body.clone())
                .with_header("content-type", "application/octet-stream")),
            None => Ok(Response::new(404, "not found")),
        }
    }
}

fn url(path: &str) -> Url {
    Url::parse(ORIGIN).unwrap().join(path).unwrap()
}

/// Active gateway whose manifest includes the vocabulary snapshot.
async fn active_gateway(
    site: &Arc<MockSite>,
    storage: Arc<dyn CacheStorage>,
) -> OfflineGateway {
    let gateway = Muninn::builder()
        .origin(ORIGIN)
        .generation("v1")
        .manifest(AssetManifest::new([
            "/",
            "/index.html",
            "/styles.css",
            "/app.js",
            VOCABULARY,
        ]))
        .network(site.clone())
        .storage(storage)
        .build()
        .unwrap();
    gateway.start().await.unwrap();
    gateway
}

// ============================================================================
// Network-first
// ============================================================================

#[tokio::test]
async fn network_first_returns_fresh_value_and_refreshes_cache() {
    let site = MockSite::new();
    let storage = Arc::new(MemoryCacheStorage::new());
    let gateway = active_gateway(&site, storage.clone()).await;

    site.publish(VOCABULARY, 200, r#"{"words":2}"#);
    let served = gateway.handle(&Request::get(url(VOCABULARY))).await.unwrap();
    assert_eq!(served.source, ResponseSource::Network);
    assert_eq!(served.response.body, r#"{"words":2}"#);

    gateway.flush().await;
    let cached = storage
        .open("v1")
        .await
        .unwrap()
        .lookup(&RequestKey::get(&url(VOCABULARY)))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cached.response().body, r#"{"words":2}"#);
}

#[tokio::test]
async fn network_first_serves_snapshot_when_offline() {
    let site = MockSite::new();
    let gateway = active_gateway(&site, Arc::new(MemoryCacheStorage::new())).await;

    site.publish(VOCABULARY, 200, r#"{"words":3}"#);
    gateway.handle(&Request::get(url(VOCABULARY))).await.unwrap();
    gateway.flush().await;

    site.set_online(false);
    let served = gateway.handle(&Request::get(url(VOCABULARY))).await.unwrap();
    assert_eq!(served.source, ResponseSource::Cache);
    assert_eq!(served.response.body, r#"{"words":3}"#);
}

#[tokio::test]
async fn network_first_offline_without_snapshot_fails() {
    let site = MockSite::new();
    let gateway = Muninn::builder()
        .origin(ORIGIN)
        .generation("v1")
        .manifest(AssetManifest::new(["/", "/index.html"]))
        .network(site.clone())
        .build()
        .unwrap();
    gateway.start().await.unwrap();

    site.set_online(false);
    let err = gateway
        .handle(&Request::get(url(VOCABULARY)))
        .await
        .unwrap_err();
    assert!(err.is_network_failure());
}

#[tokio::test]
async fn network_first_error_status_is_returned_but_not_stored() {
    let site = MockSite::new();
    let storage = Arc::new(MemoryCacheStorage::new());
    let gateway = active_gateway(&site, storage.clone()).await;

    site.publish(VOCABULARY, 503, "maintenance");
    let served = gateway.handle(&Request::get(url(VOCABULARY))).await.unwrap();
    assert_eq!(served.source, ResponseSource::Network);
    assert_eq!(served.response.status, 503);

    gateway.flush().await;
    let cached = storage
        .open("v1")
        .await
        .unwrap()
        .lookup(&RequestKey::get(&url(VOCABULARY)))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cached.response().status, 200);
    assert_eq!(cached.response().body, r#"{"words":1}"#);
}

// ============================================================================
// Cache-first
// ============================================================================

#[tokio::test]
async fn cache_first_hit_does_not_touch_network() {
    let site = MockSite::new();
    let gateway = active_gateway(&site, Arc::new(MemoryCacheStorage::new())).await;

    site.publish("/styles.css", 200, "changed");
    let before = site.call_count();
    let served = gateway
        .handle(&Request::get(url("/styles.css")))
        .await
        .unwrap();
    assert_eq!(site.call_count(), before);
    assert_eq!(served.source, ResponseSource::Cache);
    assert_eq!(served.response.body, "body {}");
}

#[tokio::test]
async fn precached_style_offline_twice_never_calls_network() {
    let site = MockSite::new();
    let gateway = active_gateway(&site, Arc::new(MemoryCacheStorage::new())).await;

    site.set_online(false);
    let before = site.call_count();
    for _ in 0..2 {
        let request = Request::get(url("/styles.css")).destination(Destination::Style);
        let served = gateway.handle(&request).await.unwrap();
        assert_eq!(served.source, ResponseSource::Cache);
    }
    assert_eq!(site.call_count(), before);
}

#[tokio::test]
async fn cache_first_ignores_fragment() {
    let site = MockSite::new();
    let gateway = active_gateway(&site, Arc::new(MemoryCacheStorage::new())).await;

    let served = gateway
        .handle(&Request::get(url("/app.js#section")))
        .await
        .unwrap();
    assert_eq!(served.source, ResponseSource::Cache);
}

#[tokio::test]
async fn cache_first_miss_is_fetched_but_not_stored() {
    let site = MockSite::new();
    let storage = Arc::new(MemoryCacheStorage::new());
    let gateway = active_gateway(&site, storage.clone()).await;

    let served = gateway
        .handle(&Request::get(url("/week1.html")))
        .await
        .unwrap();
    assert_eq!(served.source, ResponseSource::Network);
    assert_eq!(served.response.body, "week one");

    gateway.flush().await;
    let generation = storage.open("v1").await.unwrap();
    assert!(
        generation
            .lookup(&RequestKey::get(&url("/week1.html")))
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn query_string_is_part_of_the_key() {
    let site = MockSite::new();
    let gateway = active_gateway(&site, Arc::new(MemoryCacheStorage::new())).await;

    let served = gateway
        .handle(&Request::get(url("/app.js?v=2")))
        .await
        .unwrap();
    assert_eq!(served.source, ResponseSource::Network);
}

// ============================================================================
// Offline fallback
// ============================================================================

#[tokio::test]
async fn uncached_document_offline_gets_offline_page() {
    let site = MockSite::new();
    let gateway = active_gateway(&site, Arc::new(MemoryCacheStorage::new())).await;

    site.set_online(false);
    let request = Request::get(url("/week7.html")).destination(Destination::Document);
    let served = gateway.handle(&request).await.unwrap();
    assert_eq!(served.source, ResponseSource::OfflineFallback);
    assert_eq!(served.response.status, 200);
    assert_eq!(served.response.content_type(), Some(OFFLINE_CONTENT_TYPE));
    assert!(!served.response.body.is_empty());
}

#[tokio::test]
async fn uncached_script_offline_fails() {
    let site = MockSite::new();
    let gateway = active_gateway(&site, Arc::new(MemoryCacheStorage::new())).await;

    site.set_online(false);
    let request = Request::get(url("/extra.js")).destination(Destination::Script);
    let err = gateway.handle(&request).await.unwrap_err();
    assert!(err.is_network_failure());
}

#[tokio::test]
async fn cached_document_offline_is_served_from_cache() {
    let site = MockSite::new();
    let gateway = active_gateway(&site, Arc::new(MemoryCacheStorage::new())).await;

    site.set_online(false);
    let request = Request::get(url("/index.html")).destination(Destination::Document);
    let served = gateway.handle(&request).await.unwrap();
    assert_eq!(served.source, ResponseSource::Cache);
    assert_eq!(served.response.body, "home");
}

#[tokio::test]
async fn document_error_status_is_not_replaced() {
    let site = MockSite::new();
    let gateway = active_gateway(&site, Arc::new(MemoryCacheStorage::new())).await;

    let request = Request::get(url("/missing.html")).destination(Destination::Document);
    let served = gateway.handle(&request).await.unwrap();
    assert_eq!(served.source, ResponseSource::Network);
    assert_eq!(served.response.status, 404);
}

// ============================================================================
// Pass-through
// ============================================================================

#[tokio::test]
async fn non_get_passes_through() {
    let site = MockSite::new();
    let gateway = active_gateway(&site, Arc::new(MemoryCacheStorage::new())).await;

    let before = site.call_count();
    let request = Request::new(Method::POST, url("/styles.css")).body("x=1");
    let served = gateway.handle(&request).await.unwrap();
    assert_eq!(served.source, ResponseSource::Network);
    assert_eq!(site.call_count(), before + 1);
}

#[tokio::test]
async fn cross_origin_passes_through() {
    let site = MockSite::new();
    let gateway = active_gateway(&site, Arc::new(MemoryCacheStorage::new())).await;

    let before = site.call_count();
    let request = Request::get(Url::parse("https://cdn.example/styles.css").unwrap());
    let served = gateway.handle(&request).await.unwrap();
    assert_eq!(served.source, ResponseSource::Network);
    assert_eq!(site.call_count(), before + 1);
}

#[tokio::test]
async fn nothing_is_intercepted_before_activation() {
    let site = MockSite::new();
    let gateway = Muninn::builder()
        .origin(ORIGIN)
        .manifest(AssetManifest::new(["/styles.css"]))
        .network(site.clone())
        .skip_waiting(false)
        .build()
        .unwrap();
    gateway.start().await.unwrap();

    let served = gateway
        .handle(&Request::get(url("/styles.css")))
        .await
        .unwrap();
    assert_eq!(served.source, ResponseSource::Network);
}

// ============================================================================
// Write-back failures
// ============================================================================

/// Memory storage whose generations reject writes to one path once
/// `reject` is set.
struct RejectingStorage {
    inner: MemoryCacheStorage,
    path: &'static str,
    reject: Arc<AtomicBool>,
}

struct RejectingGeneration {
    inner: Arc<dyn CacheGeneration>,
    path: &'static str,
    reject: Arc<AtomicBool>,
}

#[async_trait]
impl CacheStorage for RejectingStorage {
    fn name(&self) -> &str {
        "rejecting"
    }

    async fn open(&self, name: &str) -> Result<Arc<dyn CacheGeneration>> {
        Ok(Arc::new(RejectingGeneration {
            inner: self.inner.open(name).await?,
            path: self.path,
            reject: self.reject.clone(),
        }))
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        self.inner.delete(name).await
    }

    async fn names(&self) -> Result<Vec<String>> {
        self.inner.names().await
    }
}

#[async_trait]
impl CacheGeneration for RejectingGeneration {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn put(&self, key: RequestKey, response: CachedResponse) -> Result<()> {
        if self.reject.load(Ordering::SeqCst) && key.url().ends_with(self.path) {
            return Err(MuninnError::Storage("quota exceeded".to_string()));
        }
        self.inner.put(key, response).await
    }

    async fn lookup(&self, key: &RequestKey) -> Result<Option<CachedResponse>> {
        self.inner.lookup(key).await
    }

    async fn keys(&self) -> Result<Vec<RequestKey>> {
        self.inner.keys().await
    }

    async fn commit(&self) -> Result<()> {
        self.inner.commit().await
    }

    async fn is_committed(&self) -> Result<bool> {
        self.inner.is_committed().await
    }
}

#[tokio::test]
async fn write_back_failure_is_reported_not_returned() {
    let site = MockSite::new();
    let reject = Arc::new(AtomicBool::new(false));
    let storage = Arc::new(RejectingStorage {
        inner: MemoryCacheStorage::new(),
        path: VOCABULARY,
        reject: reject.clone(),
    });
    let gateway = active_gateway(&site, storage).await;
    let mut failures = gateway.write_back_failures();

    reject.store(true, Ordering::SeqCst);
    site.publish(VOCABULARY, 200, r#"{"words":9}"#);
    let served = gateway.handle(&Request::get(url(VOCABULARY))).await.unwrap();
    assert_eq!(served.response.body, r#"{"words":9}"#);

    gateway.flush().await;
    let failure = failures.recv().await.unwrap();
    assert_eq!(failure.generation, "v1");
    assert!(failure.url.ends_with(VOCABULARY));
    assert!(failure.error.contains("quota exceeded"));

    // The old snapshot is still what offline clients get.
    site.set_online(false);
    let served = gateway.handle(&Request::get(url(VOCABULARY))).await.unwrap();
    assert_eq!(served.response.body, r#"{"words":1}"#);
}
