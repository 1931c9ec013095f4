//! Reverse proxy end to end: client → muninn proxy → wiremock origin.
#![cfg(feature = "server")]

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::oneshot;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use muninn::server::{self, HEALTH_PATH, SOURCE_HEADER};
use muninn::{AssetManifest, Muninn, OfflineGateway};

struct Proxy {
    base: String,
    gateway: Arc<OfflineGateway>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl Drop for Proxy {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

async fn start_proxy(origin: &MockServer) -> Proxy {
    let gateway = Arc::new(
        Muninn::builder()
            .origin(origin.uri())
            .generation("v1")
            .manifest(AssetManifest::new(["/", "/styles.css"]))
            .timeout(2)
            .build()
            .unwrap(),
    );
    gateway.start().await.unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let (tx, rx) = oneshot::channel();
    let app = server::router(gateway.clone(), 1024 * 1024);
    tokio::spawn(server::serve(listener, app, async {
        let _ = rx.await;
    }));

    Proxy {
        base,
        gateway,
        shutdown: Some(tx),
    }
}

async fn mount_site(server: &MockServer) {
    for (route, body) in [("/", "<h1>sākums</h1>"), ("/styles.css", "body {}")] {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(server)
            .await;
    }
    Mock::given(method("POST"))
        .and(path("/api/progress"))
        .respond_with(ResponseTemplate::new(201).set_body_string("saved"))
        .mount(server)
        .await;
}

#[tokio::test]
async fn precached_asset_is_served_from_cache() {
    let origin = MockServer::start().await;
    mount_site(&origin).await;
    let proxy = start_proxy(&origin).await;

    let response = reqwest::get(format!("{}/styles.css", proxy.base))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()[SOURCE_HEADER], "cache");
    assert_eq!(response.text().await.unwrap(), "body {}");
}

#[tokio::test]
async fn post_is_forwarded_to_origin() {
    let origin = MockServer::start().await;
    mount_site(&origin).await;
    let proxy = start_proxy(&origin).await;

    let response = reqwest::Client::new()
        .post(format!("{}/api/progress", proxy.base))
        .body("week=3")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);
    assert_eq!(response.headers()[SOURCE_HEADER], "network");
}

#[tokio::test]
async fn offline_navigation_gets_offline_page() {
    let origin = MockServer::start().await;
    mount_site(&origin).await;
    let proxy = start_proxy(&origin).await;
    drop(origin);

    let response = reqwest::Client::new()
        .get(format!("{}/week4.html", proxy.base))
        .header("accept", "text/html")
        .header("sec-fetch-dest", "document")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()[SOURCE_HEADER], "offline_fallback");
    assert!(
        response.headers()["content-type"]
            .to_str()
            .unwrap()
            .starts_with("text/html")
    );
}

#[tokio::test]
async fn offline_subresource_is_bad_gateway() {
    let origin = MockServer::start().await;
    mount_site(&origin).await;
    let proxy = start_proxy(&origin).await;
    drop(origin);

    let response = reqwest::get(format!("{}/missing.js", proxy.base))
        .await
        .unwrap();
    assert_eq!(response.status(), 502);
}

#[tokio::test]
async fn health_reports_lifecycle_state() {
    let origin = MockServer::start().await;
    mount_site(&origin).await;
    let proxy = start_proxy(&origin).await;

    let response = reqwest::get(format!("{}{HEALTH_PATH}", proxy.base))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = serde_json::from_slice(&response.bytes().await.unwrap()).unwrap();
    assert_eq!(body["state"], "active");
    assert_eq!(body["generation"], "v1");
    assert_eq!(body["current"], "v1");
    assert_eq!(proxy.gateway.current_generation().as_deref(), Some("v1"));
}
