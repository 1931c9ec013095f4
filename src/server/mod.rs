//! HTTP reverse proxy in front of the site's origin.
//!
//! Every request that reaches the listener is rebuilt against the origin and
//! handed to [`OfflineGateway::handle`]. Responses carry an
//! `x-muninn-source` header (`network`, `cache` or `offline_fallback`).
//! Requests the gateway cannot answer get `502 Bad Gateway`.
//!
//! `GET /__muninn/health` reports the lifecycle state instead of proxying.

pub mod config;
mod convert;

use std::future::Future;
use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Response as HttpResponse;
use axum::routing::get;
use reqwest::Url;
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::{debug, info};

use crate::gateway::OfflineGateway;
use crate::{MuninnError, Result};

pub use config::Config;
pub use convert::SOURCE_HEADER;

/// Path of the health endpoint.
pub const HEALTH_PATH: &str = "/__muninn/health";

#[derive(Clone)]
struct ProxyState {
    gateway: Arc<OfflineGateway>,
    origin: Url,
    max_body_bytes: usize,
}

#[derive(Serialize)]
struct HealthResponse {
    version: String,
    state: String,
    generation: String,
    current: Option<String>,
}

/// Build the proxy application.
pub fn router(gateway: Arc<OfflineGateway>, max_body_bytes: usize) -> Router {
    let origin = gateway.router().policy().origin().clone();
    let state = ProxyState {
        gateway,
        origin,
        max_body_bytes,
    };
    Router::new()
        .route(HEALTH_PATH, get(health))
        .fallback(proxy)
        .with_state(state)
}

/// Serve `app` on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, app: Router, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "proxy listening");
    }
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(MuninnError::Io)
}

async fn health(State(state): State<ProxyState>) -> axum::Json<HealthResponse> {
    let gateway = &state.gateway;
    axum::Json(HealthResponse {
        version: crate::version_string(),
        state: gateway.state().to_string(),
        generation: gateway.generation().to_string(),
        current: gateway.current_generation(),
    })
}

async fn proxy(State(state): State<ProxyState>, request: axum::extract::Request) -> HttpResponse {
    let request = match convert::to_request(&state.origin, request, state.max_body_bytes).await {
        Ok(request) => request,
        Err(e) => return convert::error_response(StatusCode::BAD_REQUEST, &e.to_string()),
    };

    match state.gateway.handle(&request).await {
        Ok(served) => {
            debug!(
                method = %request.method,
                url = %request.url,
                status = served.response.status,
                source = served.source.as_str(),
                "served"
            );
            convert::to_response(served)
        }
        Err(e) => {
            debug!(method = %request.method, url = %request.url, error = %e, "no response");
            convert::error_response(StatusCode::BAD_GATEWAY, &e.to_string())
        }
    }
}
