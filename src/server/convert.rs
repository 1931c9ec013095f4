//! Conversions between axum HTTP types and muninn native types.
//!
//! Incoming: axum request → [`Request`] addressed at the origin.
//! Outgoing: [`Served`] → axum response tagged with its source.

use axum::body::{Body, to_bytes};
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response as HttpResponse};
use reqwest::Url;

use crate::network::is_hop_by_hop;
use crate::types::{Destination, Request, Served};
use crate::{MuninnError, Result};

/// Response header naming where the body came from.
pub const SOURCE_HEADER: &str = "x-muninn-source";

/// Client headers that must not reach the origin.
///
/// Dropping `accept-encoding` keeps stored bodies identity-encoded.
fn is_client_only(name: &str) -> bool {
    is_hop_by_hop(name)
        || name.eq_ignore_ascii_case("host")
        || name.eq_ignore_ascii_case("content-length")
        || name.eq_ignore_ascii_case("accept-encoding")
}

/// Rebuild an incoming request against `origin`.
pub(super) async fn to_request(
    origin: &Url,
    request: axum::extract::Request,
    max_body_bytes: usize,
) -> Result<Request> {
    let (parts, body) = request.into_parts();

    let mut url = origin.clone();
    url.set_path(parts.uri.path());
    url.set_query(parts.uri.query());

    let headers: Vec<(String, String)> = parts
        .headers
        .iter()
        .filter(|(name, _)| !is_client_only(name.as_str()))
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();

    let body = to_bytes(body, max_body_bytes)
        .await
        .map_err(|e| MuninnError::InvalidRequest(format!("failed to read body: {e}")))?;

    let destination = Destination::infer(&headers, url.path());
    Ok(Request {
        method: parts.method,
        url,
        destination,
        headers,
        body,
    })
}

/// Turn a served response into an HTTP response.
pub(super) fn to_response(served: Served) -> HttpResponse {
    let Ok(status) = StatusCode::from_u16(served.response.status) else {
        return error_response(
            StatusCode::BAD_GATEWAY,
            &format!("invalid upstream status {}", served.response.status),
        );
    };

    let mut response = HttpResponse::new(Body::from(served.response.body));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    for (name, value) in &served.response.headers {
        if is_hop_by_hop(name) || name.eq_ignore_ascii_case("content-length") {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            headers.append(name, value);
        }
    }
    headers.insert(
        HeaderName::from_static(SOURCE_HEADER),
        HeaderValue::from_static(served.source.as_str()),
    );
    response
}

pub(super) fn error_response(status: StatusCode, message: &str) -> HttpResponse {
    (status, format!("{message}\n")).into_response()
}
