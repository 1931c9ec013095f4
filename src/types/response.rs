//! Response snapshot types

use std::time::SystemTime;

use bytes::Bytes;

use super::request::header_value;

/// A complete, buffered response: status, headers and body bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl Response {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// Append a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        header_value(&self.headers, name)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// 2xx status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// A response as stored in a cache generation.
///
/// Immutable once created; a newer snapshot replaces it wholesale.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    response: Response,
    stored_at: SystemTime,
}

impl CachedResponse {
    /// Snapshot `response`, stamped with the current time.
    pub fn new(response: Response) -> Self {
        Self::with_stored_at(response, SystemTime::now())
    }

    pub(crate) fn with_stored_at(response: Response, stored_at: SystemTime) -> Self {
        Self {
            response,
            stored_at,
        }
    }

    pub fn response(&self) -> &Response {
        &self.response
    }

    pub fn into_response(self) -> Response {
        self.response
    }

    /// When the snapshot was taken.
    pub fn stored_at(&self) -> SystemTime {
        self.stored_at
    }
}

/// Where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Network,
    Cache,
    OfflineFallback,
}

impl ResponseSource {
    /// Label used in logs, metrics and the `x-muninn-source` header.
    pub fn as_str(self) -> &'static str {
        match self {
            ResponseSource::Network => "network",
            ResponseSource::Cache => "cache",
            ResponseSource::OfflineFallback => "offline_fallback",
        }
    }
}

/// The gateway's answer to a request.
#[derive(Debug, Clone)]
pub struct Served {
    pub response: Response,
    pub source: ResponseSource,
}

impl Served {
    pub fn network(response: Response) -> Self {
        Self {
            response,
            source: ResponseSource::Network,
        }
    }

    pub fn cache(cached: CachedResponse) -> Self {
        Self {
            response: cached.into_response(),
            source: ResponseSource::Cache,
        }
    }

    pub fn offline_fallback(response: Response) -> Self {
        Self {
            response,
            source: ResponseSource::OfflineFallback,
        }
    }
}
