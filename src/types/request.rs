//! Intercepted request types

use std::fmt;

use bytes::Bytes;
use reqwest::{Method, Url};

/// What kind of resource a request is loading.
///
/// Mirrors the `Sec-Fetch-Dest` vocabulary, folded down to the categories
/// the router cares about. Only [`Destination::Document`] is navigable and
/// therefore eligible for the offline fallback page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Destination {
    /// A page navigation (top-level document or frame).
    Document,
    Script,
    Style,
    Image,
    Font,
    /// `fetch()`/XHR style loads: JSON datasets, CSV, i18n tables.
    Data,
    #[default]
    Other,
}

impl Destination {
    /// Whether a user navigated to this resource.
    pub fn is_navigable(self) -> bool {
        matches!(self, Destination::Document)
    }

    /// Parse a `Sec-Fetch-Dest` header value.
    pub fn from_fetch_dest(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "document" | "iframe" | "frame" => Destination::Document,
            "script" | "worker" | "sharedworker" | "serviceworker" | "audioworklet"
            | "paintworklet" => Destination::Script,
            "style" => Destination::Style,
            "image" => Destination::Image,
            "font" => Destination::Font,
            "empty" | "json" | "manifest" => Destination::Data,
            _ => Destination::Other,
        }
    }

    /// Guess the destination from a URL path, for callers that don't send
    /// fetch metadata headers.
    pub fn from_path(path: &str) -> Self {
        if path.ends_with('/') {
            return Destination::Document;
        }
        let file = path.rsplit('/').next().unwrap_or(path);
        let Some((_, ext)) = file.rsplit_once('.') else {
            return Destination::Other;
        };
        match ext.to_ascii_lowercase().as_str() {
            "html" | "htm" => Destination::Document,
            "js" | "mjs" => Destination::Script,
            "css" => Destination::Style,
            "png" | "jpg" | "jpeg" | "gif" | "svg" | "webp" | "ico" | "avif" => {
                Destination::Image
            }
            "woff" | "woff2" | "ttf" | "otf" => Destination::Font,
            "json" | "csv" | "txt" | "webmanifest" => Destination::Data,
            _ => Destination::Other,
        }
    }

    /// Infer the destination from request headers, falling back to the path.
    ///
    /// `Sec-Fetch-Dest` wins when present; otherwise an `Accept` header that
    /// asks for HTML marks a navigation.
    pub fn infer(headers: &[(String, String)], path: &str) -> Self {
        if let Some(dest) = header_value(headers, "sec-fetch-dest") {
            return Destination::from_fetch_dest(dest);
        }
        if header_value(headers, "accept").is_some_and(|accept| accept.contains("text/html")) {
            return Destination::Document;
        }
        Destination::from_path(path)
    }

    /// Label used in logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            Destination::Document => "document",
            Destination::Script => "script",
            Destination::Style => "style",
            Destination::Image => "image",
            Destination::Font => "font",
            Destination::Data => "data",
            Destination::Other => "other",
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request seen by the gateway.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub destination: Destination,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl Request {
    /// Create a request, guessing the destination from the URL path.
    pub fn new(method: Method, url: Url) -> Self {
        let destination = Destination::from_path(url.path());
        Self {
            method,
            url,
            destination,
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    /// Shorthand for a GET request.
    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    /// Override the destination.
    pub fn destination(mut self, destination: Destination) -> Self {
        self.destination = destination;
        self
    }

    /// Append a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the request body.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Key under which this request's response may be cached.
    ///
    /// Only GET requests are cacheable; everything else returns `None`.
    pub fn cache_key(&self) -> Option<RequestKey> {
        (self.method == Method::GET).then(|| RequestKey::get(&self.url))
    }

    /// Whether this is a page navigation.
    pub fn is_navigation(&self) -> bool {
        self.method == Method::GET && self.destination.is_navigable()
    }
}

/// Cache key: method + absolute URL.
///
/// Fragments are dropped, the query string is kept. Lookups match the
/// whole key exactly.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
    method: Method,
    url: String,
}

impl RequestKey {
    /// Key for a GET of `url`.
    pub fn get(url: &Url) -> Self {
        let mut url = url.clone();
        url.set_fragment(None);
        Self {
            method: Method::GET,
            url: url.into(),
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

/// Case-insensitive header lookup.
pub(crate) fn header_value<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}
