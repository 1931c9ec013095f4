//! Per-request routing policy.
//!
//! Classification is an ordered list of rules; the first that matches
//! decides:
//!
//! 1. not a GET → [`Strategy::PassThrough`]
//! 2. different origin than the site → [`Strategy::PassThrough`]
//! 3. path is a dynamic data endpoint → [`Strategy::NetworkFirst`]
//! 4. anything else → [`Strategy::CacheFirst`]

use std::fmt;

use reqwest::{Method, Url};

use crate::types::Request;

/// Path of the live vocabulary dataset, the one resource whose content
/// changes between deployments.
pub const DEFAULT_DYNAMIC_ENDPOINT: &str = "/data/vocabulary.json";

/// How a request is answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// Live fetch; the cached snapshot is only a fallback. Successful
    /// responses refresh the snapshot in the background.
    NetworkFirst,
    /// Cached snapshot if present, otherwise a live fetch (not stored).
    CacheFirst,
    /// Forwarded untouched; the cache is never consulted.
    PassThrough,
}

impl Strategy {
    /// Label used in logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::NetworkFirst => "network_first",
            Strategy::CacheFirst => "cache_first",
            Strategy::PassThrough => "pass_through",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Routing rules for one site.
#[derive(Debug, Clone)]
pub struct RoutePolicy {
    origin: Url,
    network_first: Vec<String>,
}

impl RoutePolicy {
    /// Policy for `origin` with the default dynamic endpoint.
    pub fn new(origin: Url) -> Self {
        Self {
            origin,
            network_first: vec![DEFAULT_DYNAMIC_ENDPOINT.to_string()],
        }
    }

    /// Replace the set of network-first paths.
    pub fn network_first_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.network_first = paths.into_iter().map(Into::into).collect();
        self
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    pub fn network_first(&self) -> &[String] {
        &self.network_first
    }

    /// Decide how `request` is handled.
    pub fn classify(&self, request: &Request) -> Strategy {
        if request.method != Method::GET {
            return Strategy::PassThrough;
        }
        if request.url.origin() != self.origin.origin() {
            return Strategy::PassThrough;
        }
        if self.network_first.iter().any(|p| p == request.url.path()) {
            return Strategy::NetworkFirst;
        }
        Strategy::CacheFirst
    }
}
