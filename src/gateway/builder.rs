//! Builder for configuring gateway instances

use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;

use super::OfflineGateway;
use crate::cache::{CacheStorage, CurrentGeneration, MemoryCacheStorage};
use crate::lifecycle::{LifecycleConfig, LifecycleController};
use crate::manifest::AssetManifest;
use crate::network::{HttpNetwork, Network};
use crate::router::{FetchRouter, RoutePolicy};
use crate::{MuninnError, Result};

/// Main entry point for creating gateway instances.
pub struct Muninn;

impl Muninn {
    /// Create a new builder for configuring the gateway.
    pub fn builder() -> MuninnBuilder {
        MuninnBuilder::new()
    }
}

/// Builder for configuring gateway instances.
///
/// Only the origin is required; everything else has a default:
///
/// | setting | default |
/// |---|---|
/// | generation | [`DEFAULT_GENERATION`](crate::lifecycle::DEFAULT_GENERATION) |
/// | manifest | [`AssetManifest::site_default`] |
/// | network-first paths | [`DEFAULT_DYNAMIC_ENDPOINT`](crate::router::DEFAULT_DYNAMIC_ENDPOINT) |
/// | storage | [`MemoryCacheStorage`] |
/// | network | [`HttpNetwork`], no timeout |
pub struct MuninnBuilder {
    origin: Option<String>,
    generation: Option<String>,
    manifest: Option<AssetManifest>,
    network_first: Option<Vec<String>>,
    storage: Option<Arc<dyn CacheStorage>>,
    network: Option<Arc<dyn Network>>,
    timeout_secs: Option<u64>,
    precache_concurrency: Option<usize>,
    skip_waiting: bool,
}

impl MuninnBuilder {
    pub fn new() -> Self {
        Self {
            origin: None,
            generation: None,
            manifest: None,
            network_first: None,
            storage: None,
            network: None,
            timeout_secs: None,
            precache_concurrency: None,
            skip_waiting: true,
        }
    }

    /// Origin of the site being fronted, e.g. `https://vardi.example`.
    pub fn origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// Generation tag of this deployment.
    pub fn generation(mut self, tag: impl Into<String>) -> Self {
        self.generation = Some(tag.into());
        self
    }

    /// URLs to precache on install.
    pub fn manifest(mut self, manifest: AssetManifest) -> Self {
        self.manifest = Some(manifest);
        self
    }

    /// Add a dynamic data endpoint answered network-first.
    ///
    /// The first call replaces the default endpoint.
    pub fn network_first(mut self, path: impl Into<String>) -> Self {
        self.network_first
            .get_or_insert_with(Vec::new)
            .push(path.into());
        self
    }

    /// Replace the network-first endpoints with `paths`.
    ///
    /// An empty list leaves every same-origin GET cache-first.
    pub fn network_first_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.network_first = Some(paths.into_iter().map(Into::into).collect());
        self
    }

    /// Where generations live.
    pub fn storage(mut self, storage: Arc<dyn CacheStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Custom network implementation (overrides [`timeout`](Self::timeout)).
    pub fn network(mut self, network: Arc<dyn Network>) -> Self {
        self.network = Some(network);
        self
    }

    /// Timeout for network fetches (seconds). Without it, fetches wait as
    /// long as the HTTP client does.
    pub fn timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Manifest fetches in flight during install.
    pub fn precache_concurrency(mut self, n: usize) -> Self {
        self.precache_concurrency = Some(n);
        self
    }

    /// Whether a successful install activates immediately (default: true).
    pub fn skip_waiting(mut self, enabled: bool) -> Self {
        self.skip_waiting = enabled;
        self
    }

    /// Build the gateway.
    pub fn build(self) -> Result<OfflineGateway> {
        let origin = self
            .origin
            .ok_or_else(|| MuninnError::Configuration("no origin configured".to_string()))?;
        let origin = Url::parse(&origin).map_err(|e| MuninnError::InvalidUrl {
            url: origin.clone(),
            message: e.to_string(),
        })?;
        if origin.cannot_be_a_base() || !matches!(origin.scheme(), "http" | "https") {
            return Err(MuninnError::Configuration(format!(
                "origin must be an http(s) URL, got {origin}"
            )));
        }

        let network: Arc<dyn Network> = match (self.network, self.timeout_secs) {
            (Some(network), _) => network,
            (None, Some(secs)) => Arc::new(HttpNetwork::with_timeout(Duration::from_secs(secs))?),
            (None, None) => Arc::new(HttpNetwork::new()),
        };
        let storage = self
            .storage
            .unwrap_or_else(|| Arc::new(MemoryCacheStorage::new()));

        let mut config = LifecycleConfig::new(origin.clone());
        if let Some(generation) = self.generation {
            config.generation = generation;
        }
        if let Some(manifest) = self.manifest {
            config.manifest = manifest;
        }
        if let Some(n) = self.precache_concurrency {
            config.precache_concurrency = n;
        }
        config.skip_waiting = self.skip_waiting;
        // Malformed or cross-origin manifest entries are a build error.
        config.manifest.resolve(&origin)?;

        let mut policy = RoutePolicy::new(origin);
        if let Some(paths) = self.network_first {
            policy = policy.network_first_paths(paths);
        }

        let current = CurrentGeneration::new();
        let lifecycle = LifecycleController::new(config, storage, network.clone(), current.clone());
        let router = FetchRouter::new(policy, network, current);

        Ok(OfflineGateway::new(Arc::new(lifecycle), router))
    }
}

impl Default for MuninnBuilder {
    fn default() -> Self {
        Self::new()
    }
}
