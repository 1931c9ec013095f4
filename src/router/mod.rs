//! Fetch router: answers every intercepted request.
//!
//! [`RoutePolicy`] picks a [`Strategy`] per request, then:
//!
//! - **NetworkFirst**: live fetch; a 2xx response is returned immediately
//!   and written back to the current generation in the background. If the
//!   network is unreachable the cached snapshot is served; with no snapshot
//!   the request fails.
//! - **CacheFirst**: a hit in the current generation is returned without
//!   touching the network. A miss is fetched and returned verbatim, without
//!   being stored: only manifest entries and the dynamic endpoints live in
//!   the cache.
//! - **PassThrough**: forwarded untouched.
//!
//! When both the network and the cache fail for a navigation, the offline
//! document is served instead of an error. Other destinations fail: there is
//! no safe synthetic script, stylesheet or image.
//!
//! Until some generation is current the router does not intercept at all
//! and every request passes through.

pub mod routing;
pub mod write_back;

pub use routing::{DEFAULT_DYNAMIC_ENDPOINT, RoutePolicy, Strategy};
pub use write_back::{WriteBack, WriteBackFailure};

use std::sync::Arc;

use tracing::{debug, warn};

use crate::cache::{CacheGeneration, CurrentGeneration};
use crate::fallback::offline_document;
use crate::network::Network;
use crate::telemetry;
use crate::types::{Request, RequestKey, Served};
use crate::{MuninnError, Result};

/// Dispatches requests according to a [`RoutePolicy`].
pub struct FetchRouter {
    policy: RoutePolicy,
    network: Arc<dyn Network>,
    current: CurrentGeneration,
    write_back: WriteBack,
}

impl FetchRouter {
    pub fn new(policy: RoutePolicy, network: Arc<dyn Network>, current: CurrentGeneration) -> Self {
        Self {
            policy,
            network,
            current,
            write_back: WriteBack::new(),
        }
    }

    pub fn policy(&self) -> &RoutePolicy {
        &self.policy
    }

    pub fn write_back(&self) -> &WriteBack {
        &self.write_back
    }

    /// Answer `request`.
    ///
    /// Returns an error only when no response can be produced: the network
    /// failed, nothing usable was cached, and the request is not a
    /// navigation.
    pub async fn handle(&self, request: &Request) -> Result<Served> {
        let strategy = self.policy.classify(request);

        let intercepted = match (strategy, self.current.get(), request.cache_key()) {
            (Strategy::PassThrough, _, _) | (_, None, _) | (_, _, None) => None,
            (strategy, Some(generation), Some(key)) => Some((strategy, generation, key)),
        };
        let Some((strategy, generation, key)) = intercepted else {
            return self.pass_through(request).await;
        };

        let result = match strategy {
            Strategy::NetworkFirst => self.network_first(request, generation, key).await,
            _ => self.cache_first(request, generation.as_ref(), &key).await,
        };

        match result {
            Ok(served) => {
                metrics::counter!(
                    telemetry::REQUESTS_TOTAL,
                    "strategy" => strategy.as_str(),
                    "source" => served.source.as_str()
                )
                .increment(1);
                Ok(served)
            }
            Err(e) if request.is_navigation() => {
                debug!(url = %request.url, error = %e, "serving offline document");
                metrics::counter!(telemetry::OFFLINE_FALLBACKS_TOTAL).increment(1);
                metrics::counter!(
                    telemetry::REQUESTS_TOTAL,
                    "strategy" => strategy.as_str(),
                    "source" => "offline_fallback"
                )
                .increment(1);
                Ok(Served::offline_fallback(offline_document()))
            }
            Err(e) => {
                debug!(
                    url = %request.url,
                    destination = %request.destination,
                    error = %e,
                    "request failed"
                );
                metrics::counter!(
                    telemetry::REQUEST_FAILURES_TOTAL,
                    "strategy" => strategy.as_str()
                )
                .increment(1);
                Err(e)
            }
        }
    }

    async fn pass_through(&self, request: &Request) -> Result<Served> {
        let strategy = Strategy::PassThrough.as_str();
        match self.network.fetch(request).await {
            Ok(response) => {
                metrics::counter!(
                    telemetry::REQUESTS_TOTAL,
                    "strategy" => strategy,
                    "source" => "network"
                )
                .increment(1);
                Ok(Served::network(response))
            }
            Err(e) => {
                metrics::counter!(telemetry::REQUEST_FAILURES_TOTAL, "strategy" => strategy)
                    .increment(1);
                Err(e)
            }
        }
    }

    async fn network_first(
        &self,
        request: &Request,
        generation: Arc<dyn CacheGeneration>,
        key: RequestKey,
    ) -> Result<Served> {
        let strategy = Strategy::NetworkFirst.as_str();
        let network_error = match self.network.fetch(request).await {
            Ok(response) => {
                if response.is_success() {
                    self.write_back
                        .spawn(generation, key, response.clone());
                } else {
                    debug!(
                        url = %request.url,
                        status = response.status,
                        "not refreshing cache from error response"
                    );
                }
                return Ok(Served::network(response));
            }
            Err(e) if e.is_network_failure() => e,
            Err(e) => return Err(e),
        };

        metrics::counter!(telemetry::NETWORK_FAILURES_TOTAL, "strategy" => strategy).increment(1);
        match generation.lookup(&key).await {
            Ok(Some(cached)) => {
                metrics::counter!(telemetry::CACHE_HITS_TOTAL, "strategy" => strategy)
                    .increment(1);
                debug!(url = %request.url, error = %network_error, "network down, serving snapshot");
                Ok(Served::cache(cached))
            }
            Ok(None) => {
                metrics::counter!(telemetry::CACHE_MISSES_TOTAL, "strategy" => strategy)
                    .increment(1);
                Err(network_error)
            }
            Err(e) => {
                warn!(
                    url = %request.url,
                    generation = generation.name(),
                    error = %e,
                    "cache lookup failed"
                );
                Err(network_error)
            }
        }
    }

    async fn cache_first(
        &self,
        request: &Request,
        generation: &dyn CacheGeneration,
        key: &RequestKey,
    ) -> Result<Served> {
        let strategy = Strategy::CacheFirst.as_str();
        match generation.lookup(key).await {
            Ok(Some(cached)) => {
                metrics::counter!(telemetry::CACHE_HITS_TOTAL, "strategy" => strategy)
                    .increment(1);
                return Ok(Served::cache(cached));
            }
            Ok(None) => {
                metrics::counter!(telemetry::CACHE_MISSES_TOTAL, "strategy" => strategy)
                    .increment(1);
            }
            Err(e) => {
                // Treated as a miss.
                warn!(
                    url = %request.url,
                    generation = generation.name(),
                    error = %e,
                    "cache lookup failed, trying network"
                );
                metrics::counter!(telemetry::CACHE_MISSES_TOTAL, "strategy" => strategy)
                    .increment(1);
            }
        }

        self.network
            .fetch(request)
            .await
            .map(Served::network)
            .inspect_err(|e: &MuninnError| {
                if e.is_network_failure() {
                    metrics::counter!(telemetry::NETWORK_FAILURES_TOTAL, "strategy" => strategy)
                        .increment(1);
                }
            })
    }
}
