//! Install → activate lifecycle of cache generations.
//!
//! One [`LifecycleController`] exists per deployment. It owns the
//! deployment's generation tag and moves through three states:
//!
//! ```text
//! Installing ──install ok──▶ WaitingToActivate ──activate──▶ Active
//!     ▲    │
//!     └────┘ install failed (retried on the next trigger)
//! ```
//!
//! # Install
//!
//! Every manifest URL is fetched (bounded concurrency, first failure aborts
//! the attempt). Nothing is written until all fetches succeeded; only then
//! is the generation opened, filled and committed. A failed attempt never
//! touches the current generation, so whatever was serving before keeps
//! serving. Only committed generations are adopted after a restart.
//!
//! # Activate
//!
//! The installed generation becomes current and every other generation is
//! deleted. Deletion failures are logged and skipped; stale generations
//! waste space but cannot be served.
//!
//! With `skip_waiting` (the default) a successful install activates
//! immediately instead of waiting for an explicit [`activate`] call.
//!
//! [`activate`]: LifecycleController::activate

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use futures_util::{StreamExt, TryStreamExt, stream};
use reqwest::Url;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::cache::{CacheGeneration, CacheStorage, CurrentGeneration};
use crate::manifest::AssetManifest;
use crate::network::Network;
use crate::telemetry;
use crate::types::{CachedResponse, Request, RequestKey, Response};
use crate::{MuninnError, Result};

/// Generation tag of the current site build.
pub const DEFAULT_GENERATION: &str = "latvian-lang-b1-v2";

/// Default number of manifest fetches in flight during install.
pub const DEFAULT_PRECACHE_CONCURRENCY: usize = 8;

/// Lifecycle state of the deployment's generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Not installed yet: an install is running or awaiting its next
    /// trigger after a failure.
    Installing,
    /// Fully precached, not yet current.
    WaitingToActivate,
    /// Current and intercepting.
    Active,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LifecycleState::Installing => "installing",
            LifecycleState::WaitingToActivate => "waiting to activate",
            LifecycleState::Active => "active",
        })
    }
}

/// Static inputs of a deployment.
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Generation tag; changing it triggers a new install and switchover.
    pub generation: String,
    /// URLs to precache.
    pub manifest: AssetManifest,
    /// Origin the manifest is resolved against.
    pub origin: Url,
    /// Manifest fetches in flight during install. Default: 8.
    pub precache_concurrency: usize,
    /// Activate right after a successful install. Default: true.
    pub skip_waiting: bool,
}

impl LifecycleConfig {
    pub fn new(origin: Url) -> Self {
        Self {
            generation: DEFAULT_GENERATION.to_string(),
            manifest: AssetManifest::site_default(),
            origin,
            precache_concurrency: DEFAULT_PRECACHE_CONCURRENCY,
            skip_waiting: true,
        }
    }
}

/// Outcome of a successful install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    pub generation: String,
    /// Entries in the generation after the install.
    pub entries: usize,
}

/// Outcome of an activation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivateReport {
    pub generation: String,
    /// Tag of the generation that was current before, if any.
    pub previous: Option<String>,
    /// Stale generations removed.
    pub deleted: Vec<String>,
    /// Stale generations that could not be removed.
    pub failed: Vec<String>,
}

/// Drives one deployment's generation from install to active.
pub struct LifecycleController {
    config: LifecycleConfig,
    storage: Arc<dyn CacheStorage>,
    network: Arc<dyn Network>,
    current: CurrentGeneration,
    state: RwLock<LifecycleState>,
    installed: RwLock<Option<Arc<dyn CacheGeneration>>>,
    transition: Mutex<()>,
}

impl LifecycleController {
    pub fn new(
        config: LifecycleConfig,
        storage: Arc<dyn CacheStorage>,
        network: Arc<dyn Network>,
        current: CurrentGeneration,
    ) -> Self {
        Self {
            config,
            storage,
            network,
            current,
            state: RwLock::new(LifecycleState::Installing),
            installed: RwLock::new(None),
            transition: Mutex::new(()),
        }
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: LifecycleState) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// This deployment's generation tag.
    pub fn generation(&self) -> &str {
        &self.config.generation
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    pub fn current(&self) -> &CurrentGeneration {
        &self.current
    }

    /// Adopt a generation left behind by a previous run.
    ///
    /// Only acts when nothing is current and storage holds exactly one
    /// committed generation (the normal state after an activation). A
    /// generation whose install never finished is left alone. Adopting this
    /// deployment's own tag makes the controller `Active` without a new
    /// install. Returns the tag of the current generation afterwards.
    pub async fn resume(&self) -> Result<Option<String>> {
        let _guard = self.transition.lock().await;
        if let Some(name) = self.current.name() {
            return Ok(Some(name));
        }
        let names = self.storage.names().await?;
        match names.as_slice() {
            [] => Ok(None),
            [only] => {
                let generation = self.storage.open(only).await?;
                if !generation.is_committed().await? {
                    debug!(generation = %only, "not adopting unfinished generation");
                    return Ok(None);
                }
                info!(generation = %only, "resuming with surviving generation");
                self.current.set(generation);
                if *only == self.config.generation {
                    self.set_state(LifecycleState::Active);
                }
                Ok(Some(only.clone()))
            }
            several => {
                warn!(
                    count = several.len(),
                    "several generations in storage, not adopting any"
                );
                Ok(None)
            }
        }
    }

    /// Precache the manifest into this deployment's generation.
    ///
    /// All-or-nothing: on error the generation is not eligible for
    /// activation and the current generation is untouched. Re-installing
    /// while `Active` refreshes the live generation in place and leaves the
    /// state alone.
    pub async fn install(&self) -> Result<InstallReport> {
        let _guard = self.transition.lock().await;
        self.run_install().await
    }

    async fn run_install(&self) -> Result<InstallReport> {
        let tag = self.config.generation.as_str();
        let refresh = self.state() == LifecycleState::Active;
        if !refresh {
            self.set_state(LifecycleState::Installing);
            *self
                .installed
                .write()
                .unwrap_or_else(PoisonError::into_inner) = None;
        }
        info!(
            generation = tag,
            assets = self.config.manifest.len(),
            storage = self.storage.name(),
            refresh,
            "installing"
        );

        match self.try_install().await {
            Ok(generation) => {
                let entries = generation.len().await?;
                if !refresh {
                    *self
                        .installed
                        .write()
                        .unwrap_or_else(PoisonError::into_inner) = Some(generation);
                    self.set_state(LifecycleState::WaitingToActivate);
                }
                metrics::counter!(telemetry::PRECACHE_TOTAL, "status" => "ok").increment(1);
                info!(generation = tag, entries, "installed");
                Ok(InstallReport {
                    generation: tag.to_string(),
                    entries,
                })
            }
            Err(e) => {
                metrics::counter!(telemetry::PRECACHE_TOTAL, "status" => "error").increment(1);
                warn!(
                    generation = tag,
                    current = ?self.current.name(),
                    error = %e,
                    "install failed, previous generation stays current"
                );
                Err(e)
            }
        }
    }

    async fn try_install(&self) -> Result<Arc<dyn CacheGeneration>> {
        let tag = self.config.generation.as_str();
        let urls = self.config.manifest.resolve(&self.config.origin)?;
        let fetched = self.precache(urls).await?;

        let generation = self.storage.open(tag).await?;
        if let Err(e) = fill(generation.as_ref(), fetched).await {
            if !self.current.is(tag) {
                if let Err(cleanup) = self.storage.delete(tag).await {
                    warn!(generation = tag, error = %cleanup, "failed to discard partial generation");
                }
            }
            return Err(e);
        }
        Ok(generation)
    }

    /// Fetch every URL, failing on the first transport error or non-2xx
    /// status. Results keep manifest order.
    async fn precache(&self, urls: Vec<Url>) -> Result<Vec<(RequestKey, Response)>> {
        let concurrency = self.config.precache_concurrency.max(1);
        stream::iter(urls)
            .map(|url| async move {
                let request = Request::get(url.clone());
                let response = self.network.fetch(&request).await.map_err(|e| {
                    MuninnError::Precache {
                        url: url.to_string(),
                        source: Box::new(e),
                    }
                })?;
                if !response.is_success() {
                    return Err(MuninnError::Precache {
                        url: url.to_string(),
                        source: Box::new(MuninnError::Status {
                            url: url.to_string(),
                            status: response.status,
                        }),
                    });
                }
                debug!(url = %url, bytes = response.body.len(), "precached");
                Ok((RequestKey::get(&url), response))
            })
            .buffered(concurrency)
            .try_collect()
            .await
    }

    /// Promote the installed generation and delete every other one.
    pub async fn activate(&self) -> Result<ActivateReport> {
        let _guard = self.transition.lock().await;
        self.run_activate().await
    }

    async fn run_activate(&self) -> Result<ActivateReport> {
        let state = self.state();
        if state != LifecycleState::WaitingToActivate {
            return Err(MuninnError::InvalidState {
                operation: "activate",
                state,
            });
        }
        let generation = self
            .installed
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(MuninnError::InvalidState {
                operation: "activate",
                state,
            })?;

        let tag = self.config.generation.clone();
        let previous = self
            .current
            .set(generation)
            .map(|g| g.name().to_string());

        let mut report = ActivateReport {
            generation: tag.clone(),
            previous,
            ..Default::default()
        };

        let names = match self.storage.names().await {
            Ok(names) => names,
            Err(e) => {
                warn!(error = %e, "failed to list generations, skipping cleanup");
                Vec::new()
            }
        };
        for name in names.into_iter().filter(|n| *n != tag) {
            match self.storage.delete(&name).await {
                Ok(_) => {
                    metrics::counter!(telemetry::GENERATIONS_DELETED_TOTAL).increment(1);
                    debug!(generation = %name, "deleted stale generation");
                    report.deleted.push(name);
                }
                Err(e) => {
                    warn!(generation = %name, error = %e, "failed to delete stale generation");
                    report.failed.push(name);
                }
            }
        }

        self.set_state(LifecycleState::Active);
        info!(
            generation = %tag,
            previous = ?report.previous,
            deleted = report.deleted.len(),
            "activated"
        );
        Ok(report)
    }

    /// Install and, with `skip_waiting`, activate.
    ///
    /// Waits for any transition already in progress.
    pub async fn start(&self) -> Result<LifecycleState> {
        let _guard = self.transition.lock().await;
        self.advance().await
    }

    /// Retry a pending install.
    ///
    /// Returns `None` without doing anything if another transition is in
    /// progress; at most one install runs at a time.
    pub async fn update(&self) -> Result<Option<LifecycleState>> {
        let Ok(_guard) = self.transition.try_lock() else {
            debug!("lifecycle transition already running");
            return Ok(None);
        };
        self.advance().await.map(Some)
    }

    async fn advance(&self) -> Result<LifecycleState> {
        if self.state() == LifecycleState::Installing {
            self.run_install().await?;
        }
        if self.state() == LifecycleState::WaitingToActivate && self.config.skip_waiting {
            self.run_activate().await?;
        }
        Ok(self.state())
    }
}

/// Write every fetched response, then mark the generation complete.
async fn fill(
    generation: &dyn CacheGeneration,
    fetched: Vec<(RequestKey, Response)>,
) -> Result<()> {
    for (key, response) in fetched {
        generation.put(key, CachedResponse::new(response)).await?;
    }
    generation.commit().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCacheStorage;
    use async_trait::async_trait;

    struct StaticNetwork;

    #[async_trait]
    impl Network for StaticNetwork {
        fn name(&self) -> &str {
            "static"
        }

        async fn fetch(&self, request: &Request) -> Result<Response> {
            Ok(Response::new(200, request.url.path().to_string()))
        }
    }

    fn controller(storage: Arc<dyn CacheStorage>, tag: &str) -> LifecycleController {
        let mut config = LifecycleConfig::new(Url::parse("https://site.test").unwrap());
        config.generation = tag.to_string();
        config.manifest = AssetManifest::new(["/", "/app.js"]);
        LifecycleController::new(
            config,
            storage,
            Arc::new(StaticNetwork),
            CurrentGeneration::new(),
        )
    }

    #[test]
    fn state_display() {
        assert_eq!(LifecycleState::WaitingToActivate.to_string(), "waiting to activate");
    }

    #[tokio::test]
    async fn activate_before_install_is_rejected() {
        let lifecycle = controller(Arc::new(MemoryCacheStorage::new()), "v1");
        let err = lifecycle.activate().await.unwrap_err();
        assert!(matches!(
            err,
            MuninnError::InvalidState {
                operation: "activate",
                state: LifecycleState::Installing
            }
        ));
    }

    #[tokio::test]
    async fn start_runs_to_active() {
        let lifecycle = controller(Arc::new(MemoryCacheStorage::new()), "v1");
        assert_eq!(lifecycle.start().await.unwrap(), LifecycleState::Active);
        assert!(lifecycle.current().is("v1"));
    }

    #[tokio::test]
    async fn without_skip_waiting_install_parks() {
        let mut lifecycle = controller(Arc::new(MemoryCacheStorage::new()), "v1");
        lifecycle.config.skip_waiting = false;

        assert_eq!(
            lifecycle.start().await.unwrap(),
            LifecycleState::WaitingToActivate
        );
        assert!(lifecycle.current().get().is_none());

        lifecycle.activate().await.unwrap();
        assert_eq!(lifecycle.state(), LifecycleState::Active);
    }

    #[tokio::test]
    async fn resume_adopts_sole_generation() {
        let storage: Arc<dyn CacheStorage> = Arc::new(MemoryCacheStorage::new());
        controller(storage.clone(), "v1").start().await.unwrap();

        let next = controller(storage, "v2");
        assert_eq!(next.resume().await.unwrap().as_deref(), Some("v1"));
        assert!(next.current().is("v1"));
        assert_eq!(next.state(), LifecycleState::Installing);
    }

    #[tokio::test]
    async fn resume_of_own_generation_is_active() {
        let storage: Arc<dyn CacheStorage> = Arc::new(MemoryCacheStorage::new());
        controller(storage.clone(), "v1").start().await.unwrap();

        let restarted = controller(storage, "v1");
        assert_eq!(restarted.resume().await.unwrap().as_deref(), Some("v1"));
        assert_eq!(restarted.state(), LifecycleState::Active);
    }

    #[tokio::test]
    async fn resume_ignores_ambiguous_storage() {
        let storage: Arc<dyn CacheStorage> = Arc::new(MemoryCacheStorage::new());
        storage.open("a").await.unwrap();
        storage.open("b").await.unwrap();

        let lifecycle = controller(storage, "v1");
        assert!(lifecycle.resume().await.unwrap().is_none());
        assert!(lifecycle.current().get().is_none());
    }
}
