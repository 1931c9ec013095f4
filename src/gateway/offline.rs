//! OfflineGateway - the interception layer as one object

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::Result;
use crate::lifecycle::{ActivateReport, InstallReport, LifecycleController, LifecycleState};
use crate::router::{FetchRouter, WriteBackFailure};
use crate::types::{Request, Served};

/// Lifecycle controller and fetch router sharing one current generation.
///
/// Hosts call [`start`](Self::start) once, then hand every request to
/// [`handle`](Self::handle).
pub struct OfflineGateway {
    lifecycle: Arc<LifecycleController>,
    router: FetchRouter,
}

impl OfflineGateway {
    pub(crate) fn new(lifecycle: Arc<LifecycleController>, router: FetchRouter) -> Self {
        Self { lifecycle, router }
    }

    /// Bring the deployment's generation up.
    ///
    /// Adopts a committed generation surviving from a previous run
    /// (persistent storage), then installs and activates unless the adopted
    /// generation is this deployment's own. An install failure is returned,
    /// but the gateway stays usable: the adopted generation, if any, keeps
    /// serving and the next navigation retries the install.
    pub async fn start(&self) -> Result<LifecycleState> {
        if let Err(e) = self.lifecycle.resume().await {
            warn!(error = %e, "failed to inspect stored generations");
        }
        self.lifecycle.start().await
    }

    /// Run the install step alone.
    ///
    /// Waits for any transition in progress. On an active gateway this
    /// refreshes the live generation without leaving `Active`.
    pub async fn install(&self) -> Result<InstallReport> {
        self.lifecycle.install().await
    }

    /// Run the activate step alone.
    pub async fn activate(&self) -> Result<ActivateReport> {
        self.lifecycle.activate().await
    }

    /// Retry a pending install now; `None` if one is already running.
    pub async fn update(&self) -> Result<Option<LifecycleState>> {
        self.lifecycle.update().await
    }

    /// Answer an intercepted request.
    ///
    /// A navigation arriving before the deployment is active also kicks off
    /// a background install retry.
    pub async fn handle(&self, request: &Request) -> Result<Served> {
        if request.is_navigation() && self.lifecycle.state() != LifecycleState::Active {
            self.spawn_update();
        }
        self.router.handle(request).await
    }

    fn spawn_update(&self) {
        let lifecycle = self.lifecycle.clone();
        tokio::spawn(async move {
            match lifecycle.update().await {
                Ok(Some(state)) => debug!(%state, "lifecycle update finished"),
                Ok(None) => {}
                Err(e) => warn!(error = %e, "lifecycle update failed"),
            }
        });
    }

    /// Wait for background cache writes to finish.
    pub async fn flush(&self) {
        self.router.write_back().flush().await;
    }

    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    /// Tag of the generation answering lookups, if any.
    pub fn current_generation(&self) -> Option<String> {
        self.lifecycle.current().name()
    }

    /// This deployment's generation tag.
    pub fn generation(&self) -> &str {
        self.lifecycle.generation()
    }

    /// Observe background write failures.
    pub fn write_back_failures(&self) -> broadcast::Receiver<WriteBackFailure> {
        self.router.write_back().subscribe()
    }

    pub fn lifecycle(&self) -> &LifecycleController {
        &self.lifecycle
    }

    pub fn router(&self) -> &FetchRouter {
        &self.router
    }
}
