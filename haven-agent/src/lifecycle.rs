//! Lifecycle Controller
//!
//! Drives `Installing → Installed → Activating → Active`. Install populates
//! the current static tier from the manifest; activation evicts every tier
//! outside the current generation set and claims open pages.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::future::join_all;
use haven_core::{
    AgentConfig, AgentState, BatchReport, HavenError, HavenResult, InstallError, LifecycleError,
    NetworkError, Request, Response,
};
use haven_storage::{CacheTier, TierStore};
use tokio::sync::RwLock;

use crate::host::{fetch_bounded, Host, Network};

/// Owns the agent state and runs the install/activate handlers.
pub struct LifecycleController<S, N, H> {
    config: Arc<AgentConfig>,
    store: Arc<S>,
    network: Arc<N>,
    host: Arc<H>,
    state: RwLock<AgentState>,
    /// Set by `SKIP_WAITING` while still installing
    skip_waiting_requested: AtomicBool,
}

impl<S, N, H> LifecycleController<S, N, H>
where
    S: TierStore + 'static,
    N: Network,
    H: Host,
{
    pub fn new(config: Arc<AgentConfig>, store: Arc<S>, network: Arc<N>, host: Arc<H>) -> Self {
        Self {
            config,
            store,
            network,
            host,
            state: RwLock::new(AgentState::Installing),
            skip_waiting_requested: AtomicBool::new(false),
        }
    }

    pub async fn state(&self) -> AgentState {
        *self.state.read().await
    }

    async fn transition(&self, next: AgentState) -> Result<AgentState, LifecycleError> {
        let mut state = self.state.write().await;
        let from = *state;
        *state = from.transition(next)?;
        tracing::info!(from = %from, to = %next, "Agent state transition");
        Ok(from)
    }

    async fn fail(&self, reason: &str) {
        let mut state = self.state.write().await;
        match state.transition(AgentState::Failed) {
            Ok(next) => {
                let from = *state;
                tracing::error!(from = %from, reason, "Agent failed");
                *state = next;
            }
            Err(e) => tracing::warn!(error = %e, reason, "Could not mark agent failed"),
        }
    }

    // ========================================================================
    // INSTALL
    // ========================================================================

    /// Fetch every manifest entry and store it in the current static tier.
    ///
    /// All fetches run concurrently and nothing is written unless every one
    /// of them produced a 2xx response. A store failure during the write
    /// phase still fails the install and leaves whatever was written so far.
    pub async fn install(&self) -> HavenResult<AgentState> {
        let current = self.state().await;
        if current != AgentState::Installing {
            return Err(LifecycleError::InvalidTransition {
                from: current,
                to: AgentState::Installed,
            }
            .into());
        }

        let static_name = self.config.registry.static_name();
        tracing::info!(tier = %static_name, assets = self.config.manifest.len(), "Installing");

        let urls = match self.config.manifest.resolve(&self.config.origin) {
            Ok(urls) => urls,
            Err(e) => {
                self.fail(&e.to_string()).await;
                return Err(e.into());
            }
        };
        let requests: Vec<Request> = urls.into_iter().map(Request::get).collect();

        let timeout = self.config.fetch_timeout();
        let results = join_all(
            requests
                .iter()
                .map(|request| fetch_bounded(self.network.as_ref(), request, timeout)),
        )
        .await;

        let mut report: BatchReport<NetworkError> = BatchReport::new();
        let mut fetched: Vec<(&Request, Response)> = Vec::with_capacity(requests.len());
        for (request, result) in requests.iter().zip(results) {
            let identity = request.identity().to_string();
            match result {
                Ok(response) if response.is_ok() => {
                    report.success(identity);
                    fetched.push((request, response));
                }
                Ok(response) => report.failure(
                    identity,
                    NetworkError::Upstream {
                        url: request.url.to_string(),
                        reason: format!("status {}", response.status),
                    },
                ),
                Err(e) => report.failure(identity, e),
            }
        }

        if !report.all_succeeded() {
            let failed: Vec<String> = report.failures().map(|(id, _)| id.to_string()).collect();
            let (first, cause) = report
                .failures()
                .next()
                .map(|(id, cause)| (id.to_string(), cause.to_string()))
                .unwrap_or_default();
            let error = InstallError::AssetsUnavailable {
                failed,
                first,
                cause,
            };
            self.fail(&error.to_string()).await;
            return Err(error.into());
        }

        if let Err(e) = self.write_static(&static_name, fetched).await {
            self.fail(&e.to_string()).await;
            return Err(e);
        }

        self.transition(AgentState::Installed).await?;
        tracing::info!(tier = %static_name, "Static assets cached");

        if self.config.skip_waiting_on_install
            || self.skip_waiting_requested.swap(false, Ordering::AcqRel)
        {
            tracing::info!("Skipping waiting after install");
            self.activate().await?;
        }

        Ok(self.state().await)
    }

    async fn write_static(
        &self,
        static_name: &str,
        fetched: Vec<(&Request, Response)>,
    ) -> HavenResult<()> {
        let tier = self.store.open(static_name).await?;
        for (request, response) in fetched {
            let identity = request.identity();
            tier.put(&identity, &response.for_storage()).await.map_err(|e| {
                HavenError::from(InstallError::AssetWriteFailed {
                    identity: identity.to_string(),
                    cause: e.to_string(),
                })
            })?;
        }
        Ok(())
    }

    // ========================================================================
    // ACTIVATE
    // ========================================================================

    /// Delete stale tiers, then claim open pages.
    ///
    /// Deletion is per tier and best effort: failures land in the report and
    /// do not stop activation. Running it again without a new version is a
    /// no-op on the tier set.
    pub async fn activate(&self) -> HavenResult<BatchReport<HavenError>> {
        self.transition(AgentState::Activating).await?;

        let names = match self.store.list_tier_names().await {
            Ok(names) => names,
            Err(e) => {
                self.fail(&e.to_string()).await;
                return Err(e);
            }
        };

        let mut report = BatchReport::new();
        for name in names {
            if self.config.registry.is_current(&name) {
                continue;
            }
            match self.store.delete_tier(&name).await {
                Ok(_) => {
                    tracing::info!(tier = %name, "Deleted stale tier");
                    report.success(name);
                }
                Err(e) => {
                    tracing::warn!(tier = %name, error = %e, "Failed to delete stale tier");
                    report.failure(name, e);
                }
            }
        }

        if let Err(e) = self.host.claim().await {
            self.fail(&e.to_string()).await;
            return Err(e.into());
        }

        self.transition(AgentState::Active).await?;
        tracing::info!(
            deleted = report.successes().count(),
            failed = report.failure_count(),
            "Activated"
        );
        Ok(report)
    }

    /// Leave the waiting state now.
    ///
    /// Installed agents activate immediately; an agent still installing
    /// remembers the request and activates once install succeeds. Anything
    /// else has nothing to skip.
    pub async fn skip_waiting(&self) -> HavenResult<Option<BatchReport<HavenError>>> {
        match self.state().await {
            AgentState::Installed => self.activate().await.map(Some),
            AgentState::Installing => {
                self.skip_waiting_requested.store(true, Ordering::Release);
                tracing::debug!("Skip waiting requested during install");
                Ok(None)
            }
            state => {
                tracing::debug!(state = %state, "Skip waiting ignored");
                Ok(None)
            }
        }
    }

    /// Delete every tier regardless of generation.
    pub async fn clear_all(&self) -> HavenResult<BatchReport<HavenError>> {
        let mut report = BatchReport::new();
        for name in self.store.list_tier_names().await? {
            let result = self.store.delete_tier(&name).await.map(|_| ());
            if let Err(e) = &result {
                tracing::warn!(tier = %name, error = %e, "Failed to clear tier");
            }
            report.record(name, result);
        }
        Ok(report)
    }
}
