//! The agent facade and its handler set.
//!
//! [`EventHandlers`] is the capability set a host dispatches into; how events
//! are delivered is the host's business. [`Agent`] wires the lifecycle,
//! interception, control and notification components over one shared store.

use std::sync::Arc;

use async_trait::async_trait;
use haven_core::{
    AgentConfig, AgentState, BatchReport, HavenError, HavenResult, NetworkError,
    NotificationChoice, NotificationClick, NotificationDescriptor, Request,
};
use haven_storage::{CacheStats, TierStore};
use tokio::sync::broadcast;

use crate::control::{ControlChannel, ControlOutcome, MessageEnvelope};
use crate::host::{Host, Network};
use crate::interceptor::{FetchInterceptor, FetchOutcome};
use crate::lifecycle::LifecycleController;
use crate::notify::NotificationDispatcher;
use crate::writer::{CacheWriteFailure, CacheWriter};

/// Named entry points invoked by the host's event loop.
#[async_trait]
pub trait EventHandlers: Send + Sync {
    async fn on_install(&self) -> HavenResult<AgentState>;

    async fn on_activate(&self) -> HavenResult<BatchReport<HavenError>>;

    async fn on_fetch(&self, request: &Request) -> Result<FetchOutcome, NetworkError>;

    async fn on_push(&self, payload: Option<&[u8]>) -> HavenResult<Option<NotificationDescriptor>>;

    async fn on_message(&self, envelope: MessageEnvelope) -> HavenResult<ControlOutcome>;

    async fn on_notification_click(
        &self,
        click: &NotificationClick,
    ) -> HavenResult<NotificationChoice>;
}

/// One agent instance over store `S`, network `N` and host `H`.
pub struct Agent<S, N, H> {
    config: Arc<AgentConfig>,
    store: Arc<S>,
    lifecycle: Arc<LifecycleController<S, N, H>>,
    interceptor: FetchInterceptor<S, N>,
    control: ControlChannel<S, N, H>,
    notifications: NotificationDispatcher<H>,
    writer: CacheWriter<S>,
}

impl<S, N, H> Agent<S, N, H>
where
    S: TierStore + 'static,
    N: Network,
    H: Host,
{
    /// Validate `config` and build the components.
    pub fn new(config: AgentConfig, store: Arc<S>, network: Arc<N>, host: Arc<H>) -> HavenResult<Self> {
        config.validate()?;
        let config = Arc::new(config);

        let writer = CacheWriter::new(store.clone());
        let lifecycle = Arc::new(LifecycleController::new(
            config.clone(),
            store.clone(),
            network.clone(),
            host.clone(),
        ));
        let interceptor =
            FetchInterceptor::new(config.clone(), store.clone(), network, writer.clone());
        let control = ControlChannel::new(config.clone(), lifecycle.clone());
        let notifications = NotificationDispatcher::new(config.clone(), host);

        tracing::info!(
            origin = %config.origin,
            static_tier = %config.registry.static_name(),
            dynamic_tier = %config.registry.dynamic_name(),
            "Agent created"
        );

        Ok(Self {
            config,
            store,
            lifecycle,
            interceptor,
            control,
            notifications,
            writer,
        })
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub async fn state(&self) -> AgentState {
        self.lifecycle.state().await
    }

    /// Name of the current static generation, as answered to `GET_VERSION`.
    pub fn version(&self) -> String {
        self.config.registry.static_name()
    }

    pub async fn stats(&self) -> HavenResult<CacheStats> {
        self.store.stats().await
    }

    pub fn subscribe_write_failures(&self) -> broadcast::Receiver<CacheWriteFailure> {
        self.writer.subscribe_failures()
    }

    /// Wait until every background cache write spawned so far has finished.
    pub async fn wait_for_writes(&self) {
        self.writer.wait_idle().await
    }
}

#[async_trait]
impl<S, N, H> EventHandlers for Agent<S, N, H>
where
    S: TierStore + 'static,
    N: Network,
    H: Host,
{
    async fn on_install(&self) -> HavenResult<AgentState> {
        self.lifecycle.install().await
    }

    async fn on_activate(&self) -> HavenResult<BatchReport<HavenError>> {
        self.lifecycle.activate().await
    }

    /// Only an active agent intercepts; before that the host handles requests itself.
    async fn on_fetch(&self, request: &Request) -> Result<FetchOutcome, NetworkError> {
        let state = self.lifecycle.state().await;
        if state != AgentState::Active {
            tracing::trace!(state = %state, url = %request.url, "Agent not active, passthrough");
            return Ok(FetchOutcome::Passthrough);
        }
        self.interceptor.handle(request).await
    }

    async fn on_push(&self, payload: Option<&[u8]>) -> HavenResult<Option<NotificationDescriptor>> {
        self.notifications.dispatch_push(payload).await
    }

    async fn on_message(&self, envelope: MessageEnvelope) -> HavenResult<ControlOutcome> {
        self.control.handle(envelope).await
    }

    async fn on_notification_click(
        &self,
        click: &NotificationClick,
    ) -> HavenResult<NotificationChoice> {
        self.notifications.handle_click(click).await
    }
}
