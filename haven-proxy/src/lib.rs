//! HAVEN Proxy - HTTP host for the agent
//!
//! Runs one agent behind an axum server: page requests are intercepted and
//! served from the tier store or forwarded upstream, and the agent's event
//! channel is exposed under `/__haven/`.

pub mod config;
pub mod error;
pub mod host;
pub mod network;
pub mod routes;
pub mod store;
pub mod telemetry;

use std::sync::Arc;

use axum::Router;
use haven_agent::{Agent, EventLoop, EventSender};
use haven_core::AgentState;
use tokio::task::JoinHandle;

pub use config::ProxyConfig;
pub use error::{ErrorBody, ProxyError, ProxyResult};
pub use host::ProxyHost;
pub use network::ReqwestNetwork;
pub use routes::{create_router, AppState};
pub use store::{ProxyStore, ProxyTier};
pub use telemetry::{init_tracing, TelemetryConfig};

pub type ProxyAgent = Agent<ProxyStore, ReqwestNetwork, ProxyHost>;

/// A wired proxy: router, agent and the running event loop.
pub struct Proxy {
    pub router: Router,
    pub events: EventSender,
    pub agent: Arc<ProxyAgent>,
    pub host: Arc<ProxyHost>,
    pub event_loop: JoinHandle<()>,
}

impl Proxy {
    /// Build the agent over `store` and spawn its event loop. Must be called
    /// inside a tokio runtime.
    pub fn assemble(config: &ProxyConfig, store: ProxyStore) -> ProxyResult<Self> {
        let agent_config = config.agent_config()?;
        let network = Arc::new(ReqwestNetwork::new(
            agent_config.origin.clone(),
            config.upstream.clone(),
            agent_config.fetch_timeout(),
        )?);
        let host = Arc::new(ProxyHost::new());
        let agent = Arc::new(Agent::new(
            agent_config,
            Arc::new(store),
            network.clone(),
            host.clone(),
        )?);

        let (events, event_loop) = EventLoop::new(agent.clone(), config.event_capacity);
        let event_loop = event_loop.spawn();

        let state = AppState::new(events.clone(), agent.clone(), host.clone(), network);
        Ok(Self {
            router: create_router(state),
            events,
            agent,
            host,
            event_loop,
        })
    }
}

/// Install, then activate unless install already did.
pub async fn bootstrap(events: &EventSender) -> ProxyResult<AgentState> {
    let state = events.install().await??;
    if state == AgentState::Installed {
        let report = events.activate().await??;
        if !report.all_succeeded() {
            tracing::warn!(
                failed = report.failure_count(),
                "Some stale tiers could not be deleted"
            );
        }
        return Ok(AgentState::Active);
    }
    Ok(state)
}
