//! Fetch Interceptor
//!
//! Cache-first routing for same-origin GET requests:
//!
//! 1. Any tier holds the identity → serve it, no network.
//! 2. Miss → fetch.
//! 3. Cacheable success under a dynamic prefix → spawn a dynamic tier write
//!    and return the response without waiting for it. Credentialed requests
//!    and private responses are returned but never written.
//! 4. Fetch failure → [`FallbackSynthesizer`].

use std::sync::Arc;

use haven_core::{AgentConfig, NetworkError, Request, Response};
use haven_storage::TierStore;

use crate::fallback::FallbackSynthesizer;
use crate::host::{fetch_bounded, Network};
use crate::writer::CacheWriter;

/// What the interceptor decided for a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Answer the request with this response.
    Respond(Response),
    /// Not eligible; let the host's default handling apply.
    Passthrough,
}

impl FetchOutcome {
    pub fn response(&self) -> Option<&Response> {
        match self {
            FetchOutcome::Respond(response) => Some(response),
            FetchOutcome::Passthrough => None,
        }
    }

    pub fn into_response(self) -> Option<Response> {
        match self {
            FetchOutcome::Respond(response) => Some(response),
            FetchOutcome::Passthrough => None,
        }
    }
}

pub struct FetchInterceptor<S, N> {
    config: Arc<AgentConfig>,
    store: Arc<S>,
    network: Arc<N>,
    writer: CacheWriter<S>,
    fallback: FallbackSynthesizer<S>,
}

impl<S, N> FetchInterceptor<S, N>
where
    S: TierStore + 'static,
    N: Network,
{
    pub fn new(
        config: Arc<AgentConfig>,
        store: Arc<S>,
        network: Arc<N>,
        writer: CacheWriter<S>,
    ) -> Self {
        let fallback = FallbackSynthesizer::new(config.clone(), store.clone());
        Self {
            config,
            store,
            network,
            writer,
            fallback,
        }
    }

    /// Only same-origin GETs are intercepted.
    pub fn is_eligible(&self, request: &Request) -> bool {
        request.method.is_get() && request.is_same_origin(&self.config.origin)
    }

    /// Whether a fetched response may go into the shared dynamic tier.
    fn should_store(&self, request: &Request, response: &Response) -> bool {
        if !response.is_cacheable() || !self.config.dynamic_policy.matches(&request.url) {
            return false;
        }
        if request.carries_credentials() || !response.is_shareable() {
            tracing::debug!(identity = %request.identity(), "Not caching private response");
            return false;
        }
        true
    }

    /// Produce a response for `request`.
    ///
    /// Errors only for non-navigation, non-image requests whose fetch failed;
    /// the caller sees the original network error.
    pub async fn handle(&self, request: &Request) -> Result<FetchOutcome, NetworkError> {
        if !self.is_eligible(request) {
            tracing::trace!(method = %request.method, url = %request.url, "Passthrough");
            return Ok(FetchOutcome::Passthrough);
        }

        let identity = request.identity();
        match self.store.match_any(&identity).await {
            Ok(Some(response)) => {
                tracing::debug!(identity = %identity, "Serving from cache");
                return Ok(FetchOutcome::Respond(response));
            }
            Ok(None) => tracing::trace!(identity = %identity, "Cache miss"),
            // A broken store degrades to network-only.
            Err(e) => tracing::warn!(identity = %identity, error = %e, "Cache lookup failed"),
        }

        match fetch_bounded(self.network.as_ref(), request, self.config.fetch_timeout()).await {
            Ok(response) => {
                if self.should_store(request, &response) {
                    tracing::debug!(identity = %identity, "Caching dynamic asset");
                    self.writer.spawn_put(
                        self.config.registry.dynamic_name(),
                        identity,
                        response.for_storage(),
                    );
                }
                Ok(FetchOutcome::Respond(response))
            }
            Err(e) => {
                tracing::info!(identity = %identity, error = %e, "Fetch failed");
                self.fallback
                    .synthesize(request, e)
                    .await
                    .map(FetchOutcome::Respond)
            }
        }
    }
}
