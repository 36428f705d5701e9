//! HAVEN Test Utilities
//!
//! Shared test infrastructure for the HAVEN workspace:
//! - Mock network with a fetch spy and scripted routes
//! - Recording host for claim/window/notification side effects
//! - Fault-injecting tier store
//! - Proptest generators and fixtures

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

pub use haven_agent::{Agent, EventHandlers, FetchOutcome, Host, Network};
pub use haven_core::{
    AgentConfig, AgentState, Destination, HavenError, HavenResult, HostError, NetworkError,
    NotificationDescriptor, Request, RequestIdentity, Response, ResponseType, StorageError, Url,
};
pub use haven_storage::{CacheStats, CacheTier, InMemoryTier, InMemoryTierStore, TierStore};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// MOCK NETWORK
// ============================================================================

/// Scripted behaviour for one URL.
#[derive(Debug, Clone)]
pub enum Route {
    Respond(Response),
    Fail(String),
    /// Never resolves; exercises fetch timeouts.
    Hang,
}

/// Network double. Unrouted URLs fail as unreachable.
#[derive(Debug)]
pub struct MockNetwork {
    origin: Url,
    routes: Mutex<HashMap<String, Route>>,
    calls: Mutex<Vec<Request>>,
    offline: AtomicBool,
}

impl MockNetwork {
    pub fn new(origin: Url) -> Self {
        Self {
            origin,
            routes: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            offline: AtomicBool::new(false),
        }
    }

    fn key(&self, path: &str) -> String {
        match self.origin.join(path) {
            Ok(url) => url.to_string(),
            Err(_) => path.to_string(),
        }
    }

    /// Script a route. `path` may be site-relative or absolute.
    pub fn route(&self, path: &str, route: Route) -> &Self {
        lock(&self.routes).insert(self.key(path), route);
        self
    }

    pub fn respond(&self, path: &str, response: Response) -> &Self {
        self.route(path, Route::Respond(response))
    }

    /// 200 Basic response with `body`.
    pub fn respond_ok(&self, path: &str, body: &str) -> &Self {
        self.respond(path, Response::new(200, body))
    }

    pub fn fail(&self, path: &str) -> &Self {
        self.route(path, Route::Fail("connection refused".to_string()))
    }

    pub fn hang(&self, path: &str) -> &Self {
        self.route(path, Route::Hang)
    }

    /// Fail every fetch regardless of routes.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Every request seen, in order.
    pub fn calls(&self) -> Vec<Request> {
        lock(&self.calls).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }

    pub fn calls_to(&self, path: &str) -> usize {
        let key = self.key(path);
        lock(&self.calls)
            .iter()
            .filter(|request| request.url.as_str() == key)
            .count()
    }

    pub fn reset_calls(&self) {
        lock(&self.calls).clear();
    }
}

#[async_trait]
impl Network for MockNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
        lock(&self.calls).push(request.clone());

        if self.offline.load(Ordering::SeqCst) {
            return Err(NetworkError::Unreachable {
                url: request.url.to_string(),
                reason: "offline".to_string(),
            });
        }

        let route = lock(&self.routes).get(request.url.as_str()).cloned();
        match route {
            Some(Route::Respond(response)) => Ok(response),
            Some(Route::Fail(reason)) => Err(NetworkError::Unreachable {
                url: request.url.to_string(),
                reason,
            }),
            Some(Route::Hang) => std::future::pending().await,
            None => Err(NetworkError::Unreachable {
                url: request.url.to_string(),
                reason: "no route".to_string(),
            }),
        }
    }
}

// ============================================================================
// RECORDING HOST
// ============================================================================

/// A host side effect, in the order it was requested.
#[derive(Debug, Clone, PartialEq)]
pub enum HostCall {
    Claim,
    OpenWindow(Url),
    ShowNotification(NotificationDescriptor),
    CloseNotification(String),
}

#[derive(Debug, Default)]
pub struct RecordingHost {
    calls: Mutex<Vec<HostCall>>,
    fail_claim: AtomicBool,
    fail_open_window: AtomicBool,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_claim(&self, fail: bool) {
        self.fail_claim.store(fail, Ordering::SeqCst);
    }

    pub fn fail_open_window(&self, fail: bool) {
        self.fail_open_window.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<HostCall> {
        lock(&self.calls).clone()
    }

    pub fn claim_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, HostCall::Claim))
            .count()
    }

    pub fn opened_windows(&self) -> Vec<Url> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                HostCall::OpenWindow(url) => Some(url),
                _ => None,
            })
            .collect()
    }

    pub fn shown_notifications(&self) -> Vec<NotificationDescriptor> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                HostCall::ShowNotification(descriptor) => Some(descriptor),
                _ => None,
            })
            .collect()
    }

    pub fn closed_notifications(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                HostCall::CloseNotification(tag) => Some(tag),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl Host for RecordingHost {
    async fn claim(&self) -> Result<(), HostError> {
        lock(&self.calls).push(HostCall::Claim);
        if self.fail_claim.load(Ordering::SeqCst) {
            return Err(HostError::ClaimFailed {
                reason: "injected".to_string(),
            });
        }
        Ok(())
    }

    async fn open_window(&self, url: &Url) -> Result<(), HostError> {
        lock(&self.calls).push(HostCall::OpenWindow(url.clone()));
        if self.fail_open_window.load(Ordering::SeqCst) {
            return Err(HostError::NavigationFailed {
                url: url.to_string(),
                reason: "injected".to_string(),
            });
        }
        Ok(())
    }

    async fn show_notification(
        &self,
        descriptor: &NotificationDescriptor,
    ) -> Result<(), HostError> {
        lock(&self.calls).push(HostCall::ShowNotification(descriptor.clone()));
        Ok(())
    }

    async fn close_notification(&self, tag: &str) -> Result<(), HostError> {
        lock(&self.calls).push(HostCall::CloseNotification(tag.to_string()));
        Ok(())
    }
}

// ============================================================================
// FAULT-INJECTING STORE
// ============================================================================

#[derive(Debug, Default)]
struct Faults {
    delete: Mutex<HashSet<String>>,
    puts: AtomicBool,
    list: AtomicBool,
}

/// [`InMemoryTierStore`] with switchable failures.
#[derive(Debug, Clone, Default)]
pub struct FlakyTierStore {
    inner: InMemoryTierStore,
    faults: Arc<Faults>,
}

impl FlakyTierStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deleting `tier` fails until cleared.
    pub fn fail_delete_of(&self, tier: &str) {
        lock(&self.faults.delete).insert(tier.to_string());
    }

    pub fn fail_puts(&self, fail: bool) {
        self.faults.puts.store(fail, Ordering::SeqCst);
    }

    pub fn fail_list(&self, fail: bool) {
        self.faults.list.store(fail, Ordering::SeqCst);
    }

    pub fn inner(&self) -> &InMemoryTierStore {
        &self.inner
    }
}

pub struct FlakyTier {
    inner: InMemoryTier,
    faults: Arc<Faults>,
}

#[async_trait]
impl CacheTier for FlakyTier {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn match_request(&self, identity: &RequestIdentity) -> HavenResult<Option<Response>> {
        self.inner.match_request(identity).await
    }

    async fn put(&self, identity: &RequestIdentity, response: &Response) -> HavenResult<()> {
        if self.faults.puts.load(Ordering::SeqCst) {
            return Err(StorageError::WriteFailed {
                tier: self.inner.name().to_string(),
                reason: "injected".to_string(),
            }
            .into());
        }
        self.inner.put(identity, response).await
    }

    async fn delete(&self, identity: &RequestIdentity) -> HavenResult<bool> {
        self.inner.delete(identity).await
    }

    async fn keys(&self) -> HavenResult<Vec<RequestIdentity>> {
        self.inner.keys().await
    }
}

#[async_trait]
impl TierStore for FlakyTierStore {
    type Tier = FlakyTier;

    async fn open(&self, name: &str) -> HavenResult<FlakyTier> {
        Ok(FlakyTier {
            inner: self.inner.open(name).await?,
            faults: self.faults.clone(),
        })
    }

    async fn has_tier(&self, name: &str) -> HavenResult<bool> {
        self.inner.has_tier(name).await
    }

    async fn list_tier_names(&self) -> HavenResult<Vec<String>> {
        if self.faults.list.load(Ordering::SeqCst) {
            return Err(StorageError::ListFailed {
                reason: "injected".to_string(),
            }
            .into());
        }
        self.inner.list_tier_names().await
    }

    async fn delete_tier(&self, name: &str) -> HavenResult<bool> {
        if lock(&self.faults.delete).contains(name) {
            return Err(StorageError::DeleteFailed {
                tier: name.to_string(),
                reason: "injected".to_string(),
            }
            .into());
        }
        self.inner.delete_tier(name).await
    }

    async fn match_any(&self, identity: &RequestIdentity) -> HavenResult<Option<Response>> {
        self.inner.match_any(identity).await
    }

    async fn stats(&self) -> HavenResult<CacheStats> {
        self.inner.stats().await
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for HAVEN inputs.

    use super::*;
    use proptest::prelude::*;

    /// A lowercase path segment.
    pub fn arb_segment() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9-]{0,11}"
    }

    /// Version tag such as `v3` or `v1.2.0`.
    pub fn arb_version() -> impl Strategy<Value = String> {
        prop_oneof![
            (1u32..100).prop_map(|n| format!("v{n}")),
            (0u32..5, 0u32..10, 0u32..10).prop_map(|(a, b, c)| format!("v{a}.{b}.{c}")),
        ]
    }

    /// Path under one of the stock dynamic prefixes.
    pub fn arb_dynamic_path() -> impl Strategy<Value = String> {
        (
            prop_oneof![
                Just("/pages/"),
                Just("/assets/images/"),
                Just("/assets/audio/"),
                Just("/assets/video/"),
            ],
            arb_segment(),
        )
            .prop_map(|(prefix, segment)| format!("{prefix}{segment}"))
    }

    /// Path matching no stock dynamic prefix.
    pub fn arb_non_dynamic_path() -> impl Strategy<Value = String> {
        (
            prop_oneof![Just("/api/"), Just("/static/"), Just("/docs/"), Just("/")],
            arb_segment(),
        )
            .prop_map(|(prefix, segment)| format!("{prefix}{segment}"))
    }

    /// Tier name that is not one of the `v1` fixture generations.
    pub fn arb_stale_tier_name() -> impl Strategy<Value = String> {
        prop_oneof![
            (prop_oneof![Just("static"), Just("dynamic")], arb_version())
                .prop_filter("current generation", |(_, v)| v != "v1")
                .prop_map(|(kind, version)| format!("{kind}-{version}")),
            arb_segment().prop_map(|s| format!("legacy-{s}")),
        ]
    }

    pub fn arb_body() -> impl Strategy<Value = String> {
        "[ -~]{0,64}"
    }

    /// Basic 200 response.
    pub fn arb_cacheable_response() -> impl Strategy<Value = Response> {
        arb_body().prop_map(|body| Response::new(200, body))
    }

    /// Response the interceptor must never store.
    pub fn arb_uncacheable_response() -> impl Strategy<Value = Response> {
        prop_oneof![
            (201u16..600, arb_body()).prop_map(|(status, body)| Response::new(status, body)),
            arb_body().prop_map(|body| Response::new(200, body).with_type(ResponseType::Opaque)),
            arb_body().prop_map(|body| Response::new(200, body).with_type(ResponseType::Cors)),
        ]
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built configurations and agents.

    use super::*;
    use haven_core::StaticAssetManifest;

    pub const TEST_ORIGIN: &str = "https://app.test";

    pub fn origin() -> Url {
        Url::parse(TEST_ORIGIN).unwrap_or_else(|e| panic!("fixture origin: {e}"))
    }

    /// Absolute URL of a site path.
    pub fn url(path: &str) -> Url {
        origin()
            .join(path)
            .unwrap_or_else(|e| panic!("fixture path {path}: {e}"))
    }

    pub fn get(path: &str) -> Request {
        Request::get(url(path))
    }

    pub fn navigate(path: &str) -> Request {
        Request::navigate(url(path))
    }

    pub fn image(path: &str) -> Request {
        Request::get(url(path)).with_destination(Destination::Image)
    }

    pub fn identity(path: &str) -> RequestIdentity {
        RequestIdentity::get(&url(path))
    }

    /// Version `v1`, manifest `/` and `/app.css`, stock dynamic prefixes.
    pub fn test_config() -> AgentConfig {
        AgentConfig::new(origin(), "v1").with_manifest(StaticAssetManifest::new(["/", "/app.css"]))
    }

    /// Network serving every manifest path of `config`.
    pub fn network_for(config: &AgentConfig) -> Arc<MockNetwork> {
        let network = Arc::new(MockNetwork::new(config.origin.clone()));
        for path in config.manifest.paths() {
            network.respond_ok(path, &format!("asset {path}"));
        }
        network
    }

    pub type TestAgent<S = InMemoryTierStore> = Agent<S, MockNetwork, RecordingHost>;

    /// Agent plus handles to its collaborators.
    pub struct Harness<S = InMemoryTierStore> {
        pub agent: Arc<TestAgent<S>>,
        pub store: Arc<S>,
        pub network: Arc<MockNetwork>,
        pub host: Arc<RecordingHost>,
    }

    impl<S: TierStore + 'static> Harness<S> {
        pub fn with_store(config: AgentConfig, store: S) -> Self {
            let store = Arc::new(store);
            let network = network_for(&config);
            let host = Arc::new(RecordingHost::new());
            let agent = Agent::new(config, store.clone(), network.clone(), host.clone())
                .unwrap_or_else(|e| panic!("fixture agent: {e}"));
            Self {
                agent: Arc::new(agent),
                store,
                network,
                host,
            }
        }

        /// Install and activate, then forget the install traffic.
        pub async fn activated(self) -> Self {
            self.agent
                .on_install()
                .await
                .unwrap_or_else(|e| panic!("fixture install: {e}"));
            self.agent
                .on_activate()
                .await
                .unwrap_or_else(|e| panic!("fixture activate: {e}"));
            self.network.reset_calls();
            self
        }
    }

    impl Harness<InMemoryTierStore> {
        pub fn new(config: AgentConfig) -> Self {
            Self::with_store(config, InMemoryTierStore::new())
        }
    }
}
