//! Install and activate behaviour.

use haven_agent::EventHandlers;
use haven_core::{
    AgentState, HavenError, InstallError, LifecycleError, Response, StaticAssetManifest,
};
use haven_storage::{CacheTier, TierStore};
use haven_test_utils::fixtures::*;
use haven_test_utils::generators::*;
use haven_test_utils::{FlakyTierStore, HostCall, InMemoryTierStore};
use proptest::prelude::*;
use proptest::test_runner::TestCaseError;

async fn seed_tiers<S: TierStore>(store: &S, names: &[&str]) {
    for name in names {
        let tier = store.open(name).await.unwrap();
        tier.put(&identity("/"), &Response::new(200, *name))
            .await
            .unwrap();
    }
}

async fn tier_names<S: TierStore>(store: &S) -> Vec<String> {
    let mut names = store.list_tier_names().await.unwrap();
    names.sort();
    names
}

// ============================================================================
// INSTALL
// ============================================================================

#[tokio::test]
async fn test_install_caches_every_manifest_entry() {
    let harness = Harness::new(test_config());

    let state = harness.agent.on_install().await.unwrap();

    assert_eq!(state, AgentState::Installed);
    let tier = harness.store.open("static-v1").await.unwrap();
    let mut keys = tier.keys().await.unwrap();
    keys.sort();
    assert_eq!(keys, vec![identity("/"), identity("/app.css")]);
    assert_eq!(harness.network.call_count(), 2);
    // Waiting is the default: no activation, no claim.
    assert_eq!(harness.host.claim_count(), 0);
}

#[tokio::test]
async fn test_install_strips_cookies_from_stored_assets() {
    let harness = Harness::new(test_config());
    harness.network.respond(
        "/",
        Response::new(200, "home")
            .with_header("Content-Type", "text/html")
            .with_header("Set-Cookie", "visitor=42"),
    );

    harness.agent.on_install().await.unwrap();

    let tier = harness.store.open("static-v1").await.unwrap();
    let stored = tier.match_request(&identity("/")).await.unwrap().unwrap();
    assert_eq!(stored.body_text(), "home");
    assert_eq!(stored.content_type(), Some("text/html"));
    assert!(stored.header("set-cookie").is_none());
}

#[tokio::test]
async fn test_install_fails_when_one_asset_fails() {
    let harness = Harness::new(test_config());
    harness.network.fail("/app.css");

    let result = harness.agent.on_install().await;

    match result {
        Err(HavenError::Install(InstallError::AssetsUnavailable { failed, first, .. })) => {
            assert_eq!(failed, vec!["GET https://app.test/app.css".to_string()]);
            assert_eq!(first, "GET https://app.test/app.css");
        }
        other => panic!("expected AssetsUnavailable, got {other:?}"),
    }
    assert_eq!(harness.agent.state().await, AgentState::Failed);

    let entries = match harness.store.has_tier("static-v1").await.unwrap() {
        true => harness
            .store
            .open("static-v1")
            .await
            .unwrap()
            .keys()
            .await
            .unwrap()
            .len(),
        false => 0,
    };
    assert!(entries <= 1, "static tier must never hold both entries");
}

#[tokio::test]
async fn test_install_treats_non_ok_status_as_failure() {
    let harness = Harness::new(test_config());
    harness.network.respond("/", Response::new(503, "unavailable"));

    assert!(harness.agent.on_install().await.is_err());
    assert_eq!(harness.agent.state().await, AgentState::Failed);
}

#[tokio::test]
async fn test_install_write_failure_fails_install() {
    let harness = Harness::with_store(test_config(), FlakyTierStore::new());
    harness.store.fail_puts(true);

    let result = harness.agent.on_install().await;

    assert!(matches!(
        result,
        Err(HavenError::Install(InstallError::AssetWriteFailed { .. }))
    ));
    assert_eq!(harness.agent.state().await, AgentState::Failed);
}

#[tokio::test]
async fn test_failed_agent_cannot_activate() {
    let harness = Harness::new(test_config());
    harness.network.fail("/");
    let _ = harness.agent.on_install().await;

    let result = harness.agent.on_activate().await;

    assert!(matches!(
        result,
        Err(HavenError::Lifecycle(LifecycleError::InvalidTransition {
            from: AgentState::Failed,
            to: AgentState::Activating,
        }))
    ));
}

#[tokio::test]
async fn test_install_runs_once() {
    let harness = Harness::new(test_config());
    harness.agent.on_install().await.unwrap();

    assert!(matches!(
        harness.agent.on_install().await,
        Err(HavenError::Lifecycle(LifecycleError::InvalidTransition { .. }))
    ));
}

#[tokio::test]
async fn test_activate_before_install_is_rejected() {
    let harness = Harness::new(test_config());
    assert!(harness.agent.on_activate().await.is_err());
    assert_eq!(harness.agent.state().await, AgentState::Installing);
}

#[tokio::test]
async fn test_skip_waiting_on_install_activates_immediately() {
    let harness = Harness::new(test_config().with_skip_waiting_on_install(true));

    let state = harness.agent.on_install().await.unwrap();

    assert_eq!(state, AgentState::Active);
    assert_eq!(harness.host.claim_count(), 1);
}

#[tokio::test]
async fn test_empty_manifest_installs() {
    let harness = Harness::new(
        test_config().with_manifest(StaticAssetManifest::new(Vec::<String>::new())),
    );

    assert_eq!(harness.agent.on_install().await.unwrap(), AgentState::Installed);
    assert_eq!(harness.network.call_count(), 0);
}

// ============================================================================
// ACTIVATE
// ============================================================================

#[tokio::test]
async fn test_activation_deletes_stale_generations() {
    let harness = Harness::new(test_config());
    seed_tiers(harness.store.as_ref(), &["static-v0"]).await;
    harness.agent.on_install().await.unwrap();
    seed_tiers(harness.store.as_ref(), &["dynamic-v1"]).await;

    let report = harness.agent.on_activate().await.unwrap();

    assert_eq!(harness.agent.state().await, AgentState::Active);
    assert_eq!(report.successes().collect::<Vec<_>>(), vec!["static-v0"]);
    assert_eq!(
        tier_names(harness.store.as_ref()).await,
        vec!["dynamic-v1", "static-v1"]
    );
}

#[tokio::test]
async fn test_activation_claims_after_cleanup() {
    let harness = Harness::new(test_config());
    harness.agent.on_install().await.unwrap();

    harness.agent.on_activate().await.unwrap();

    assert_eq!(harness.host.calls(), vec![HostCall::Claim]);
}

#[tokio::test]
async fn test_activation_twice_is_idempotent() {
    let harness = Harness::new(test_config());
    seed_tiers(harness.store.as_ref(), &["static-v0", "dynamic-v0", "legacy"]).await;
    harness.agent.on_install().await.unwrap();

    harness.agent.on_activate().await.unwrap();
    let after_first = tier_names(harness.store.as_ref()).await;
    let second = harness.agent.on_activate().await.unwrap();
    let after_second = tier_names(harness.store.as_ref()).await;

    assert_eq!(after_first, after_second);
    assert!(second.is_empty());
    assert_eq!(harness.agent.state().await, AgentState::Active);
}

#[tokio::test]
async fn test_deletion_failure_does_not_block_others() {
    let harness = Harness::with_store(test_config(), FlakyTierStore::new());
    seed_tiers(harness.store.as_ref(), &["static-v0", "dynamic-v0", "static-v00"]).await;
    harness.store.fail_delete_of("dynamic-v0");
    harness.agent.on_install().await.unwrap();

    let report = harness.agent.on_activate().await.unwrap();

    assert_eq!(harness.agent.state().await, AgentState::Active);
    assert_eq!(report.failure_count(), 1);
    assert_eq!(report.failures().next().map(|(name, _)| name), Some("dynamic-v0"));
    assert_eq!(
        tier_names(harness.store.as_ref()).await,
        vec!["dynamic-v0", "static-v1"]
    );
}

#[tokio::test]
async fn test_listing_failure_fails_activation() {
    let harness = Harness::with_store(test_config(), FlakyTierStore::new());
    harness.agent.on_install().await.unwrap();
    harness.store.fail_list(true);

    assert!(harness.agent.on_activate().await.is_err());
    assert_eq!(harness.agent.state().await, AgentState::Failed);
}

#[tokio::test]
async fn test_claim_failure_fails_activation() {
    let harness = Harness::new(test_config());
    harness.agent.on_install().await.unwrap();
    harness.host.fail_claim(true);

    assert!(matches!(
        harness.agent.on_activate().await,
        Err(HavenError::Host(_))
    ));
    assert_eq!(harness.agent.state().await, AgentState::Failed);
}

#[tokio::test]
async fn test_new_version_inherits_store_and_evicts_old() {
    let store = InMemoryTierStore::new();
    let old = Harness::with_store(test_config(), store.clone()).activated().await;
    old.network.respond_ok("/pages/a", "a");
    old.agent.on_fetch(&get("/pages/a")).await.unwrap();
    old.agent.wait_for_writes().await;

    let next_config = haven_core::AgentConfig::new(origin(), "v2")
        .with_manifest(StaticAssetManifest::new(["/", "/app.css"]));
    let next = Harness::with_store(next_config, store.clone()).activated().await;

    assert_eq!(next.agent.version(), "static-v2");
    assert_eq!(tier_names(&store).await, vec!["static-v2"]);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// After activation only current generations survive, whatever else existed.
    #[test]
    fn prop_activation_keeps_only_current(
        stale in proptest::collection::vec(arb_stale_tier_name(), 0..6),
        with_dynamic in any::<bool>(),
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let harness = Harness::new(test_config());
            let stale: Vec<&str> = stale.iter().map(String::as_str).collect();
            seed_tiers(harness.store.as_ref(), &stale).await;
            if with_dynamic {
                seed_tiers(harness.store.as_ref(), &["dynamic-v1"]).await;
            }
            harness.agent.on_install().await.unwrap();

            harness.agent.on_activate().await.unwrap();
            let first = tier_names(harness.store.as_ref()).await;
            harness.agent.on_activate().await.unwrap();
            let second = tier_names(harness.store.as_ref()).await;

            let expected: Vec<String> = if with_dynamic {
                vec!["dynamic-v1".to_string(), "static-v1".to_string()]
            } else {
                vec!["static-v1".to_string()]
            };
            prop_assert_eq!(&first, &expected);
            prop_assert_eq!(first, second);
            Ok::<(), TestCaseError>(())
        })?;
    }
}
