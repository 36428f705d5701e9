//! Fetch interception and fallback behaviour through the agent facade.

use std::time::Duration;

use haven_agent::{EventHandlers, FetchOutcome};
use haven_core::{DynamicCachePolicy, Method, NetworkError, Request, Response, ResponseType};
use haven_storage::{CacheTier, TierStore};
use haven_test_utils::fixtures::*;
use haven_test_utils::generators::*;
use haven_test_utils::FlakyTierStore;
use proptest::prelude::*;
use proptest::test_runner::TestCaseError;

fn respond(outcome: Result<FetchOutcome, NetworkError>) -> Response {
    match outcome {
        Ok(FetchOutcome::Respond(response)) => response,
        other => panic!("expected a response, got {other:?}"),
    }
}

async fn dynamic_entry<S: TierStore>(store: &S, path: &str) -> Option<Response> {
    let tier = store.open("dynamic-v1").await.unwrap();
    tier.match_request(&identity(path)).await.unwrap()
}

// ============================================================================
// CACHE-FIRST
// ============================================================================

#[tokio::test]
async fn test_cached_request_skips_network() {
    let harness = Harness::new(test_config()).activated().await;

    let response = respond(harness.agent.on_fetch(&get("/app.css")).await);

    assert_eq!(response.body_text(), "asset /app.css");
    assert_eq!(harness.network.call_count(), 0);
}

#[tokio::test]
async fn test_dynamic_tier_entries_are_served_as_peers() {
    let harness = Harness::new(test_config()).activated().await;
    let tier = harness.store.open("dynamic-v1").await.unwrap();
    tier.put(&identity("/pages/about.html"), &Response::new(200, "about"))
        .await
        .unwrap();

    let response = respond(harness.agent.on_fetch(&navigate("/pages/about.html")).await);

    assert_eq!(response.body_text(), "about");
    assert_eq!(harness.network.call_count(), 0);
}

#[tokio::test]
async fn test_fragment_does_not_affect_matching() {
    let harness = Harness::new(test_config()).activated().await;

    let response = respond(harness.agent.on_fetch(&get("/app.css#section")).await);

    assert_eq!(response.body_text(), "asset /app.css");
    assert_eq!(harness.network.call_count(), 0);
}

// ============================================================================
// DYNAMIC CACHING
// ============================================================================

#[tokio::test]
async fn test_dynamic_prefix_success_is_written() {
    let harness = Harness::new(test_config()).activated().await;
    harness.network.respond_ok("/pages/guide.html", "guide");

    let response = respond(harness.agent.on_fetch(&get("/pages/guide.html")).await);
    assert_eq!(response.body_text(), "guide");

    harness.agent.wait_for_writes().await;
    let stored = dynamic_entry(harness.store.as_ref(), "/pages/guide.html")
        .await
        .expect("entry should be in the dynamic tier");
    assert_eq!(stored, response);

    // Second request is a hit.
    harness.network.reset_calls();
    respond(harness.agent.on_fetch(&get("/pages/guide.html")).await);
    assert_eq!(harness.network.call_count(), 0);
}

#[tokio::test]
async fn test_non_matching_url_is_not_written() {
    let harness = Harness::new(test_config()).activated().await;
    harness.network.respond_ok("/api/data.json", "{}");

    respond(harness.agent.on_fetch(&get("/api/data.json")).await);
    harness.agent.wait_for_writes().await;

    assert!(dynamic_entry(harness.store.as_ref(), "/api/data.json")
        .await
        .is_none());
    assert!(harness.store.match_any(&identity("/api/data.json")).await.unwrap().is_none());
}

#[tokio::test]
async fn test_uncacheable_responses_are_returned_unstored() {
    let harness = Harness::new(test_config()).activated().await;
    harness
        .network
        .respond("/pages/missing", Response::new(404, "not found"))
        .respond(
            "/assets/images/remote.png",
            Response::new(200, "opaque").with_type(ResponseType::Opaque),
        );

    let not_found = respond(harness.agent.on_fetch(&get("/pages/missing")).await);
    let opaque = respond(harness.agent.on_fetch(&get("/assets/images/remote.png")).await);
    harness.agent.wait_for_writes().await;

    assert_eq!(not_found.status, 404);
    assert_eq!(opaque.response_type, ResponseType::Opaque);
    assert!(dynamic_entry(harness.store.as_ref(), "/pages/missing").await.is_none());
    assert!(dynamic_entry(harness.store.as_ref(), "/assets/images/remote.png")
        .await
        .is_none());
}

#[tokio::test]
async fn test_credentialed_request_is_not_written() {
    let harness = Harness::new(test_config()).activated().await;
    harness.network.respond_ok("/pages/account", "alice's account");

    let cookie = get("/pages/account").with_header("Cookie", "session=alice");
    let bearer = get("/pages/account").with_header("Authorization", "Bearer alice");
    for request in [cookie, bearer] {
        let response = respond(harness.agent.on_fetch(&request).await);
        assert_eq!(response.body_text(), "alice's account");
    }
    harness.agent.wait_for_writes().await;
    assert!(dynamic_entry(harness.store.as_ref(), "/pages/account").await.is_none());

    // An anonymous follow-up goes to the network instead of replaying alice's page.
    harness.network.reset_calls();
    respond(harness.agent.on_fetch(&get("/pages/account")).await);
    assert_eq!(harness.network.call_count(), 1);
}

#[tokio::test]
async fn test_private_responses_are_returned_unstored() {
    let harness = Harness::new(test_config()).activated().await;
    harness
        .network
        .respond(
            "/pages/login",
            Response::new(200, "welcome").with_header("Set-Cookie", "session=bob; HttpOnly"),
        )
        .respond(
            "/pages/inbox",
            Response::new(200, "inbox").with_header("Cache-Control", "private, max-age=60"),
        )
        .respond(
            "/pages/receipt",
            Response::new(200, "receipt").with_header("Cache-Control", "no-store"),
        );

    let login = respond(harness.agent.on_fetch(&get("/pages/login")).await);
    respond(harness.agent.on_fetch(&get("/pages/inbox")).await);
    respond(harness.agent.on_fetch(&get("/pages/receipt")).await);
    harness.agent.wait_for_writes().await;

    // The caller still sees the cookie.
    assert_eq!(login.header("set-cookie"), Some("session=bob; HttpOnly"));
    for path in ["/pages/login", "/pages/inbox", "/pages/receipt"] {
        assert!(dynamic_entry(harness.store.as_ref(), path).await.is_none(), "{path} was stored");
    }
}

#[tokio::test]
async fn test_policy_is_taken_from_config() {
    let config = test_config().with_dynamic_policy(DynamicCachePolicy::new(["/api/"]));
    let harness = Harness::new(config).activated().await;
    harness.network.respond_ok("/api/items", "[]").respond_ok("/pages/a", "a");

    respond(harness.agent.on_fetch(&get("/api/items")).await);
    respond(harness.agent.on_fetch(&get("/pages/a")).await);
    harness.agent.wait_for_writes().await;

    assert!(dynamic_entry(harness.store.as_ref(), "/api/items").await.is_some());
    assert!(dynamic_entry(harness.store.as_ref(), "/pages/a").await.is_none());
}

#[tokio::test]
async fn test_write_failure_is_swallowed_and_broadcast() {
    let harness = Harness::with_store(test_config(), FlakyTierStore::new())
        .activated()
        .await;
    let mut failures = harness.agent.subscribe_write_failures();
    harness.store.fail_puts(true);
    harness.network.respond_ok("/pages/a.html", "a");

    let response = respond(harness.agent.on_fetch(&get("/pages/a.html")).await);
    assert_eq!(response.body_text(), "a");

    let failure = failures.recv().await.unwrap();
    assert_eq!(failure.tier, "dynamic-v1");
    assert_eq!(failure.identity, identity("/pages/a.html"));
    harness.agent.wait_for_writes().await;
}

// ============================================================================
// ELIGIBILITY
// ============================================================================

#[tokio::test]
async fn test_non_get_and_cross_origin_pass_through() {
    let harness = Harness::new(test_config()).activated().await;

    let post = Request::new(Method::Post, url("/app.css"));
    let foreign = Request::get(url("https://cdn.example.com/lib.js"));

    assert_eq!(
        harness.agent.on_fetch(&post).await.unwrap(),
        FetchOutcome::Passthrough
    );
    assert_eq!(
        harness.agent.on_fetch(&foreign).await.unwrap(),
        FetchOutcome::Passthrough
    );
    assert_eq!(harness.network.call_count(), 0);
}

#[tokio::test]
async fn test_agent_not_yet_active_passes_through() {
    let harness = Harness::new(test_config());
    harness.agent.on_install().await.unwrap();

    assert_eq!(
        harness.agent.on_fetch(&get("/app.css")).await.unwrap(),
        FetchOutcome::Passthrough
    );
}

// ============================================================================
// FALLBACKS
// ============================================================================

#[tokio::test]
async fn test_missing_page_navigation_gets_offline_document() {
    let harness = Harness::new(test_config()).activated().await;
    harness.network.set_offline(true);

    let response = respond(harness.agent.on_fetch(&navigate("/missing-page")).await);

    assert!(response.content_type().unwrap().starts_with("text/html"));
    assert!(response.body_text().contains("Retry"));
}

#[tokio::test]
async fn test_navigation_uses_cached_offline_document() {
    let config = test_config().with_manifest(haven_core::StaticAssetManifest::new([
        "/",
        "/offline.html",
    ]));
    let harness = Harness::new(config);
    harness.network.respond(
        "/offline.html",
        Response::new(200, "<h1>custom offline</h1>").with_header("Content-Type", "text/html"),
    );
    let harness = harness.activated().await;
    harness.network.set_offline(true);

    let response = respond(harness.agent.on_fetch(&navigate("/pages/unseen")).await);

    assert_eq!(response.body_text(), "<h1>custom offline</h1>");
}

#[tokio::test]
async fn test_image_failure_gets_svg_placeholder() {
    let harness = Harness::new(test_config()).activated().await;
    harness.network.fail("/photo.png");

    let response = respond(harness.agent.on_fetch(&image("/photo.png")).await);

    assert_eq!(response.content_type(), Some("image/svg+xml"));
}

#[tokio::test]
async fn test_other_failures_propagate_unchanged() {
    let harness = Harness::new(test_config()).activated().await;
    harness.network.fail("/assets/js/extra.js");

    let result = harness.agent.on_fetch(&get("/assets/js/extra.js")).await;

    match result {
        Err(NetworkError::Unreachable { url, reason }) => {
            assert_eq!(url, "https://app.test/assets/js/extra.js");
            assert_eq!(reason, "connection refused");
        }
        other => panic!("expected the original network error, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_hung_navigation_times_out_into_offline_page() {
    let config = test_config().with_fetch_timeout(Some(Duration::from_secs(5)));
    let harness = Harness::new(config).activated().await;
    harness.network.hang("/pages/slow");

    let response = respond(harness.agent.on_fetch(&navigate("/pages/slow")).await);

    assert!(response.body_text().contains("You're Offline"));
}

// ============================================================================
// PROPERTIES
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Dynamic-prefix successes become retrievable under the same identity.
    #[test]
    fn prop_dynamic_success_is_eventually_stored(
        path in arb_dynamic_path(),
        response in arb_cacheable_response(),
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let harness = Harness::new(test_config()).activated().await;
            harness.network.respond(&path, response.clone());

            let returned = respond(harness.agent.on_fetch(&get(&path)).await);
            prop_assert_eq!(&returned, &response);

            harness.agent.wait_for_writes().await;
            let stored = dynamic_entry(harness.store.as_ref(), &path).await;
            prop_assert_eq!(stored, Some(response));
            Ok::<(), TestCaseError>(())
        })?;
    }

    /// Nothing outside the dynamic prefixes lands in the dynamic tier.
    #[test]
    fn prop_non_dynamic_success_is_never_stored(
        path in arb_non_dynamic_path(),
        response in arb_cacheable_response(),
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let harness = Harness::new(test_config()).activated().await;
            harness.network.respond(&path, response);

            respond(harness.agent.on_fetch(&get(&path)).await);
            harness.agent.wait_for_writes().await;

            let tier = harness.store.open("dynamic-v1").await.unwrap();
            prop_assert!(tier.keys().await.unwrap().is_empty());
            Ok::<(), TestCaseError>(())
        })?;
    }

    /// Uncacheable responses are never stored, even under a dynamic prefix.
    #[test]
    fn prop_uncacheable_is_never_stored(
        path in arb_dynamic_path(),
        response in arb_uncacheable_response(),
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let harness = Harness::new(test_config()).activated().await;
            harness.network.respond(&path, response);

            respond(harness.agent.on_fetch(&get(&path)).await);
            harness.agent.wait_for_writes().await;

            prop_assert!(dynamic_entry(harness.store.as_ref(), &path).await.is_none());
            Ok::<(), TestCaseError>(())
        })?;
    }

    /// A cached identity is always answered without touching the network.
    #[test]
    fn prop_cached_identity_never_fetches(
        path in prop_oneof![arb_dynamic_path(), arb_non_dynamic_path()],
        response in arb_cacheable_response(),
        in_static in any::<bool>(),
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let harness = Harness::new(test_config()).activated().await;
            let tier_name = if in_static { "static-v1" } else { "dynamic-v1" };
            let tier = harness.store.open(tier_name).await.unwrap();
            tier.put(&identity(&path), &response).await.unwrap();

            let returned = respond(harness.agent.on_fetch(&get(&path)).await);
            prop_assert_eq!(returned, response);
            prop_assert_eq!(harness.network.call_count(), 0);
            Ok::<(), TestCaseError>(())
        })?;
    }
}
