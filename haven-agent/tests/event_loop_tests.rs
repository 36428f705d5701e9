//! Driving the agent through its event channel.

use std::sync::Arc;

use haven_agent::{EventLoop, EventLoopClosed, FetchOutcome};
use haven_core::{AgentState, NotificationClick};
use haven_storage::TierStore;
use haven_test_utils::fixtures::*;
use serde_json::json;

#[tokio::test]
async fn test_full_lifecycle_over_channel() {
    let harness = Harness::new(test_config());
    let (events, event_loop) = EventLoop::new(harness.agent.clone(), 16);
    let handle = event_loop.spawn();

    assert_eq!(events.install().await.unwrap().unwrap(), AgentState::Installed);
    assert!(events.activate().await.unwrap().unwrap().is_empty());

    harness.network.respond_ok("/pages/a", "a");
    let outcome = events.fetch(get("/pages/a")).await.unwrap().unwrap();
    assert_eq!(outcome.response().map(|r| r.body_text()), Some("a".to_string()));

    let reply = events
        .request(json!({ "type": "GET_VERSION" }))
        .await
        .unwrap()
        .expect("GET_VERSION is answered");
    assert_eq!(reply.version, "static-v1");

    drop(events);
    handle.await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_fetches_share_the_store() {
    let harness = Harness::new(test_config()).activated().await;
    harness.network.respond_ok("/pages/shared", "shared");
    let (events, event_loop) = EventLoop::new(harness.agent.clone(), 64);
    let handle = event_loop.spawn();

    let mut tasks = Vec::new();
    for _ in 0..16 {
        let events = events.clone();
        tasks.push(tokio::spawn(async move {
            events.fetch(get("/pages/shared")).await
        }));
    }
    for task in tasks {
        let outcome = task.await.unwrap().unwrap().unwrap();
        assert!(matches!(outcome, FetchOutcome::Respond(_)));
    }
    harness.agent.wait_for_writes().await;

    let tier = harness.store.open("dynamic-v1").await.unwrap();
    assert!(tier_contains(&tier, "/pages/shared").await);

    drop(events);
    handle.await.unwrap();
}

async fn tier_contains<T: haven_storage::CacheTier>(tier: &T, path: &str) -> bool {
    tier.match_request(&identity(path)).await.unwrap().is_some()
}

#[tokio::test]
async fn test_fire_and_forget_events_are_processed_in_order() {
    let harness = Harness::new(test_config()).activated().await;
    let (events, event_loop) = EventLoop::new(harness.agent.clone(), 16);
    let handle = event_loop.spawn();

    events
        .post_message(json!({ "type": "CLEAR_CACHE" }))
        .await
        .unwrap();
    events
        .notification_click(NotificationClick {
            tag: "n1".to_string(),
            action: None,
        })
        .await
        .unwrap();
    let shown = events
        .push(Some(br#"{"title":"t","body":"b"}"#.to_vec()))
        .await
        .unwrap()
        .unwrap();
    assert!(shown.is_some());

    // The push answer arrives after the earlier events were handled.
    assert!(harness.store.list_tier_names().await.unwrap().is_empty());
    assert_eq!(harness.host.opened_windows(), vec![url("/")]);

    drop(events);
    handle.await.unwrap();
}

#[tokio::test]
async fn test_sender_reports_closed_loop() {
    let harness = Harness::new(test_config());
    let (events, event_loop) = EventLoop::new(Arc::clone(&harness.agent), 1);
    drop(event_loop);

    assert_eq!(events.install().await.unwrap_err(), EventLoopClosed);
}
