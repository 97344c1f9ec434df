//! Architectural Contract Test: Throttle Sharing
//!
//! This test verifies that sibling sensors share one remote read per window.
//!
//! Constraints verified:
//! - N sensors over one fetcher cause one network call per window
//! - Callers inside the window receive the cached snapshot
//! - A new window triggers exactly one new call
//! - Projection of the shared snapshot is independent per sensor
//!
//! If this test fails, someone has added:
//! - Per-sensor fetching
//! - Caching inside a snapshot source
//! - A bypass around the throttle

mod common;

use common::*;
use homelink_core::projection::ATTR_ATTRIBUTION;
use homelink_core::{
    Entity, EntityPhase, IntegrationContext, SnapshotSource, StateValue, ThrottledFetcher,
    UniqueId,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn siblings_share_one_network_call_per_window() {
    let source = Arc::new(ScriptedSource::always("nvram", router_snapshot()));
    let context = IntegrationContext::new("mock", "entry", Arc::new(()), polling(10));

    let kinds = [("2g_wifi", "wl0_bss_enabled"), ("qos", "qos_enable")];
    let sensors: Vec<_> = kinds
        .iter()
        .map(|(kind, field)| {
            let source = Arc::clone(&source);
            context.sensor(
                "nvram",
                flag_descriptor(kind, field),
                UniqueId::from_parts(["mock", kind]),
                move |_| source as Arc<dyn SnapshotSource>,
            )
        })
        .collect();

    for sensor in &sensors {
        assert!(sensor.refresh().await.is_published());
    }
    assert_eq!(source.call_count(), 1, "two siblings in one window → one call");

    tokio::time::advance(Duration::from_secs(10)).await;
    for sensor in &sensors {
        sensor.refresh().await;
    }
    assert_eq!(source.call_count(), 2, "new window → exactly one more call");

    assert_eq!(sensors[0].state(), StateValue::Text("on".to_string()));
    assert_eq!(sensors[1].state(), StateValue::Text("off".to_string()));
    assert!(sensors.iter().all(|s| s.phase() == EntityPhase::Published));
}

#[tokio::test(start_paused = true)]
async fn second_fetch_within_window_returns_cached_snapshot() {
    let source = Arc::new(
        ScriptedSource::new("traffic")
            .then_ok(homelink_core::Snapshot::from_pairs([("rx_rate", json!(1))]))
            .then_ok(homelink_core::Snapshot::from_pairs([("rx_rate", json!(2))])),
    );
    let fetcher = ThrottledFetcher::new(
        source.clone(),
        Duration::from_secs(10),
        Duration::from_secs(5),
    );

    let first = fetcher.fetch().await.unwrap();
    let second = fetcher.fetch().await.unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(second.get("rx_rate"), Some(&json!(1)));
    assert_eq!(source.call_count(), 1);
    assert_eq!(fetcher.network_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn concurrent_siblings_wait_for_the_in_flight_call() {
    let source = Arc::new(
        ScriptedSource::always("nvram", router_snapshot()).with_delay(Duration::from_secs(2)),
    );
    let fetcher = Arc::new(ThrottledFetcher::new(
        source.clone(),
        Duration::from_secs(10),
        Duration::from_secs(5),
    ));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let fetcher = Arc::clone(&fetcher);
            tokio::spawn(async move { fetcher.fetch().await })
        })
        .collect();

    for handle in handles {
        assert!(handle.await.unwrap().is_ok());
    }
    assert_eq!(source.call_count(), 1, "at most one request in flight per fetcher");
}

#[tokio::test(start_paused = true)]
async fn router_flag_projection_end_to_end() {
    let source: Arc<dyn SnapshotSource> =
        Arc::new(ScriptedSource::always("nvram", router_snapshot()));
    let context = IntegrationContext::new("mock", "entry", Arc::new(()), polling(10));
    let sensor = context.sensor(
        "nvram",
        flag_descriptor("2g_wifi", "wl0_bss_enabled").with_attribution("Data provided by router"),
        UniqueId::new("mock_2g_wifi"),
        move |_| source,
    );

    sensor.refresh().await;

    assert_eq!(sensor.state().as_text(), Some("on"));
    let attributes = sensor.attributes();
    assert_eq!(attributes.get("model"), Some(&json!("RT-X")));
    assert_eq!(attributes.get("buildno"), Some(&json!("v1.2")));
    assert!(!attributes.contains_key("wl0_bss_enabled"));
    assert_eq!(
        attributes.get(ATTR_ATTRIBUTION),
        Some(&json!("Data provided by router"))
    );
    assert_eq!(attributes.len(), 4);
}
