//! Contract Test: Config Flow Error Codes
//!
//! Constraints verified:
//! - Connection problems show `cannot_connect`
//! - Rejected credentials show `invalid_auth`
//! - Anything else shows `unknown`
//! - Accepted input creates and persists an entry with the validated title

mod common;

use common::*;
use homelink_core::config_flow::{BASE_ERROR_KEY, FlowResult, user_step};
use homelink_core::{ConfigEntryStore, MemoryEntryStore, Snapshot};
use serde_json::json;

fn integration() -> MockIntegration {
    MockIntegration::new(SetupBehavior::Sensors(vec![]), Snapshot::new(Default::default()))
}

async fn error_code(host: &str) -> String {
    let store = MemoryEntryStore::new();
    match user_step(&integration(), &store, "e1", json!({"host": host})).await {
        FlowResult::ShowForm { errors } => errors[BASE_ERROR_KEY].clone(),
        other => panic!("expected a form, got {:?}", other),
    }
}

#[tokio::test]
async fn flow_error_codes() {
    assert_eq!(error_code("unreachable").await, "cannot_connect");
    assert_eq!(error_code("locked").await, "invalid_auth");
    assert_eq!(error_code("broken").await, "unknown");
}

#[tokio::test]
async fn accepted_input_creates_entry() {
    let store = MemoryEntryStore::new();
    let result = user_step(&integration(), &store, "e1", json!({"host": "10.0.0.1"})).await;

    let FlowResult::CreateEntry { entry } = result else {
        panic!("expected an entry");
    };
    assert_eq!(entry.title, "Mock 10.0.0.1");
    assert_eq!(entry.domain, "mock");
    assert_eq!(store.get_entry("e1").await.unwrap(), Some(entry));
}

#[tokio::test]
async fn duplicate_entry_id_shows_unknown() {
    let store = MemoryEntryStore::new();
    let first = user_step(&integration(), &store, "e1", json!({"host": "10.0.0.1"})).await;
    assert!(matches!(first, FlowResult::CreateEntry { .. }));

    let second = user_step(&integration(), &store, "e1", json!({"host": "10.0.0.2"})).await;
    assert!(matches!(
        second,
        FlowResult::ShowForm { ref errors } if errors[BASE_ERROR_KEY] == "unknown"
    ));
}
