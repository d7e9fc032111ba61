//! E2E tests for the Split wrapper against a mock flag service.
//!
//! Run with: cargo test --test e2e

use std::time::Duration;

use httpmock::prelude::*;
use serde_json::json;
use split_wrapper::{
    flag, ClientConfig, Event, FlagClient, ReadinessState, WrapperContext, CONTROL_TREATMENT,
};

const API_KEY: &str = "e2e-api-key";
const USER_KEY: &str = "e2e-user";

fn definitions() -> serde_json::Value {
    json!({
        "splits": [
            {
                "name": flag::APP_VERSION,
                "defaultTreatment": "off",
                "conditions": [
                    { "attribute": "app_version", "in": ["2.5.0"], "treatment": "on" }
                ]
            },
            {
                "name": flag::IS_ASYNC_ON,
                "defaultTreatment": "on"
            }
        ],
        "till": 42
    })
}

fn config(server: &MockServer) -> ClientConfig {
    ClientConfig::new()
        .with_endpoints(server.base_url(), server.base_url())
        .with_app_version("2.5")
        .with_fetch_retry(20)
        .with_events_push(3_600_000)
}

async fn wait_until_settled(client: &FlagClient) {
    let mut rx = client.subscribe_readiness();
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| s.is_settled()))
        .await
        .expect("readiness did not settle")
        .expect("readiness channel closed");
}

#[tokio::test(flavor = "multi_thread")]
async fn e2e_ready_evaluate_track_and_destroy() {
    let server = MockServer::start_async().await;
    let definitions_mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/splitChanges")
                .header("authorization", format!("Bearer {API_KEY}"));
            then.status(200)
                .delay(Duration::from_millis(100))
                .json_body(definitions());
        })
        .await;
    let events_mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/events/bulk")
                .body_includes("\"eventTypeId\":\"coffee_added\"")
                .body_includes("\"key\":\"e2e-user\"");
            then.status(202);
        })
        .await;
    let impressions_mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/testImpressions/bulk")
                .body_includes(flag::APP_VERSION);
            then.status(200);
        })
        .await;

    let client = FlagClient::initialize(API_KEY, Some(USER_KEY.to_string()), config(&server))
        .expect("Failed to initialize client");

    // Test: should serve control before definitions arrive
    {
        assert_eq!(client.readiness().state(), ReadinessState::Uninitialized);
        assert_eq!(client.evaluate(flag::IS_ASYNC_ON), CONTROL_TREATMENT);
    }

    wait_until_settled(&client).await;
    definitions_mock.assert_async().await;

    // Test: should become ready and evaluate with attributes
    {
        assert_eq!(client.readiness().state(), ReadinessState::Ready);
        assert_eq!(client.evaluate(flag::IS_ASYNC_ON), "on");
        assert_eq!(client.evaluate_with_attributes(flag::APP_VERSION), "on");
        assert_eq!(client.evaluate(flag::APP_VERSION), "off");
        assert_eq!(client.evaluate("not_defined"), CONTROL_TREATMENT);
    }

    // Test: should deliver tracked events on flush
    {
        let outcome = client.track_default_traffic(Event::new("coffee_added").with_value(1.0));
        assert!(outcome.contains("queued"), "unexpected outcome: {outcome}");

        client.flush().await;
        events_mock.assert_async().await;
        impressions_mock.assert_async().await;
    }

    // Test: should be safe to use after destroy
    {
        client.destroy().await;
        client.destroy().await;
        client.flush().await;
        assert_eq!(client.evaluate(flag::IS_ASYNC_ON), CONTROL_TREATMENT);
        assert!(client.track_default_traffic("coffee_added").contains("destroyed"));
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn e2e_ready_timeout_when_service_unavailable() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/splitChanges");
            then.status(503);
        })
        .await;

    let client = FlagClient::initialize(
        API_KEY,
        Some(USER_KEY.to_string()),
        config(&server).with_ready_timeout(100),
    )
    .expect("Failed to initialize client");

    wait_until_settled(&client).await;

    let snapshot = client.readiness();
    assert!(!snapshot.ready);
    assert!(snapshot.ready_timed_out);
    assert_eq!(client.evaluate(flag::IS_ASYNC_ON), CONTROL_TREATMENT);

    client.destroy().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn e2e_context_teardown() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/splitChanges");
            then.status(200).json_body(definitions());
        })
        .await;

    let context = WrapperContext::new();
    let first = context
        .get_or_try_init(|| FlagClient::initialize(API_KEY, None, config(&server)))
        .expect("Failed to initialize client");
    let second = context
        .get_or_try_init(|| panic!("client constructed twice"))
        .expect("Failed to get client");
    assert!(std::sync::Arc::ptr_eq(&first, &second));

    wait_until_settled(&first).await;
    context.teardown().await;
    assert!(first.is_destroyed());
}
