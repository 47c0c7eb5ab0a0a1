//! Integration tests for the simulator client against a stub server

use super::common::simulator::{spawn_stub_simulator, unreachable_url, FAILING_PROMPT};
use kvtrace::{ClientError, SimulatorClient};

/// A successful simulation parses into a full trace
#[tokio::test]
async fn test_simulate_returns_trace() {
    let client = SimulatorClient::new(spawn_stub_simulator());

    let result = client
        .simulate("  the cat sat  ", 7)
        .await
        .expect("simulation should succeed");

    assert_eq!(result.tokens, vec!["the", "cat", "sat"]);
    assert_eq!(result.events.len(), 11);
    assert_eq!(result.summary.num_requests, 2);
    assert_eq!(
        result.token_timeline.as_ref().map(|t| t["max_tokens"].clone()),
        Some(serde_json::json!(7))
    );
}

/// Non-2xx responses surface the status and body
#[tokio::test]
async fn test_simulator_error_status_is_reported() {
    let client = SimulatorClient::new(spawn_stub_simulator());

    let err = client
        .simulate(FAILING_PROMPT, 5)
        .await
        .expect_err("stub should fail this prompt");

    match err {
        ClientError::Status { status, body } => {
            assert_eq!(status, 500);
            assert!(body.contains("exploded"), "unexpected body: {body}");
        }
        other => panic!("expected status error, got {other:?}"),
    }
}

/// Transport failures are typed errors, not panics
#[tokio::test]
async fn test_unreachable_simulator_is_a_request_error() {
    let client = SimulatorClient::new(unreachable_url());
    let err = client.simulate("hello", 5).await.expect_err("nothing listens");
    assert!(matches!(err, ClientError::Request(_)));
    assert!(err.to_string().starts_with("Cannot reach simulator"));
}

/// Health reflects reachability and never errors
#[tokio::test]
async fn test_health_check() {
    let up = SimulatorClient::new(format!("{}/", spawn_stub_simulator()));
    assert!(up.health().await);

    let down = SimulatorClient::new(unreachable_url());
    assert!(!down.health().await);
}
