//! Failure tests for the remote transports
//!
//! These tests verify that the system handles failures gracefully:
//! - Unreachable or misbehaving remote API
//! - Remote-only triggers without fallback
//! - Failed hub negotiation

use std::time::Duration;

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use rosc::OscType;
use shockosc::actors::hub::HubHandle;
use shockosc::actors::messages::{ConnectionState, ShockSource};
use shockosc::dispatcher::{DispatchOutcome, Transport};
use shockosc::error::ShockError;
use shockosc::openshock::OpenShockClient;
use shockosc::osc::Parameter;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::*;

#[tokio::test]
async fn test_unreachable_api_falls_back_to_local() {
    // Nothing listens on port 1
    let h = harness(remote_config("http://127.0.0.1:1"));

    let outcome = h.dispatcher.send_timed(None, Some(30), Some(5.0)).await;

    assert_eq!(outcome.transport(), Some(Transport::Local));
    assert_eq!(
        h.sink.last_value(&address("leftleg", Parameter::ContinuousShock)),
        Some(OscType::Float(0.3))
    );
    assert!(h.state.cooldowns.is_cooling("leftleg"));
    assert!(h.state.cooldowns.is_cooling("rightleg"));

    h.dispatcher.shutdown().await;
    assert_eq!(
        h.sink.last_value(&address("leftleg", Parameter::ContinuousShock)),
        Some(OscType::Float(0.0))
    );
}

#[tokio::test]
async fn test_malformed_success_body_falls_back() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/2/shockers/control"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let h = harness(remote_config(&mock_server.uri()));

    let outcome = h.dispatcher.send_vibrate(None).await;

    assert_eq!(outcome.transport(), Some(Transport::Local));
    h.dispatcher.shutdown().await;
}

#[tokio::test]
async fn test_trigger_failure_arms_cooldown_and_notifies() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/2/shockers/control"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&mock_server)
        .await;

    let h = harness(remote_config(&mock_server.uri()));
    let mut events = h.state.shock_events.subscribe();

    let outcome = h
        .dispatcher
        .trigger_shockers(&["s1".to_string()], 60, ShockSource::Dispatch)
        .await;

    assert_matches!(outcome, DispatchOutcome::Failed(ShockError::Status { status: 503, .. }));
    assert!(h.state.cooldowns.is_cooling("leftleg"));
    assert!(!h.state.cooldowns.is_cooling("rightleg"));

    let event = events.try_recv().unwrap();
    assert_eq!(event.group, "leftleg");
    assert_eq!(event.intensity, 60);
    assert!(events.try_recv().is_err());

    // Remote-only: nothing went out locally
    assert!(h.sink.sent_to(&address("leftleg", Parameter::ContinuousShock)).is_empty());
}

#[tokio::test]
async fn test_trigger_without_token_is_skipped() {
    let mut config = remote_config("http://127.0.0.1:1");
    config.openshock.token = Some("   ".to_string());
    let h = harness(config);

    let outcome = h
        .dispatcher
        .trigger_shockers(&[], 60, ShockSource::Dispatch)
        .await;

    assert_matches!(outcome, DispatchOutcome::Skipped(ShockError::MissingCredential));
    assert!(!h.state.cooldowns.is_cooling("leftleg"));
    assert!(!h.state.cooldowns.is_cooling("rightleg"));
}

#[tokio::test]
async fn test_unmapped_shocker_is_skipped() {
    let h = harness(remote_config("http://127.0.0.1:1"));

    let outcome = h
        .dispatcher
        .trigger_shockers(&["unknown".to_string()], 60, ShockSource::Dispatch)
        .await;

    assert_matches!(outcome, DispatchOutcome::Skipped(ShockError::NoTargets));
}

#[tokio::test]
async fn test_negotiate_failure_leaves_hub_disconnected() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/1/hubs/user/negotiate"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid token"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let h = harness(remote_config(&mock_server.uri()));
    let hub = HubHandle::spawn(h.state.clone(), OpenShockClient::new().unwrap());

    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(hub.connection_state(), ConnectionState::Disconnected);
    hub.shutdown().await.unwrap();
}
