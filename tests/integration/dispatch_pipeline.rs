//! Integration tests for group dispatch
//!
//! These tests verify transport selection and cooldown across the dispatcher:
//! - Remote control API preferred when shockers are mapped
//! - Local protocol fallback with a timed stop
//! - Cooling groups left out of a multi-group shock
//! - Cooldown holding while a remote call is still in flight
//! - Direct shocker triggers

use std::time::Duration;

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use rosc::OscType;
use shockosc::actors::messages::ShockSource;
use shockosc::dispatcher::{DispatchOutcome, Transport};
use shockosc::error::ShockError;
use shockosc::osc::Parameter;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::*;

fn groups(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}

#[tokio::test]
async fn test_remote_transport_preferred() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/2/shockers/control"))
        .and(header("OpenShockToken", "test-token"))
        .and(body_json(control_body(50, 1000, &["s1"])))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let h = harness(remote_config(&mock_server.uri()));
    let target = groups(&["leftleg"]);

    let outcome = h.dispatcher.send_timed(Some(&target), None, None).await;

    assert_matches!(
        outcome,
        DispatchOutcome::Sent { transport: Transport::Remote, ref groups, intensity: 50 }
            if groups == &target
    );

    // Nothing on the local shock parameter, cooldown still published
    assert!(h.sink.sent_to(&address("leftleg", Parameter::ContinuousShock)).is_empty());
    assert_eq!(
        h.sink.last_value(&address("leftleg", Parameter::Cooldown)),
        Some(OscType::Bool(true))
    );
    assert!(h.dispatcher.cooldown_status()["leftleg"]);
    assert!(!h.dispatcher.cooldown_status()["rightleg"]);
}

#[tokio::test]
async fn test_remote_500_falls_back_to_local() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/2/shockers/control"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let h = harness(remote_config(&mock_server.uri()));
    let cshock = address("leftleg", Parameter::ContinuousShock);

    let outcome = h
        .dispatcher
        .send_timed(Some(&groups(&["leftleg"])), Some(70), Some(0.3))
        .await;

    assert_eq!(outcome.transport(), Some(Transport::Local));
    assert_eq!(h.sink.last_value(&cshock), Some(OscType::Float(0.7)));

    // The stop timer resets the parameter after the duration
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(h.sink.last_value(&cshock), Some(OscType::Float(0.0)));
    assert_eq!(h.sink.sent_to(&cshock).len(), 2);
}

#[tokio::test]
async fn test_cooling_group_left_out() {
    let h = harness(enabled_config());

    let first = h
        .dispatcher
        .send_timed(Some(&groups(&["leftleg"])), None, Some(5.0))
        .await;
    assert!(first.is_sent());

    // leftleg is cooling, so only rightleg goes out
    let second = h.dispatcher.send_timed(None, None, Some(5.0)).await;

    assert_matches!(
        second,
        DispatchOutcome::Sent { ref groups, .. } if groups == &["rightleg".to_string()]
    );
    assert_eq!(
        h.sink.sent_to(&address("leftleg", Parameter::ContinuousShock)).len(),
        1
    );
    assert_eq!(
        h.sink.last_value(&address("rightleg", Parameter::ContinuousShock)),
        Some(OscType::Float(0.5))
    );

    h.dispatcher.shutdown().await;
}

#[tokio::test]
async fn test_immediate_shock_and_clear_cooldowns() {
    let h = harness(enabled_config());

    let outcome = h.dispatcher.send_immediate(None).await;
    assert!(outcome.is_sent());
    assert_eq!(
        h.sink.last_value(&address("leftleg", Parameter::ImmediateShock)),
        Some(OscType::Bool(true))
    );

    let mut cleared = h.dispatcher.clear_all_cooldowns().await;
    cleared.sort();
    assert_eq!(cleared, groups(&["leftleg", "rightleg"]));
    assert!(h.dispatcher.cooldown_status().values().all(|cooling| !cooling));
    assert_eq!(
        h.sink.last_value(&address("rightleg", Parameter::Cooldown)),
        Some(OscType::Bool(false))
    );
}

#[tokio::test]
async fn test_vibrate_ignores_cooldown() {
    let h = harness(enabled_config());
    let target = groups(&["leftleg"]);

    h.dispatcher.send_timed(Some(&target), None, Some(5.0)).await;
    assert!(h.state.cooldowns.is_cooling("leftleg"));

    let first = h.dispatcher.send_vibrate(Some(&target)).await;
    let second = h.dispatcher.send_vibrate(Some(&target)).await;

    assert!(first.is_sent());
    assert!(second.is_sent());
    assert_eq!(
        h.sink.last_value(&address("leftleg", Parameter::ContinuousVibrate)),
        Some(OscType::Float(0.5))
    );

    let stopped = h.dispatcher.stop_vibrate(Some(&target)).await;
    assert_eq!(stopped, target);
    assert_eq!(
        h.sink.last_value(&address("leftleg", Parameter::ContinuousVibrate)),
        Some(OscType::Float(0.0))
    );

    h.dispatcher.shutdown().await;
}

#[tokio::test]
async fn test_stop_zeroes_and_sends_remote_stop() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/2/shockers/control"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;

    let h = harness(remote_config(&mock_server.uri()));

    let stopped = h.dispatcher.stop(Some(&groups(&["rightleg"]))).await;

    assert_eq!(stopped, groups(&["rightleg"]));
    assert_eq!(
        h.sink.last_value(&address("rightleg", Parameter::ContinuousShock)),
        Some(OscType::Float(0.0))
    );

    let requests = mock_server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["shocks"][0]["id"], "s2");
    assert_eq!(body["shocks"][0]["type"], "Stop");
}

#[tokio::test]
async fn test_trigger_shockers_publishes_per_group() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/2/shockers/control"))
        .and(body_json(control_body(70, 1000, &["s1", "s2"])))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let h = harness(remote_config(&mock_server.uri()));
    let mut events = h.state.shock_events.subscribe();

    let outcome = h
        .dispatcher
        .trigger_shockers(&[], 70, ShockSource::Trigger("slide".into()))
        .await;

    assert_matches!(
        outcome,
        DispatchOutcome::Sent { transport: Transport::Remote, intensity: 70, .. }
    );

    let first = events.recv().await.unwrap();
    let second = events.recv().await.unwrap();
    assert_eq!(first.group, "leftleg");
    assert_eq!(second.group, "rightleg");
    assert_eq!(first.source, ShockSource::Trigger("slide".into()));
    assert!(h.state.cooldowns.is_cooling("leftleg"));
    assert!(h.state.cooldowns.is_cooling("rightleg"));
}

#[tokio::test]
async fn test_trigger_shockers_skips_cooling_group() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/2/shockers/control"))
        .and(body_json(control_body(40, 1000, &["s2"])))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let h = harness(remote_config(&mock_server.uri()));
    h.state.cooldowns.arm("leftleg").await;

    let outcome = h
        .dispatcher
        .trigger_shockers(&[], 40, ShockSource::Dispatch)
        .await;

    assert_matches!(
        outcome,
        DispatchOutcome::Sent { ref groups, .. } if groups == &["rightleg".to_string()]
    );
}

#[tokio::test]
async fn test_all_cooling_makes_no_remote_call() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/2/shockers/control"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let h = harness(remote_config(&mock_server.uri()));
    h.state.cooldowns.arm("leftleg").await;
    h.state.cooldowns.arm("rightleg").await;
    h.sink.clear();

    let timed = h.dispatcher.send_timed(None, Some(50), Some(1.0)).await;
    let immediate = h.dispatcher.send_immediate(None).await;
    let triggered = h
        .dispatcher
        .trigger_shockers(&[], 50, ShockSource::Dispatch)
        .await;

    assert_matches!(timed, DispatchOutcome::Skipped(ShockError::NoTargets));
    assert_matches!(immediate, DispatchOutcome::Skipped(ShockError::NoTargets));
    assert_matches!(triggered, DispatchOutcome::Skipped(ShockError::NoTargets));
    assert!(h.sink.is_empty());
}

#[tokio::test]
async fn test_cooldown_holds_during_slow_remote_call() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/2/shockers/control"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .expect(1)
        .mount(&mock_server)
        .await;

    let h = harness(remote_config(&mock_server.uri()));
    let target = groups(&["leftleg"]);

    let dispatcher = h.dispatcher.clone();
    let first_target = target.clone();
    let first = tokio::spawn(async move {
        dispatcher
            .send_timed(Some(&first_target), Some(50), Some(1.0))
            .await
    });

    // The first call is still waiting on the remote API
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(h.state.cooldowns.is_cooling("leftleg"));
    let second = h.dispatcher.send_timed(Some(&target), Some(50), Some(1.0)).await;

    assert_matches!(second, DispatchOutcome::Skipped(ShockError::NoTargets));
    assert_eq!(first.await.unwrap().transport(), Some(Transport::Remote));
    assert!(h.state.cooldowns.is_cooling("leftleg"));
    assert_eq!(mock_server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_concurrent_triggers_share_one_cooldown() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/2/shockers/control"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(300)))
        .expect(1)
        .mount(&mock_server)
        .await;

    let h = harness(remote_config(&mock_server.uri()));
    let ids = vec!["s1".to_string()];

    let (first, second) = tokio::join!(
        h.dispatcher
            .trigger_shockers(&ids, 40, ShockSource::Trigger("slide".into())),
        h.dispatcher
            .trigger_shockers(&ids, 40, ShockSource::Trigger("slide".into())),
    );

    let sent = [&first, &second]
        .iter()
        .filter(|outcome| outcome.is_sent())
        .count();
    assert_eq!(sent, 1);
    assert!(
        matches!(first, DispatchOutcome::Skipped(ShockError::NoTargets))
            || matches!(second, DispatchOutcome::Skipped(ShockError::NoTargets))
    );
}
