//! Integration tests for the assembled service: bus in, actuation out, shutdown

use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use rosc::{OscMessage, OscPacket, OscType, encoder};
use shockosc::config::{Config, read_config_file};
use shockosc::dispatcher::DispatchOutcome;
use shockosc::error::ShockError;
use shockosc::osc::{MemorySink, Parameter};
use shockosc::service::ShockOscService;
use tokio::net::UdpSocket;

use crate::helpers::*;

fn local_config() -> Config {
    let mut config = enabled_config();
    config.osc.listen = SocketAddr::from(([127, 0, 0, 1], 0));
    config.shock.duration = 10.0;
    config
}

async fn send_osc(to: SocketAddr, addr: &str, args: Vec<OscType>) {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let packet = OscPacket::Message(OscMessage {
        addr: addr.to_string(),
        args,
    });
    socket
        .send_to(&encoder::encode(&packet).unwrap(), to)
        .await
        .unwrap();
}

async fn wait_until(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}

#[tokio::test]
async fn test_bus_trigger_shocks_and_shutdown_zeroes() {
    let sink = Arc::new(MemorySink::new());
    let service = ShockOscService::start_with_sink(local_config(), sink.clone())
        .await
        .unwrap();

    let cshock = address("leftleg", Parameter::ContinuousShock);
    send_osc(
        service.router().local_addr(),
        &format!("{PREFIX}leftleg"),
        vec![OscType::Bool(true)],
    )
    .await;

    assert!(wait_until(|| sink.last_value(&cshock) == Some(OscType::Float(0.5))).await);
    assert!(service.dispatcher().cooldown_status()["leftleg"]);

    let cooldown = address("leftleg", Parameter::Cooldown);
    assert_eq!(sink.last_value(&cooldown), Some(OscType::Bool(true)));

    // The 10s stop and the cooldown are still pending; shutdown resets both
    service.shutdown().await;
    assert_eq!(sink.last_value(&cshock), Some(OscType::Float(0.0)));
    assert_eq!(sink.last_value(&cooldown), Some(OscType::Bool(false)));
}

#[tokio::test]
async fn test_falsy_argument_only_records_telemetry() {
    let sink = Arc::new(MemorySink::new());
    let mut config = local_config();
    config.slide.variables = vec![slide_variable(SLIDE, 0.5)];
    let service = ShockOscService::start_with_sink(config, sink.clone())
        .await
        .unwrap();

    let target = service.router().local_addr();
    send_osc(target, &format!("{PREFIX}leftleg"), vec![OscType::Bool(false)]).await;
    send_osc(target, SLIDE, vec![OscType::Float(0.42)]).await;

    let state = service.state().clone();
    let mut recorded = false;
    for _ in 0..100 {
        if state.telemetry.value(SLIDE).await == 0.42 {
            recorded = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert!(recorded);
    assert!(sink.sent_to(&address("leftleg", Parameter::ContinuousShock)).is_empty());

    service.shutdown().await;
}

#[tokio::test]
async fn test_display_sends_initial_status() {
    let sink = Arc::new(MemorySink::new());
    let service = ShockOscService::start_with_sink(local_config(), sink.clone())
        .await
        .unwrap();

    assert!(wait_until(|| !sink.sent_to("/chatbox/input").is_empty()).await);

    service.shutdown().await;
}

#[tokio::test]
async fn test_update_config_applies_everywhere() {
    let sink = Arc::new(MemorySink::new());
    let service = ShockOscService::start_with_sink(local_config(), sink.clone())
        .await
        .unwrap();

    let mut disabled = local_config();
    disabled.shock.enabled = false;
    service.update_config(disabled);

    let outcome = service.dispatcher().send_timed(None, None, None).await;
    assert_matches!(outcome, DispatchOutcome::Skipped(ShockError::Disabled));

    service.shutdown().await;
}

#[test]
fn test_read_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{
            "shock": {{ "enabled": true, "intensity": {{ "mode": "random", "min": 10, "max": 40 }} }},
            "openshock": {{ "token": "abc", "shockers": {{ "s1": "leftleg" }} }},
            "slide": {{ "variables": [{{ "path": "{SLIDE}", "threshold": 0.3 }}] }}
        }}"#
    )
    .unwrap();

    let config = read_config_file(file.path().to_str().unwrap()).unwrap();

    assert!(config.shock.enabled);
    assert_eq!(config.openshock.group_of("s1"), Some("leftleg"));
    assert!(config.openshock.remote_enabled());
    assert_eq!(config.slide.variables.len(), 1);
    assert!(config.slide.variables[0].enabled);
}
