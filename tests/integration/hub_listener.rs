//! Integration tests for the hub listener against a local WebSocket server
//!
//! Negotiation goes to a wiremock server; the hub URL override points the socket at a
//! tokio-tungstenite server on an ephemeral port.

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use pretty_assertions::assert_eq;
use shockosc::ActionKind;
use shockosc::actors::hub::HubHandle;
use shockosc::actors::messages::ConnectionState;
use shockosc::config::Config;
use shockosc::openshock::OpenShockClient;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::*;

const WAIT: Duration = Duration::from_secs(5);
const SEP: char = '\u{1e}';

/// What the fake hub saw on one connection
#[derive(Debug)]
struct SeenConnection {
    uri: String,
    token_header: Option<String>,
    handshake: String,
}

/// Accept `connections` sockets; on each, ack the handshake, push `frames`, then drain
async fn spawn_hub_server(
    frames: Vec<String>,
    connections: usize,
) -> (SocketAddr, mpsc::UnboundedReceiver<SeenConnection>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (seen_tx, seen_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        for _ in 0..connections {
            let (stream, _) = listener.accept().await.unwrap();
            let mut uri = String::new();
            let mut token_header = None;

            let callback = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                uri = req.uri().to_string();
                token_header = req
                    .headers()
                    .get("OpenShockToken")
                    .and_then(|value| value.to_str().ok())
                    .map(str::to_string);
                Ok(resp)
            };
            let mut ws = tokio_tungstenite::accept_hdr_async(stream, callback)
                .await
                .unwrap();

            let handshake = match ws.next().await {
                Some(Ok(Message::Text(text))) => text.to_string(),
                other => panic!("expected handshake, got {other:?}"),
            };
            let _ = seen_tx.send(SeenConnection {
                uri,
                token_header,
                handshake,
            });

            ws.send(Message::Text(format!("{{}}{SEP}").into()))
                .await
                .unwrap();
            for frame in &frames {
                ws.send(Message::Text(frame.clone().into())).await.unwrap();
            }

            while let Some(Ok(_)) = ws.next().await {}
        }
    });

    (addr, seen_rx)
}

async fn mock_negotiate(expected: u64) -> MockServer {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/1/hubs/user/negotiate"))
        .and(query_param("negotiateVersion", "1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "connectionToken": "conn-1" })),
        )
        .expect(expected)
        .mount(&mock_server)
        .await;
    mock_server
}

fn hub_config(api_url: &str, hub_addr: SocketAddr) -> Config {
    let mut config = remote_config(api_url);
    config.openshock.hub_url = Some(format!("http://{hub_addr}/"));
    config
}

fn log_frame() -> String {
    let message = serde_json::json!({
        "type": 1,
        "target": "Log",
        "arguments": [
            {
                "id": "6b1f0c7e-0000-4000-8000-000000000001",
                "name": "alice",
                "customName": "Ally",
                "connectionId": "c1"
            },
            [
                { "shocker": { "id": "s1", "name": "Left Leg" }, "type": 1, "intensity": 60, "duration": 1500, "executedAt": "2024-01-01T00:00:00Z" },
                { "shocker": { "id": "s2", "name": "Right Leg" }, "type": 2, "intensity": 30, "duration": 1000, "executedAt": "2024-01-01T00:00:00Z" }
            ]
        ]
    });
    format!("{message}{SEP}")
}

#[tokio::test]
async fn test_connects_and_relays_remote_shocks() {
    let negotiate = mock_negotiate(1).await;
    let (hub_addr, mut seen) = spawn_hub_server(vec![log_frame()], 1).await;

    let h = harness(hub_config(&negotiate.uri(), hub_addr));
    let mut remote = h.state.remote_events.subscribe();
    let hub = HubHandle::spawn(h.state.clone(), OpenShockClient::new().unwrap());

    let connection = timeout(WAIT, seen.recv()).await.unwrap().unwrap();
    let uri = url::Url::parse(&format!("ws://{hub_addr}{}", connection.uri)).unwrap();
    let query: Vec<(String, String)> = uri.query_pairs().into_owned().collect();
    assert_eq!(uri.path(), "/1/hubs/user");
    assert_eq!(
        query,
        vec![
            ("id".to_string(), "conn-1".to_string()),
            ("access_token".to_string(), "test-token".to_string()),
        ]
    );
    assert_eq!(connection.token_header.as_deref(), Some("test-token"));
    assert!(connection.handshake.contains("\"protocol\":\"json\""));
    assert!(connection.handshake.ends_with(SEP));

    timeout(WAIT, hub.wait_for(ConnectionState::Connected))
        .await
        .unwrap()
        .unwrap();

    let event = timeout(WAIT, remote.recv()).await.unwrap().unwrap();
    assert_eq!(event.user_name, "Ally");
    assert_eq!(event.real_name, "alice");
    assert_eq!(event.target, "leftleg");
    assert_eq!(event.kind, ActionKind::Shock);
    assert_eq!(event.intensity, 60);
    assert_eq!(event.duration_ms, 1500);
    assert!(!event.is_guest);

    // The vibrate entry in the same log is not relayed
    assert!(timeout(Duration::from_millis(200), remote.recv()).await.is_err());

    hub.shutdown().await.unwrap();
    timeout(WAIT, hub.wait_for(ConnectionState::Disconnected))
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_close_message_stays_disconnected_until_reconnect() {
    let negotiate = mock_negotiate(2).await;
    let close = format!("{}{SEP}", serde_json::json!({ "type": 7, "error": "bye" }));
    let (hub_addr, mut seen) = spawn_hub_server(vec![close], 2).await;

    let h = harness(hub_config(&negotiate.uri(), hub_addr));
    let hub = HubHandle::spawn(h.state.clone(), OpenShockClient::new().unwrap());

    timeout(WAIT, seen.recv()).await.unwrap().unwrap();
    timeout(WAIT, hub.wait_for(ConnectionState::Disconnected))
        .await
        .unwrap()
        .unwrap();

    // No automatic retry
    assert!(timeout(Duration::from_millis(300), seen.recv()).await.is_err());
    assert_eq!(hub.connection_state(), ConnectionState::Disconnected);

    hub.reconnect().await.unwrap();
    timeout(WAIT, seen.recv()).await.unwrap().unwrap();

    hub.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_token_change_starts_connection() {
    let negotiate = mock_negotiate(1).await;
    let (hub_addr, mut seen) = spawn_hub_server(Vec::new(), 1).await;

    let mut config = hub_config(&negotiate.uri(), hub_addr);
    config.openshock.token = None;

    let h = harness(config.clone());
    let hub = HubHandle::spawn(h.state.clone(), OpenShockClient::new().unwrap());

    // Without a token the listener stays idle
    assert!(timeout(Duration::from_millis(200), seen.recv()).await.is_err());
    assert_eq!(hub.connection_state(), ConnectionState::Disconnected);

    config.openshock.token = Some("test-token".to_string());
    h.config_tx.send_replace(config);

    timeout(WAIT, seen.recv()).await.unwrap().unwrap();
    timeout(WAIT, hub.wait_for(ConnectionState::Connected))
        .await
        .unwrap()
        .unwrap();

    hub.shutdown().await.unwrap();
}
