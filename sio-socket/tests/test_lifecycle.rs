//! Connection lifecycle integration tests.
//!
//! Covers the handshake, graceful close, server-initiated disconnect,
//! heartbeat timeout with reconnect, the reconnect ceiling for both fresh and
//! recovering sessions, and abrupt transport loss, all against the scripted
//! server in `common`.

mod common;

use std::time::Duration;

use common::{MockServer, ServerCommand};
use sio_socket::{ConnectionState, LifecycleEvent};

// ---- Handshake ----

#[tokio::test]
async fn handshake_sets_connected_state_and_sid() {
    let server = MockServer::start().await;
    let client = common::create_client(&server.address, common::fast_options());

    let seen = common::connect(&client).await;
    assert_eq!(seen, vec!["connecting", "open", "connect"]);

    assert_eq!(client.state().await, ConnectionState::Connected);
    assert_eq!(client.socket_id().await.as_deref(), Some("sid-1"));
    assert_eq!(client.reconnect_attempts().await, 0);
    assert_eq!(server.connections(), 1);
}

#[tokio::test]
async fn connect_is_ignored_while_connected() {
    let server = MockServer::start().await;
    let client = common::create_client(&server.address, common::fast_options());
    common::connect(&client).await;

    client.connect().await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(server.connections(), 1);
    assert_eq!(client.state().await, ConnectionState::Connected);
}

#[tokio::test]
async fn state_receiver_observes_transitions() {
    let server = MockServer::start().await;
    let client = common::create_client(&server.address, common::fast_options());
    let mut states = client.state_receiver();

    client.connect().await;
    tokio::time::timeout(
        common::WAIT,
        states.wait_for(|state| *state == ConnectionState::Connected),
    )
    .await
    .expect("never reached connected")
    .unwrap();
}

// ---- Close ----

#[tokio::test]
async fn close_sends_disconnect_then_close() {
    let server = MockServer::start().await;
    let client = common::create_client(&server.address, common::fast_options());
    common::connect(&client).await;

    client.close().await;

    assert_eq!(server.next_frame().await, "41");
    assert_eq!(server.next_frame().await, "1");
    assert_eq!(client.state().await, ConnectionState::Disconnected);
    assert_eq!(client.socket_id().await, None);

    let (event, _) = common::wait_for_event(&client, "close").await;
    assert_eq!(event.as_lifecycle(), Some(LifecycleEvent::Close));

    // No reconnect after a requested close.
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(server.connections(), 1);
    assert_eq!(client.state().await, ConnectionState::Disconnected);
}

#[tokio::test]
async fn reconnect_after_close() {
    let server = MockServer::start().await;
    let client = common::create_client(&server.address, common::fast_options());
    common::connect(&client).await;
    client.close().await;
    common::wait_for_event(&client, "close").await;

    let seen = common::connect(&client).await;
    assert_eq!(seen, vec!["connecting", "open", "connect"]);
    assert_eq!(client.socket_id().await.as_deref(), Some("sid-2"));
}

// ---- Server-initiated endings ----

#[tokio::test]
async fn server_disconnect_packet_ends_session() {
    let server = MockServer::start().await;
    let client = common::create_client(&server.address, common::fast_options());
    common::connect(&client).await;

    server.send("41");

    let (event, _) = common::wait_for_event(&client, "disconnect").await;
    assert_eq!(event.data(), Some("io server disconnect"));
    assert_eq!(client.state().await, ConnectionState::Disconnected);

    // The heartbeat is stopped, so nothing redials.
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(server.connections(), 1);
}

#[tokio::test]
async fn abrupt_close_reports_transport_close() {
    let server = MockServer::start().await;
    let mut options = common::fast_options();
    options.reconnect.enabled = false;
    let client = common::create_client(&server.address, options);
    common::connect(&client).await;

    server.command(ServerCommand::Drop);

    let (event, _) = common::wait_for_event(&client, "disconnect").await;
    assert_eq!(event.data(), Some("transport close"));
    assert_eq!(client.state().await, ConnectionState::Error);
    assert_eq!(client.socket_id().await, None);

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(server.connections(), 1);
}

#[tokio::test]
async fn server_close_frame_triggers_reconnect() {
    let server = MockServer::start().await;
    let client = common::create_client(&server.address, common::fast_options());
    common::connect(&client).await;

    server.command(ServerCommand::Close);

    let (event, _) = common::wait_for_event(&client, "disconnect").await;
    assert_eq!(event.data(), Some("transport close"));

    let (event, _) = common::wait_for_event(&client, "reconnecting").await;
    assert_eq!(event.data(), Some("1"));
    common::wait_for_event(&client, "connect").await;
    assert_eq!(client.socket_id().await.as_deref(), Some("sid-2"));
    assert_eq!(client.reconnect_attempts().await, 0);
}

#[tokio::test]
async fn server_close_packet_starts_recovery() {
    let server = MockServer::start().await;
    let client = common::create_client(&server.address, common::fast_options());
    common::connect(&client).await;

    server.send("1");

    let (event, _) = common::wait_for_event(&client, "disconnect").await;
    assert_eq!(event.data(), Some("transport close"));
    let (_, seen) = common::wait_for_event(&client, "connect").await;
    assert_eq!(seen, vec!["reconnecting", "open", "connect"]);
    assert_eq!(client.socket_id().await.as_deref(), Some("sid-2"));
    assert_eq!(server.connections(), 2);
}

// ---- Heartbeat ----

#[tokio::test]
async fn ping_timeout_triggers_reconnect() {
    let server = MockServer::start_with_silent(1).await;
    let client = common::create_client(&server.address, common::fast_options());
    common::connect(&client).await;

    let (event, _) = common::wait_for_event(&client, "disconnect").await;
    assert_eq!(event.data(), Some("ping timeout"));

    let (event, seen) = common::wait_for_event(&client, "connect").await;
    assert_eq!(event.name, "connect");
    assert_eq!(seen, vec!["reconnecting", "open", "connect"]);

    assert_eq!(client.state().await, ConnectionState::Connected);
    assert_eq!(client.socket_id().await.as_deref(), Some("sid-2"));
    assert_eq!(client.reconnect_attempts().await, 0);
    assert_eq!(server.connections(), 2);
}

#[tokio::test]
async fn answered_pings_keep_session_alive() {
    let server = MockServer::start().await;
    let client = common::create_client(&server.address, common::fast_options());
    common::connect(&client).await;

    tokio::time::sleep(Duration::from_millis(800)).await;

    let frames = server.drain_frames().await;
    assert!(frames.iter().filter(|f| *f == "2").count() >= 3, "{frames:?}");
    assert_eq!(client.state().await, ConnectionState::Connected);
    assert_eq!(server.connections(), 1);
    assert_eq!(client.pump_events(), 0);
}

#[tokio::test]
async fn heartbeat_failure_without_auto_reconnect_stays_down() {
    let server = MockServer::start_with_silent(1).await;
    let mut options = common::fast_options();
    options.reconnect.enabled = false;
    let client = common::create_client(&server.address, options);
    common::connect(&client).await;

    let (event, _) = common::wait_for_event(&client, "disconnect").await;
    assert_eq!(event.data(), Some("ping timeout"));

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(server.connections(), 1);
}

// ---- Dial failures ----

#[tokio::test]
async fn reconnect_ceiling_emits_reconnect_failed_once() {
    let address = common::refused_address().await;
    let mut options = common::fast_options();
    options.reconnect.max_attempts = 3;
    let client = common::create_client(&address, options);

    client.connect().await;

    let (_, seen) = common::wait_for_event(&client, "reconnect_failed").await;
    assert_eq!(
        seen,
        vec![
            "connecting",
            "connect_error",
            "reconnecting",
            "reconnect_error",
            "reconnecting",
            "reconnect_error",
            "reconnect_failed",
        ]
    );

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(client.pump_events(), 0);
    assert_eq!(client.state().await, ConnectionState::Error);
}

#[tokio::test]
async fn recovery_gets_the_full_dial_budget() {
    let server = MockServer::start_with_silent(1).await;
    let mut options = common::fast_options();
    options.reconnect.max_attempts = 3;
    let client = common::create_client(&server.address, options);
    common::connect(&client).await;
    server.refuse_new_connections();

    let (_, seen) = common::wait_for_event(&client, "reconnect_failed").await;
    assert_eq!(
        seen,
        vec![
            "disconnect",
            "reconnecting",
            "reconnect_error",
            "reconnecting",
            "reconnect_error",
            "reconnecting",
            "reconnect_error",
            "reconnect_failed",
        ]
    );
    assert_eq!(client.state().await, ConnectionState::Error);
    assert_eq!(client.socket_id().await, None);
    assert_eq!(server.connections(), 1);
}

#[tokio::test]
async fn connect_error_carries_the_failure() {
    let address = common::refused_address().await;
    let mut options = common::fast_options();
    options.reconnect.max_attempts = 1;
    let client = common::create_client(&address, options);

    client.connect().await;

    let (event, _) = common::wait_for_event(&client, "connect_error").await;
    assert!(event.data().is_some_and(|d| !d.is_empty()));
    common::wait_for_event(&client, "reconnect_failed").await;
}

#[tokio::test]
async fn close_cancels_pending_retries() {
    let address = common::refused_address().await;
    let mut options = common::fast_options();
    options.reconnect.retry_base = Duration::from_secs(30);
    let client = common::create_client(&address, options);

    client.connect().await;
    common::wait_for_event(&client, "connect_error").await;

    client.close().await;
    assert_eq!(client.state().await, ConnectionState::Disconnected);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(client.pump_events(), 0);
}
