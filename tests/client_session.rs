#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! Client session against a live server session

use std::sync::{Arc, Mutex};
use std::time::Duration;

use game_sync_protocol::config::NetworkConfig;
use game_sync_protocol::core::message_type::MessageType;
use game_sync_protocol::core::payload::{
    ChatMessage, CombatAction, Payload, Position, PositionUpdate, ServerChat,
};
use game_sync_protocol::error::ProtocolError;
use game_sync_protocol::protocol::{
    Admission, ClientSession, ClientState, ServerSession, SessionContext, TickOutcome,
};
use game_sync_protocol::utils::compression::CompressionKind;
use game_sync_protocol::utils::logging::CapturingSink;
use game_sync_protocol::utils::time::ManualClock;

fn config() -> NetworkConfig {
    NetworkConfig::default_with_overrides(|c| {
        c.server.address = "127.0.0.1:0".to_string();
        c.client.client_version = "2.1.0".to_string();
        c.client.reconnect_delay = Duration::from_millis(20);
        c.transport.compression_kind = CompressionKind::Lz4;
    })
}

async fn eventually(what: &str, mut check: impl FnMut() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition never held: {what}");
}

/// Connect a client to `server` over an in-memory stream
async fn attach(server: &ServerSession, client: &mut ClientSession) {
    let (client_end, server_end) = tokio::io::duplex(64 * 1024);
    assert!(matches!(
        server.on_client_connect(server_end).unwrap(),
        Admission::Accepted(_)
    ));
    client.connect_stream(client_end).await.unwrap();
    assert_eq!(client.state(), ClientState::Connected);
}

#[tokio::test]
async fn test_connect_announces_version() {
    let server = ServerSession::new(&config(), SessionContext::default());
    let mut client = ClientSession::new(&config(), SessionContext::from_config(&config()));
    attach(&server, &mut client).await;

    eventually("version recorded", || {
        server
            .connection_ids()
            .first()
            .and_then(|id| server.peer_version(*id))
            .as_deref()
            == Some("2.1.0")
    })
    .await;
}

#[tokio::test]
async fn test_injected_context_version_is_announced() {
    let server = ServerSession::new(&config(), SessionContext::default());
    let ctx = SessionContext::new(CapturingSink::new(), "3.0.0-rc1");
    let mut client = ClientSession::new(&config(), ctx);
    attach(&server, &mut client).await;

    eventually("context version recorded", || {
        server
            .connection_ids()
            .first()
            .and_then(|id| server.peer_version(*id))
            .as_deref()
            == Some("3.0.0-rc1")
    })
    .await;
}

#[tokio::test]
async fn test_ping_round_trip_uses_clock() {
    let clock = Arc::new(ManualClock::new(0));
    let ctx = SessionContext::new(CapturingSink::new(), "2.1.0").with_clock(clock.clone());
    let server = ServerSession::new(&config(), SessionContext::default());
    let mut client = ClientSession::new(&config(), ctx);
    attach(&server, &mut client).await;

    clock.advance(1001);
    assert!(matches!(
        client.tick(),
        TickOutcome::Active { ping_sent: true, .. }
    ));

    clock.advance(37);
    eventually("pong processed", || {
        matches!(client.tick(), TickOutcome::Active { processed, .. } if processed > 0)
    })
    .await;
    assert_eq!(client.ping_millis(), 37);
}

#[tokio::test]
async fn test_compression_toggle_preserves_positions() {
    let server = ServerSession::new(&config(), SessionContext::default());
    let received = Arc::new(Mutex::new(Vec::new()));
    {
        let received = Arc::clone(&received);
        server
            .register_handler(MessageType::UpdatePosition, move |_, envelope| {
                let PositionUpdate(position) = PositionUpdate::from_envelope(envelope)?;
                received.lock().unwrap().push(position);
                Ok(())
            })
            .unwrap();
    }
    let mut client = ClientSession::new(&config(), SessionContext::default());
    attach(&server, &mut client).await;

    let position = Position::new(1.5, -2.25, 1024.125, 0.5);
    assert!(client.send_position_update(position).unwrap());
    assert!(client.enable_compression().unwrap());
    assert!(client.send_position_update(position).unwrap());
    assert!(client.disable_compression().unwrap());
    assert!(client.send_position_update(position).unwrap());

    eventually("three updates", || received.lock().unwrap().len() == 3).await;
    assert!(received.lock().unwrap().iter().all(|p| *p == position));
}

#[tokio::test]
async fn test_chat_and_combat_reach_server_intact() {
    let server = ServerSession::new(&config(), SessionContext::default());
    let chats = Arc::new(Mutex::new(Vec::new()));
    let attacks = Arc::new(Mutex::new(Vec::new()));
    {
        let chats = Arc::clone(&chats);
        server
            .register_handler(MessageType::ChatMessage, move |_, envelope| {
                chats.lock().unwrap().push(ChatMessage::from_envelope(envelope)?);
                Ok(())
            })
            .unwrap();
        let attacks = Arc::clone(&attacks);
        server
            .register_handler(MessageType::PlayerAttack, move |_, envelope| {
                attacks.lock().unwrap().push(CombatAction::from_envelope(envelope)?);
                Ok(())
            })
            .unwrap();
    }
    let mut client = ClientSession::new(&config(), SessionContext::default());
    attach(&server, &mut client).await;

    let long = "x".repeat(150);
    assert!(client.send_chat_message(&long).unwrap());
    assert!(client.send_combat_action(42, 17.5, "heavy_strike").unwrap());

    eventually("chat", || chats.lock().unwrap().len() == 1).await;
    eventually("attack", || attacks.lock().unwrap().len() == 1).await;
    assert_eq!(chats.lock().unwrap()[0].text(), &long[..100]);
    assert_eq!(
        attacks.lock().unwrap()[0],
        CombatAction {
            target_id: 42,
            damage: 17.5,
            action_type: "heavy_strike".into()
        }
    );
}

#[tokio::test]
async fn test_client_handlers_run_on_tick() {
    let server = ServerSession::new(&config(), SessionContext::default());
    let mut client = ClientSession::new(&config(), SessionContext::default());
    let heard = Arc::new(Mutex::new(Vec::new()));
    {
        let heard = Arc::clone(&heard);
        client
            .register_handler(MessageType::ServerChatMessage, move |_, envelope| {
                heard.lock().unwrap().push(ServerChat::from_envelope(envelope)?.text);
                Ok(())
            })
            .unwrap();
    }
    attach(&server, &mut client).await;

    let report = server.broadcast(&ServerChat { text: "welcome".into() }.to_envelope(), None);
    assert_eq!(report.delivered, 1);

    eventually("handler ran", || {
        client.tick();
        !heard.lock().unwrap().is_empty()
    })
    .await;
    assert_eq!(*heard.lock().unwrap(), vec!["welcome".to_string()]);
}

#[tokio::test]
async fn test_disconnect_is_idempotent_and_frees_server_slot() {
    let server = ServerSession::new(&config(), SessionContext::default());
    let mut client = ClientSession::new(&config(), SessionContext::default());
    attach(&server, &mut client).await;
    eventually("registered", || server.connection_count() == 1).await;

    client.disconnect().await;
    client.disconnect().await;
    assert_eq!(client.state(), ClientState::Disconnected);
    assert!(!client.send_chat_message("anyone?").unwrap());

    eventually("server released slot", || server.connection_count() == 0).await;
}

#[tokio::test]
async fn test_server_stop_is_reported_as_connection_lost() {
    let server = ServerSession::new(&config(), SessionContext::default());
    let mut client = ClientSession::new(&config(), SessionContext::default());
    attach(&server, &mut client).await;

    server.stop().await.unwrap();

    eventually("loss detected", || {
        client.tick() == TickOutcome::ConnectionLost { reconnect: true }
    })
    .await;
    assert_eq!(client.state(), ClientState::Disconnected);
    assert_eq!(client.tick(), TickOutcome::NotConnected);
}

#[tokio::test]
async fn test_connect_to_closed_port_is_connect_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let mut client = ClientSession::new(&config(), SessionContext::default());
    let result = client.connect("127.0.0.1", port).await;
    assert!(matches!(result, Err(ProtocolError::Connect(_))));
    assert_eq!(client.state(), ClientState::Disconnected);
}

#[tokio::test]
async fn test_reconnect_after_server_restart() {
    let first = ServerSession::new(&config(), SessionContext::default());
    let addr = first.start().await.unwrap();

    let mut client = ClientSession::new(&config(), SessionContext::default());
    client.connect("127.0.0.1", addr.port()).await.unwrap();
    eventually("admitted", || first.connection_count() == 1).await;

    first.stop().await.unwrap();
    eventually("loss detected", || {
        matches!(client.tick(), TickOutcome::ConnectionLost { .. })
    })
    .await;

    let restarted = NetworkConfig::default_with_overrides(|c| c.server.address = addr.to_string());
    let second = ServerSession::new(&restarted, SessionContext::default());
    second.start().await.unwrap();

    client.reconnect().await.unwrap();
    assert_eq!(client.state(), ClientState::Connected);
    eventually("readmitted", || second.connection_count() == 1).await;

    client.disconnect().await;
    second.stop().await.unwrap();
}

#[tokio::test]
async fn test_reconnect_gives_up_after_max_attempts() {
    let server = ServerSession::new(&config(), SessionContext::default());
    let addr = server.start().await.unwrap();

    let mut client = ClientSession::new(&config(), SessionContext::default());
    client.connect("127.0.0.1", addr.port()).await.unwrap();
    server.stop().await.unwrap();
    eventually("loss detected", || {
        matches!(client.tick(), TickOutcome::ConnectionLost { .. })
    })
    .await;

    let result = client.reconnect().await;
    assert!(matches!(result, Err(ProtocolError::Connect(_))));
    assert_eq!(client.state(), ClientState::Disconnected);
}
