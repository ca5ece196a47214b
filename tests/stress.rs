#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! Many TCP clients talking to one server at once

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use game_sync_protocol::config::NetworkConfig;
use game_sync_protocol::core::message_type::MessageType;
use game_sync_protocol::protocol::{ClientSession, ServerSession, SessionContext, TickOutcome};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stress_many_clients_chat_concurrently() {
    let clients = 32;
    let messages = 50;

    let config = NetworkConfig::default_with_overrides(|c| {
        c.server.address = "127.0.0.1:0".to_string();
        c.server.max_connections = clients;
    });
    let server = ServerSession::new(&config, SessionContext::default());
    let chats = Arc::new(AtomicUsize::new(0));
    {
        let chats = Arc::clone(&chats);
        server
            .register_handler(MessageType::ChatMessage, move |_, _| {
                chats.fetch_add(1, Ordering::Relaxed);
                Ok(())
            })
            .unwrap();
    }
    let addr = server.start().await.unwrap();

    let mut tasks = Vec::new();
    for n in 0..clients {
        let config = config.clone();
        tasks.push(tokio::spawn(async move {
            let mut client = ClientSession::new(&config, SessionContext::default());
            client.connect("127.0.0.1", addr.port()).await.unwrap();
            for i in 0..messages {
                assert!(client.send_chat_message(&format!("client {n} line {i}")).unwrap());
                if i % 10 == 0 {
                    assert!(matches!(client.tick(), TickOutcome::Active { .. }));
                    tokio::task::yield_now().await;
                }
            }
            client
        }));
    }
    let mut sessions = Vec::new();
    for task in tasks {
        sessions.push(task.await.unwrap());
    }

    let expected = clients * messages;
    for _ in 0..500 {
        if chats.load(Ordering::Relaxed) == expected {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(chats.load(Ordering::Relaxed), expected);
    assert_eq!(server.connection_count(), clients);

    for client in &mut sessions {
        client.disconnect().await;
    }
    server.stop().await.unwrap();
}
