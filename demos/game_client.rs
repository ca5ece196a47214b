//! Example: Ticking Client
//!
//! Connects to a relay server, walks in a circle, chats once a second and
//! prints what other players say.
//!
//! Run with: `cargo run --example game_client [host] [port]`

#![allow(clippy::uninlined_format_args)]

use std::time::Duration;

use game_sync_protocol::config::NetworkConfig;
use game_sync_protocol::core::message_type::MessageType;
use game_sync_protocol::core::payload::{Payload, Position, ServerChat};
use game_sync_protocol::protocol::{ClientSession, SessionContext, TickOutcome};
use game_sync_protocol::utils::logging::init_logging;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let host = args.next().unwrap_or_else(|| "127.0.0.1".to_string());
    let port: u16 = args.next().map(|p| p.parse::<u16>()).transpose()?.unwrap_or(7777);

    let config = NetworkConfig::from_env()?;
    init_logging(&config.logging)?;

    let mut client = ClientSession::new(&config, SessionContext::from_config(&config));
    client.register_handler(MessageType::ServerChatMessage, |_, envelope| {
        println!("{}", ServerChat::from_envelope(envelope)?.text);
        Ok(())
    })?;
    client.connect(&host, port).await?;

    let mut ticker = tokio::time::interval(Duration::from_millis(50));
    for frame in 0u32..600 {
        ticker.tick().await;

        match client.tick() {
            TickOutcome::ConnectionLost { reconnect: true } => client.reconnect().await?,
            TickOutcome::ConnectionLost { reconnect: false } | TickOutcome::NotConnected => break,
            TickOutcome::Active { .. } => {}
        }

        let angle = frame as f32 * 0.05;
        let position = Position::new(angle.cos() * 10.0, 0.0, angle.sin() * 10.0, angle);
        client.send_position_update(position)?;
        if frame % 20 == 0 {
            client.send_chat_message(&format!("tick {frame}, ping {} ms", client.ping_millis()))?;
        }
    }

    if let Some(stats) = client.statistics() {
        println!(
            "sent {} / received {} packets, loss {:.1}%",
            stats.packets_sent, stats.packets_received, stats.packet_loss_percent
        );
    }
    client.disconnect().await;
    Ok(())
}
