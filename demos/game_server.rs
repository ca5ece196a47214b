//! Example: Relay Server
//!
//! Accepts clients, relays position updates and chat to everyone else, and
//! shuts down cleanly on Ctrl+C.
//!
//! Run with: `cargo run --example game_server [config.toml]`

use game_sync_protocol::config::NetworkConfig;
use game_sync_protocol::core::envelope::MessageEnvelope;
use game_sync_protocol::core::message_type::MessageType;
use game_sync_protocol::core::payload::{ChatMessage, Payload, ServerChat};
use game_sync_protocol::protocol::{ServerSession, SessionContext};
use game_sync_protocol::utils::logging::init_logging;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = match std::env::args().nth(1) {
        Some(path) => NetworkConfig::from_file(path)?,
        None => NetworkConfig::from_env()?,
    };
    config.validate_strict()?;
    init_logging(&config.logging)?;

    let server = ServerSession::new(&config, SessionContext::default());

    server.register_handler(MessageType::UpdatePosition, |peer, envelope| {
        let relay = MessageEnvelope::new(MessageType::NotifyPlayerPosChange, envelope.body.clone());
        peer.broadcast_others(&relay);
        Ok(())
    })?;

    server.register_handler(MessageType::ChatMessage, |peer, envelope| {
        let chat = ChatMessage::from_envelope(envelope)?;
        let line = ServerChat {
            text: format!("[{}] {}", peer.id(), chat.text()),
        };
        peer.server().broadcast(&line.to_envelope(), None);
        Ok(())
    })?;

    server.register_handler(MessageType::RequestPlayerData, |peer, envelope| {
        peer.reply(MessageEnvelope::new(MessageType::SendPlayerData, envelope.body.clone()))
    })?;

    server.on_connect(|id| info!(connection = %id, "Player joined"))?;
    server.on_disconnect(|id| info!(connection = %id, "Player left"))?;

    let addr = server.start().await?;
    info!(address = %addr, "Relay server ready; press Ctrl+C to stop");

    tokio::signal::ctrl_c().await?;
    server.stop().await?;
    Ok(())
}
