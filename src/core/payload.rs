//! Typed message bodies.
//!
//! Each payload knows its [`MessageType`] and packs its fields with
//! [`BodyWriter`] in the order they are declared here. Decoding reads them back
//! in exactly that order and rejects trailing bytes.

use bytes::Bytes;

use crate::core::body::{BodyReader, BodyWriter};
use crate::core::envelope::MessageEnvelope;
use crate::core::message_type::MessageType;
use crate::error::{ProtocolError, Result};

/// Longest chat message in characters; senders truncate beyond this
pub const MAX_CHAT_CHARS: usize = 100;

/// A body with a fixed message type and field layout
pub trait Payload: Sized {
    const KIND: MessageType;

    fn encode(&self, writer: &mut BodyWriter);

    fn decode(reader: &mut BodyReader) -> Result<Self>;

    /// Pack into a ready-to-send envelope
    fn to_envelope(&self) -> MessageEnvelope {
        let mut writer = BodyWriter::new();
        self.encode(&mut writer);
        MessageEnvelope::new(Self::KIND, writer.finish())
    }

    /// Unpack from an envelope, checking the message type
    fn from_envelope(envelope: &MessageEnvelope) -> Result<Self> {
        if envelope.kind() != Some(Self::KIND) {
            return Err(ProtocolError::Framing(format!(
                "expected {:?} body, got id {}",
                Self::KIND,
                envelope.id()
            )));
        }
        let mut reader = BodyReader::new(envelope.body.clone());
        let payload = Self::decode(&mut reader)?;
        reader.finish()?;
        Ok(payload)
    }
}

/// Truncate to at most `max` characters on a char boundary
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}

/// `ClientConnect`: version handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientHello {
    pub version: String,
}

impl Payload for ClientHello {
    const KIND: MessageType = MessageType::ClientConnect;

    fn encode(&self, writer: &mut BodyWriter) {
        writer.put_str(&self.version);
    }

    fn decode(reader: &mut BodyReader) -> Result<Self> {
        Ok(Self {
            version: reader.get_string()?,
        })
    }
}

/// `ClientPing` timestamp in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ping {
    pub timestamp: i64,
}

impl Payload for Ping {
    const KIND: MessageType = MessageType::ClientPing;

    fn encode(&self, writer: &mut BodyWriter) {
        writer.put_i64(self.timestamp);
    }

    fn decode(reader: &mut BodyReader) -> Result<Self> {
        Ok(Self {
            timestamp: reader.get_i64()?,
        })
    }
}

/// `ServerPong`: the ping timestamp echoed back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pong {
    pub timestamp: i64,
}

impl Payload for Pong {
    const KIND: MessageType = MessageType::ServerPong;

    fn encode(&self, writer: &mut BodyWriter) {
        writer.put_i64(self.timestamp);
    }

    fn decode(reader: &mut BodyReader) -> Result<Self> {
        Ok(Self {
            timestamp: reader.get_i64()?,
        })
    }
}

/// Position packed as `x, y, z, w`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Position {
    pub fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }

    fn encode_fields(&self, writer: &mut BodyWriter) {
        writer
            .put_f32(self.x)
            .put_f32(self.y)
            .put_f32(self.z)
            .put_f32(self.w);
    }

    fn decode_fields(reader: &mut BodyReader) -> Result<Self> {
        let x = reader.get_f32()?;
        let y = reader.get_f32()?;
        let z = reader.get_f32()?;
        let w = reader.get_f32()?;
        Ok(Self { x, y, z, w })
    }
}

/// `TC_UPDATE_POS`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionUpdate(pub Position);

impl Payload for PositionUpdate {
    const KIND: MessageType = MessageType::UpdatePosition;

    fn encode(&self, writer: &mut BodyWriter) {
        self.0.encode_fields(writer);
    }

    fn decode(reader: &mut BodyReader) -> Result<Self> {
        Position::decode_fields(reader).map(Self)
    }
}

/// `TS_NOTIFY_PLAYER_POS_CHANGE`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionChanged(pub Position);

impl Payload for PositionChanged {
    const KIND: MessageType = MessageType::NotifyPlayerPosChange;

    fn encode(&self, writer: &mut BodyWriter) {
        self.0.encode_fields(writer);
    }

    fn decode(reader: &mut BodyReader) -> Result<Self> {
        Position::decode_fields(reader).map(Self)
    }
}

/// `TC_CHAT_MESSAGE`: text is truncated to [`MAX_CHAT_CHARS`] on construction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    text: String,
}

impl ChatMessage {
    pub fn new(text: &str) -> Self {
        Self {
            text: truncate_chars(text, MAX_CHAT_CHARS).to_string(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

impl Payload for ChatMessage {
    const KIND: MessageType = MessageType::ChatMessage;

    fn encode(&self, writer: &mut BodyWriter) {
        writer.put_str(&self.text);
    }

    fn decode(reader: &mut BodyReader) -> Result<Self> {
        Ok(Self {
            text: reader.get_string()?,
        })
    }
}

/// `TS_CHAT_MESSAGE` relayed by the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerChat {
    pub text: String,
}

impl Payload for ServerChat {
    const KIND: MessageType = MessageType::ServerChatMessage;

    fn encode(&self, writer: &mut BodyWriter) {
        writer.put_str(&self.text);
    }

    fn decode(reader: &mut BodyReader) -> Result<Self> {
        Ok(Self {
            text: reader.get_string()?,
        })
    }
}

/// `PlayerAttack`: `target_id, damage, action_type`
#[derive(Debug, Clone, PartialEq)]
pub struct CombatAction {
    pub target_id: u32,
    pub damage: f32,
    pub action_type: String,
}

impl Payload for CombatAction {
    const KIND: MessageType = MessageType::PlayerAttack;

    fn encode(&self, writer: &mut BodyWriter) {
        writer
            .put_u32(self.target_id)
            .put_f32(self.damage)
            .put_str(&self.action_type);
    }

    fn decode(reader: &mut BodyReader) -> Result<Self> {
        let target_id = reader.get_u32()?;
        let damage = reader.get_f32()?;
        let action_type = reader.get_string()?;
        Ok(Self {
            target_id,
            damage,
            action_type,
        })
    }
}

/// `TS_HIT_NPC`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HitNpc {
    pub npc_id: u32,
}

impl Payload for HitNpc {
    const KIND: MessageType = MessageType::HitNpc;

    fn encode(&self, writer: &mut BodyWriter) {
        writer.put_u32(self.npc_id);
    }

    fn decode(reader: &mut BodyReader) -> Result<Self> {
        Ok(Self {
            npc_id: reader.get_u32()?,
        })
    }
}

/// `TC_REQUEST_PLAYERDATA`: opaque to the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerDataRequest(pub Bytes);

impl Payload for PlayerDataRequest {
    const KIND: MessageType = MessageType::RequestPlayerData;

    fn encode(&self, writer: &mut BodyWriter) {
        writer.put_raw(&self.0);
    }

    fn decode(reader: &mut BodyReader) -> Result<Self> {
        Ok(Self(reader.take_rest()))
    }
}

/// `TS_SEND_PLAYERDATA`: opaque to the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerData(pub Bytes);

impl Payload for PlayerData {
    const KIND: MessageType = MessageType::SendPlayerData;

    fn encode(&self, writer: &mut BodyWriter) {
        writer.put_raw(&self.0);
    }

    fn decode(reader: &mut BodyReader) -> Result<Self> {
        Ok(Self(reader.take_rest()))
    }
}
