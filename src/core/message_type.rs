//! Message type identifiers.
//!
//! The numeric id of every message is the cross-process contract between
//! client and server builds. Ids are carried on the wire as `u32`; modules that
//! route on message types are written against the [`MessageKind`] trait so a
//! different table can be plugged in without touching framing or dispatch.

use std::fmt;
use std::hash::Hash;

/// Raw message type id as carried in a [`MessageHeader`](crate::core::envelope::MessageHeader)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MessageTypeId(pub u32);

impl fmt::Display for MessageTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A table of message types with a stable numeric encoding
pub trait MessageKind: Copy + Eq + Ord + Hash + fmt::Debug + Send + Sync + 'static {
    /// Numeric id used on the wire
    fn to_id(self) -> MessageTypeId;

    /// Look up a kind by wire id, `None` for ids outside the table
    fn from_id(id: MessageTypeId) -> Option<Self>;

    /// Human-readable name for logs
    fn name(self) -> &'static str;
}

/// The message table shared by client and server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u32)]
pub enum MessageType {
    /// C→S handshake carrying the client version string
    ClientConnect = 0,
    ClientDisconnect = 1,
    /// C→S heartbeat carrying an `i64` timestamp
    ClientPing = 2,
    /// S→C echo of the ping timestamp
    ServerPong = 3,
    UpdatePosition = 4,
    ChatMessage = 5,
    RequestPlayerData = 6,
    SendPlayerData = 7,
    NotifyPlayerPosChange = 8,
    ServerChatMessage = 9,
    PlayerAttack = 10,
    HitNpc = 11,
    GotHit = 12,
    /// Control: subsequent bodies from the sender are compressed
    CompressionEnabled = 13,
    /// Control: subsequent bodies from the sender are raw
    CompressionDisabled = 14,
}

impl MessageType {
    /// Every message type, ordered by id
    pub const ALL: [MessageType; 15] = [
        MessageType::ClientConnect,
        MessageType::ClientDisconnect,
        MessageType::ClientPing,
        MessageType::ServerPong,
        MessageType::UpdatePosition,
        MessageType::ChatMessage,
        MessageType::RequestPlayerData,
        MessageType::SendPlayerData,
        MessageType::NotifyPlayerPosChange,
        MessageType::ServerChatMessage,
        MessageType::PlayerAttack,
        MessageType::HitNpc,
        MessageType::GotHit,
        MessageType::CompressionEnabled,
        MessageType::CompressionDisabled,
    ];

    /// Control messages steer the connection itself and are never compressed
    #[inline]
    pub fn is_control(self) -> bool {
        matches!(
            self,
            MessageType::CompressionEnabled | MessageType::CompressionDisabled
        )
    }
}

impl MessageKind for MessageType {
    #[inline]
    fn to_id(self) -> MessageTypeId {
        MessageTypeId(self as u32)
    }

    fn from_id(id: MessageTypeId) -> Option<Self> {
        MessageType::ALL.get(id.0 as usize).copied()
    }

    fn name(self) -> &'static str {
        match self {
            MessageType::ClientConnect => "ClientConnect",
            MessageType::ClientDisconnect => "ClientDisconnect",
            MessageType::ClientPing => "ClientPing",
            MessageType::ServerPong => "ServerPong",
            MessageType::UpdatePosition => "TC_UPDATE_POS",
            MessageType::ChatMessage => "TC_CHAT_MESSAGE",
            MessageType::RequestPlayerData => "TC_REQUEST_PLAYERDATA",
            MessageType::SendPlayerData => "TS_SEND_PLAYERDATA",
            MessageType::NotifyPlayerPosChange => "TS_NOTIFY_PLAYER_POS_CHANGE",
            MessageType::ServerChatMessage => "TS_CHAT_MESSAGE",
            MessageType::PlayerAttack => "PlayerAttack",
            MessageType::HitNpc => "TS_HIT_NPC",
            MessageType::GotHit => "TS_GOT_HIT",
            MessageType::CompressionEnabled => "CompressionEnabled",
            MessageType::CompressionDisabled => "CompressionDisabled",
        }
    }
}

impl From<MessageType> for MessageTypeId {
    fn from(kind: MessageType) -> Self {
        kind.to_id()
    }
}

impl TryFrom<MessageTypeId> for MessageType {
    type Error = crate::error::ProtocolError;

    fn try_from(id: MessageTypeId) -> Result<Self, Self::Error> {
        MessageType::from_id(id).ok_or(crate::error::ProtocolError::UnknownMessageType(id.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_dense_and_stable() {
        for (index, kind) in MessageType::ALL.iter().enumerate() {
            assert_eq!(kind.to_id(), MessageTypeId(index as u32));
            assert_eq!(MessageType::from_id(kind.to_id()), Some(*kind));
        }
        assert_eq!(MessageType::ClientPing.to_id(), MessageTypeId(2));
        assert_eq!(MessageType::CompressionDisabled.to_id(), MessageTypeId(14));
    }

    #[test]
    fn unknown_ids_are_rejected() {
        assert_eq!(MessageType::from_id(MessageTypeId(15)), None);
        assert!(MessageType::try_from(MessageTypeId(u32::MAX)).is_err());
    }

    #[test]
    fn only_compression_toggles_are_control() {
        let control: Vec<_> = MessageType::ALL
            .iter()
            .filter(|kind| kind.is_control())
            .collect();
        assert_eq!(
            control,
            vec![
                &MessageType::CompressionEnabled,
                &MessageType::CompressionDisabled
            ]
        );
    }
}
