#![no_main]

use bytes::BytesMut;
use game_sync_protocol::core::codec::{EnvelopeCodec, Frame};
use game_sync_protocol::core::envelope::MessageEnvelope;
use game_sync_protocol::core::payload::{ChatMessage, CombatAction, Payload, PositionUpdate};
use libfuzzer_sys::fuzz_target;
use tokio_util::codec::Decoder;

fuzz_target!(|data: &[u8]| {
    let _ = MessageEnvelope::deserialize(data, 4096);

    let mut codec = EnvelopeCodec::new(4096);
    let mut buf = BytesMut::from(data);
    while let Ok(Some(frame)) = codec.decode(&mut buf) {
        if let Frame::Envelope(envelope) = frame {
            let _ = PositionUpdate::from_envelope(&envelope);
            let _ = ChatMessage::from_envelope(&envelope);
            let _ = CombatAction::from_envelope(&envelope);
        }
    }
});
