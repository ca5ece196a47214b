#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! Framing behavior of the envelope codec over real byte streams:
//! partial delivery, oversized frames, truncated tails

use bytes::BytesMut;
use futures::StreamExt;
use game_sync_protocol::core::codec::{EnvelopeCodec, Frame};
use game_sync_protocol::core::envelope::{MessageEnvelope, HEADER_SIZE};
use game_sync_protocol::core::message_type::{MessageType, MessageTypeId};
use game_sync_protocol::core::payload::{ChatMessage, Payload, Position, PositionUpdate};
use game_sync_protocol::error::ProtocolError;
use tokio::io::AsyncWriteExt;
use tokio_util::codec::{Decoder, FramedRead};

fn envelopes(frames: Vec<Frame>) -> Vec<MessageEnvelope> {
    frames
        .into_iter()
        .filter_map(|frame| match frame {
            Frame::Envelope(envelope) => Some(envelope),
            Frame::Dropped(_) => None,
        })
        .collect()
}

#[tokio::test]
async fn test_byte_at_a_time_delivery() {
    let first = PositionUpdate(Position::new(1.0, -2.5, 3.25, 0.0)).to_envelope();
    let second = ChatMessage::new("gg").to_envelope();
    let mut wire = first.serialize();
    wire.extend(second.serialize());

    let (mut tx, rx) = tokio::io::duplex(4);
    let writer = tokio::spawn(async move {
        for byte in wire {
            tx.write_all(&[byte]).await.unwrap();
        }
    });

    let frames: Vec<Frame> = FramedRead::new(rx, EnvelopeCodec::default())
        .map(|frame| frame.unwrap())
        .collect()
        .await;
    writer.await.unwrap();

    assert_eq!(envelopes(frames), vec![first, second]);
}

#[tokio::test]
async fn test_oversized_frame_is_skipped_and_stream_resyncs() {
    let max = 1024;
    let mut wire = Vec::new();
    wire.extend_from_slice(&(MessageType::SendPlayerData as u32).to_le_bytes());
    wire.extend_from_slice(&((max as u32) + 1).to_le_bytes());
    wire.extend(vec![0xEE; max + 1]);
    let good = MessageEnvelope::new(MessageType::HitNpc, 7u32.to_le_bytes().to_vec());
    wire.extend(good.serialize());

    let frames: Vec<Frame> = FramedRead::new(&wire[..], EnvelopeCodec::new(max))
        .map(|frame| frame.unwrap())
        .collect()
        .await;

    assert_eq!(frames.len(), 2);
    assert!(matches!(
        frames[0],
        Frame::Dropped(ProtocolError::OversizedFrame(size)) if size == max + 1
    ));
    assert!(matches!(&frames[1], Frame::Envelope(envelope) if *envelope == good));
}

#[tokio::test]
async fn test_truncated_tail_is_dropped() {
    let complete = MessageEnvelope::empty(MessageType::GotHit);
    let mut wire = complete.serialize();
    let partial = MessageEnvelope::new(MessageType::ChatMessage, vec![1u8; 32]).serialize();
    wire.extend_from_slice(&partial[..HEADER_SIZE + 5]);

    let frames: Vec<Frame> = FramedRead::new(&wire[..], EnvelopeCodec::default())
        .map(|frame| frame.unwrap())
        .collect()
        .await;

    assert_eq!(frames.len(), 2);
    assert!(matches!(&frames[0], Frame::Envelope(envelope) if *envelope == complete));
    assert!(matches!(frames[1], Frame::Dropped(ProtocolError::Framing(_))));
}

#[test]
fn test_unknown_ids_still_frame() {
    let envelope = MessageEnvelope::from_raw(MessageTypeId(9000), vec![1u8, 2, 3]);
    let mut buf = BytesMut::from(&envelope.serialize()[..]);

    let mut codec = EnvelopeCodec::default();
    match codec.decode(&mut buf).unwrap() {
        Some(Frame::Envelope(decoded)) => {
            assert_eq!(decoded.id(), MessageTypeId(9000));
            assert_eq!(decoded.kind(), None);
            assert_eq!(decoded.body.as_ref(), &[1, 2, 3]);
        }
        other => panic!("expected envelope, got {other:?}"),
    }
    assert!(buf.is_empty());
}

#[test]
fn test_deserialize_rejects_short_input() {
    let result = MessageEnvelope::deserialize(&[0, 0, 0], 1024);
    assert!(matches!(result, Err(ProtocolError::Framing(_))));

    let mut header_only = Vec::new();
    header_only.extend_from_slice(&5u32.to_le_bytes());
    header_only.extend_from_slice(&10u32.to_le_bytes());
    let result = MessageEnvelope::deserialize(&header_only, 1024);
    assert!(matches!(result, Err(ProtocolError::Framing(_))));
}
