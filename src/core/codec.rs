//! Stream framing for envelopes.
//!
//! [`EnvelopeCodec`] turns a byte stream into [`Frame`]s and back. Malformed
//! input never ends the stream: an oversized header is reported once as a
//! dropped frame, after which exactly `body_size` bytes are discarded as they
//! arrive and decoding resumes at the next header. Only I/O errors are fatal.

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

use crate::config::MAX_FRAME_SIZE;
use crate::core::envelope::{MessageEnvelope, MessageHeader, HEADER_SIZE};
use crate::error::{ProtocolError, Result};

/// Result of decoding one frame from the stream
#[derive(Debug)]
pub enum Frame {
    /// A complete, well-formed envelope
    Envelope(MessageEnvelope),
    /// A frame that was discarded; the stream is still usable
    Dropped(ProtocolError),
}

#[derive(Debug, Clone)]
pub struct EnvelopeCodec {
    max_frame_size: usize,
    /// Bytes of an oversized body still to be discarded
    skip_remaining: usize,
}

impl EnvelopeCodec {
    pub fn new(max_frame_size: usize) -> Self {
        Self {
            max_frame_size,
            skip_remaining: 0,
        }
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Whether the codec is currently discarding an oversized body
    pub fn is_skipping(&self) -> bool {
        self.skip_remaining > 0
    }

    fn discard(&mut self, src: &mut BytesMut) {
        let n = self.skip_remaining.min(src.len());
        src.advance(n);
        self.skip_remaining -= n;
    }
}

impl Default for EnvelopeCodec {
    fn default() -> Self {
        Self::new(MAX_FRAME_SIZE)
    }
}

impl Decoder for EnvelopeCodec {
    type Item = Frame;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        if self.skip_remaining > 0 {
            self.discard(src);
            if self.skip_remaining > 0 {
                return Ok(None);
            }
        }

        if src.len() < HEADER_SIZE {
            src.reserve(HEADER_SIZE - src.len());
            return Ok(None);
        }

        let header = MessageHeader::peek(&src[..])?;
        let body_size = header.body_size as usize;

        if body_size > self.max_frame_size {
            src.advance(HEADER_SIZE);
            self.skip_remaining = body_size;
            self.discard(src);
            return Ok(Some(Frame::Dropped(ProtocolError::OversizedFrame(body_size))));
        }

        let frame_len = HEADER_SIZE + body_size;
        if src.len() < frame_len {
            src.reserve(frame_len - src.len());
            return Ok(None);
        }

        src.advance(HEADER_SIZE);
        let body = src.split_to(body_size).freeze();
        trace!(id = %header.id, body_size, "Decoded frame");

        Ok(Some(Frame::Envelope(MessageEnvelope { header, body })))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        if src.is_empty() && self.skip_remaining == 0 {
            return Ok(None);
        }

        let leftover = src.len();
        src.clear();
        self.skip_remaining = 0;
        Ok(Some(Frame::Dropped(ProtocolError::Framing(format!(
            "stream ended inside a frame ({leftover} bytes buffered)"
        )))))
    }
}

impl Encoder<MessageEnvelope> for EnvelopeCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: MessageEnvelope, dst: &mut BytesMut) -> Result<()> {
        if item.body.len() > self.max_frame_size {
            return Err(ProtocolError::OversizedFrame(item.body.len()));
        }
        item.write_to(dst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::message_type::MessageType;

    fn expect_envelope(frame: Option<Frame>) -> MessageEnvelope {
        match frame {
            Some(Frame::Envelope(envelope)) => envelope,
            other => panic!("expected envelope, got {other:?}"),
        }
    }

    #[test]
    fn decodes_frames_split_across_reads() {
        let mut codec = EnvelopeCodec::new(1024);
        let envelope = MessageEnvelope::new(MessageType::ChatMessage, vec![3u8; 40]);
        let bytes = envelope.serialize();

        let mut buf = BytesMut::new();
        buf.extend_from_slice(&bytes[..5]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(&bytes[5..20]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(&bytes[20..]);

        assert_eq!(expect_envelope(codec.decode(&mut buf).unwrap()), envelope);
        assert!(buf.is_empty());
    }

    #[test]
    fn oversized_frame_is_skipped_and_stream_resyncs() {
        let mut codec = EnvelopeCodec::new(16);
        let mut buf = BytesMut::new();
        MessageEnvelope::new(MessageType::SendPlayerData, vec![0xEE; 64]).write_to(&mut buf);
        let next = MessageEnvelope::new(MessageType::GotHit, vec![1u8, 2]);
        next.write_to(&mut buf);

        match codec.decode(&mut buf).unwrap() {
            Some(Frame::Dropped(ProtocolError::OversizedFrame(64))) => {}
            other => panic!("expected dropped frame, got {other:?}"),
        }
        assert!(!codec.is_skipping());
        assert_eq!(expect_envelope(codec.decode(&mut buf).unwrap()), next);
    }

    #[test]
    fn oversized_body_arriving_in_pieces_is_discarded() {
        let mut codec = EnvelopeCodec::new(8);
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&7u32.to_le_bytes());
        buf.extend_from_slice(&100u32.to_le_bytes());
        buf.extend_from_slice(&[0u8; 30]);

        assert!(matches!(
            codec.decode(&mut buf).unwrap(),
            Some(Frame::Dropped(ProtocolError::OversizedFrame(100)))
        ));
        assert!(codec.is_skipping());

        buf.extend_from_slice(&[0u8; 70]);
        let next = MessageEnvelope::empty(MessageType::ClientDisconnect);
        next.write_to(&mut buf);
        assert_eq!(expect_envelope(codec.decode(&mut buf).unwrap()), next);
    }

    #[test]
    fn truncated_frame_at_eof_is_dropped() {
        let mut codec = EnvelopeCodec::new(1024);
        let mut buf = BytesMut::new();
        let bytes = MessageEnvelope::new(MessageType::ChatMessage, vec![1u8; 10]).serialize();
        buf.extend_from_slice(&bytes[..12]);

        assert!(matches!(
            codec.decode_eof(&mut buf).unwrap(),
            Some(Frame::Dropped(ProtocolError::Framing(_)))
        ));
        assert!(codec.decode_eof(&mut buf).unwrap().is_none());
    }

    #[test]
    fn encoder_refuses_oversized_bodies() {
        let mut codec = EnvelopeCodec::new(4);
        let mut buf = BytesMut::new();
        let result = codec.encode(
            MessageEnvelope::new(MessageType::SendPlayerData, vec![0u8; 5]),
            &mut buf,
        );
        assert!(matches!(result, Err(ProtocolError::OversizedFrame(5))));
        assert!(buf.is_empty());
    }
}
