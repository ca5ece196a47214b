//! Message envelope: the wire unit of the protocol.
//!
//! ```text
//! [id: u32 LE] [body_size: u32 LE] [body: body_size bytes]
//! ```
//!
//! `body_size` always mirrors the body length; constructors derive it from the
//! body so a sender cannot produce an inconsistent header. A receiver treats it
//! only as a framing boundary and refuses values above its configured maximum
//! before allocating anything.

use bytes::{BufMut, Bytes, BytesMut};

use crate::core::message_type::{MessageKind, MessageType, MessageTypeId};
use crate::error::{constants, ProtocolError, Result};

/// Size of the fixed header on the wire
pub const HEADER_SIZE: usize = 8;

/// Typed header preceding every body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    pub id: MessageTypeId,
    pub body_size: u32,
}

impl MessageHeader {
    /// Write the header in wire order
    #[inline]
    pub fn write_to(&self, dst: &mut BytesMut) {
        dst.put_u32_le(self.id.0);
        dst.put_u32_le(self.body_size);
    }

    /// Parse a header from the front of `src` without consuming it
    pub fn peek(src: &[u8]) -> Result<Self> {
        if src.len() < HEADER_SIZE {
            return Err(ProtocolError::Framing(
                constants::ERR_TRUNCATED_HEADER.to_string(),
            ));
        }
        let id = u32::from_le_bytes([src[0], src[1], src[2], src[3]]);
        let body_size = u32::from_le_bytes([src[4], src[5], src[6], src[7]]);
        Ok(Self {
            id: MessageTypeId(id),
            body_size,
        })
    }
}

/// One complete protocol message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageEnvelope {
    pub header: MessageHeader,
    pub body: Bytes,
}

impl MessageEnvelope {
    /// Build an envelope for a known message kind
    pub fn new<K: MessageKind>(kind: K, body: impl Into<Bytes>) -> Self {
        Self::from_raw(kind.to_id(), body)
    }

    /// Build an envelope with an empty body
    pub fn empty<K: MessageKind>(kind: K) -> Self {
        Self::new(kind, Bytes::new())
    }

    /// Build an envelope from a raw id, which may be outside the known table
    pub fn from_raw(id: MessageTypeId, body: impl Into<Bytes>) -> Self {
        let body = body.into();
        Self {
            header: MessageHeader {
                id,
                body_size: body.len() as u32,
            },
            body,
        }
    }

    #[inline]
    pub fn id(&self) -> MessageTypeId {
        self.header.id
    }

    /// Known message type, `None` for ids outside the table
    #[inline]
    pub fn kind(&self) -> Option<MessageType> {
        MessageType::from_id(self.header.id)
    }

    /// Replace the body, keeping the header consistent
    pub fn with_body(self, body: impl Into<Bytes>) -> Self {
        Self::from_raw(self.header.id, body)
    }

    /// Number of bytes this envelope occupies on the wire
    #[inline]
    pub fn wire_len(&self) -> usize {
        HEADER_SIZE + self.body.len()
    }

    /// Append the wire representation to `dst`
    pub fn write_to(&self, dst: &mut BytesMut) {
        dst.reserve(self.wire_len());
        self.header.write_to(dst);
        dst.extend_from_slice(&self.body);
    }

    /// Serialize to a standalone byte vector
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(self.wire_len());
        self.write_to(&mut buf);
        buf.to_vec()
    }

    /// Parse exactly one envelope from the front of `bytes`.
    ///
    /// Trailing bytes after the frame are ignored.
    ///
    /// # Errors
    /// - `Framing` if fewer than [`HEADER_SIZE`] bytes are present, or the body is truncated
    /// - `OversizedFrame` if `body_size` exceeds `max_frame_size`
    pub fn deserialize(bytes: &[u8], max_frame_size: usize) -> Result<Self> {
        let header = MessageHeader::peek(bytes)?;
        let body_size = header.body_size as usize;

        if body_size > max_frame_size {
            return Err(ProtocolError::OversizedFrame(body_size));
        }

        let available = bytes.len() - HEADER_SIZE;
        if body_size > available {
            return Err(ProtocolError::Framing(format!(
                "{}: header claims {body_size}, {available} available",
                constants::ERR_TRUNCATED_BODY
            )));
        }

        let body = Bytes::copy_from_slice(&bytes[HEADER_SIZE..HEADER_SIZE + body_size]);
        Ok(Self { header, body })
    }
}
