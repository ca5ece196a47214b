//! # Core Protocol Components
//!
//! Message types, envelope framing and body packing.
//!
//! ## Components
//! - **MessageType**: the stable id table shared by client and server
//! - **Envelope**: typed header plus opaque body
//! - **Codec**: Tokio codec for framing envelopes over byte streams
//! - **Body / Payload**: fixed-order field packing and typed bodies
//!
//! ## Wire Format
//! ```text
//! [Id(4, LE)] [BodySize(4, LE)] [Body(N)]
//! ```
//!
//! ## Limits
//! - Body size is checked against the configured maximum before allocation
//! - Oversized or truncated frames are dropped without ending the stream

pub mod body;
pub mod codec;
pub mod envelope;
pub mod message_type;
pub mod payload;
