//! Body compression.
//!
//! A [`Compressor`] is a swappable transform over message bodies. The default
//! is [`Identity`], which returns its input unchanged; [`Lz4`] and [`Zstd`]
//! implement the same trait, so switching codecs needs no protocol change.
//!
//! A [`CompressionPipeline`] sits on each connection and tracks the two
//! directions separately: whether we compress what we send, and whether the
//! peer told us (via `CompressionEnabled`) that it compresses what it sends.

use std::fmt;
use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::{COMPRESSION_LEVEL, MAX_FRAME_SIZE};
use crate::core::envelope::MessageEnvelope;
use crate::error::{ProtocolError, Result};

/// Selectable compression strategies
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionKind {
    #[default]
    Identity,
    Lz4,
    Zstd,
}

impl CompressionKind {
    /// Instantiate the strategy, bounding decompressed output to `max_output` bytes
    pub fn build(self, max_output: usize) -> Arc<dyn Compressor> {
        self.build_with_level(max_output, COMPRESSION_LEVEL)
    }

    /// Like [`CompressionKind::build`], with an explicit level for strategies
    /// that take one
    pub fn build_with_level(self, max_output: usize, level: i32) -> Arc<dyn Compressor> {
        match self {
            CompressionKind::Identity => Arc::new(Identity),
            CompressionKind::Lz4 => Arc::new(Lz4::new(max_output)),
            CompressionKind::Zstd => Arc::new(Zstd::new(max_output).with_level(level)),
        }
    }
}

/// A reversible transform over body bytes
pub trait Compressor: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// # Errors
    /// Returns `ProtocolError::Compression` if the codec itself fails
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// # Errors
    /// Returns `ProtocolError::Decompression` on malformed input or when the
    /// output would exceed the configured limit
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>>;
}

/// Pass-through strategy
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl Compressor for Identity {
    fn name(&self) -> &'static str {
        "identity"
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }
}

/// LZ4 block compression with a prepended little-endian size
#[derive(Debug, Clone, Copy)]
pub struct Lz4 {
    max_output: usize,
}

impl Lz4 {
    pub fn new(max_output: usize) -> Self {
        Self { max_output }
    }
}

impl Default for Lz4 {
    fn default() -> Self {
        Self::new(MAX_FRAME_SIZE)
    }
}

impl Compressor for Lz4 {
    fn name(&self) -> &'static str {
        "lz4"
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(lz4_flex::compress_prepend_size(data))
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        // The claimed size must be checked before lz4_flex allocates for it
        if data.len() < 4 {
            return Err(ProtocolError::Decompression);
        }
        let claimed_size = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
        if claimed_size > self.max_output {
            return Err(ProtocolError::Decompression);
        }

        let decompressed = lz4_flex::decompress_size_prepended(data)
            .map_err(|_| ProtocolError::Decompression)?;

        if decompressed.len() > self.max_output {
            return Err(ProtocolError::Decompression);
        }
        Ok(decompressed)
    }
}

/// Zstd streaming compression
#[derive(Debug, Clone, Copy)]
pub struct Zstd {
    max_output: usize,
    level: i32,
}

impl Zstd {
    pub fn new(max_output: usize) -> Self {
        Self {
            max_output,
            level: COMPRESSION_LEVEL,
        }
    }

    pub fn with_level(mut self, level: i32) -> Self {
        self.level = level;
        self
    }
}

impl Default for Zstd {
    fn default() -> Self {
        Self::new(MAX_FRAME_SIZE)
    }
}

impl Compressor for Zstd {
    fn name(&self) -> &'static str {
        "zstd"
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        zstd::stream::copy_encode(data, &mut out, self.level)
            .map_err(|_| ProtocolError::Compression)?;
        Ok(out)
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut reader =
            zstd::stream::Decoder::new(data).map_err(|_| ProtocolError::Decompression)?;

        // Read in chunks so the size limit is enforced while decoding
        let mut out = Vec::new();
        let mut buffer = [0u8; 8192];
        loop {
            match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => {
                    out.extend_from_slice(&buffer[..n]);
                    if out.len() > self.max_output {
                        return Err(ProtocolError::Decompression);
                    }
                }
                Err(_) => return Err(ProtocolError::Decompression),
            }
        }
        Ok(out)
    }
}

/// Per-connection compression state.
///
/// Outbound and inbound flags are independent: each peer announces its own
/// outbound encoding with a control envelope before it starts using it.
#[derive(Debug)]
pub struct CompressionPipeline {
    codec: Arc<dyn Compressor>,
    outbound: AtomicBool,
    inbound: AtomicBool,
}

impl CompressionPipeline {
    pub fn new(codec: Arc<dyn Compressor>) -> Self {
        Self {
            codec,
            outbound: AtomicBool::new(false),
            inbound: AtomicBool::new(false),
        }
    }

    /// Pipeline using the identity transform
    pub fn identity() -> Self {
        Self::new(Arc::new(Identity))
    }

    pub fn codec(&self) -> &Arc<dyn Compressor> {
        &self.codec
    }

    pub fn outbound_enabled(&self) -> bool {
        self.outbound.load(Ordering::Acquire)
    }

    pub fn inbound_enabled(&self) -> bool {
        self.inbound.load(Ordering::Acquire)
    }

    pub fn set_outbound(&self, enabled: bool) {
        self.outbound.store(enabled, Ordering::Release);
    }

    pub fn set_inbound(&self, enabled: bool) {
        self.inbound.store(enabled, Ordering::Release);
    }

    /// Compress the body if outbound compression is on; control envelopes pass through
    pub fn encode_outbound(&self, envelope: MessageEnvelope) -> Result<MessageEnvelope> {
        if !self.outbound_enabled() || is_control(&envelope) {
            return Ok(envelope);
        }
        let body = self.codec.compress(&envelope.body)?;
        Ok(envelope.with_body(body))
    }

    /// Reverse the peer's compression if it announced it
    pub fn decode_inbound(&self, envelope: MessageEnvelope) -> Result<MessageEnvelope> {
        if !self.inbound_enabled() || is_control(&envelope) {
            return Ok(envelope);
        }
        let body = self.codec.decompress(&envelope.body)?;
        Ok(envelope.with_body(body))
    }
}

impl Default for CompressionPipeline {
    fn default() -> Self {
        Self::identity()
    }
}

#[inline]
fn is_control(envelope: &MessageEnvelope) -> bool {
    envelope.kind().is_some_and(|kind| kind.is_control())
}
