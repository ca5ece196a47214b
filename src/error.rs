//! # Error Types
//!
//! Error handling for the game sync protocol.
//!
//! Every fallible operation in the crate returns [`Result`], whose error side is
//! [`ProtocolError`]. The variants follow the failure policy of the transport:
//!
//! - **Framing / decompression**: the offending frame is dropped and logged, the
//!   connection stays alive.
//! - **Connect / bind**: surfaced to the caller, the session keeps its prior state.
//! - **Server full**: not an error; admission reports it as an outcome.
//! - **Unknown message type**: logged at warning level and discarded.
//!
//! ## Example Usage
//! ```rust
//! use game_sync_protocol::core::envelope::MessageEnvelope;
//! use game_sync_protocol::error::ProtocolError;
//!
//! match MessageEnvelope::deserialize(&[0x01, 0x00], 1024) {
//!     Err(ProtocolError::Framing(reason)) => println!("dropped frame: {reason}"),
//!     other => println!("{other:?}"),
//! }
//! ```

use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Dispatcher-related error messages
    pub const ERR_DISPATCHER_WRITE_LOCK: &str = "Failed to acquire write lock on dispatcher";
    pub const ERR_DISPATCHER_READ_LOCK: &str = "Failed to acquire read lock on dispatcher";

    /// Framing errors
    pub const ERR_TRUNCATED_HEADER: &str = "Fewer bytes than a message header";
    pub const ERR_TRUNCATED_BODY: &str = "Body size exceeds available bytes";
    pub const ERR_BODY_UNDERRUN: &str = "Body ended before all fields were read";
    pub const ERR_INVALID_UTF8: &str = "String field is not valid UTF-8";

    /// Synchronization
    pub const ERR_LOCK_POISONED: &str = "Synchronization primitive poisoned";
}

/// ProtocolError is the primary error type for all protocol operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Framing error: {0}")]
    Framing(String),

    #[error("Frame too large: {0} bytes")]
    OversizedFrame(usize),

    #[error("Compression failed")]
    Compression,

    #[error("Decompression failed")]
    Decompression,

    #[error("Connect failed: {0}")]
    Connect(String),

    #[error("Bind failed: {0}")]
    Bind(String),

    #[error("Unknown message type id: {0}")]
    UnknownMessageType(u32),

    #[error("Unknown connection id: {0}")]
    UnknownConnection(u32),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Outbound queue is full")]
    QueueFull,

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidStateTransition {
        from: &'static str,
        to: &'static str,
    },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Custom error: {0}")]
    Custom(String),
}

impl ProtocolError {
    /// Whether the error only affects a single frame.
    ///
    /// Frame-local errors are logged and the frame dropped; the connection that
    /// produced them stays healthy.
    pub fn is_frame_local(&self) -> bool {
        matches!(
            self,
            ProtocolError::Framing(_)
                | ProtocolError::OversizedFrame(_)
                | ProtocolError::Decompression
                | ProtocolError::UnknownMessageType(_)
        )
    }
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;
