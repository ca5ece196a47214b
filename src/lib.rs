//! # Game Sync Protocol
//!
//! Low-latency binary transport and session layer for real-time multiplayer
//! game state. A server accepts many clients, exchanges length-prefixed binary
//! envelopes with them, routes each message by type id, and tracks per-client
//! statistics; a client connects, keeps a heartbeat, and sends gameplay updates.
//!
//! ## Layout
//! - [`core`]: message ids, envelopes, the frame codec and message bodies
//! - [`protocol`]: connections, dispatch, server and client sessions
//! - [`transport`]: TCP helpers
//! - [`utils`]: compression, statistics, logging and clocks
//! - [`config`]: TOML and environment configuration
//!
//! ## Example
//! ```no_run
//! use game_sync_protocol::config::NetworkConfig;
//! use game_sync_protocol::protocol::{ServerSession, SessionContext};
//!
//! # async fn run() -> game_sync_protocol::error::Result<()> {
//! let server = ServerSession::new(&NetworkConfig::default(), SessionContext::default());
//! let addr = server.start().await?;
//! println!("listening on {addr}");
//! server.stop().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod transport;
pub mod utils;

pub use crate::core::envelope::MessageEnvelope;
pub use crate::core::message_type::{MessageKind, MessageType, MessageTypeId};
pub use crate::error::{ProtocolError, Result};
pub use crate::protocol::{ClientSession, ServerSession, SessionContext};
