//! # Protocol Layer
//!
//! Session semantics on top of the framed transport.
//!
//! ## Components
//! - **Connection**: Reader and writer tasks, bounded queues, compression state
//! - **Dispatcher**: Message type id to handler routing
//! - **Server**: Admission, per-connection dispatch, broadcast, shutdown
//! - **Client**: Connect, tick-driven dispatch, heartbeat, typed senders
//!
//! ## Guarantees
//! - Messages from one peer are delivered and dispatched in arrival order
//! - Sends never block the caller; a full queue is reported as `QueueFull`
//! - Malformed frames are dropped without ending the session

pub mod client;
pub mod connection;
pub mod context;
pub mod dispatcher;
pub mod server;
pub mod state;

pub use client::{ClientSession, ClientState, TickOutcome};
pub use connection::{Connection, ConnectionOptions, InboundQueue};
pub use context::SessionContext;
pub use dispatcher::Dispatcher;
pub use server::{Admission, BroadcastReport, Peer, ServerSession, ServerState};
pub use state::{ConnectionId, ConnectionState};
