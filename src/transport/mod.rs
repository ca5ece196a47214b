//! # Transport Layer
//!
//! Byte-stream plumbing under the sessions. Sessions accept any
//! `AsyncRead + AsyncWrite` stream; this module provides the TCP pieces used by
//! [`ServerSession::start`](crate::protocol::server::ServerSession::start) and
//! [`ClientSession::connect`](crate::protocol::client::ClientSession::connect).

pub mod tcp;
