//! Connection identity and lifecycle.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use crate::error::{ProtocolError, Result};

/// Server-assigned handle for one live connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(pub u32);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a connection; transitions only move forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum ConnectionState {
    Connecting = 0,
    Connected = 1,
    Disconnecting = 2,
    Closed = 3,
}

impl ConnectionState {
    pub fn name(self) -> &'static str {
        match self {
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Connected => "Connected",
            ConnectionState::Disconnecting => "Disconnecting",
            ConnectionState::Closed => "Closed",
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => ConnectionState::Connecting,
            1 => ConnectionState::Connected,
            2 => ConnectionState::Disconnecting,
            _ => ConnectionState::Closed,
        }
    }
}

/// Lock-free holder enforcing forward-only transitions
#[derive(Debug)]
pub(crate) struct AtomicConnectionState(AtomicU8);

impl AtomicConnectionState {
    pub(crate) fn new(state: ConnectionState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub(crate) fn load(&self) -> ConnectionState {
        ConnectionState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Move to `to` if it is strictly later than the current state
    pub(crate) fn advance(&self, to: ConnectionState) -> Result<ConnectionState> {
        let mut current = self.0.load(Ordering::Acquire);
        loop {
            let from = ConnectionState::from_u8(current);
            if to <= from {
                return Err(ProtocolError::InvalidStateTransition {
                    from: from.name(),
                    to: to.name(),
                });
            }
            match self.0.compare_exchange_weak(
                current,
                to as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(from),
                Err(actual) => current = actual,
            }
        }
    }
}

/// Hands out the lowest free id; released ids become reusable
#[derive(Debug, Default)]
pub(crate) struct IdAllocator {
    next: u32,
    free: BTreeSet<u32>,
}

impl IdAllocator {
    pub(crate) fn allocate(&mut self) -> ConnectionId {
        if let Some(id) = self.free.pop_first() {
            return ConnectionId(id);
        }
        let id = self.next;
        self.next = self.next.wrapping_add(1);
        ConnectionId(id)
    }

    pub(crate) fn release(&mut self, id: ConnectionId) {
        if id.0 < self.next {
            self.free.insert(id.0);
        }
    }
}
