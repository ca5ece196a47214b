use crate::core::envelope::MessageEnvelope;
use crate::core::message_type::{MessageKind, MessageTypeId};
use crate::error::{constants, ProtocolError, Result};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

type HandlerFn<C> = dyn Fn(&C, &MessageEnvelope) -> Result<()> + Send + Sync + 'static;

/// Runtime routing table from message type id to handler.
///
/// `C` is whatever the owning session hands to its handlers: a
/// [`Peer`](crate::protocol::server::Peer) on the server, the live
/// [`Connection`](crate::protocol::connection::Connection) on the client.
pub struct Dispatcher<C> {
    handlers: Arc<RwLock<HashMap<MessageTypeId, Arc<HandlerFn<C>>>>>,
}

impl<C> Default for Dispatcher<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> Clone for Dispatcher<C> {
    fn clone(&self) -> Self {
        Self {
            handlers: Arc::clone(&self.handlers),
        }
    }
}

impl<C> Dispatcher<C> {
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register (or replace) the handler for a message kind
    pub fn register<K, F>(&self, kind: K, handler: F) -> Result<()>
    where
        K: MessageKind,
        F: Fn(&C, &MessageEnvelope) -> Result<()> + Send + Sync + 'static,
    {
        self.register_raw(kind.to_id(), handler)
    }

    /// Register by raw id, for ids outside the built-in table
    pub fn register_raw<F>(&self, id: MessageTypeId, handler: F) -> Result<()>
    where
        F: Fn(&C, &MessageEnvelope) -> Result<()> + Send + Sync + 'static,
    {
        let mut handlers = self.handlers.write().map_err(|_| {
            ProtocolError::Custom(constants::ERR_DISPATCHER_WRITE_LOCK.to_string())
        })?;

        handlers.insert(id, Arc::new(handler));
        Ok(())
    }

    pub fn unregister(&self, id: MessageTypeId) -> Result<bool> {
        let mut handlers = self.handlers.write().map_err(|_| {
            ProtocolError::Custom(constants::ERR_DISPATCHER_WRITE_LOCK.to_string())
        })?;
        Ok(handlers.remove(&id).is_some())
    }

    pub fn has_handler(&self, id: MessageTypeId) -> bool {
        self.handlers
            .read()
            .map(|handlers| handlers.contains_key(&id))
            .unwrap_or(false)
    }

    /// Route an envelope to its handler.
    ///
    /// The handler runs after the table lock is released, so handlers may
    /// register or replace handlers themselves.
    ///
    /// # Errors
    /// `UnknownMessageType` when no handler is registered for the id; otherwise
    /// whatever the handler returns.
    pub fn dispatch(&self, ctx: &C, envelope: &MessageEnvelope) -> Result<()> {
        let handler = {
            let handlers = self.handlers.read().map_err(|_| {
                ProtocolError::Custom(constants::ERR_DISPATCHER_READ_LOCK.to_string())
            })?;
            handlers
                .get(&envelope.id())
                .cloned()
                .ok_or(ProtocolError::UnknownMessageType(envelope.id().0))?
        };

        handler(ctx, envelope)
    }
}
