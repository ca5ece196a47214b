//! # Client Session
//!
//! Connects to a server, announces the client version, and is driven by the
//! game loop through [`ClientSession::tick`]: each tick drains inbound
//! messages in order, keeps the heartbeat going, and refreshes the loss
//! estimate. The typed senders pack gameplay messages and report `false`
//! instead of sending while disconnected.

use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, instrument, warn, Level};

use crate::config::{ClientConfig, NetworkConfig, TransportConfig};
use crate::core::envelope::MessageEnvelope;
use crate::core::message_type::{MessageKind, MessageType};
use crate::core::payload::{
    ChatMessage, ClientHello, CombatAction, Payload, Ping, PlayerDataRequest, Position,
    PositionUpdate,
};
use crate::error::{ProtocolError, Result};
use crate::protocol::connection::{Connection, ConnectionOptions, InboundQueue};
use crate::protocol::context::SessionContext;
use crate::protocol::dispatcher::Dispatcher;
use crate::protocol::state::ConnectionId;
use crate::transport::tcp;
use crate::utils::metrics::{Statistics, StatisticsSnapshot};

/// Client lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

/// What a call to [`ClientSession::tick`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    NotConnected,
    Active {
        /// Inbound envelopes processed this tick
        processed: usize,
        ping_sent: bool,
    },
    /// The server went away; `reconnect` says whether auto-reconnect is on
    ConnectionLost { reconnect: bool },
}

struct Link {
    connection: Connection,
    inbound: InboundQueue,
}

pub struct ClientSession {
    config: ClientConfig,
    transport: TransportConfig,
    ctx: SessionContext,
    state: ClientState,
    link: Option<Link>,
    dispatcher: Dispatcher<Connection>,
    /// Statistics of the current or most recent connection
    stats: Option<Arc<Statistics>>,
    target: Option<(String, u16)>,
    connected_at: Option<i64>,
    last_ping_sent: Option<i64>,
    sessions: u32,
}

impl ClientSession {
    pub fn new(config: &NetworkConfig, ctx: SessionContext) -> Self {
        Self {
            config: config.client.clone(),
            transport: config.transport.clone(),
            ctx,
            state: ClientState::Disconnected,
            link: None,
            dispatcher: Dispatcher::new(),
            stats: None,
            target: None,
            connected_at: None,
            last_ping_sent: None,
            sessions: 0,
        }
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ClientState::Connected
    }

    /// Open a TCP connection to `host:port` and announce this client.
    ///
    /// # Errors
    /// `Connect` when the server is unreachable within the connection
    /// timeout; the session stays `Disconnected`.
    #[instrument(skip(self))]
    pub async fn connect(&mut self, host: &str, port: u16) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }
        self.state = ClientState::Connecting;
        let stream = match tcp::connect(host, port, self.config.connection_timeout).await {
            Ok(stream) => stream,
            Err(e) => {
                self.state = ClientState::Disconnected;
                self.log(Level::ERROR, "connect", &format!("Connection failed: {e}"));
                return Err(e);
            }
        };
        self.target = Some((host.to_string(), port));
        self.connect_stream(stream).await
    }

    /// Start a session over an already established stream
    pub async fn connect_stream<S>(&mut self, stream: S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        self.drop_link();
        self.state = ClientState::Connecting;
        self.sessions = self.sessions.wrapping_add(1);

        let options =
            ConnectionOptions::from_config(&self.transport, self.config.backpressure_limit);
        let (connection, inbound) =
            Connection::spawn(ConnectionId(self.sessions), stream, options, self.ctx.clone());

        let hello = ClientHello {
            version: self.ctx.version().to_string(),
        };
        if let Err(e) = connection
            .mark_connected()
            .and_then(|_| connection.send(hello.to_envelope()))
        {
            connection.shutdown();
            self.state = ClientState::Disconnected;
            return Err(e);
        }

        self.stats = Some(Arc::clone(connection.statistics()));
        self.connected_at = Some(self.ctx.now_millis());
        self.last_ping_sent = None;
        self.link = Some(Link {
            connection,
            inbound,
        });
        self.state = ClientState::Connected;

        info!(version = %self.ctx.version(), "Connected to server");
        self.log(Level::INFO, "connect", "Connected to server");
        Ok(())
    }

    /// Say goodbye and close the connection. Safe to call at any time.
    #[instrument(skip(self))]
    pub async fn disconnect(&mut self) {
        let Some(link) = self.link.take() else {
            self.state = ClientState::Disconnected;
            return;
        };

        if self.state == ClientState::Connected {
            self.state = ClientState::Disconnecting;
            if let Err(e) = link
                .connection
                .send(MessageEnvelope::empty(MessageType::ClientDisconnect))
            {
                debug!(error = %e, "Goodbye not sent");
            }
        }
        link.connection.close().await;
        self.state = ClientState::Disconnected;
        self.log(Level::INFO, "connect", "Disconnected from server");
    }

    /// Retry the last `connect` target.
    ///
    /// # Errors
    /// The last `Connect` error once `max_reconnect_attempts` are used up, or
    /// `Connect` immediately when no TCP target was ever connected.
    #[instrument(skip(self))]
    pub async fn reconnect(&mut self) -> Result<()> {
        let (host, port) = self
            .target
            .clone()
            .ok_or_else(|| ProtocolError::Connect("no previous server address".to_string()))?;
        if self.is_connected() {
            return Ok(());
        }
        self.drop_link();

        let attempts = self.config.max_reconnect_attempts.max(1);
        let mut last_error = None;
        for attempt in 1..=attempts {
            match self.connect(&host, port).await {
                Ok(()) => {
                    info!(attempt, "Reconnected");
                    return Ok(());
                }
                Err(e) => {
                    warn!(attempt, attempts, error = %e, "Reconnect attempt failed");
                    last_error = Some(e);
                }
            }
            if attempt < attempts {
                tokio::time::sleep(self.config.reconnect_delay).await;
            }
        }
        Err(last_error.unwrap_or_else(|| ProtocolError::Connect(format!("{host}:{port}"))))
    }

    /// Drive the session from the game loop
    pub fn tick(&mut self) -> TickOutcome {
        if !self.is_connected() {
            return TickOutcome::NotConnected;
        }
        let Some(link) = self.link.as_mut() else {
            self.state = ClientState::Disconnected;
            return TickOutcome::NotConnected;
        };

        let mut processed = 0;
        while let Some(envelope) = link.inbound.try_next() {
            processed += 1;
            if envelope.kind() == Some(MessageType::ServerPong) {
                if let Some(sent) = self.last_ping_sent {
                    let rtt = (self.ctx.now_millis() - sent).max(0) as u64;
                    link.connection.statistics().set_ping(rtt);
                }
                continue;
            }
            match self.dispatcher.dispatch(&link.connection, &envelope) {
                Ok(()) => {}
                Err(ProtocolError::UnknownMessageType(raw)) => self.ctx.log(
                    Level::WARN,
                    "dispatch",
                    &format!("Unhandled message type {raw}"),
                    "client",
                ),
                Err(e) => self.ctx.log(
                    Level::WARN,
                    "handler",
                    &format!("Handler for message {} failed: {e}", envelope.id()),
                    "client",
                ),
            }
        }

        if !link.connection.is_open() {
            self.drop_link();
            self.state = ClientState::Disconnected;
            self.log(Level::WARN, "connect", "Connection to server lost");
            return TickOutcome::ConnectionLost {
                reconnect: self.config.auto_reconnect,
            };
        }

        let now = self.ctx.now_millis();
        let since = self.last_ping_sent.or(self.connected_at).unwrap_or(now);
        let mut ping_sent = false;
        if now - since > self.config.heartbeat_interval.as_millis() as i64 {
            match link.connection.send(Ping { timestamp: now }.to_envelope()) {
                Ok(()) => {
                    self.last_ping_sent = Some(now);
                    ping_sent = true;
                }
                Err(e) => debug!(error = %e, "Heartbeat deferred"),
            }
        }

        link.connection.statistics().update_packet_loss();
        TickOutcome::Active {
            processed,
            ping_sent,
        }
    }

    pub fn send_position_update(&self, position: Position) -> Result<bool> {
        self.send_payload(&PositionUpdate(position))
    }

    /// Send a chat line, truncated to the first 100 characters
    pub fn send_chat_message(&self, text: &str) -> Result<bool> {
        self.send_payload(&ChatMessage::new(text))
    }

    pub fn send_combat_action(
        &self,
        target_id: u32,
        damage: f32,
        action_type: &str,
    ) -> Result<bool> {
        self.send_payload(&CombatAction {
            target_id,
            damage,
            action_type: action_type.to_string(),
        })
    }

    /// Upload this player's opaque data blob to the server
    pub fn send_player_data(&self, data: impl Into<Bytes>) -> Result<bool> {
        self.send_payload(&PlayerDataRequest(data.into()))
    }

    /// Ask the server for player data with an empty request body
    pub fn request_player_data(&self) -> Result<bool> {
        self.send_payload(&PlayerDataRequest(Bytes::new()))
    }

    pub fn enable_compression(&self) -> Result<bool> {
        self.set_compression(true)
    }

    pub fn disable_compression(&self) -> Result<bool> {
        self.set_compression(false)
    }

    /// Send a pre-built envelope
    pub fn send(&self, envelope: MessageEnvelope) -> Result<bool> {
        match self.live_connection() {
            Some(connection) => connection.send(envelope).map(|_| true),
            None => Ok(false),
        }
    }

    /// Register (or replace) the handler for a message kind
    pub fn register_handler<K, F>(&self, kind: K, handler: F) -> Result<()>
    where
        K: MessageKind,
        F: Fn(&Connection, &MessageEnvelope) -> Result<()> + Send + Sync + 'static,
    {
        self.dispatcher.register(kind, handler)
    }

    pub fn ping_millis(&self) -> u64 {
        self.stats.as_ref().map_or(0, |stats| stats.ping_millis())
    }

    pub fn packet_loss(&self) -> f64 {
        self.stats.as_ref().map_or(0.0, |stats| stats.packet_loss())
    }

    pub fn statistics(&self) -> Option<StatisticsSnapshot> {
        self.stats.as_ref().map(|stats| stats.snapshot())
    }

    /// Clock reading taken when the current connection was established
    pub fn connected_at(&self) -> Option<i64> {
        self.connected_at
    }

    fn send_payload<P: Payload>(&self, payload: &P) -> Result<bool> {
        self.send(payload.to_envelope())
    }

    fn set_compression(&self, enabled: bool) -> Result<bool> {
        match self.live_connection() {
            Some(connection) => connection.set_compression(enabled).map(|_| true),
            None => Ok(false),
        }
    }

    fn live_connection(&self) -> Option<&Connection> {
        if !self.is_connected() {
            return None;
        }
        self.link.as_ref().map(|link| &link.connection)
    }

    fn drop_link(&mut self) {
        if let Some(link) = self.link.take() {
            link.connection.shutdown();
        }
    }

    fn log(&self, level: Level, category: &str, message: &str) {
        self.ctx.log(level, category, message, "client");
    }
}

impl Drop for ClientSession {
    fn drop(&mut self) {
        self.drop_link();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::logging::CapturingSink;
    use crate::utils::time::ManualClock;
    use tokio::io::duplex;

    #[test]
    fn senders_are_noops_while_disconnected() {
        let client = ClientSession::new(&NetworkConfig::default(), SessionContext::default());
        assert!(!client.send_chat_message("hi").unwrap());
        assert!(!client.send_position_update(Position::new(1.0, 2.0, 3.0, 4.0)).unwrap());
        assert!(!client.send_combat_action(1, 2.0, "slash").unwrap());
        assert!(!client.request_player_data().unwrap());
        assert!(!client.enable_compression().unwrap());
        assert_eq!(client.statistics(), None);
    }

    #[tokio::test]
    async fn tick_without_connection_does_nothing() {
        let mut client = ClientSession::new(&NetworkConfig::default(), SessionContext::default());
        assert_eq!(client.tick(), TickOutcome::NotConnected);
        client.disconnect().await;
        client.disconnect().await;
        assert_eq!(client.state(), ClientState::Disconnected);
    }

    #[tokio::test]
    async fn heartbeat_waits_for_interval() {
        let clock = Arc::new(ManualClock::new(10_000));
        let ctx = SessionContext::new(CapturingSink::new(), "test").with_clock(clock.clone());
        let mut client = ClientSession::new(&NetworkConfig::default(), ctx);

        let (a, _server_end) = duplex(64 * 1024);
        client.connect_stream(a).await.unwrap();
        assert_eq!(client.connected_at(), Some(10_000));

        clock.advance(1000);
        assert_eq!(
            client.tick(),
            TickOutcome::Active {
                processed: 0,
                ping_sent: false
            }
        );

        clock.advance(1);
        assert_eq!(
            client.tick(),
            TickOutcome::Active {
                processed: 0,
                ping_sent: true
            }
        );
    }

    #[tokio::test]
    async fn reconnect_without_target_fails() {
        let mut client = ClientSession::new(&NetworkConfig::default(), SessionContext::default());
        assert!(matches!(client.reconnect().await, Err(ProtocolError::Connect(_))));
    }
}
