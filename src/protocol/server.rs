//! # Server Session Manager
//!
//! Accepts client streams, admits them against the capacity limit, and runs
//! one dispatch task per connection so each client's messages are handled
//! sequentially in arrival order while different clients proceed concurrently.
//!
//! ## Lifecycle
//! `Idle → Listening → Stopping → Idle`. Streams can also be admitted directly
//! through [`ServerSession::on_client_connect`], which lets callers drive their
//! own accept loop (or in-memory transports) while the session is `Idle`.
//!
//! ## Built-in messages
//! - `ClientPing` is answered with `ServerPong` carrying the same body
//! - `ClientConnect` records the peer's version, then reaches a handler if any
//! - `ClientDisconnect` tears the connection down
//!
//! Everything else goes through the registered handlers; ids without a handler
//! are logged as warnings and dropped.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use futures::future::join_all;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn, Level};

use crate::config::{NetworkConfig, ServerConfig, TransportConfig};
use crate::core::envelope::MessageEnvelope;
use crate::core::message_type::{MessageKind, MessageType};
use crate::core::payload::{ClientHello, Payload};
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::connection::{Connection, ConnectionOptions, InboundQueue};
use crate::protocol::context::SessionContext;
use crate::protocol::dispatcher::Dispatcher;
use crate::protocol::state::{ConnectionId, IdAllocator};
use crate::transport::tcp;
use crate::utils::metrics::StatisticsSnapshot;

/// Server lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Idle,
    Listening,
    Stopping,
}

/// Outcome of offering a new stream to the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Accepted(ConnectionId),
    /// At capacity; the stream was dropped without any reply
    ServerFull,
    /// The server is stopping
    Refused,
}

/// Per-call broadcast outcome
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub failed: usize,
}

type Callback = Arc<dyn Fn(ConnectionId) + Send + Sync>;

/// What a server handler sees: the sender's id plus reply capability
#[derive(Clone)]
pub struct Peer {
    id: ConnectionId,
    connection: Arc<Connection>,
    server: ServerSession,
}

impl Peer {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn server(&self) -> &ServerSession {
        &self.server
    }

    /// Enqueue an envelope back to the sender.
    ///
    /// Bound to the sender's own connection, so a reply never reaches a
    /// later client that was handed the same id.
    pub fn reply(&self, envelope: MessageEnvelope) -> Result<()> {
        self.connection.send(envelope)
    }

    /// Enqueue an envelope to every other client
    pub fn broadcast_others(&self, envelope: &MessageEnvelope) -> BroadcastReport {
        self.server.broadcast(envelope, Some(self.id))
    }

    pub fn peer_version(&self) -> Option<String> {
        self.server.peer_version(self.id)
    }
}

struct Entry {
    connection: Arc<Connection>,
    peer_version: Option<String>,
}

#[derive(Default)]
struct Registry {
    connections: HashMap<ConnectionId, Entry>,
    ids: IdAllocator,
}

struct Listener {
    local_addr: SocketAddr,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

struct ServerInner {
    config: ServerConfig,
    transport: TransportConfig,
    ctx: SessionContext,
    state: Mutex<ServerState>,
    registry: Mutex<Registry>,
    listener: Mutex<Option<Listener>>,
    start_lock: tokio::sync::Mutex<()>,
    dispatcher: Dispatcher<Peer>,
    on_connect: RwLock<Vec<Callback>>,
    on_disconnect: RwLock<Vec<Callback>>,
}

/// Multiplayer server session; cheap to clone, all clones share one server
#[derive(Clone)]
pub struct ServerSession {
    inner: Arc<ServerInner>,
}

impl ServerSession {
    pub fn new(config: &NetworkConfig, ctx: SessionContext) -> Self {
        Self {
            inner: Arc::new(ServerInner {
                config: config.server.clone(),
                transport: config.transport.clone(),
                ctx,
                state: Mutex::new(ServerState::Idle),
                registry: Mutex::new(Registry::default()),
                listener: Mutex::new(None),
                start_lock: tokio::sync::Mutex::new(()),
                dispatcher: Dispatcher::new(),
                on_connect: RwLock::new(Vec::new()),
                on_disconnect: RwLock::new(Vec::new()),
            }),
        }
    }

    pub fn state(&self) -> ServerState {
        lock(&self.inner.state)
            .map(|state| *state)
            .unwrap_or(ServerState::Stopping)
    }

    pub fn max_connections(&self) -> usize {
        self.inner.config.max_connections
    }

    /// Address the listener is bound to while `Listening`
    pub fn local_addr(&self) -> Option<SocketAddr> {
        lock(&self.inner.listener)
            .ok()
            .and_then(|listener| listener.as_ref().map(|l| l.local_addr))
    }

    /// Bind the configured address and start accepting.
    ///
    /// A second call while `Listening` returns the existing address.
    ///
    /// # Errors
    /// `Bind` when the address cannot be bound; the state stays `Idle`.
    #[instrument(skip(self), fields(address = %self.inner.config.address))]
    pub async fn start(&self) -> Result<SocketAddr> {
        let _starting = self.inner.start_lock.lock().await;
        match self.state() {
            ServerState::Listening => {
                if let Some(addr) = self.local_addr() {
                    return Ok(addr);
                }
            }
            ServerState::Stopping => {
                return Err(ProtocolError::InvalidStateTransition {
                    from: "Stopping",
                    to: "Listening",
                })
            }
            ServerState::Idle => {}
        }

        let listener = tcp::bind(&self.inner.config.address).await?;
        let local_addr = listener.local_addr()?;
        let cancel = CancellationToken::new();
        let task = tokio::spawn(self.clone().accept_loop(listener, cancel.clone()));

        *lock(&self.inner.listener)? = Some(Listener {
            local_addr,
            cancel,
            task,
        });
        *lock(&self.inner.state)? = ServerState::Listening;

        info!(address = %local_addr, "Server listening");
        self.log(Level::INFO, "server", &format!("Listening on {local_addr}"));
        Ok(local_addr)
    }

    async fn accept_loop(self, listener: TcpListener, cancel: CancellationToken) {
        loop {
            let accepted = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Accept loop stopped");
                    break;
                }
                accepted = listener.accept() => accepted,
            };

            let (stream, peer) = match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!(error = %e, "Error accepting connection");
                    continue;
                }
            };
            if let Err(e) = stream.set_nodelay(true) {
                debug!(error = %e, "Failed to set TCP_NODELAY");
            }
            match self.on_client_connect(stream) {
                Ok(Admission::Accepted(id)) => {
                    info!(peer = %peer, connection = %id, "Client connected");
                }
                Ok(outcome) => info!(peer = %peer, ?outcome, "Client not admitted"),
                Err(e) => error!(peer = %peer, error = %e, "Failed to admit client"),
            }
        }
    }

    /// Admit a new client stream.
    ///
    /// The lifecycle check, capacity check, id assignment and registration
    /// happen under one registry lock, so concurrent admissions never exceed
    /// the limit and none slips past the drain in [`ServerSession::stop`].
    pub fn on_client_connect<S>(&self, stream: S) -> Result<Admission>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (connection, inbound) = {
            let mut registry = lock(&self.inner.registry)?;
            if *lock(&self.inner.state)? == ServerState::Stopping {
                return Ok(Admission::Refused);
            }
            if registry.connections.len() >= self.inner.config.max_connections {
                drop(registry);
                self.log(Level::INFO, "server", "Server full; connection rejected");
                return Ok(Admission::ServerFull);
            }

            let id = registry.ids.allocate();
            let options = ConnectionOptions::from_config(
                &self.inner.transport,
                self.inner.config.backpressure_limit,
            );
            let (connection, inbound) =
                Connection::spawn(id, stream, options, self.inner.ctx.clone());
            if let Err(e) = connection.mark_connected() {
                connection.shutdown();
                registry.ids.release(id);
                return Err(e);
            }

            let connection = Arc::new(connection);
            registry.connections.insert(
                id,
                Entry {
                    connection: Arc::clone(&connection),
                    peer_version: None,
                },
            );
            (connection, inbound)
        };

        let id = connection.id();
        tokio::spawn(self.clone().dispatch_loop(connection, inbound));

        self.log(Level::INFO, "server", &format!("Client {id} connected"));
        for callback in snapshot(&self.inner.on_connect) {
            callback(id);
        }
        Ok(Admission::Accepted(id))
    }

    async fn dispatch_loop(self, connection: Arc<Connection>, mut inbound: InboundQueue) {
        let id = connection.id();
        while let Some(envelope) = inbound.next().await {
            if let Err(e) = self.route(&connection, envelope) {
                let level = if e.is_frame_local() {
                    Level::WARN
                } else {
                    Level::ERROR
                };
                self.log(level, "dispatch", &format!("Client {id}: {e}"));
            }
        }

        // the id may already belong to a newer client; only tear down our own entry
        let entry = self.take_entry(id, |entry| Arc::ptr_eq(&entry.connection, &connection));
        drop(connection);
        if let Some(entry) = entry {
            self.finish_disconnect(id, entry).await;
        }
    }

    /// Remove, close and release a connection. Unknown ids are a no-op.
    #[instrument(skip(self))]
    pub async fn on_client_disconnect(&self, id: ConnectionId) {
        if let Some(entry) = self.take_entry(id, |_| true) {
            self.finish_disconnect(id, entry).await;
        }
    }

    fn take_entry(&self, id: ConnectionId, owned: impl FnOnce(&Entry) -> bool) -> Option<Entry> {
        let mut registry = match lock(&self.inner.registry) {
            Ok(registry) => registry,
            Err(e) => {
                error!(error = %e, "Registry unavailable");
                return None;
            }
        };
        if !registry.connections.get(&id).is_some_and(owned) {
            return None;
        }
        registry.connections.remove(&id)
    }

    async fn finish_disconnect(&self, id: ConnectionId, entry: Entry) {
        entry.connection.close().await;
        entry.connection.statistics().log_statistics(id.0);

        if let Ok(mut registry) = lock(&self.inner.registry) {
            registry.ids.release(id);
        }
        self.log(Level::INFO, "server", &format!("Client {id} disconnected"));
        for callback in snapshot(&self.inner.on_disconnect) {
            callback(id);
        }
    }

    /// Route one inbound envelope as if it arrived from `id`.
    ///
    /// # Errors
    /// `UnknownConnection` when `id` is not registered.
    pub fn dispatch(&self, id: ConnectionId, envelope: MessageEnvelope) -> Result<()> {
        let connection = self
            .connection(id)
            .ok_or(ProtocolError::UnknownConnection(id.0))?;
        self.route(&connection, envelope)
    }

    fn route(&self, connection: &Arc<Connection>, envelope: MessageEnvelope) -> Result<()> {
        let id = connection.id();
        match envelope.kind() {
            Some(MessageType::ClientPing) => {
                let pong = MessageEnvelope::new(MessageType::ServerPong, envelope.body);
                return connection.send(pong);
            }
            Some(MessageType::ClientDisconnect) => {
                self.log(Level::INFO, "server", &format!("Client {id} requested disconnect"));
                connection.shutdown();
                return Ok(());
            }
            Some(MessageType::ClientConnect) => {
                match ClientHello::from_envelope(&envelope) {
                    Ok(hello) => {
                        self.log(
                            Level::INFO,
                            "server",
                            &format!("Client {id} announced version {}", hello.version),
                        );
                        if let Ok(mut registry) = lock(&self.inner.registry) {
                            if let Some(entry) = registry
                                .connections
                                .get_mut(&id)
                                .filter(|entry| Arc::ptr_eq(&entry.connection, connection))
                            {
                                entry.peer_version = Some(hello.version);
                            }
                        }
                    }
                    Err(e) => {
                        self.log(
                            Level::WARN,
                            "framing",
                            &format!("Bad ClientConnect from {id}: {e}"),
                        );
                    }
                }
                if !self.inner.dispatcher.has_handler(envelope.id()) {
                    return Ok(());
                }
            }
            _ => {}
        }

        let peer = Peer {
            id,
            connection: Arc::clone(connection),
            server: self.clone(),
        };
        match self.inner.dispatcher.dispatch(&peer, &envelope) {
            Ok(()) => Ok(()),
            Err(ProtocolError::UnknownMessageType(raw)) => {
                self.log(
                    Level::WARN,
                    "dispatch",
                    &format!("Unhandled message type {raw} from client {id}"),
                );
                Ok(())
            }
            Err(e) => {
                self.log(
                    Level::WARN,
                    "handler",
                    &format!("Handler for message {} failed: {e}", envelope.id()),
                );
                Ok(())
            }
        }
    }

    /// Register (or replace) the handler for a message kind
    pub fn register_handler<K, F>(&self, kind: K, handler: F) -> Result<()>
    where
        K: MessageKind,
        F: Fn(&Peer, &MessageEnvelope) -> Result<()> + Send + Sync + 'static,
    {
        self.inner.dispatcher.register(kind, handler)
    }

    pub fn on_connect<F>(&self, callback: F) -> Result<()>
    where
        F: Fn(ConnectionId) + Send + Sync + 'static,
    {
        push_callback(&self.inner.on_connect, Arc::new(callback))
    }

    pub fn on_disconnect<F>(&self, callback: F) -> Result<()>
    where
        F: Fn(ConnectionId) + Send + Sync + 'static,
    {
        push_callback(&self.inner.on_disconnect, Arc::new(callback))
    }

    /// Enqueue a copy of `envelope` on every connected client except `exclude`
    pub fn broadcast(
        &self,
        envelope: &MessageEnvelope,
        exclude: Option<ConnectionId>,
    ) -> BroadcastReport {
        let targets: Vec<Arc<Connection>> = match lock(&self.inner.registry) {
            Ok(registry) => registry
                .connections
                .iter()
                .filter(|(id, _)| Some(**id) != exclude)
                .map(|(_, entry)| Arc::clone(&entry.connection))
                .collect(),
            Err(_) => return BroadcastReport::default(),
        };

        let mut report = BroadcastReport::default();
        for connection in targets {
            if !connection.is_open() {
                continue;
            }
            match connection.send(envelope.clone()) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    report.failed += 1;
                    self.log(
                        Level::WARN,
                        "broadcast",
                        &format!("Broadcast to client {} failed: {e}", connection.id()),
                    );
                }
            }
        }
        report
    }

    /// Enqueue `envelope` on a single client
    pub fn send_to(&self, id: ConnectionId, envelope: MessageEnvelope) -> Result<()> {
        self.connection(id)
            .ok_or(ProtocolError::UnknownConnection(id.0))?
            .send(envelope)
    }

    /// Stop accepting, close every connection and return to `Idle`
    #[instrument(skip(self))]
    pub async fn stop(&self) -> Result<()> {
        {
            let mut state = lock(&self.inner.state)?;
            if *state == ServerState::Stopping {
                return Ok(());
            }
            *state = ServerState::Stopping;
        }
        info!("Server stopping");

        let listener = lock(&self.inner.listener)?.take();
        if let Some(listener) = listener {
            listener.cancel.cancel();
            if let Err(e) = listener.task.await {
                warn!(error = %e, "Accept loop ended abnormally");
            }
        }

        let entries: Vec<(ConnectionId, Entry)> =
            lock(&self.inner.registry)?.connections.drain().collect();
        let closing = join_all(entries.iter().map(|(_, entry)| entry.connection.close()));
        if tokio::time::timeout(self.inner.config.shutdown_timeout, closing)
            .await
            .is_err()
        {
            warn!("Shutdown timeout reached; remaining connections dropped");
        }

        {
            let mut registry = lock(&self.inner.registry)?;
            for (id, _) in &entries {
                registry.ids.release(*id);
            }
        }
        let callbacks = snapshot(&self.inner.on_disconnect);
        for (id, _) in &entries {
            for callback in &callbacks {
                callback(*id);
            }
        }

        *lock(&self.inner.state)? = ServerState::Idle;
        self.log(
            Level::INFO,
            "server",
            &format!("Server stopped; {} client(s) disconnected", entries.len()),
        );
        Ok(())
    }

    pub fn connection_count(&self) -> usize {
        lock(&self.inner.registry)
            .map(|registry| registry.connections.len())
            .unwrap_or(0)
    }

    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        let mut ids: Vec<ConnectionId> = lock(&self.inner.registry)
            .map(|registry| registry.connections.keys().copied().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    pub fn statistics(&self, id: ConnectionId) -> Option<StatisticsSnapshot> {
        self.connection(id).map(|connection| connection.snapshot())
    }

    /// Version string the client sent in `ClientConnect`
    pub fn peer_version(&self, id: ConnectionId) -> Option<String> {
        lock(&self.inner.registry)
            .ok()?
            .connections
            .get(&id)?
            .peer_version
            .clone()
    }

    fn connection(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        lock(&self.inner.registry)
            .ok()?
            .connections
            .get(&id)
            .map(|entry| Arc::clone(&entry.connection))
    }

    fn log(&self, level: Level, category: &str, message: &str) {
        self.inner.ctx.log(level, category, message, "server");
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| ProtocolError::Custom(constants::ERR_LOCK_POISONED.to_string()))
}

fn snapshot(callbacks: &RwLock<Vec<Callback>>) -> Vec<Callback> {
    callbacks
        .read()
        .map(|callbacks| callbacks.clone())
        .unwrap_or_default()
}

fn push_callback(callbacks: &RwLock<Vec<Callback>>, callback: Callback) -> Result<()> {
    callbacks
        .write()
        .map_err(|_| ProtocolError::Custom(constants::ERR_LOCK_POISONED.to_string()))?
        .push(callback);
    Ok(())
}
