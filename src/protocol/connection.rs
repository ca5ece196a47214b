//! # Connection
//!
//! One peer's transport session: a reader task decoding frames off the stream,
//! a writer task draining the bounded outbound queue, and the statistics and
//! compression state both tasks share.
//!
//! ## Queues
//! - Outbound: bounded, filled with `try_send` so callers never block
//! - Inbound: bounded, consumed by the owning session in arrival order
//!
//! ## Teardown
//! A connection ends on explicit [`Connection::shutdown`]/[`Connection::close`],
//! on peer EOF, or on a fatal I/O error. Framing and decompression errors only
//! drop the offending frame.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace, Level};

use crate::config::{TransportConfig, COMPRESSION_LEVEL, FLUSH_TIMEOUT, MAX_FRAME_SIZE};
use crate::core::codec::{EnvelopeCodec, Frame};
use crate::core::envelope::MessageEnvelope;
use crate::core::message_type::MessageType;
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::context::SessionContext;
use crate::protocol::state::{AtomicConnectionState, ConnectionId, ConnectionState};
use crate::utils::compression::{CompressionKind, CompressionPipeline};
use crate::utils::metrics::{Statistics, StatisticsSnapshot};

/// Per-connection transport settings
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    pub max_frame_size: usize,
    /// Capacity of both the outbound and the inbound queue
    pub queue_limit: usize,
    pub flush_timeout: Duration,
    pub compression: CompressionKind,
    pub compression_level: i32,
    /// Announce and enable outbound compression as soon as the connection is up
    pub compress_from_start: bool,
}

impl ConnectionOptions {
    pub fn from_config(transport: &TransportConfig, queue_limit: usize) -> Self {
        Self {
            max_frame_size: transport.max_frame_size,
            queue_limit,
            flush_timeout: transport.flush_timeout,
            compression: transport.compression_kind,
            compression_level: transport.compression_level,
            compress_from_start: transport.compression_enabled,
        }
    }
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            max_frame_size: MAX_FRAME_SIZE,
            queue_limit: 256,
            flush_timeout: FLUSH_TIMEOUT,
            compression: CompressionKind::Identity,
            compression_level: COMPRESSION_LEVEL,
            compress_from_start: false,
        }
    }
}

/// Receiving end of a connection, in arrival order
#[derive(Debug)]
pub struct InboundQueue {
    rx: mpsc::Receiver<MessageEnvelope>,
}

impl InboundQueue {
    /// Next envelope if one is already waiting
    pub fn try_next(&mut self) -> Option<MessageEnvelope> {
        self.rx.try_recv().ok()
    }

    /// Wait for the next envelope; `None` once the reader has stopped and the
    /// queue is drained
    pub async fn next(&mut self) -> Option<MessageEnvelope> {
        self.rx.recv().await
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

/// Handle to a live transport session
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    state: Arc<AtomicConnectionState>,
    outbound: mpsc::Sender<MessageEnvelope>,
    /// Orders compression toggles against regular sends
    send_lock: Mutex<()>,
    pipeline: Arc<CompressionPipeline>,
    stats: Arc<Statistics>,
    cancel: CancellationToken,
    writer: Mutex<Option<JoinHandle<()>>>,
    max_frame_size: usize,
    flush_timeout: Duration,
    compress_from_start: bool,
    ctx: SessionContext,
}

impl Connection {
    /// Split `stream` into reader and writer tasks and return the handle plus
    /// its inbound queue. The connection starts in `Connecting`; the owner
    /// calls [`Connection::mark_connected`] once it has admitted it.
    pub fn spawn<S>(
        id: ConnectionId,
        stream: S,
        options: ConnectionOptions,
        ctx: SessionContext,
    ) -> (Connection, InboundQueue)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let queue_limit = options.queue_limit.max(1);
        let (read_half, write_half) = tokio::io::split(stream);
        let (outbound_tx, outbound_rx) = mpsc::channel(queue_limit);
        let (inbound_tx, inbound_rx) = mpsc::channel(queue_limit);

        let state = Arc::new(AtomicConnectionState::new(ConnectionState::Connecting));
        let pipeline = Arc::new(CompressionPipeline::new(
            options
                .compression
                .build_with_level(options.max_frame_size, options.compression_level),
        ));
        let stats = Arc::new(Statistics::new());
        let cancel = CancellationToken::new();

        let reader = ReadLoop {
            id,
            frames: FramedRead::new(read_half, EnvelopeCodec::new(options.max_frame_size)),
            inbound: inbound_tx,
            pipeline: Arc::clone(&pipeline),
            stats: Arc::clone(&stats),
            state: Arc::clone(&state),
            cancel: cancel.clone(),
            ctx: ctx.clone(),
        };
        tokio::spawn(reader.run());

        let writer = WriteLoop {
            id,
            sink: FramedWrite::new(write_half, EnvelopeCodec::new(options.max_frame_size)),
            outbound: outbound_rx,
            stats: Arc::clone(&stats),
            cancel: cancel.clone(),
            flush_timeout: options.flush_timeout,
            ctx: ctx.clone(),
        };
        let writer = tokio::spawn(writer.run());

        let connection = Connection {
            id,
            state,
            outbound: outbound_tx,
            send_lock: Mutex::new(()),
            pipeline,
            stats,
            cancel,
            writer: Mutex::new(Some(writer)),
            max_frame_size: options.max_frame_size,
            flush_timeout: options.flush_timeout,
            compress_from_start: options.compress_from_start,
            ctx,
        };

        (connection, InboundQueue { rx: inbound_rx })
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn state(&self) -> ConnectionState {
        self.state.load()
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Move from `Connecting` to `Connected`, announcing compression if the
    /// options asked for it
    pub fn mark_connected(&self) -> Result<()> {
        self.state.advance(ConnectionState::Connected)?;
        if self.compress_from_start {
            self.set_compression(true)?;
        }
        Ok(())
    }

    /// Compress and enqueue without waiting.
    ///
    /// # Errors
    /// - `ConnectionClosed` when the connection is not `Connected`
    /// - `QueueFull` when the outbound queue is at capacity
    /// - `OversizedFrame` when the (compressed) body exceeds the frame limit
    pub fn send(&self, envelope: MessageEnvelope) -> Result<()> {
        if !self.is_open() {
            return Err(ProtocolError::ConnectionClosed);
        }
        let _guard = self.lock_send()?;
        let envelope = self.pipeline.encode_outbound(envelope)?;
        if envelope.body.len() > self.max_frame_size {
            return Err(ProtocolError::OversizedFrame(envelope.body.len()));
        }
        self.enqueue(envelope)
    }

    /// Announce a compression change to the peer and apply it to later sends
    #[instrument(skip(self), fields(connection = %self.id))]
    pub fn set_compression(&self, enabled: bool) -> Result<()> {
        if !self.is_open() {
            return Err(ProtocolError::ConnectionClosed);
        }
        let control = if enabled {
            MessageType::CompressionEnabled
        } else {
            MessageType::CompressionDisabled
        };

        let _guard = self.lock_send()?;
        self.enqueue(MessageEnvelope::empty(control))?;
        self.pipeline.set_outbound(enabled);
        debug!(codec = self.pipeline.codec().name(), "Outbound compression updated");
        Ok(())
    }

    pub fn compression_enabled(&self) -> bool {
        self.pipeline.outbound_enabled()
    }

    pub fn statistics(&self) -> &Arc<Statistics> {
        &self.stats
    }

    pub fn snapshot(&self) -> StatisticsSnapshot {
        self.stats.snapshot()
    }

    /// Begin teardown without waiting: later sends fail, both tasks stop
    pub fn shutdown(&self) {
        if self.state.advance(ConnectionState::Disconnecting).is_ok() {
            debug!(connection = %self.id, "Connection shutting down");
        }
        self.cancel.cancel();
    }

    /// Shut down and give the writer up to the flush timeout to push out what
    /// was already queued
    #[instrument(skip(self), fields(connection = %self.id))]
    pub async fn close(&self) {
        self.shutdown();

        let writer = match self.writer.lock() {
            Ok(mut slot) => slot.take(),
            Err(_) => None,
        };
        if let Some(mut writer) = writer {
            // the writer bounds its own flush; the margin covers a send stuck mid-write
            let deadline = self.flush_timeout + Duration::from_millis(50);
            if tokio::time::timeout(deadline, &mut writer).await.is_err() {
                writer.abort();
                self.ctx.log(
                    Level::WARN,
                    "transport",
                    &format!("Connection {} flush timed out; pending data discarded", self.id),
                    "connection",
                );
            }
        }

        let _ = self.state.advance(ConnectionState::Closed);
    }

    /// Resolves once teardown has begun, whichever side started it
    pub async fn closed(&self) {
        self.cancel.cancelled().await
    }

    fn lock_send(&self) -> Result<std::sync::MutexGuard<'_, ()>> {
        self.send_lock
            .lock()
            .map_err(|_| ProtocolError::Custom(constants::ERR_LOCK_POISONED.to_string()))
    }

    fn enqueue(&self, envelope: MessageEnvelope) -> Result<()> {
        self.outbound.try_send(envelope).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => ProtocolError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => ProtocolError::ConnectionClosed,
        })
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct ReadLoop<R> {
    id: ConnectionId,
    frames: FramedRead<R, EnvelopeCodec>,
    inbound: mpsc::Sender<MessageEnvelope>,
    pipeline: Arc<CompressionPipeline>,
    stats: Arc<Statistics>,
    state: Arc<AtomicConnectionState>,
    cancel: CancellationToken,
    ctx: SessionContext,
}

impl<R> ReadLoop<R>
where
    R: AsyncRead + Unpin,
{
    async fn run(mut self) {
        loop {
            let next = tokio::select! {
                _ = self.cancel.cancelled() => break,
                next = self.frames.next() => next,
            };

            match next {
                Some(Ok(Frame::Envelope(envelope))) => {
                    self.stats.record_received(envelope.wire_len() as u64);
                    if let Some(envelope) = self.accept(envelope) {
                        tokio::select! {
                            _ = self.cancel.cancelled() => break,
                            sent = self.inbound.send(envelope) => {
                                if sent.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                }
                Some(Ok(Frame::Dropped(err))) => {
                    self.stats.record_dropped();
                    self.log(Level::WARN, "framing", &format!("Dropped frame: {err}"));
                }
                Some(Err(err)) => {
                    self.log(Level::ERROR, "transport", &format!("Read failed: {err}"));
                    break;
                }
                None => {
                    debug!(connection = %self.id, "Peer closed the stream");
                    break;
                }
            }
        }

        if self.state.advance(ConnectionState::Disconnecting).is_ok() {
            self.log(Level::INFO, "transport", "Connection lost");
        }
        self.cancel.cancel();
    }

    /// Apply compression control and decompression; `None` when nothing
    /// should reach the inbound queue
    fn accept(&self, envelope: MessageEnvelope) -> Option<MessageEnvelope> {
        match envelope.kind() {
            Some(MessageType::CompressionEnabled) => {
                self.pipeline.set_inbound(true);
                trace!(connection = %self.id, "Peer enabled compression");
                return None;
            }
            Some(MessageType::CompressionDisabled) => {
                self.pipeline.set_inbound(false);
                trace!(connection = %self.id, "Peer disabled compression");
                return None;
            }
            _ => {}
        }

        let id = envelope.id();
        match self.pipeline.decode_inbound(envelope) {
            Ok(envelope) => Some(envelope),
            Err(err) => {
                self.stats.record_dropped();
                self.log(
                    Level::WARN,
                    "compression",
                    &format!("Dropped message {id}: {err}"),
                );
                None
            }
        }
    }

    fn log(&self, level: Level, category: &str, message: &str) {
        self.ctx.log(
            level,
            category,
            &format!("[connection {}] {message}", self.id),
            "connection",
        );
    }
}

struct WriteLoop<W> {
    id: ConnectionId,
    sink: FramedWrite<W, EnvelopeCodec>,
    outbound: mpsc::Receiver<MessageEnvelope>,
    stats: Arc<Statistics>,
    cancel: CancellationToken,
    flush_timeout: Duration,
    ctx: SessionContext,
}

impl<W> WriteLoop<W>
where
    W: AsyncWrite + Unpin,
{
    async fn run(mut self) {
        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                next = self.outbound.recv() => next,
            };
            let Some(envelope) = next else { break };
            if let Err(err) = self.write(envelope).await {
                self.ctx.log(
                    Level::ERROR,
                    "transport",
                    &format!("[connection {}] Write failed: {err}", self.id),
                    "connection",
                );
                self.cancel.cancel();
                return;
            }
        }

        // flush what was queued before teardown, then release the stream
        self.outbound.close();
        let flush_timeout = self.flush_timeout;
        let drained = tokio::time::timeout(flush_timeout, async {
            while let Some(envelope) = self.outbound.recv().await {
                self.write(envelope).await?;
            }
            self.sink.get_mut().shutdown().await?;
            Ok::<_, ProtocolError>(())
        })
        .await;

        match drained {
            Ok(Ok(())) => debug!(connection = %self.id, "Writer flushed and closed"),
            Ok(Err(err)) => debug!(connection = %self.id, error = %err, "Flush aborted"),
            Err(_) => debug!(connection = %self.id, "Flush timed out"),
        }
    }

    async fn write(&mut self, envelope: MessageEnvelope) -> Result<()> {
        let len = envelope.wire_len() as u64;
        self.sink.send(envelope).await?;
        self.stats.record_sent(len);
        Ok(())
    }
}
