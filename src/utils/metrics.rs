//! Per-connection statistics.
//!
//! Every [`Connection`](crate::protocol::connection::Connection) owns one
//! [`Statistics`] block. Counters are atomics so the reader and writer tasks can
//! update them without locking; only the owning connection (and the client
//! session for ping and loss) can mutate them, everyone else reads a
//! [`StatisticsSnapshot`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Rolling counters for one connection
#[derive(Debug)]
pub struct Statistics {
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    packets_sent: AtomicU64,
    packets_received: AtomicU64,
    /// Frames discarded for framing or decompression errors
    frames_dropped: AtomicU64,
    ping_millis: AtomicU64,
    /// `f64` stored as raw bits
    packet_loss_bits: AtomicU64,
    start_time: Instant,
}

impl Statistics {
    pub fn new() -> Self {
        Self {
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            packets_sent: AtomicU64::new(0),
            packets_received: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
            ping_millis: AtomicU64::new(0),
            packet_loss_bits: AtomicU64::new(0f64.to_bits()),
            start_time: Instant::now(),
        }
    }

    pub(crate) fn record_sent(&self, byte_count: u64) {
        self.packets_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(byte_count, Ordering::Relaxed);
    }

    pub(crate) fn record_received(&self, byte_count: u64) {
        self.packets_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(byte_count, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn set_ping(&self, millis: u64) {
        self.ping_millis.store(millis, Ordering::Relaxed);
    }

    /// Recompute the loss estimate from the current packet counters
    pub(crate) fn update_packet_loss(&self) -> f64 {
        let loss = packet_loss_percent(
            self.packets_sent.load(Ordering::Relaxed),
            self.packets_received.load(Ordering::Relaxed),
        );
        self.packet_loss_bits.store(loss.to_bits(), Ordering::Relaxed);
        loss
    }

    pub fn ping_millis(&self) -> u64 {
        self.ping_millis.load(Ordering::Relaxed)
    }

    pub fn packet_loss(&self) -> f64 {
        f64::from_bits(self.packet_loss_bits.load(Ordering::Relaxed))
    }

    pub fn snapshot(&self) -> StatisticsSnapshot {
        StatisticsSnapshot {
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            packets_received: self.packets_received.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            ping_millis: self.ping_millis(),
            packet_loss_percent: self.packet_loss(),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    /// Emit the current counters as one structured event
    pub fn log_statistics(&self, connection: u32) {
        let snapshot = self.snapshot();
        info!(
            connection,
            bytes_sent = snapshot.bytes_sent,
            bytes_received = snapshot.bytes_received,
            packets_sent = snapshot.packets_sent,
            packets_received = snapshot.packets_received,
            frames_dropped = snapshot.frames_dropped,
            ping_millis = snapshot.ping_millis,
            packet_loss_percent = snapshot.packet_loss_percent,
            uptime_seconds = snapshot.uptime_seconds,
            "Connection statistics snapshot"
        );
    }
}

impl Default for Statistics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of statistics at a point in time
#[derive(Debug, Clone, PartialEq)]
pub struct StatisticsSnapshot {
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub packets_sent: u64,
    pub packets_received: u64,
    pub frames_dropped: u64,
    pub ping_millis: u64,
    pub packet_loss_percent: f64,
    pub uptime_seconds: u64,
}

/// `(1 - received / sent) * 100`, clamped to `[0, 100]`; zero when nothing was sent
pub fn packet_loss_percent(packets_sent: u64, packets_received: u64) -> f64 {
    if packets_sent == 0 || packets_received >= packets_sent {
        return 0.0;
    }
    let missing = (packets_sent - packets_received) as f64;
    (missing * 100.0 / packets_sent as f64).clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loss_formula() {
        assert_eq!(packet_loss_percent(10, 7), 30.0);
        assert_eq!(packet_loss_percent(0, 0), 0.0);
        assert_eq!(packet_loss_percent(0, 5), 0.0);
        assert_eq!(packet_loss_percent(4, 9), 0.0);
        assert_eq!(packet_loss_percent(8, 0), 100.0);
    }

    #[test]
    fn counters_feed_loss_estimate() {
        let stats = Statistics::new();
        for _ in 0..10 {
            stats.record_sent(16);
        }
        for _ in 0..7 {
            stats.record_received(24);
        }
        assert_eq!(stats.update_packet_loss(), 30.0);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.packets_sent, 10);
        assert_eq!(snapshot.packets_received, 7);
        assert_eq!(snapshot.bytes_sent, 160);
        assert_eq!(snapshot.bytes_received, 168);
        assert_eq!(snapshot.packet_loss_percent, 30.0);
    }

    #[test]
    fn ping_and_drops() {
        let stats = Statistics::default();
        stats.set_ping(42);
        stats.record_dropped();
        stats.record_dropped();
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.ping_millis, 42);
        assert_eq!(snapshot.frames_dropped, 2);
        assert_eq!(snapshot.packet_loss_percent, 0.0);
    }
}
