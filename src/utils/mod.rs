//! # Utility Modules
//!
//! Supporting utilities for compression, statistics, logging, and timing.
//!
//! ## Components
//! - **Compression**: Identity, LZ4 and Zstd strategies behind one trait, plus
//!   the per-connection pipeline
//! - **Metrics**: Per-connection atomic statistics
//! - **Logging**: Subscriber setup and the injectable logging service
//! - **Time**: Clocks for heartbeat bookkeeping
//!
//! ## Limits
//! - Decompressed output is bounded by the maximum frame size

pub mod compression;
pub mod logging;
pub mod metrics;
pub mod time;

pub use compression::{CompressionKind, CompressionPipeline, Compressor};
pub use logging::{CapturingSink, LogSink, TracingSink};
pub use metrics::{Statistics, StatisticsSnapshot};
pub use time::{Clock, ManualClock, SystemClock};
