//! jvm-gc-stats - JVM garbage collection log tailer and metric reporter.
//!
//! Follows a live, growing GC log, recognizes the known collector line
//! shapes and forwards derived numbers to a monitoring sink.
//!
//! Provides:
//! - `config` - immutable runtime configuration
//! - `tailer` - rotation-aware incremental file reader
//! - `classifier` - ordered GC log line rules
//! - `extractor` - numeric metrics derived from a classified event
//! - `sink` - metric destinations (gmetric, tracing log, in-memory)
//! - `pipeline` - the single worker loop wiring it all together

pub mod classifier;
pub mod config;
pub mod error;
pub mod extractor;
pub mod pipeline;
pub mod sink;
pub mod tailer;

pub use classifier::{EventKind, GcEvent, classify};
pub use config::GcStatsConfig;
pub use error::TailError;
pub use extractor::{Metric, Unit, extract, known_metrics};
pub use pipeline::{GcStatsPipeline, PipelineStats};
pub use sink::{GmetricSink, LogSink, MemorySink, ReportSink};
pub use tailer::{FileTailer, LineBuffer, LogPosition};
