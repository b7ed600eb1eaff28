//! The tailing worker: lines from the [`FileTailer`] go through the
//! classifier and extractor and end up at the [`ReportSink`].
//!
//! One sequential loop, no shared state. While the log is quiet, each wait
//! cycle publishes every known metric at zero so the monitoring side can
//! tell an idle JVM from a dead agent.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{Level, debug, info, trace};

use crate::classifier::{EventKind, GcEvent, classify};
use crate::config::GcStatsConfig;
use crate::error::TailError;
use crate::extractor::{CollectionRates, extract, known_metrics};
use crate::sink::ReportSink;
use crate::tailer::FileTailer;

/// Counters for one pipeline run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Lines classified.
    pub lines: u64,
    /// Lines that produced metrics.
    pub events: u64,
    /// Known-benign lines.
    pub ignored: u64,
    /// Lines sent to the unmatched channel.
    pub unmatched: u64,
    /// Metrics reported from events (heartbeats excluded).
    pub metrics: u64,
    /// Zero heartbeats sent.
    pub heartbeats: u64,
}

/// Drives lines through classification and extraction into a sink.
pub struct GcStatsPipeline<S: ReportSink> {
    sink: S,
    debug: bool,
    stats: PipelineStats,
}

impl<S: ReportSink> GcStatsPipeline<S> {
    pub fn new(config: &GcStatsConfig, sink: S) -> Self {
        Self {
            sink,
            debug: config.debug,
            stats: PipelineStats::default(),
        }
    }

    /// Process one line. Blank lines match no rule and go to the unmatched
    /// channel like any other unrecognized line.
    pub fn ingest(&mut self, line: &str) -> EventKind {
        let line = line.strip_suffix('\r').unwrap_or(line);
        self.stats.lines += 1;

        let event = classify(line);
        let kind = event.kind();
        match kind {
            EventKind::Unrecognized => {
                self.stats.unmatched += 1;
                self.sink.notify_unmatched(line);
            }
            EventKind::IgnorableStartup | EventKind::IgnorableNotice => {
                self.stats.ignored += 1;
                if self.debug {
                    info!(kind = kind.as_str(), line, "ignore");
                } else {
                    trace!(kind = kind.as_str(), line, "ignore");
                }
            }
            _ => {
                self.stats.events += 1;
                self.echo(&event);
                for metric in extract(&event) {
                    self.sink.report(metric.name, metric.value, metric.unit);
                    self.stats.metrics += 1;
                }
            }
        }

        kind
    }

    /// Report every known metric at zero.
    pub fn heartbeat(&mut self) {
        for metric in known_metrics() {
            self.sink.report(metric.name, metric.value, metric.unit);
        }
        self.stats.heartbeats += 1;
        debug!(heartbeats = self.stats.heartbeats, "log quiet, sent zero heartbeat");
    }

    /// Follow `tailer` until `running` is cleared or the log becomes
    /// permanently unavailable.
    pub fn run(&mut self, tailer: &mut FileTailer, running: &AtomicBool) -> Result<(), TailError> {
        info!(
            path = %tailer.path().display(),
            offset = tailer.position().offset,
            "tailing gc log"
        );

        while running.load(Ordering::SeqCst) {
            let lines = tailer.next_lines(running, || self.heartbeat())?;
            for line in &lines {
                self.ingest(line);
            }
        }

        Ok(())
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Per-event numbers in a fixed-width console layout.
    fn echo(&self, event: &GcEvent) {
        if !self.debug && !tracing::enabled!(Level::DEBUG) {
            return;
        }

        let kind = event.kind().as_str();
        let text = match event {
            GcEvent::MinorCollection(c) | GcEvent::FullCollection(c) => {
                let r = CollectionRates::of(c);
                format!(
                    "{:<15} user {:5.2} real {:5.2} ratio {:1.3} kPerUserSec {:10.0} kPerRealSec {:10.0}",
                    kind,
                    r.user_secs,
                    r.real_secs,
                    r.survival_ratio,
                    r.kbytes_per_user_sec,
                    r.kbytes_per_real_sec
                )
            }
            GcEvent::PromotionFailure(t) | GcEvent::ConcurrentPhase(t) | GcEvent::BlockingPhase(t) => {
                format!("{:<15} user {:5.2} real {:5.2}", kind, t.user_secs, t.real_secs)
            }
            _ => return,
        };

        if self.debug {
            info!("{}", text);
        } else {
            debug!("{}", text);
        }
    }
}
