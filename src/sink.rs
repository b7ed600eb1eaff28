//! Metric destinations.
//!
//! The pipeline hands every derived metric and every unmatched line to a
//! [`ReportSink`]. Delivery (and its failures) is the sink's business; the
//! pipeline never retries or waits on it beyond the call itself.

use std::ffi::OsString;
use std::process::{Command, Stdio};

use tracing::{info, warn};

use crate::config::GcStatsConfig;
use crate::extractor::Unit;

/// Receives derived metrics and unmatched lines.
pub trait ReportSink {
    /// Publish one metric. `name` is unprefixed, e.g. `minor.realSec`.
    fn report(&mut self, name: &str, value: f64, unit: Unit);

    /// A line no rule recognized. Logged by default.
    fn notify_unmatched(&mut self, line: &str) {
        warn!(line, "UNMATCHED gc log line");
    }
}

impl<S: ReportSink + ?Sized> ReportSink for Box<S> {
    fn report(&mut self, name: &str, value: f64, unit: Unit) {
        (**self).report(name, value, unit)
    }

    fn notify_unmatched(&mut self, line: &str) {
        (**self).notify_unmatched(line)
    }
}

/// Publishes each metric with Ganglia's `gmetric` command line tool.
pub struct GmetricSink {
    program: OsString,
    prefix: String,
}

impl GmetricSink {
    pub fn new(config: &GcStatsConfig, program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            prefix: config.metric_prefix.clone(),
        }
    }

    /// Arguments passed to gmetric for one metric.
    pub fn args(&self, name: &str, value: f64, unit: Unit) -> Vec<String> {
        vec![
            "-tfloat".to_string(),
            format!("-n{}{}", self.prefix, name),
            format!("-v{}", value),
            format!("-u{}", unit.as_str()),
        ]
    }
}

impl ReportSink for GmetricSink {
    fn report(&mut self, name: &str, value: f64, unit: Unit) {
        let status = Command::new(&self.program)
            .args(self.args(name, value, unit))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match status {
            Ok(s) if s.success() => {}
            Ok(s) => warn!(metric = name, status = %s, "gmetric exited with failure"),
            Err(e) => warn!(metric = name, error = %e, "failed to run gmetric"),
        }
    }
}

/// Writes each metric to the tracing log. Used when publishing is off.
pub struct LogSink {
    prefix: String,
}

impl LogSink {
    pub fn new(config: &GcStatsConfig) -> Self {
        Self {
            prefix: config.metric_prefix.clone(),
        }
    }
}

impl ReportSink for LogSink {
    fn report(&mut self, name: &str, value: f64, unit: Unit) {
        let metric = format!("{}{}", self.prefix, name);
        info!(
            metric = %metric,
            value,
            unit = unit.as_str(),
            "report"
        );
    }
}

/// Keeps everything it receives in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    pub reports: Vec<(String, f64, Unit)>,
    pub unmatched: Vec<String>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recent value reported under `name`.
    pub fn last(&self, name: &str) -> Option<f64> {
        self.reports
            .iter()
            .rev()
            .find(|(n, _, _)| n == name)
            .map(|(_, v, _)| *v)
    }

    /// Names in report order.
    pub fn names(&self) -> Vec<&str> {
        self.reports.iter().map(|(n, _, _)| n.as_str()).collect()
    }
}

impl ReportSink for MemorySink {
    fn report(&mut self, name: &str, value: f64, unit: Unit) {
        self.reports.push((name.to_string(), value, unit));
    }

    fn notify_unmatched(&mut self, line: &str) {
        self.unmatched.push(line.to_string());
    }
}
