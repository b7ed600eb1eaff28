//! Metric extraction from classified GC events.
//!
//! Pure functions: one event in, an ordered list of named numbers out.

use crate::classifier::{Collection, GcEvent, PauseTimes};

/// Seconds assumed for a pause the JVM reported as 0.00.
pub const SUB_MEASURABLE_SECS: f64 = 0.05;

/// Measurement unit attached to a reported metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Unit {
    Ratio,
    KilobytesPerSec,
    Seconds,
    #[default]
    Items,
}

impl Unit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Unit::Ratio => "ratio",
            Unit::KilobytesPerSec => "KB/s",
            Unit::Seconds => "seconds",
            Unit::Items => "items",
        }
    }
}

/// A named value ready to hand to a sink.
#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    pub name: &'static str,
    pub value: f64,
    pub unit: Unit,
}

impl Metric {
    fn new(name: &'static str, value: f64, unit: Unit) -> Self {
        Self { name, value, unit }
    }
}

/// Metric names per collection kind, in emission order.
struct CollectionNames {
    survival_ratio: &'static str,
    kbytes_per_sec: &'static str,
    user_sec: &'static str,
    real_sec: &'static str,
}

const MINOR: CollectionNames = CollectionNames {
    survival_ratio: "minor.survivalRatio",
    kbytes_per_sec: "minor.kbytesPerSec",
    user_sec: "minor.userSec",
    real_sec: "minor.realSec",
};

const FULL: CollectionNames = CollectionNames {
    survival_ratio: "full.survivalRatio",
    kbytes_per_sec: "full.kbytesPerSec",
    user_sec: "full.userSec",
    real_sec: "full.realSec",
};

const PROMO_FAIL_REAL: &str = "promoFail.realSec";
const CONCUR_USER: &str = "major.concur.userSec";
const CONCUR_REAL: &str = "major.concur.realSec";
const BLOCK_USER: &str = "major.block.userSec";
const BLOCK_REAL: &str = "major.block.realSec";

/// Derive the metrics for one event. Ignorable and unrecognized events
/// produce nothing.
pub fn extract(event: &GcEvent) -> Vec<Metric> {
    match event {
        GcEvent::MinorCollection(c) => collection_metrics(&MINOR, c),
        GcEvent::FullCollection(c) => collection_metrics(&FULL, c),
        // userSec for promotion failures duplicates the following full GC.
        GcEvent::PromotionFailure(t) => {
            vec![Metric::new(PROMO_FAIL_REAL, t.real_secs, Unit::Seconds)]
        }
        GcEvent::ConcurrentPhase(t) => phase_metrics(CONCUR_USER, CONCUR_REAL, t),
        GcEvent::BlockingPhase(t) => phase_metrics(BLOCK_USER, BLOCK_REAL, t),
        GcEvent::IgnorableStartup | GcEvent::IgnorableNotice | GcEvent::Unrecognized => {
            Vec::new()
        }
    }
}

/// Every metric name `extract` can produce, each at zero. Sent while the
/// log is quiet so the sink keeps seeing the series.
pub fn known_metrics() -> Vec<Metric> {
    let mut metrics = Vec::with_capacity(13);
    for names in [&MINOR, &FULL] {
        metrics.push(Metric::new(names.survival_ratio, 0.0, Unit::Ratio));
        metrics.push(Metric::new(names.kbytes_per_sec, 0.0, Unit::KilobytesPerSec));
        metrics.push(Metric::new(names.user_sec, 0.0, Unit::Seconds));
        metrics.push(Metric::new(names.real_sec, 0.0, Unit::Seconds));
    }
    metrics.push(Metric::new(PROMO_FAIL_REAL, 0.0, Unit::Seconds));
    metrics.extend(phase_metrics(CONCUR_USER, CONCUR_REAL, &ZERO_TIMES));
    metrics.extend(phase_metrics(BLOCK_USER, BLOCK_REAL, &ZERO_TIMES));
    metrics
}

const ZERO_TIMES: PauseTimes = PauseTimes {
    user_secs: 0.0,
    real_secs: 0.0,
};

/// Collection throughput numbers that also serve as the debug echo.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollectionRates {
    pub survival_ratio: f64,
    pub user_secs: f64,
    pub real_secs: f64,
    pub kbytes_per_user_sec: f64,
    pub kbytes_per_real_sec: f64,
}

impl CollectionRates {
    pub fn of(c: &Collection) -> Self {
        let delta_kb = c.before_kb as f64 - c.after_kb as f64;
        let survival_ratio = if c.before_kb == 0 {
            0.0
        } else {
            c.after_kb as f64 / c.before_kb as f64
        };
        let user_secs = denominator(c.times.user_secs);
        let real_secs = denominator(c.times.real_secs);

        Self {
            survival_ratio,
            user_secs,
            real_secs,
            kbytes_per_user_sec: delta_kb / user_secs,
            kbytes_per_real_sec: delta_kb / real_secs,
        }
    }
}

/// A time of exactly zero is below the log's resolution.
fn denominator(secs: f64) -> f64 {
    if secs == 0.0 { SUB_MEASURABLE_SECS } else { secs }
}

fn collection_metrics(names: &CollectionNames, c: &Collection) -> Vec<Metric> {
    let rates = CollectionRates::of(c);
    vec![
        Metric::new(names.survival_ratio, rates.survival_ratio, Unit::Ratio),
        Metric::new(
            names.kbytes_per_sec,
            rates.kbytes_per_real_sec,
            Unit::KilobytesPerSec,
        ),
        Metric::new(names.user_sec, rates.user_secs, Unit::Seconds),
        Metric::new(names.real_sec, rates.real_secs, Unit::Seconds),
    ]
}

fn phase_metrics(user: &'static str, real: &'static str, t: &PauseTimes) -> Vec<Metric> {
    vec![
        Metric::new(user, t.user_secs, Unit::Seconds),
        Metric::new(real, t.real_secs, Unit::Seconds),
    ]
}
