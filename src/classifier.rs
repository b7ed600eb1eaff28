//! GC log line classifier.
//!
//! Maps one line of CMS/ParNew collector output to a [`GcEvent`]. Rules are
//! tried in a fixed order and the first match wins; some patterns overlap
//! textually (a promotion failure line also mentions ParNew), so the order
//! is part of the contract.

use std::sync::LazyLock;

use regex::{Captures, Regex};

/// `user=` and `real=` timings at the end of a collector line. Either `.`
/// or `,` may separate decimals depending on the JVM's locale.
const USER_REAL: &str = r".*?user=(\d+[.,]\d+).*?real=(\d+[.,]\d+)";

/// CPU and wall-clock seconds spent in one collector pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PauseTimes {
    pub user_secs: f64,
    pub real_secs: f64,
}

/// A generation collected from `before_kb` down to `after_kb`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Collection {
    pub before_kb: u64,
    pub after_kb: u64,
    pub times: PauseTimes,
}

/// What a single GC log line says.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GcEvent {
    /// Young generation (ParNew) collection.
    MinorCollection(Collection),
    /// Full heap (CMS) collection.
    FullCollection(Collection),
    /// Object promotion to the old generation failed.
    PromotionFailure(PauseTimes),
    /// A CMS phase running alongside the application.
    ConcurrentPhase(PauseTimes),
    /// CMS initial mark or remark, both stop the world.
    BlockingPhase(PauseTimes),
    /// Heap layout banner printed at JVM startup/exit.
    IgnorableStartup,
    /// Informational line with nothing to measure.
    IgnorableNotice,
    /// No rule matched.
    Unrecognized,
}

/// Fieldless tag of a [`GcEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    MinorCollection,
    FullCollection,
    PromotionFailure,
    ConcurrentPhase,
    BlockingPhase,
    IgnorableStartup,
    IgnorableNotice,
    Unrecognized,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::MinorCollection => "minor",
            EventKind::FullCollection => "full",
            EventKind::PromotionFailure => "promoFail",
            EventKind::ConcurrentPhase => "major concur",
            EventKind::BlockingPhase => "major block",
            EventKind::IgnorableStartup => "startup",
            EventKind::IgnorableNotice => "notice",
            EventKind::Unrecognized => "unmatched",
        }
    }

    /// True for kinds that only exist to silence the unmatched channel.
    pub fn is_ignorable(&self) -> bool {
        matches!(self, EventKind::IgnorableStartup | EventKind::IgnorableNotice)
    }
}

impl GcEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            GcEvent::MinorCollection(_) => EventKind::MinorCollection,
            GcEvent::FullCollection(_) => EventKind::FullCollection,
            GcEvent::PromotionFailure(_) => EventKind::PromotionFailure,
            GcEvent::ConcurrentPhase(_) => EventKind::ConcurrentPhase,
            GcEvent::BlockingPhase(_) => EventKind::BlockingPhase,
            GcEvent::IgnorableStartup => EventKind::IgnorableStartup,
            GcEvent::IgnorableNotice => EventKind::IgnorableNotice,
            GcEvent::Unrecognized => EventKind::Unrecognized,
        }
    }
}

/// One entry of the ordered rule list: a pattern, optional exclusion, and
/// how to turn the captures into an event.
pub struct Rule {
    pub kind: EventKind,
    pattern: Regex,
    exclude: Option<Regex>,
    build: fn(&Captures<'_>) -> Option<GcEvent>,
}

impl Rule {
    fn new(kind: EventKind, pattern: &str, build: fn(&Captures<'_>) -> Option<GcEvent>) -> Self {
        Self {
            kind,
            pattern: Regex::new(pattern).unwrap(),
            exclude: None,
            build,
        }
    }

    fn excluding(mut self, pattern: &str) -> Self {
        self.exclude = Some(Regex::new(pattern).unwrap());
        self
    }

    /// Apply this rule alone. `None` means the line is not this rule's.
    pub fn apply(&self, line: &str) -> Option<GcEvent> {
        if self.exclude.as_ref().is_some_and(|re| re.is_match(line)) {
            return None;
        }
        let caps = self.pattern.captures(line)?;
        (self.build)(&caps)
    }
}

/// Collector rules in match order.
static RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    vec![
        Rule::new(
            EventKind::MinorCollection,
            &format!(r"ParNew: (\d+)K->(\d+)K?{USER_REAL}"),
            |c| collection(c).map(GcEvent::MinorCollection),
        ),
        Rule::new(
            EventKind::FullCollection,
            &format!(r"Full GC[^\[]*\[CMS: (\d+)K->(\d+)K?{USER_REAL}"),
            |c| collection(c).map(GcEvent::FullCollection),
        ),
        Rule::new(
            EventKind::PromotionFailure,
            &format!(r"promotion failed{USER_REAL}"),
            |c| times(c, 1).map(GcEvent::PromotionFailure),
        ),
        Rule::new(
            EventKind::ConcurrentPhase,
            &format!(r"CMS-concurrent{USER_REAL}"),
            |c| times(c, 1).map(GcEvent::ConcurrentPhase),
        )
        .excluding(r"CMS-concurrent[\w-]*-start\]"),
        Rule::new(
            EventKind::BlockingPhase,
            &format!(r"CMS-(?:initial-|re)mark{USER_REAL}"),
            |c| times(c, 1).map(GcEvent::BlockingPhase),
        ),
        Rule::new(
            EventKind::IgnorableStartup,
            r"^Heap$|^ par new generation|^  eden space|^  from space|^  to   space|^ concurrent mark-sweep generation|^ concurrent-mark-sweep perm",
            |_| Some(GcEvent::IgnorableStartup),
        ),
        Rule::new(
            EventKind::IgnorableNotice,
            r"\[CMS-concurrent.*start\]|Trying a full collection because scavenge failed",
            |_| Some(GcEvent::IgnorableNotice),
        ),
    ]
});

/// The ordered rule list, for inspecting rules one at a time.
pub fn rules() -> &'static [Rule] {
    &RULES
}

/// Classify a single line (without its newline).
///
/// A line whose pattern matches but whose numbers do not parse falls
/// through to later rules and ends up `Unrecognized`.
pub fn classify(line: &str) -> GcEvent {
    RULES
        .iter()
        .find_map(|rule| rule.apply(line))
        .unwrap_or(GcEvent::Unrecognized)
}

fn collection(caps: &Captures<'_>) -> Option<Collection> {
    Some(Collection {
        before_kb: caps[1].parse().ok()?,
        after_kb: caps[2].parse().ok()?,
        times: times(caps, 3)?,
    })
}

/// User and real seconds from capture groups `first` and `first + 1`.
fn times(caps: &Captures<'_>, first: usize) -> Option<PauseTimes> {
    Some(PauseTimes {
        user_secs: seconds(&caps[first])?,
        real_secs: seconds(&caps[first + 1])?,
    })
}

fn seconds(raw: &str) -> Option<f64> {
    raw.replace(',', ".").parse().ok()
}
