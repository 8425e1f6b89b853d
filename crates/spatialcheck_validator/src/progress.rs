//! Progress delivery, percent arithmetic and throttling.

use spatialcheck_core::{ProgressEvent, StageId};
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedSender;

/// Receives progress events.
///
/// Implemented for any `Fn(ProgressEvent)` closure.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

impl<F> ProgressSink for F
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    fn emit(&self, event: ProgressEvent) {
        self(event)
    }
}

/// A sink that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl ProgressSink for NoopSink {
    fn emit(&self, _event: ProgressEvent) {}
}

/// A sink forwarding events into an unbounded channel.
///
/// Events sent after the receiver is dropped are discarded.
pub fn channel_sink(tx: UnboundedSender<ProgressEvent>) -> impl ProgressSink {
    move |event: ProgressEvent| {
        let _ = tx.send(event);
    }
}

/// Percent complete of a rule, rounded and clamped to 0..=100.
///
/// With nothing to process the rule is either done (100) or not (0).
pub fn rule_percent(processed: u64, total: u64, completed: bool) -> u8 {
    if total == 0 {
        return if completed { 100 } else { 0 };
    }
    let pct = (processed as f64 * 100.0 / total as f64).round();
    pct.clamp(0.0, 100.0) as u8
}

/// Limits how often non-terminal events pass.
#[derive(Debug, Clone)]
pub struct ProgressThrottle {
    interval: Duration,
    last_emit: Option<Instant>,
}

impl ProgressThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_emit: None,
        }
    }

    /// Decides whether an event may be emitted now.
    pub fn should_emit(&mut self, terminal: bool) -> bool {
        self.should_emit_at(Instant::now(), terminal)
    }

    /// Decides whether an event may be emitted at `now`.
    ///
    /// Terminal events always pass. The first non-terminal event passes;
    /// later ones pass once `interval` has elapsed since the last emission.
    pub fn should_emit_at(&mut self, now: Instant, terminal: bool) -> bool {
        let due = self
            .last_emit
            .is_none_or(|last| now.saturating_duration_since(last) >= self.interval);
        if terminal || due {
            self.last_emit = Some(now);
            true
        } else {
            false
        }
    }
}

/// Snapshot of a rule's progress handed to the relation stage.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleProgress {
    pub rule_id: String,
    pub case_type: String,
    pub processed: u64,
    pub total: u64,
    pub percent: u8,
    pub completed: bool,
    pub successful: bool,
    /// Result counters at the time of the report
    pub error_count: usize,
    pub warning_count: usize,
}

/// Per-invocation progress state of one rule.
///
/// Holds its own throttle, so concurrent rules never share timing state.
pub struct RuleProgressReporter<'a> {
    rule_id: String,
    case_type: String,
    throttle: ProgressThrottle,
    last_processed: u64,
    last_total: u64,
    finished: bool,
    counts: (usize, usize),
    forward: &'a (dyn Fn(RuleProgress) + Send + Sync),
}

impl<'a> RuleProgressReporter<'a> {
    pub fn new(
        rule_id: impl Into<String>,
        case_type: impl Into<String>,
        interval: Duration,
        forward: &'a (dyn Fn(RuleProgress) + Send + Sync),
    ) -> Self {
        Self {
            rule_id: rule_id.into(),
            case_type: case_type.into(),
            throttle: ProgressThrottle::new(interval),
            last_processed: 0,
            last_total: 0,
            finished: false,
            counts: (0, 0),
            forward,
        }
    }

    /// Reports progress; returns true if an event was forwarded.
    ///
    /// `processed` never goes backwards in forwarded events, and nothing is
    /// forwarded after the terminal event.
    pub fn report(&mut self, processed: u64, total: u64, completed: bool, successful: bool) -> bool {
        if self.finished || !self.throttle.should_emit(completed) {
            return false;
        }
        let processed = processed.max(self.last_processed);
        self.last_processed = processed;
        self.last_total = total;
        self.finished = completed;
        (self.forward)(RuleProgress {
            rule_id: self.rule_id.clone(),
            case_type: self.case_type.clone(),
            processed,
            total,
            percent: rule_percent(processed, total, completed),
            completed,
            successful,
            error_count: self.counts.0,
            warning_count: self.counts.1,
        });
        true
    }

    /// Sends the terminal event at the last reported position, unless the
    /// rule already sent one.
    pub fn finish(&mut self, successful: bool) -> bool {
        self.report(self.last_processed, self.last_total, true, successful)
    }

    /// Updates the result counters carried by later reports.
    pub fn set_counts(&mut self, error_count: usize, warning_count: usize) {
        self.counts = (error_count, warning_count);
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

/// Overall run percent for a stage and its progress.
pub fn overall_percent(stage: StageId, stage_progress: f64) -> f64 {
    let raw = (stage.number() as f64 * 100.0 + stage_progress.clamp(0.0, 100.0))
        / StageId::COUNT as f64;
    raw.clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_rule_percent() {
        assert_eq!(rule_percent(0, 0, false), 0);
        assert_eq!(rule_percent(0, 0, true), 100);
        assert_eq!(rule_percent(1, 3, false), 33);
        assert_eq!(rule_percent(2, 3, false), 67);
        assert_eq!(rule_percent(5, 3, false), 100);
    }

    #[test]
    fn test_throttle_window() {
        let mut t = ProgressThrottle::new(Duration::from_millis(200));
        let start = Instant::now();
        assert!(t.should_emit_at(start, false));
        assert!(!t.should_emit_at(start + Duration::from_millis(50), false));
        assert!(!t.should_emit_at(start + Duration::from_millis(199), false));
        assert!(t.should_emit_at(start + Duration::from_millis(200), false));
        // terminal always passes
        assert!(t.should_emit_at(start + Duration::from_millis(201), true));
    }

    #[test]
    fn test_reporter_is_monotonic_and_ends_at_terminal() {
        let seen = Mutex::new(Vec::new());
        let forward = |p: RuleProgress| seen.lock().unwrap().push(p);
        let mut reporter = RuleProgressReporter::new("R1", "X", Duration::ZERO, &forward);

        assert!(reporter.report(5, 10, false, true));
        assert!(reporter.report(3, 10, false, true));
        assert!(reporter.report(10, 10, true, true));
        assert!(!reporter.report(10, 10, true, true));

        let seen = seen.into_inner().unwrap();
        let processed: Vec<u64> = seen.iter().map(|p| p.processed).collect();
        assert_eq!(processed, vec![5, 5, 10]);
        assert!(seen.last().unwrap().completed);
        assert_eq!(seen.last().unwrap().percent, 100);
    }

    #[test]
    fn test_finish_keeps_last_position() {
        let seen = Mutex::new(Vec::new());
        let forward = |p: RuleProgress| seen.lock().unwrap().push(p);
        let mut reporter = RuleProgressReporter::new("R1", "X", Duration::ZERO, &forward);

        reporter.report(50, 100, false, true);
        reporter.set_counts(3, 1);
        assert!(reporter.finish(false));
        assert!(reporter.is_finished());
        assert!(!reporter.finish(true));

        let seen = seen.into_inner().unwrap();
        let last = seen.last().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!((last.processed, last.total), (50, 100));
        assert!(last.completed);
        assert!(!last.successful);
        assert_eq!(last.percent, 50);
        assert_eq!((last.error_count, last.warning_count), (3, 1));
    }

    #[test]
    fn test_overall_percent() {
        assert_eq!(overall_percent(StageId::PreCheck, 0.0), 0.0);
        assert_eq!(overall_percent(StageId::Relation, 100.0), 100.0);
        assert_eq!(overall_percent(StageId::Table, 50.0), 25.0);
        assert_eq!(overall_percent(StageId::Relation, 500.0), 100.0);
    }

    #[tokio::test]
    async fn test_channel_sink() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let sink = channel_sink(tx);
        sink.emit(ProgressEvent::new(StageId::Schema, "start"));
        assert_eq!(rx.recv().await.unwrap().current_stage, StageId::Schema);
    }
}
