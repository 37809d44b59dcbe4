//! The capture loop.
//!
//! Slots are spaced `interval` apart on the monotonic clock and handed to the
//! configured sources in fixed round-robin order. Each slot runs
//! ensure-fresh, capture and deliver, retrying with backoff. A slot that
//! exhausts its retries is counted and skipped. The loop ends when the run
//! budget is used up or a stop is requested, and always releases every
//! source before returning.

use crate::capture::FrameSource;
use crate::clock::Clock;
use crate::error::CaptureError;
use crate::naming::Snapshot;
use crate::output::SnapshotSink;
use crate::retry::RetryPolicy;
use crate::signal::StopFlag;
use std::fmt;
use std::time::{Duration, Instant};

/// Idle waits are broken into chunks of this length so a stop request is
/// seen promptly.
const STOP_POLL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSettings {
    /// Time between consecutive slots, across all sources
    pub interval: Duration,
    /// Total run time; `None` runs until interrupted
    pub budget: Option<Duration>,
    pub retry: RetryPolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    BudgetExhausted,
    Interrupted,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BudgetExhausted => f.write_str("run budget exhausted"),
            Self::Interrupted => f.write_str("interrupted"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceCount {
    pub label: String,
    pub delivered: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Slots started, including failed and abandoned ones
    pub slots: u64,
    pub delivered: u64,
    pub failed_slots: u64,
    pub per_source: Vec<SourceCount>,
    pub stop: StopReason,
    pub elapsed: Duration,
}

/// One scheduled snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureSlot {
    pub index: u64,
    pub due: Instant,
}

enum SlotOutcome {
    Delivered(String),
    Failed(CaptureError),
    Abandoned,
}

/// Mutable state of a run. Only the loop reads and writes it.
struct RunContext<'a, C> {
    clock: &'a C,
    stop: &'a StopFlag,
    settings: &'a RunSettings,
    start: Instant,
    next: CaptureSlot,
    delivered: u64,
    failed_slots: u64,
    per_source: Vec<u64>,
}

impl<C: Clock> RunContext<'_, C> {
    fn elapsed(&self) -> Duration {
        self.clock.now().saturating_duration_since(self.start)
    }

    /// End of the run budget. A budget past the clock's range is unbounded.
    fn deadline(&self) -> Option<Instant> {
        self.settings
            .budget
            .and_then(|budget| self.start.checked_add(budget))
    }

    /// Sleep until `until`, waking early on a stop request. Returns false if
    /// a stop was requested.
    fn pause_until(&self, until: Instant) -> bool {
        loop {
            if self.stop.is_requested() {
                return false;
            }
            let now = self.clock.now();
            if now >= until {
                return true;
            }
            self.clock.sleep((until - now).min(STOP_POLL));
        }
    }

    fn pause(&self, duration: Duration) -> bool {
        self.pause_until(self.clock.now() + duration)
    }

    /// Advance the schedule after a slot. An overdue slot starts at once and
    /// the lost time is not made up.
    fn advance(&mut self) {
        let now = self.clock.now();
        let due = (self.next.due + self.settings.interval).max(now);
        self.next = CaptureSlot {
            index: self.next.index + 1,
            due,
        };
    }
}

/// Bring every source up before the first slot so that a source that cannot
/// be reached at all fails the run at startup.
pub fn prepare<S: FrameSource, C: Clock>(sources: &mut [S], clock: &C) -> Result<(), CaptureError> {
    for source in sources.iter_mut() {
        let session = source.ensure_fresh(clock.now())?;
        tracing::info!(source = source.label(), session, "Source ready");
    }
    Ok(())
}

pub fn run<S, K, C>(
    sources: &mut [S],
    sink: &mut K,
    clock: &C,
    stop: &StopFlag,
    settings: &RunSettings,
) -> RunReport
where
    S: FrameSource,
    K: SnapshotSink,
    C: Clock,
{
    let start = clock.now();
    let mut ctx = RunContext {
        clock,
        stop,
        settings,
        start,
        next: CaptureSlot {
            index: 0,
            due: start,
        },
        delivered: 0,
        failed_slots: 0,
        per_source: vec![0; sources.len()],
    };

    match settings.budget {
        Some(budget) => tracing::info!(
            "Capturing every {:.1}s from {} source(s) for at most {}s into {}",
            settings.interval.as_secs_f64(),
            sources.len(),
            budget.as_secs(),
            sink.describe()
        ),
        None => tracing::info!(
            "Capturing every {:.1}s from {} source(s) into {} until interrupted",
            settings.interval.as_secs_f64(),
            sources.len(),
            sink.describe()
        ),
    }

    let stop_reason = if sources.is_empty() {
        StopReason::BudgetExhausted
    } else {
        capture_loop(&mut ctx, sources, sink)
    };

    tracing::info!("Stopping ({}), releasing sources", stop_reason);
    for source in sources.iter_mut() {
        source.shutdown();
    }

    let report = RunReport {
        slots: ctx.next.index,
        delivered: ctx.delivered,
        failed_slots: ctx.failed_slots,
        per_source: sources
            .iter()
            .zip(&ctx.per_source)
            .map(|(source, &delivered)| SourceCount {
                label: source.label().to_string(),
                delivered,
            })
            .collect(),
        stop: stop_reason,
        elapsed: ctx.elapsed(),
    };

    tracing::info!(
        delivered = report.delivered,
        failed = report.failed_slots,
        "Capture finished after {:.0}s: {} snapshot(s) in {} slot(s), stop reason: {}",
        report.elapsed.as_secs_f64(),
        report.delivered,
        report.slots,
        report.stop
    );
    for count in &report.per_source {
        tracing::info!(source = %count.label, "Source total: {} snapshot(s)", count.delivered);
    }

    report
}

fn capture_loop<S, K, C>(ctx: &mut RunContext<'_, C>, sources: &mut [S], sink: &mut K) -> StopReason
where
    S: FrameSource,
    K: SnapshotSink,
    C: Clock,
{
    loop {
        if ctx.stop.is_requested() {
            return StopReason::Interrupted;
        }

        // A slot due at or after the deadline is never started.
        if let Some(deadline) = ctx.deadline() {
            if ctx.next.due >= deadline {
                if !ctx.pause_until(deadline) {
                    return StopReason::Interrupted;
                }
                return StopReason::BudgetExhausted;
            }
        }

        if !ctx.pause_until(ctx.next.due) {
            return StopReason::Interrupted;
        }

        let slot = ctx.next;
        let position = (slot.index % sources.len() as u64) as usize;
        let source = &mut sources[position];

        match run_slot(ctx, slot, source, sink) {
            SlotOutcome::Delivered(location) => {
                ctx.delivered += 1;
                ctx.per_source[position] += 1;
                log_progress(ctx, source.label(), ctx.per_source[position], &location);
            }
            SlotOutcome::Failed(e) => {
                ctx.failed_slots += 1;
                tracing::error!(
                    slot = slot.index,
                    source = source.label(),
                    kind = e.kind(),
                    "Slot failed, skipping: {}",
                    e
                );
            }
            SlotOutcome::Abandoned => {
                ctx.failed_slots += 1;
                tracing::warn!(
                    slot = slot.index,
                    source = source.label(),
                    "Stop requested, abandoning slot"
                );
            }
        }

        ctx.advance();
    }
}

/// ensure-fresh, capture, deliver; retried as a unit. Once an image has
/// been captured only delivery is retried, under the same name.
fn run_slot<S, K, C>(ctx: &RunContext<'_, C>, slot: CaptureSlot, source: &mut S, sink: &mut K) -> SlotOutcome
where
    S: FrameSource,
    K: SnapshotSink,
    C: Clock,
{
    let policy = &ctx.settings.retry;
    let max_attempts = policy.max_attempts.max(1);
    let mut pending: Option<Snapshot> = None;
    let mut attempt = 1;

    loop {
        match attempt_slot(ctx, source, sink, &mut pending) {
            Ok(location) => return SlotOutcome::Delivered(location),
            Err(e) if !e.is_transient() || attempt >= max_attempts => {
                return SlotOutcome::Failed(e);
            }
            Err(e) => {
                let wait = policy.backoff(attempt);
                tracing::warn!(
                    slot = slot.index,
                    source = source.label(),
                    attempt,
                    max_attempts,
                    kind = e.kind(),
                    "Attempt failed: {}; retrying in {:.1}s",
                    e,
                    wait.as_secs_f64()
                );
                if !ctx.pause(wait) {
                    return SlotOutcome::Abandoned;
                }
                attempt += 1;
            }
        }
    }
}

fn attempt_slot<S, K, C>(
    ctx: &RunContext<'_, C>,
    source: &mut S,
    sink: &mut K,
    pending: &mut Option<Snapshot>,
) -> Result<String, CaptureError>
where
    S: FrameSource,
    K: SnapshotSink,
    C: Clock,
{
    let snapshot = match pending.take() {
        Some(snapshot) => snapshot,
        None => {
            let session = source.ensure_fresh(ctx.clock.now())?;
            let bytes = source.capture()?;
            tracing::debug!(source = source.label(), session, "Captured {} bytes", bytes.len());
            Snapshot::new(
                source.kind(),
                source.partition().map(str::to_owned),
                &ctx.clock.wall(),
                bytes,
            )
        }
    };

    let result = sink.deliver(&snapshot);
    *pending = Some(snapshot);
    result
}

fn log_progress<C: Clock>(ctx: &RunContext<'_, C>, label: &str, count: u64, location: &str) {
    match ctx.deadline() {
        Some(deadline) => {
            let remaining = deadline.saturating_duration_since(ctx.clock.now());
            tracing::info!(
                slot = ctx.next.index,
                source = label,
                location,
                "Snapshot #{} saved ({:.0}s remaining)",
                count,
                remaining.as_secs_f64()
            );
        }
        None => tracing::info!(
            slot = ctx.next.index,
            source = label,
            location,
            "Snapshot #{} saved",
            count
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::ManagedSource;
    use crate::clock::ManualClock;
    use crate::lifecycle::testing::ScriptedDriver;
    use crate::lifecycle::RecyclePolicy;
    use crate::naming::SourceKind;
    use pretty_assertions::assert_eq;
    use std::collections::VecDeque;

    type TestSource = ManagedSource<ScriptedDriver>;

    /// Records every delivery call and fails the scripted ones.
    #[derive(Default)]
    struct MemorySink {
        delivered: Vec<Snapshot>,
        calls: Vec<String>,
        failures: VecDeque<CaptureError>,
    }

    impl SnapshotSink for MemorySink {
        fn deliver(&mut self, snapshot: &Snapshot) -> Result<String, CaptureError> {
            self.calls.push(snapshot.name.clone());
            if let Some(e) = self.failures.pop_front() {
                return Err(e);
            }
            self.delivered.push(snapshot.clone());
            Ok(format!("mem://{}", snapshot.name))
        }

        fn describe(&self) -> String {
            "memory".into()
        }
    }

    /// Source wrapper that can take simulated time per capture and trip the
    /// stop flag.
    struct Harness<'a> {
        inner: TestSource,
        clock: &'a ManualClock,
        capture_cost: Duration,
        stop_on_capture: Option<(u32, StopFlag)>,
        captures: u32,
        shut_down: bool,
    }

    impl<'a> Harness<'a> {
        fn new(label: &str, driver: ScriptedDriver, clock: &'a ManualClock) -> Self {
            Self {
                inner: ManagedSource::new(
                    label,
                    SourceKind::Webcam,
                    Some(label.to_string()),
                    driver,
                    RecyclePolicy::default(),
                ),
                clock,
                capture_cost: Duration::ZERO,
                stop_on_capture: None,
                captures: 0,
                shut_down: false,
            }
        }

        fn driver(&self) -> &ScriptedDriver {
            self.inner.lifecycle().driver()
        }
    }

    impl FrameSource for Harness<'_> {
        fn label(&self) -> &str {
            self.inner.label()
        }

        fn kind(&self) -> SourceKind {
            self.inner.kind()
        }

        fn partition(&self) -> Option<&str> {
            self.inner.partition()
        }

        fn ensure_fresh(&mut self, now: Instant) -> Result<u64, CaptureError> {
            self.inner.ensure_fresh(now)
        }

        fn capture(&mut self) -> Result<Vec<u8>, CaptureError> {
            self.captures += 1;
            self.clock.advance(self.capture_cost);
            if let Some((n, flag)) = &self.stop_on_capture {
                if *n == self.captures {
                    flag.request();
                }
            }
            self.inner.capture()
        }

        fn shutdown(&mut self) {
            self.shut_down = true;
            self.inner.shutdown();
        }
    }

    fn settings(interval: u64, budget: Option<u64>) -> RunSettings {
        RunSettings {
            interval: Duration::from_secs(interval),
            budget: budget.map(Duration::from_secs),
            retry: RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_secs(1),
                max_delay: Duration::from_secs(4),
                jitter: Duration::ZERO,
            },
        }
    }

    fn failure() -> Result<Vec<u8>, CaptureError> {
        Err(CaptureError::CaptureFailed("screenshot timed out".into()))
    }

    #[test]
    fn budget_bounds_the_number_of_snapshots() {
        let clock = ManualClock::new();
        let mut sources = vec![Harness::new("cam", ScriptedDriver::default(), &clock)];
        let mut sink = MemorySink::default();

        let report = run(&mut sources, &mut sink, &clock, &StopFlag::new(), &settings(5, Some(20)));

        assert_eq!(report.delivered, 4);
        assert_eq!(report.stop, StopReason::BudgetExhausted);
        assert_eq!(clock.elapsed(), Duration::from_secs(20));

        let names: Vec<&str> = sink.delivered.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "webcam_snapshot_20240501_120000.png",
                "webcam_snapshot_20240501_120005.png",
                "webcam_snapshot_20240501_120010.png",
                "webcam_snapshot_20240501_120015.png",
            ]
        );
        assert!(sources[0].shut_down);
    }

    #[test]
    fn slow_slots_drift_without_catching_up() {
        let clock = ManualClock::new();
        let mut source = Harness::new("cam", ScriptedDriver::default(), &clock);
        source.capture_cost = Duration::from_secs(7);
        let mut sources = vec![source];
        let mut sink = MemorySink::default();

        let report = run(&mut sources, &mut sink, &clock, &StopFlag::new(), &settings(5, Some(20)));

        // Slots start at 0, 7 and 14; the one due at 21 is past the budget.
        let names: Vec<&str> = sink.delivered.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "webcam_snapshot_20240501_120007.png",
                "webcam_snapshot_20240501_120014.png",
                "webcam_snapshot_20240501_120021.png",
            ]
        );
        assert_eq!(report.stop, StopReason::BudgetExhausted);
        assert!(report.elapsed <= Duration::from_secs(20 + 5));
    }

    #[test]
    fn sources_are_interleaved_in_fixed_order() {
        let clock = ManualClock::new();
        let mut sources = vec![
            Harness::new("a", ScriptedDriver::default(), &clock),
            Harness::new("b", ScriptedDriver::default(), &clock),
            Harness::new("c", ScriptedDriver::default(), &clock),
        ];
        let mut sink = MemorySink::default();

        let report = run(&mut sources, &mut sink, &clock, &StopFlag::new(), &settings(5, Some(30)));

        let order: Vec<&str> = sink
            .delivered
            .iter()
            .map(|s| s.partition.as_deref().unwrap())
            .collect();
        assert_eq!(order, vec!["a", "b", "c", "a", "b", "c"]);
        assert_eq!(
            report.per_source.iter().map(|c| c.delivered).collect::<Vec<_>>(),
            vec![2, 2, 2]
        );
    }

    #[test]
    fn two_failures_then_success_delivers_once_without_recycle() {
        let clock = ManualClock::new();
        let driver = ScriptedDriver::with_captures([Ok(vec![1]), failure(), failure(), Ok(vec![2])]);
        let mut sources = vec![Harness::new("cam", driver, &clock)];
        let mut sink = MemorySink::default();

        let report = run(&mut sources, &mut sink, &clock, &StopFlag::new(), &settings(10, Some(20)));

        assert_eq!(report.delivered, 2);
        assert_eq!(report.failed_slots, 0);
        assert_eq!(sink.delivered[1].bytes, vec![2]);
        // Both slots used the first session.
        assert_eq!(sources[0].driver().acquired, 1);
        assert_eq!(sources[0].driver().captured_with, vec![1, 1, 1, 1]);
    }

    #[test]
    fn exhausted_slot_is_skipped_and_session_recycled() {
        let clock = ManualClock::new();
        let driver = ScriptedDriver::with_captures([failure(), failure(), failure(), Ok(vec![9])]);
        let mut sources = vec![Harness::new("cam", driver, &clock)];
        let mut sink = MemorySink::default();

        let report = run(&mut sources, &mut sink, &clock, &StopFlag::new(), &settings(10, Some(20)));

        assert_eq!(report.failed_slots, 1);
        assert_eq!(report.delivered, 1);
        assert_eq!(report.slots, 2);
        // Three failures on session 1, then a fresh session for the next slot.
        assert_eq!(sources[0].driver().captured_with, vec![1, 1, 1, 2]);
        assert_eq!(sources[0].driver().released, vec![1, 2]);
    }

    #[test]
    fn content_error_recycles_before_the_retry() {
        let clock = ManualClock::new();
        let driver = ScriptedDriver::with_captures([Err(CaptureError::ElementNotFound), Ok(vec![1])]);
        let mut sources = vec![Harness::new("cam", driver, &clock)];
        let mut sink = MemorySink::default();

        let report = run(&mut sources, &mut sink, &clock, &StopFlag::new(), &settings(10, Some(10)));

        assert_eq!(report.delivered, 1);
        assert_eq!(sources[0].driver().captured_with, vec![1, 2]);
    }

    #[test]
    fn delivery_retry_reuses_the_captured_snapshot() {
        let clock = ManualClock::new();
        let mut sources = vec![Harness::new("cam", ScriptedDriver::default(), &clock)];
        let mut sink = MemorySink {
            failures: [
                CaptureError::delivery("503", true),
                CaptureError::delivery("503", true),
            ]
            .into(),
            ..MemorySink::default()
        };

        let report = run(&mut sources, &mut sink, &clock, &StopFlag::new(), &settings(10, Some(10)));

        assert_eq!(report.delivered, 1);
        assert_eq!(sources[0].captures, 1);
        assert_eq!(
            sink.calls,
            vec!["webcam_snapshot_20240501_120000.png"; 3]
        );
    }

    #[test]
    fn permanent_delivery_error_fails_the_slot_immediately() {
        let clock = ManualClock::new();
        let mut sources = vec![Harness::new("cam", ScriptedDriver::default(), &clock)];
        let mut sink = MemorySink {
            failures: [CaptureError::delivery("permission denied", false)].into(),
            ..MemorySink::default()
        };

        let report = run(&mut sources, &mut sink, &clock, &StopFlag::new(), &settings(10, Some(20)));

        assert_eq!(sink.calls.len(), 2);
        assert_eq!(report.failed_slots, 1);
        assert_eq!(report.delivered, 1);
    }

    #[test]
    fn interrupt_mid_retry_finishes_attempt_then_tears_down() {
        let clock = ManualClock::new();
        let stop = StopFlag::new();
        let driver = ScriptedDriver::with_captures([Ok(vec![1]), failure(), failure()]);
        let mut source = Harness::new("cam", driver, &clock);
        source.stop_on_capture = Some((2, stop.clone()));
        let mut sources = vec![source];
        let mut sink = MemorySink::default();

        let report = run(&mut sources, &mut sink, &clock, &stop, &settings(5, None));

        assert_eq!(report.stop, StopReason::Interrupted);
        assert_eq!(report.delivered, 1);
        assert_eq!(report.failed_slots, 1);
        // The attempt in flight when the stop arrived ran to completion; no
        // further attempt was made.
        assert_eq!(sources[0].captures, 2);
        assert!(sources[0].shut_down);
        assert_eq!(sources[0].driver().released, vec![1]);
    }

    #[test]
    fn stop_after_a_slot_skips_the_idle_wait() {
        let clock = ManualClock::new();
        let stop = StopFlag::new();
        let mut source = Harness::new("cam", ScriptedDriver::default(), &clock);
        source.stop_on_capture = Some((1, stop.clone()));
        let mut sources = vec![source];
        let mut sink = MemorySink::default();

        let report = run(&mut sources, &mut sink, &clock, &stop, &settings(3600, None));

        assert_eq!(report.stop, StopReason::Interrupted);
        assert_eq!(report.delivered, 1);
        assert!(clock.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn budget_beyond_clock_range_runs_until_interrupted() {
        let clock = ManualClock::new();
        let stop = StopFlag::new();
        let mut source = Harness::new("cam", ScriptedDriver::default(), &clock);
        source.stop_on_capture = Some((2, stop.clone()));
        let mut sources = vec![source];
        let mut sink = MemorySink::default();
        let mut settings = settings(5, None);
        settings.budget = Some(Duration::from_secs(u64::MAX));

        let report = run(&mut sources, &mut sink, &clock, &stop, &settings);

        assert_eq!(report.stop, StopReason::Interrupted);
        assert_eq!(report.delivered, 2);
    }

    #[test]
    fn prepare_fails_fast_on_unreachable_source() {
        let clock = ManualClock::new();
        let driver = ScriptedDriver {
            acquire_failures: 1,
            ..ScriptedDriver::default()
        };
        let mut sources = vec![
            Harness::new("ok", ScriptedDriver::default(), &clock),
            Harness::new("broken", driver, &clock),
        ];

        let err = prepare(&mut sources, &clock).unwrap_err();
        assert_eq!(err.kind(), "acquisition_failed");
        assert_eq!(sources[0].driver().acquired, 1);
    }
}
