use serde::Serialize;
use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use crate::{
    histogram::{Histogram, HistogramSnapshot},
    meter::{Meter, MeterSnapshot},
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimerSnapshot {
    /// Durations in nanoseconds.
    pub durations: HistogramSnapshot,
    pub rate: MeterSnapshot,
}

/// Distribution of durations plus the rate at which they occur.
#[derive(Debug, Default)]
pub struct Timer {
    histogram: Histogram,
    meter: Meter,
}

impl Timer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, duration: Duration) {
        let nanos = i64::try_from(duration.as_nanos()).unwrap_or(i64::MAX);
        self.histogram.record(nanos);
        self.meter.mark(1);
    }

    /// Runs `f` once and records how long it took. If `f` panics the panic
    /// propagates and nothing is recorded.
    pub fn time<T>(&self, f: impl FnOnce() -> T) -> T {
        let started = Instant::now();
        let result = f();
        self.update(started.elapsed());
        result
    }

    pub fn count(&self) -> u64 {
        self.histogram.count()
    }

    pub fn snapshot(&self) -> TimerSnapshot {
        TimerSnapshot {
            durations: self.histogram.snapshot(),
            rate: self.meter.snapshot(),
        }
    }
}

/// A running span started with [`Timer`]; recording happens on
/// [`TimerContext::stop`]. Dropping the context without stopping it records
/// nothing. An inert context (telemetry disabled) measures but never records.
#[derive(Debug)]
#[must_use = "a timer context records nothing until stopped"]
pub struct TimerContext {
    timer: Option<Arc<Timer>>,
    started: Instant,
}

impl TimerContext {
    pub fn start(timer: Arc<Timer>) -> Self {
        Self {
            timer: Some(timer),
            started: Instant::now(),
        }
    }

    pub fn inert() -> Self {
        Self {
            timer: None,
            started: Instant::now(),
        }
    }

    pub const fn is_inert(&self) -> bool {
        self.timer.is_none()
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Records the elapsed time and returns it. Inert contexts return
    /// [`Duration::ZERO`].
    pub fn stop(self) -> Duration {
        match self.timer {
            Some(timer) => {
                let elapsed = self.started.elapsed();
                timer.update(elapsed);
                elapsed
            }
            None => Duration::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{cell::Cell, panic, thread};

    #[test]
    fn test_time_runs_closure_once_and_returns_result() {
        let timer = Timer::new();
        let calls = Cell::new(0);

        let result = timer.time(|| {
            calls.set(calls.get() + 1);
            "done"
        });

        assert_eq!(result, "done");
        assert_eq!(calls.get(), 1);
        assert_eq!(timer.count(), 1);
    }

    #[test]
    fn test_panicking_closure_records_nothing() {
        let timer = Timer::new();
        let outcome = panic::catch_unwind(panic::AssertUnwindSafe(|| {
            timer.time(|| -> u32 { panic!("boom") })
        }));
        assert!(outcome.is_err());
        assert_eq!(timer.count(), 0);
    }

    #[test]
    fn test_context_records_on_stop() {
        let timer = Arc::new(Timer::new());
        let ctx = TimerContext::start(timer.clone());
        thread::sleep(Duration::from_millis(2));
        let elapsed = ctx.stop();

        assert!(elapsed >= Duration::from_millis(2));
        let snapshot = timer.snapshot();
        assert_eq!(snapshot.durations.count, 1);
        assert!(snapshot.durations.max >= 2_000_000);
        assert_eq!(snapshot.rate.count, 1);
    }

    #[test]
    fn test_dropped_context_records_nothing() {
        let timer = Arc::new(Timer::new());
        drop(TimerContext::start(timer.clone()));
        assert_eq!(timer.count(), 0);
    }

    #[test]
    fn test_inert_context() {
        let ctx = TimerContext::inert();
        assert!(ctx.is_inert());
        assert_eq!(ctx.stop(), Duration::ZERO);
    }
}
