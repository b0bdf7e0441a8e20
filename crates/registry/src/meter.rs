use parking_lot::Mutex;
use serde::Serialize;
use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant},
};

const TICK_INTERVAL: Duration = Duration::from_secs(5);

/// Exponentially weighted moving average of a per-second rate, updated once
/// per [`TICK_INTERVAL`].
#[derive(Debug, Clone)]
struct Ewma {
    alpha: f64,
    rate: f64,
    initialized: bool,
}

impl Ewma {
    fn over_minutes(minutes: f64) -> Self {
        let interval = TICK_INTERVAL.as_secs_f64();
        Self {
            alpha: 1.0 - (-interval / 60.0 / minutes).exp(),
            rate: 0.0,
            initialized: false,
        }
    }

    fn tick(&mut self, count: u64) {
        let instant_rate = count as f64 / TICK_INTERVAL.as_secs_f64();
        if self.initialized {
            self.rate += self.alpha * (instant_rate - self.rate);
        } else {
            self.rate = instant_rate;
            self.initialized = true;
        }
    }
}

#[derive(Debug)]
struct MovingRates {
    m1: Ewma,
    m5: Ewma,
    m15: Ewma,
}

impl MovingRates {
    fn tick(&mut self, count: u64) {
        self.m1.tick(count);
        self.m5.tick(count);
        self.m15.tick(count);
    }
}

/// Point-in-time view of a [`Meter`]. Rates are events per second.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MeterSnapshot {
    pub count: u64,
    pub mean_rate: f64,
    pub m1_rate: f64,
    pub m5_rate: f64,
    pub m15_rate: f64,
}

/// Measures the rate at which occurrences are marked.
///
/// `mark` only touches atomics unless a tick boundary has been crossed, in
/// which case the thread that wins the tick updates the moving averages.
#[derive(Debug)]
pub struct Meter {
    count: AtomicU64,
    uncounted: AtomicU64,
    started: Instant,
    // nanoseconds since `started`
    last_tick: AtomicU64,
    rates: Mutex<MovingRates>,
}

impl Default for Meter {
    fn default() -> Self {
        Self::new()
    }
}

impl Meter {
    pub fn new() -> Self {
        Self {
            count: AtomicU64::new(0),
            uncounted: AtomicU64::new(0),
            started: Instant::now(),
            last_tick: AtomicU64::new(0),
            rates: Mutex::new(MovingRates {
                m1: Ewma::over_minutes(1.0),
                m5: Ewma::over_minutes(5.0),
                m15: Ewma::over_minutes(15.0),
            }),
        }
    }

    pub fn mark(&self, n: u64) {
        self.tick_if_necessary();
        self.count.fetch_add(n, Ordering::Relaxed);
        self.uncounted.fetch_add(n, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn mean_rate(&self) -> f64 {
        let count = self.count();
        if count == 0 {
            return 0.0;
        }
        let elapsed = self.started.elapsed().as_secs_f64();
        if elapsed <= 0.0 {
            return 0.0;
        }
        count as f64 / elapsed
    }

    pub fn snapshot(&self) -> MeterSnapshot {
        self.tick_if_necessary();
        let rates = self.rates.lock();
        MeterSnapshot {
            count: self.count(),
            mean_rate: self.mean_rate(),
            m1_rate: rates.m1.rate,
            m5_rate: rates.m5.rate,
            m15_rate: rates.m15.rate,
        }
    }

    fn elapsed_nanos(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }

    fn tick_if_necessary(&self) {
        let old_tick = self.last_tick.load(Ordering::Acquire);
        let now = self.elapsed_nanos();
        let age = now.saturating_sub(old_tick);
        let interval = TICK_INTERVAL.as_nanos() as u64;
        if age < interval {
            return;
        }

        let new_tick = now - age % interval;
        if self
            .last_tick
            .compare_exchange(old_tick, new_tick, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            // another thread is ticking
            return;
        }

        let ticks = age / interval;
        let mut rates = self.rates.lock();
        for i in 0..ticks {
            let count = if i == 0 {
                self.uncounted.swap(0, Ordering::AcqRel)
            } else {
                0
            };
            rates.tick(count);
        }
    }
}
