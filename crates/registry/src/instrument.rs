use sentinel_errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr, sync::Arc};

use crate::{
    counter::Counter,
    histogram::{Histogram, HistogramSnapshot},
    meter::{Meter, MeterSnapshot},
    timer::{Timer, TimerSnapshot},
};

/// Zero-argument snapshot function backing a [`Gauge`].
pub type GaugeFn = Arc<dyn Fn() -> f64 + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Counter,
    Meter,
    Histogram,
    Timer,
    Gauge,
}

impl MetricKind {
    pub const ALL: [Self; 5] = [
        Self::Counter,
        Self::Meter,
        Self::Histogram,
        Self::Timer,
        Self::Gauge,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Counter => "counter",
            Self::Meter => "meter",
            Self::Histogram => "histogram",
            Self::Timer => "timer",
            Self::Gauge => "gauge",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ConfigError::InvalidMetricKind(s.to_string()))
    }
}

/// A value computed on demand by calling the supplied function.
#[derive(Clone)]
pub struct Gauge {
    f: GaugeFn,
}

impl Gauge {
    pub fn new(f: GaugeFn) -> Self {
        Self { f }
    }

    pub fn value(&self) -> f64 {
        (self.f)()
    }
}

impl fmt::Debug for Gauge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Gauge { .. }")
    }
}

/// One typed measurement object bound to an alias. Clones share the same
/// underlying instrument.
#[derive(Debug, Clone)]
pub enum Instrument {
    Counter(Arc<Counter>),
    Meter(Arc<Meter>),
    Histogram(Arc<Histogram>),
    Timer(Arc<Timer>),
    Gauge(Arc<Gauge>),
}

impl Instrument {
    pub(crate) fn create(kind: MetricKind, gauge_fn: Option<GaugeFn>) -> Option<Self> {
        Some(match kind {
            MetricKind::Counter => Self::Counter(Arc::new(Counter::new())),
            MetricKind::Meter => Self::Meter(Arc::new(Meter::new())),
            MetricKind::Histogram => Self::Histogram(Arc::new(Histogram::new())),
            MetricKind::Timer => Self::Timer(Arc::new(Timer::new())),
            MetricKind::Gauge => Self::Gauge(Arc::new(Gauge::new(gauge_fn?))),
        })
    }

    pub const fn kind(&self) -> MetricKind {
        match self {
            Self::Counter(_) => MetricKind::Counter,
            Self::Meter(_) => MetricKind::Meter,
            Self::Histogram(_) => MetricKind::Histogram,
            Self::Timer(_) => MetricKind::Timer,
            Self::Gauge(_) => MetricKind::Gauge,
        }
    }

    /// Whether both handles point at the very same instrument.
    pub fn same_as(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Counter(a), Self::Counter(b)) => Arc::ptr_eq(a, b),
            (Self::Meter(a), Self::Meter(b)) => Arc::ptr_eq(a, b),
            (Self::Histogram(a), Self::Histogram(b)) => Arc::ptr_eq(a, b),
            (Self::Timer(a), Self::Timer(b)) => Arc::ptr_eq(a, b),
            (Self::Gauge(a), Self::Gauge(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub fn snapshot(&self) -> InstrumentSnapshot {
        match self {
            Self::Counter(c) => InstrumentSnapshot::Counter { count: c.count() },
            Self::Meter(m) => InstrumentSnapshot::Meter(m.snapshot()),
            Self::Histogram(h) => InstrumentSnapshot::Histogram(h.snapshot()),
            Self::Timer(t) => InstrumentSnapshot::Timer(t.snapshot()),
            Self::Gauge(g) => InstrumentSnapshot::Gauge { value: g.value() },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InstrumentSnapshot {
    Counter { count: i64 },
    Meter(MeterSnapshot),
    Histogram(HistogramSnapshot),
    Timer(TimerSnapshot),
    Gauge { value: f64 },
}

impl InstrumentSnapshot {
    /// Flattens the snapshot into `(field, value)` pairs, the shape every
    /// line-oriented sink wants.
    pub fn fields(&self) -> Vec<(&'static str, f64)> {
        match self {
            Self::Counter { count } => vec![("count", *count as f64)],
            Self::Gauge { value } => vec![("value", *value)],
            Self::Meter(m) => meter_fields(m),
            Self::Histogram(h) => histogram_fields(h),
            Self::Timer(t) => {
                let mut fields = histogram_fields(&t.durations);
                fields.extend(
                    meter_fields(&t.rate)
                        .into_iter()
                        .filter(|(name, _)| *name != "count"),
                );
                fields
            }
        }
    }
}

fn meter_fields(m: &MeterSnapshot) -> Vec<(&'static str, f64)> {
    vec![
        ("count", m.count as f64),
        ("mean_rate", m.mean_rate),
        ("m1_rate", m.m1_rate),
        ("m5_rate", m.m5_rate),
        ("m15_rate", m.m15_rate),
    ]
}

fn histogram_fields(h: &HistogramSnapshot) -> Vec<(&'static str, f64)> {
    vec![
        ("count", h.count as f64),
        ("min", h.min as f64),
        ("max", h.max as f64),
        ("mean", h.mean),
        ("stddev", h.stddev),
        ("p50", h.p50),
        ("p75", h.p75),
        ("p95", h.p95),
        ("p99", h.p99),
        ("p999", h.p999),
    ]
}
