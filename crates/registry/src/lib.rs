#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! # Sentinel Registry
//!
//! Thread-safe registry of named measurement instruments: counters, meters,
//! histograms, timers and gauges, addressed by hierarchical
//! [`MetricAlias`]es.
//!
//! ```rust
//! use sentinel_registry::{MetricKind, MetricRegistry};
//!
//! let registry = MetricRegistry::new();
//! registry.increment("jobs.accepted", 1).unwrap();
//! let rows = registry.time_sync("jobs.duration", || 3).unwrap();
//! assert_eq!(rows, 3);
//!
//! let counter = registry.get_or_create("jobs.accepted", MetricKind::Counter, None).unwrap();
//! assert_eq!(counter.kind(), MetricKind::Counter);
//! ```

mod alias;
mod counter;
mod histogram;
mod instrument;
mod meter;
mod registry;
mod snapshot;
mod timer;

pub use alias::MetricAlias;
pub use counter::Counter;
pub use histogram::{DEFAULT_RESERVOIR_SIZE, Histogram, HistogramSnapshot};
pub use instrument::{Gauge, GaugeFn, Instrument, InstrumentSnapshot, MetricKind};
pub use meter::{Meter, MeterSnapshot};
pub use registry::MetricRegistry;
pub use snapshot::RegistrySnapshot;
pub use timer::{Timer, TimerContext, TimerSnapshot};
