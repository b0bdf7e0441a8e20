use parking_lot::RwLock;
use sentinel_errors::ConfigError;
use std::{collections::HashMap, sync::Arc, time::Duration};
use tracing::{debug, info};

use crate::{
    alias::MetricAlias,
    counter::Counter,
    histogram::Histogram,
    instrument::{Gauge, GaugeFn, Instrument, MetricKind},
    meter::Meter,
    snapshot::RegistrySnapshot,
    timer::{Timer, TimerContext},
};

/// Thread-safe store mapping a [`MetricAlias`] to exactly one [`Instrument`].
///
/// Lookups take a shared lock; only the first creation of an alias takes the
/// write lock. Instruments are updated through their own atomics or locks, so
/// producers never contend on the registry map once an alias exists.
#[derive(Debug, Default)]
pub struct MetricRegistry {
    instruments: RwLock<HashMap<MetricAlias, Instrument>>,
}

impl MetricRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the instrument bound to `alias`, creating one of `kind` if the
    /// alias is unbound.
    ///
    /// # Errors
    /// - [`ConfigError::GaugeFunctionRequired`] if a gauge must be created and
    ///   `gauge_fn` is `None`.
    /// - [`ConfigError::MetricKindMismatch`] if `alias` is already bound to a
    ///   different kind. The existing instrument is left untouched.
    pub fn get_or_create(
        &self,
        alias: impl Into<MetricAlias>,
        kind: MetricKind,
        gauge_fn: Option<GaugeFn>,
    ) -> Result<Instrument, ConfigError> {
        let alias = alias.into();

        if let Some(existing) = self.instruments.read().get(&alias) {
            return check_kind(&alias, existing, kind);
        }

        let mut instruments = self.instruments.write();
        // another producer may have bound the alias while we waited
        if let Some(existing) = instruments.get(&alias) {
            return check_kind(&alias, existing, kind);
        }

        let instrument = Instrument::create(kind, gauge_fn)
            .ok_or_else(|| ConfigError::GaugeFunctionRequired(alias.to_string()))?;
        debug!(alias = %alias, kind = %kind, "registered instrument");
        instruments.insert(alias, instrument.clone());
        Ok(instrument)
    }

    /// Like [`MetricRegistry::get_or_create`] with the kind given by name, as
    /// it appears in configuration.
    ///
    /// # Errors
    /// [`ConfigError::InvalidMetricKind`] for an unknown name; no binding is
    /// created in that case.
    pub fn get_or_create_named(
        &self,
        alias: impl Into<MetricAlias>,
        kind: &str,
        gauge_fn: Option<GaugeFn>,
    ) -> Result<Instrument, ConfigError> {
        let kind: MetricKind = kind.parse()?;
        self.get_or_create(alias, kind, gauge_fn)
    }

    pub fn counter(&self, alias: impl Into<MetricAlias>) -> Result<Arc<Counter>, ConfigError> {
        match self.get_or_create(alias, MetricKind::Counter, None)? {
            Instrument::Counter(c) => Ok(c),
            other => unreachable_kind(other),
        }
    }

    pub fn meter(&self, alias: impl Into<MetricAlias>) -> Result<Arc<Meter>, ConfigError> {
        match self.get_or_create(alias, MetricKind::Meter, None)? {
            Instrument::Meter(m) => Ok(m),
            other => unreachable_kind(other),
        }
    }

    pub fn histogram(
        &self,
        alias: impl Into<MetricAlias>,
    ) -> Result<Arc<Histogram>, ConfigError> {
        match self.get_or_create(alias, MetricKind::Histogram, None)? {
            Instrument::Histogram(h) => Ok(h),
            other => unreachable_kind(other),
        }
    }

    pub fn timer(&self, alias: impl Into<MetricAlias>) -> Result<Arc<Timer>, ConfigError> {
        match self.get_or_create(alias, MetricKind::Timer, None)? {
            Instrument::Timer(t) => Ok(t),
            other => unreachable_kind(other),
        }
    }

    /// Binds a gauge backed by `f`. If the alias is already a gauge the
    /// existing one is returned and `f` is dropped.
    pub fn gauge<F>(&self, alias: impl Into<MetricAlias>, f: F) -> Result<Arc<Gauge>, ConfigError>
    where
        F: Fn() -> f64 + Send + Sync + 'static,
    {
        match self.get_or_create(alias, MetricKind::Gauge, Some(Arc::new(f)))? {
            Instrument::Gauge(g) => Ok(g),
            other => unreachable_kind(other),
        }
    }

    pub fn increment(&self, alias: impl Into<MetricAlias>, delta: i64) -> Result<(), ConfigError> {
        self.counter(alias)?.inc(delta);
        Ok(())
    }

    pub fn decrement(&self, alias: impl Into<MetricAlias>, delta: i64) -> Result<(), ConfigError> {
        self.counter(alias)?.dec(delta);
        Ok(())
    }

    pub fn mark(&self, alias: impl Into<MetricAlias>, n: u64) -> Result<(), ConfigError> {
        self.meter(alias)?.mark(n);
        Ok(())
    }

    pub fn record(&self, alias: impl Into<MetricAlias>, value: i64) -> Result<(), ConfigError> {
        self.histogram(alias)?.record(value);
        Ok(())
    }

    /// Invokes `f` exactly once, records its wall-clock duration in the timer
    /// bound to `alias` and returns its result. A panic in `f` propagates
    /// unchanged.
    ///
    /// The timer is resolved before `f` runs, so a kind mismatch is reported
    /// without invoking `f`.
    pub fn time_sync<T>(
        &self,
        alias: impl Into<MetricAlias>,
        f: impl FnOnce() -> T,
    ) -> Result<T, ConfigError> {
        let timer = self.timer(alias)?;
        Ok(timer.time(f))
    }

    pub fn start_timer(&self, alias: impl Into<MetricAlias>) -> Result<TimerContext, ConfigError> {
        Ok(TimerContext::start(self.timer(alias)?))
    }

    pub fn stop_timer(&self, context: TimerContext) -> Duration {
        context.stop()
    }

    pub fn get(&self, alias: &MetricAlias) -> Option<Instrument> {
        self.instruments.read().get(alias).cloned()
    }

    pub fn contains(&self, alias: &MetricAlias) -> bool {
        self.instruments.read().contains_key(alias)
    }

    pub fn remove(&self, alias: &MetricAlias) -> Option<Instrument> {
        self.instruments.write().remove(alias)
    }

    pub fn len(&self) -> usize {
        self.instruments.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.instruments.read().is_empty()
    }

    pub fn aliases(&self) -> Vec<MetricAlias> {
        let mut aliases: Vec<_> = self.instruments.read().keys().cloned().collect();
        aliases.sort();
        aliases
    }

    /// Takes a point-in-time view of every instrument. The registry lock is
    /// held only while cloning handles; values are read afterwards.
    pub fn snapshot(&self) -> RegistrySnapshot {
        let handles: Vec<(MetricAlias, Instrument)> = self
            .instruments
            .read()
            .iter()
            .map(|(alias, instrument)| (alias.clone(), instrument.clone()))
            .collect();
        RegistrySnapshot::capture(handles)
    }

    /// Removes every instrument. The registry stays usable.
    pub fn close(&self) {
        let mut instruments = self.instruments.write();
        let removed = instruments.len();
        instruments.clear();
        info!("Metric registry closed, removed {} instruments", removed);
    }
}

fn check_kind(
    alias: &MetricAlias,
    existing: &Instrument,
    requested: MetricKind,
) -> Result<Instrument, ConfigError> {
    if existing.kind() == requested {
        Ok(existing.clone())
    } else {
        Err(ConfigError::MetricKindMismatch {
            alias: alias.to_string(),
            existing: existing.kind().to_string(),
            requested: requested.to_string(),
        })
    }
}

// get_or_create guarantees the returned kind matches the requested one
fn unreachable_kind<T>(instrument: Instrument) -> Result<T, ConfigError> {
    Err(ConfigError::InvalidMetricKind(instrument.kind().to_string()))
}
