use async_trait::async_trait;
use mockall::automock;
use sentinel_errors::ConfigError;
use sentinel_events::{Event, EventClient, SendOutcome};
use sentinel_registry::{MetricAlias, MetricRegistry, TimerContext};
use std::{sync::Arc, time::Duration};
use tracing::warn;

/// Instrumentation operations available to application code.
///
/// Implementations never fail the caller: when metrics are disabled every
/// operation is a no-op, and a kind mismatch on an alias is logged and
/// ignored.
pub trait MetricHolder {
    fn increment(&self, alias: impl Into<MetricAlias>);

    fn decrement(&self, alias: impl Into<MetricAlias>);

    fn mark(&self, alias: impl Into<MetricAlias>, n: u64);

    fn record(&self, alias: impl Into<MetricAlias>, value: i64);

    /// Runs `f` exactly once and returns its result, timing it when a timer
    /// is available.
    fn time_sync<T>(&self, alias: impl Into<MetricAlias>, f: impl FnOnce() -> T) -> T;

    fn start_timer(&self, alias: impl Into<MetricAlias>) -> TimerContext;

    fn stop_timer(&self, context: TimerContext) -> Duration;

    fn gauge<F>(&self, alias: impl Into<MetricAlias>, f: F)
    where
        F: Fn() -> f64 + Send + Sync + 'static;
}

/// [`MetricHolder`] over an optional registry.
#[derive(Debug, Clone, Default)]
pub struct Metrics {
    registry: Option<Arc<MetricRegistry>>,
}

impl Metrics {
    pub const fn new(registry: Option<Arc<MetricRegistry>>) -> Self {
        Self { registry }
    }

    pub const fn disabled() -> Self {
        Self { registry: None }
    }

    pub const fn is_enabled(&self) -> bool {
        self.registry.is_some()
    }

    pub const fn registry(&self) -> Option<&Arc<MetricRegistry>> {
        self.registry.as_ref()
    }

    fn apply(
        &self,
        alias: impl Into<MetricAlias>,
        op: impl FnOnce(&MetricRegistry, MetricAlias) -> Result<(), ConfigError>,
    ) {
        let Some(registry) = &self.registry else {
            return;
        };
        let alias = alias.into();
        if let Err(e) = op(registry.as_ref(), alias.clone()) {
            warn!(alias = %alias, error = %e, "metric update ignored");
        }
    }
}

impl MetricHolder for Metrics {
    fn increment(&self, alias: impl Into<MetricAlias>) {
        self.apply(alias, |registry, alias| registry.increment(alias, 1));
    }

    fn decrement(&self, alias: impl Into<MetricAlias>) {
        self.apply(alias, |registry, alias| registry.decrement(alias, 1));
    }

    fn mark(&self, alias: impl Into<MetricAlias>, n: u64) {
        self.apply(alias, |registry, alias| registry.mark(alias, n));
    }

    fn record(&self, alias: impl Into<MetricAlias>, value: i64) {
        self.apply(alias, |registry, alias| registry.record(alias, value));
    }

    fn time_sync<T>(&self, alias: impl Into<MetricAlias>, f: impl FnOnce() -> T) -> T {
        let Some(registry) = &self.registry else {
            return f();
        };
        let alias = alias.into();
        match registry.timer(alias.clone()) {
            Ok(timer) => timer.time(f),
            Err(e) => {
                warn!(alias = %alias, error = %e, "timing skipped");
                f()
            }
        }
    }

    fn start_timer(&self, alias: impl Into<MetricAlias>) -> TimerContext {
        let Some(registry) = &self.registry else {
            return TimerContext::inert();
        };
        let alias = alias.into();
        registry.start_timer(alias.clone()).unwrap_or_else(|e| {
            warn!(alias = %alias, error = %e, "timer not started");
            TimerContext::inert()
        })
    }

    fn stop_timer(&self, context: TimerContext) -> Duration {
        context.stop()
    }

    fn gauge<F>(&self, alias: impl Into<MetricAlias>, f: F)
    where
        F: Fn() -> f64 + Send + Sync + 'static,
    {
        self.apply(alias, |registry, alias| registry.gauge(alias, f).map(|_| ()));
    }
}

/// Sends discrete events to the monitoring service.
#[automock]
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn send_event(&self, event: Event) -> SendOutcome;
}

/// [`EventSink`] over an optional client, merging the client's configured
/// defaults into every event.
#[derive(Clone, Default)]
pub struct Events {
    client: Option<Arc<EventClient>>,
}

impl Events {
    pub const fn new(client: Option<Arc<EventClient>>) -> Self {
        Self { client }
    }

    pub const fn disabled() -> Self {
        Self { client: None }
    }

    pub const fn is_enabled(&self) -> bool {
        self.client.is_some()
    }

    pub const fn client(&self) -> Option<&Arc<EventClient>> {
        self.client.as_ref()
    }
}

#[async_trait]
impl EventSink for Events {
    async fn send_event(&self, event: Event) -> SendOutcome {
        match &self.client {
            Some(client) => client.send(client.defaults(), &event).await,
            None => SendOutcome::Disabled,
        }
    }
}
