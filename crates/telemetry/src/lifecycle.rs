use sentinel_crash::{
    CrashConfig, CrashReport, CrashSink, CrashTransport, FailureHookRegistration,
    JsonLinesTransport,
};
use sentinel_errors::{CollectedErrors, ConfigError, TelemetryError};
use sentinel_events::{CloseReport, EventClient, EventTransport, EventsConfig};
use sentinel_registry::{MetricAlias, MetricRegistry};
use sentinel_reporters::{MetricsConfig, ReporterSupervisor, StopReport};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::{
    config::TelemetryConfig,
    holder::{Events, Metrics},
    runtime::RuntimeSources,
};

/// What [`TelemetryLifecycle::stop`] did.
#[derive(Debug, Default)]
pub struct StopSummary {
    /// False when `stop` found the lifecycle already stopped and did nothing.
    pub was_running: bool,
    pub reporters: StopReport,
    /// Stop errors forwarded to the crash sink.
    pub captured: usize,
    pub client: CloseReport,
}

impl StopSummary {
    pub fn is_clean(&self) -> bool {
        self.reporters.is_clean() && self.client.is_empty()
    }
}

struct RunningState {
    registry: Option<Arc<MetricRegistry>>,
    reporters: ReporterSupervisor,
    event_client: Option<Arc<EventClient>>,
    crash_sink: Option<Arc<CrashSink>>,
    hook: Option<FailureHookRegistration>,
}

enum LifecycleState {
    Stopped,
    Running(RunningState),
}

/// Owns every telemetry resource of the process and brings them up and down
/// together.
///
/// `start` builds, in order, the event client, the metric registry with its
/// reporters, and the crash sink with its panic hook. Each part is optional
/// and only built when its configuration section is present. `stop` gives
/// every reporter a final flush, releases everything and restores the
/// previous panic hook. Both are idempotent.
pub struct TelemetryLifecycle {
    config: TelemetryConfig,
    crash_transport: Option<Arc<dyn CrashTransport>>,
    event_transport: Option<Arc<dyn EventTransport>>,
    state: LifecycleState,
}

impl TelemetryLifecycle {
    pub const fn new(config: TelemetryConfig) -> Self {
        Self {
            config,
            crash_transport: None,
            event_transport: None,
            state: LifecycleState::Stopped,
        }
    }

    /// Forwards crash reports through `transport` instead of the one implied
    /// by the destination.
    pub fn with_crash_transport(mut self, transport: Arc<dyn CrashTransport>) -> Self {
        self.crash_transport = Some(transport);
        self
    }

    /// Sends events through `transport` instead of connecting to the
    /// configured endpoint.
    pub fn with_event_transport(mut self, transport: Arc<dyn EventTransport>) -> Self {
        self.event_transport = Some(transport);
        self
    }

    pub const fn config(&self) -> &TelemetryConfig {
        &self.config
    }

    pub const fn is_running(&self) -> bool {
        matches!(self.state, LifecycleState::Running(_))
    }

    const fn running(&self) -> Option<&RunningState> {
        match &self.state {
            LifecycleState::Running(running) => Some(running),
            LifecycleState::Stopped => None,
        }
    }

    /// Builds and starts everything configured.
    ///
    /// Starting a running lifecycle does nothing. An unreachable event
    /// service only disables events. A configuration error unwinds whatever
    /// was already built and is returned as
    /// [`TelemetryError::StartupFailure`]; the lifecycle stays stopped.
    pub async fn start(&mut self) -> Result<(), TelemetryError> {
        if self.is_running() {
            info!("telemetry already running");
            return Ok(());
        }

        let event_client = match &self.config.events {
            Some(config) => self.build_event_client(config).await,
            None => None,
        };

        let (registry, reporters) = match &self.config.metrics {
            Some(config) => match build_reporters(config, event_client.clone()) {
                Ok((registry, reporters)) => (Some(registry), reporters),
                Err(e) => {
                    unwind(None, event_client.as_deref()).await;
                    return Err(TelemetryError::startup(e));
                }
            },
            None => (None, ReporterSupervisor::default()),
        };

        let crash_sink = match &self.config.crash {
            Some(config) => match self.build_crash_sink(config) {
                Ok(sink) => Some(sink),
                Err(e) => {
                    unwind(Some(&reporters), event_client.as_deref()).await;
                    return Err(TelemetryError::startup(e));
                }
            },
            None => None,
        };
        let hook = crash_sink.clone().map(FailureHookRegistration::install);

        info!(
            events = event_client.is_some(),
            reporters = reporters.len(),
            crash = crash_sink.is_some(),
            "telemetry started"
        );
        self.state = LifecycleState::Running(RunningState {
            registry,
            reporters,
            event_client,
            crash_sink,
            hook,
        });
        Ok(())
    }

    async fn build_event_client(&self, config: &EventsConfig) -> Option<Arc<EventClient>> {
        let client = match &self.event_transport {
            Some(transport) => Some(
                EventClient::with_transport(transport.clone(), config.batch_size, config.ack_timeout())
                    .with_defaults(config.defaults.clone()),
            ),
            None => EventClient::connect(config).await,
        };
        client.map(Arc::new)
    }

    fn build_crash_sink(&self, config: &CrashConfig) -> Result<Arc<CrashSink>, ConfigError> {
        config.validate()?;
        let transport = self.crash_transport.clone().or_else(|| {
            JsonLinesTransport::from_destination(&config.destination)
                .map(|t| Arc::new(t) as Arc<dyn CrashTransport>)
        });
        if transport.is_none() {
            warn!(
                destination = %config.destination,
                "no crash transport for destination, failures will only be logged"
            );
        }
        let sink = CrashSink::new(transport.map(|t| (t, config.destination.clone())))
            .with_environment(config.environment.clone());
        Ok(Arc::new(sink))
    }

    /// Flushes and stops every reporter, closes the registry and the event
    /// client, and uninstalls the panic hook. Errors met on the way are
    /// collected in the summary and forwarded to the crash sink.
    ///
    /// Stopping a stopped lifecycle does nothing.
    pub async fn stop(&mut self) -> StopSummary {
        let LifecycleState::Running(running) =
            std::mem::replace(&mut self.state, LifecycleState::Stopped)
        else {
            debug!("telemetry already stopped");
            return StopSummary::default();
        };

        let reporters = running.reporters.stop_all().await;
        if let Some(registry) = &running.registry {
            registry.close();
        }
        let client = match &running.event_client {
            Some(client) => client.close().await,
            None => CloseReport::new(),
        };
        if !client.is_empty() {
            warn!(errors = %client, "event client closed with errors");
        }

        let mut captured = 0;
        if let Some(sink) = &running.crash_sink {
            for collected in reporters.errors.iter().chain(client.iter()) {
                sink.capture(&CrashReport::new(collected.to_string()));
                captured += 1;
            }
        }

        if let Some(hook) = &running.hook {
            hook.uninstall();
        }
        info!(
            flushed = reporters.flushed.len(),
            errors = reporters.errors.len() + client.len(),
            "telemetry stopped"
        );
        StopSummary {
            was_running: true,
            reporters,
            captured,
            client,
        }
    }

    /// Instrumentation handle. Disabled unless metrics are running.
    pub fn metrics(&self) -> Metrics {
        Metrics::new(self.running().and_then(|r| r.registry.clone()))
    }

    /// Event handle. Disabled unless an event client is connected.
    pub fn events(&self) -> Events {
        Events::new(self.running().and_then(|r| r.event_client.clone()))
    }

    pub fn crash_sink(&self) -> Option<Arc<CrashSink>> {
        self.running().and_then(|r| r.crash_sink.clone())
    }

    pub fn registry(&self) -> Option<Arc<MetricRegistry>> {
        self.running().and_then(|r| r.registry.clone())
    }

    /// Current view from the on-demand reporter, if one is configured.
    pub fn exposition(&self) -> Option<String> {
        self.running().and_then(|r| r.reporters.exposition())
    }

    /// Registers one gauge per runtime value as `prefix.<group>.<name>`.
    /// Returns how many gauges were registered; zero while metrics are off.
    pub fn instrument(&self, prefix: &str, sources: &RuntimeSources) -> usize {
        let Some(registry) = self.registry() else {
            debug!(prefix, "metrics disabled, runtime gauges not registered");
            return 0;
        };
        let prefix = MetricAlias::from(prefix);
        let mut registered = 0;
        for (suffix, source) in sources.groups() {
            for name in source.names() {
                let alias = prefix.child(suffix).child(name.as_str());
                let source = source.clone();
                match registry.gauge(alias.clone(), move || source.value(&name).unwrap_or(f64::NAN)) {
                    Ok(_) => registered += 1,
                    Err(e) => warn!(alias = %alias, error = %e, "runtime gauge not registered"),
                }
            }
        }
        info!(prefix = %prefix, gauges = registered, "runtime gauges registered");
        registered
    }
}

impl Drop for TelemetryLifecycle {
    fn drop(&mut self) {
        if self.is_running() {
            warn!("telemetry dropped while running, reporters cancelled without a final flush");
        }
    }
}

fn build_reporters(
    config: &MetricsConfig,
    event_client: Option<Arc<EventClient>>,
) -> Result<(Arc<MetricRegistry>, ReporterSupervisor), ConfigError> {
    let registry = Arc::new(MetricRegistry::new());
    let reporters = ReporterSupervisor::build(config, registry.clone(), event_client)?;
    reporters.start_all();
    Ok((registry, reporters))
}

// Releases a partially started set of resources.
async fn unwind(reporters: Option<&ReporterSupervisor>, event_client: Option<&EventClient>) {
    let mut errors = CollectedErrors::new();
    if let Some(reporters) = reporters {
        errors.extend(reporters.cancel_all().await);
    }
    if let Some(client) = event_client {
        errors.extend(client.close().await);
    }
    if !errors.is_empty() {
        warn!(%errors, "errors while unwinding a failed start");
    }
}
