use sentinel_errors::{CollectedErrors, ConfigError};
use sentinel_events::EventClient;
use sentinel_registry::MetricRegistry;
use std::sync::Arc;
use tracing::{info, warn};

use crate::{
    backend::ReportBackend,
    backends::{ConsoleBackend, EventsBackend, ExpositionBackend, GraphiteBackend},
    config::{MetricsConfig, ReporterConfig, ReporterKind},
    handle::ReporterHandle,
};

/// Outcome of [`ReporterSupervisor::stop_all`].
#[derive(Debug, Default)]
pub struct StopReport {
    /// Reporters that received their final flush, in order.
    pub flushed: Vec<String>,
    /// Reporters stopped by this call, in order.
    pub stopped: Vec<String>,
    pub errors: CollectedErrors,
}

impl StopReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Owns the reporter handles built from configuration, in declaration order.
#[derive(Default)]
pub struct ReporterSupervisor {
    handles: Vec<ReporterHandle>,
}

impl ReporterSupervisor {
    /// Builds one handle per configured reporter. Nothing is started.
    pub fn build(
        config: &MetricsConfig,
        registry: Arc<MetricRegistry>,
        event_client: Option<Arc<EventClient>>,
    ) -> Result<Self, ConfigError> {
        let configs = config.reporter_configs()?;
        Self::build_from_configs(&configs, registry, event_client)
    }

    pub fn build_from_configs(
        configs: &[ReporterConfig],
        registry: Arc<MetricRegistry>,
        event_client: Option<Arc<EventClient>>,
    ) -> Result<Self, ConfigError> {
        let handles = configs
            .iter()
            .map(|config| {
                config.validate()?;
                let backend = build_backend(config, &registry, event_client.as_ref())?;
                Ok(ReporterHandle::new(
                    config.kind,
                    config.interval,
                    backend,
                    registry.clone(),
                ))
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;
        info!(reporters = handles.len(), "reporters built");
        Ok(Self { handles })
    }

    pub const fn from_handles(handles: Vec<ReporterHandle>) -> Self {
        Self { handles }
    }

    pub fn handles(&self) -> &[ReporterHandle] {
        &self.handles
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn start_all(&self) {
        for handle in &self.handles {
            handle.start();
        }
    }

    /// Gives every handle a final flush and then stops it, continuing past
    /// failures. Handles that are already stopped are skipped.
    pub async fn stop_all(&self) -> StopReport {
        let mut report = StopReport::default();
        for handle in &self.handles {
            if handle.is_stopped() {
                continue;
            }
            let name = handle.name().to_string();

            match handle.flush().await {
                Ok(()) => report.flushed.push(name.clone()),
                Err(e) => {
                    warn!(reporter = %name, error = %e, "final flush failed");
                    report.errors.push(format!("{}.flush", name), e);
                }
            }
            if let Err(e) = handle.stop().await {
                warn!(reporter = %name, error = %e, "stopping reporter failed");
                report.errors.push(format!("{}.stop", name), e);
            }
            report.stopped.push(name);
        }
        report
    }

    /// Stops every handle without a final flush. Used to unwind a partial
    /// start, when nothing worth exporting has been recorded yet.
    pub async fn cancel_all(&self) -> CollectedErrors {
        let mut errors = CollectedErrors::new();
        for handle in &self.handles {
            if let Err(e) = handle.stop().await {
                errors.push(format!("{}.stop", handle.name()), e);
            }
        }
        errors
    }

    /// Renders the first on-demand backend's view, if any.
    pub fn exposition(&self) -> Option<String> {
        self.handles.iter().find_map(ReporterHandle::expose)
    }
}

fn build_backend(
    config: &ReporterConfig,
    registry: &Arc<MetricRegistry>,
    event_client: Option<&Arc<EventClient>>,
) -> Result<Arc<dyn ReportBackend>, ConfigError> {
    let backend: Arc<dyn ReportBackend> = match config.kind {
        ReporterKind::Console => Arc::new(ConsoleBackend::stdout()),
        ReporterKind::Exposition => Arc::new(ExpositionBackend::new(registry.clone())),
        ReporterKind::Graphite => Arc::new(GraphiteBackend::from_config(config)?),
        ReporterKind::Events => {
            let client = event_client
                .cloned()
                .ok_or_else(|| ConfigError::MissingEventClient(config.kind.to_string()))?;
            Arc::new(EventsBackend::from_config(config, client)?)
        }
    };
    Ok(backend)
}
