use parking_lot::Mutex;
use sentinel_errors::TransportError;
use sentinel_registry::MetricRegistry;
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use tokio::{
    task::JoinHandle,
    time::{Instant, MissedTickBehavior, interval_at},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{backend::ReportBackend, config::ReporterKind};

/// One running export job: a backend plus, for periodic kinds, the task that
/// feeds it a registry snapshot every interval.
pub struct ReporterHandle {
    name: String,
    kind: ReporterKind,
    interval: Option<Duration>,
    backend: Arc<dyn ReportBackend>,
    registry: Arc<MetricRegistry>,
    report_handle: Mutex<Option<JoinHandle<()>>>,
    cancellation_token: CancellationToken,
    started: AtomicBool,
    stopped: AtomicBool,
}

impl ReporterHandle {
    pub fn new(
        kind: ReporterKind,
        interval: Option<Duration>,
        backend: Arc<dyn ReportBackend>,
        registry: Arc<MetricRegistry>,
    ) -> Self {
        Self {
            name: backend.name(),
            kind,
            interval: interval.filter(|i| !i.is_zero()),
            backend,
            registry,
            report_handle: Mutex::new(None),
            cancellation_token: CancellationToken::new(),
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub const fn kind(&self) -> ReporterKind {
        self.kind
    }

    pub const fn interval(&self) -> Option<Duration> {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.started.load(Ordering::Acquire) && !self.is_stopped()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Starts periodic reporting. Must be called within a tokio runtime.
    /// Starting twice, or after `stop`, does nothing.
    pub fn start(&self) {
        if self.is_stopped() {
            warn!(reporter = %self.name, "not restarting a stopped reporter");
            return;
        }
        let mut handle_lock = self.report_handle.lock();
        if self.started.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(period) = self.interval {
            *handle_lock = Some(self.run_reports(period));
        }
        info!(reporter = %self.name, interval = ?self.interval, "reporter started");
    }

    fn run_reports(&self, period: Duration) -> JoinHandle<()> {
        let name = self.name.clone();
        let backend = self.backend.clone();
        let registry = self.registry.clone();
        let cancellation_token = self.cancellation_token.clone();

        tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancellation_token.cancelled() => {
                        debug!(reporter = %name, "periodic reporting cancelled");
                        break;
                    }
                    _ = interval.tick() => {
                        let snapshot = registry.snapshot();
                        tokio::select! {
                            _ = cancellation_token.cancelled() => break,
                            result = backend.report(&snapshot) => {
                                if let Err(e) = result {
                                    warn!(reporter = %name, error = %e, "periodic report failed");
                                }
                            }
                        }
                    }
                }
            }
        })
    }

    /// Exports the current registry once, immediately. Skipped once stopped.
    pub async fn flush(&self) -> Result<(), TransportError> {
        if self.is_stopped() {
            return Ok(());
        }
        let snapshot = self.registry.snapshot();
        self.backend.report(&snapshot).await
    }

    /// Cancels periodic reporting, waits for the task and closes the
    /// backend. Later calls do nothing.
    pub async fn stop(&self) -> Result<(), TransportError> {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.cancellation_token.cancel();

        let handle = self.report_handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(reporter = %self.name, error = %e, "reporter task ended abnormally");
            }
        }

        let result = self.backend.close().await;
        info!(reporter = %self.name, "reporter stopped");
        result
    }

    /// On-demand rendering for backends that support it.
    pub fn expose(&self) -> Option<String> {
        if self.is_stopped() {
            return None;
        }
        self.backend.expose()
    }
}

impl Drop for ReporterHandle {
    fn drop(&mut self) {
        self.cancellation_token.cancel();
    }
}
