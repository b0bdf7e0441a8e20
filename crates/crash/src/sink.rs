use sentinel_errors::CaptureError;
use std::{
    error::Error,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};
use tracing::{error, warn};

use crate::{report::CrashReport, transport::CrashTransport};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// No transport is bound; the failure was only logged.
    LoggedOnly,
    Forwarded,
    ForwardFailed(CaptureError),
}

/// Records failures locally and, when bound to a transport, forwards them.
/// Capturing never fails the caller.
pub struct CrashSink {
    binding: Option<(Arc<dyn CrashTransport>, String)>,
    environment: Option<String>,
    captured: AtomicUsize,
}

impl CrashSink {
    pub fn new(binding: Option<(Arc<dyn CrashTransport>, String)>) -> Self {
        Self {
            binding,
            environment: None,
            captured: AtomicUsize::new(0),
        }
    }

    pub fn disabled() -> Self {
        Self::new(None)
    }

    pub fn with_environment(mut self, environment: Option<String>) -> Self {
        self.environment = environment;
        self
    }

    pub fn destination(&self) -> Option<&str> {
        self.binding.as_ref().map(|(_, destination)| destination.as_str())
    }

    /// Number of failures captured so far.
    pub fn captured(&self) -> usize {
        self.captured.load(Ordering::Acquire)
    }

    pub fn capture(&self, report: &CrashReport) -> CaptureOutcome {
        self.captured.fetch_add(1, Ordering::AcqRel);
        error!(
            message = %report.message,
            location = report.location.as_deref().unwrap_or("unknown"),
            thread = report.thread.as_deref().unwrap_or("unnamed"),
            "captured failure"
        );

        let Some((transport, destination)) = &self.binding else {
            return CaptureOutcome::LoggedOnly;
        };
        let report = report
            .clone()
            .with_environment(report.environment.clone().or_else(|| self.environment.clone()))
            .with_destination(destination.as_str());
        match transport.forward(destination, &report) {
            Ok(()) => CaptureOutcome::Forwarded,
            Err(e) => {
                warn!(%destination, error = %e, "forwarding crash report failed");
                CaptureOutcome::ForwardFailed(e)
            }
        }
    }

    pub fn capture_error(&self, error: &(dyn Error + 'static)) -> CaptureOutcome {
        self.capture(&CrashReport::from_error(error))
    }
}
