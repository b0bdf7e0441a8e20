use anyhow::Error as AnyhowError;
use std::{fmt, time::Duration};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error("starting telemetry: {0}")]
    StartupFailure(Box<TelemetryError>),
    #[error(transparent)]
    Other(#[from] AnyhowError),
}

impl TelemetryError {
    pub fn startup(cause: impl Into<Self>) -> Self {
        Self::StartupFailure(Box::new(cause.into()))
    }

    /// Returns the configuration error at the root of this error, looking
    /// through [`TelemetryError::StartupFailure`] wrappers.
    pub fn config_error(&self) -> Option<&ConfigError> {
        match self {
            Self::Config(e) => Some(e),
            Self::StartupFailure(inner) => inner.config_error(),
            _ => None,
        }
    }
}

// Fatal at construction time, surfaced to the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unsupported reporter kind: {0}")]
    UnsupportedReporterKind(String),
    #[error("reporter {0} requires an event client but none is configured")]
    MissingEventClient(String),
    #[error("invalid metric kind: {0}")]
    InvalidMetricKind(String),
    #[error("gauge {0} requires a snapshot function")]
    GaugeFunctionRequired(String),
    #[error("metric {alias} is already bound as a {existing}, requested {requested}")]
    MetricKindMismatch {
        alias: String,
        existing: String,
        requested: String,
    },
    #[error("reporter {0} requires a positive interval")]
    InvalidInterval(String),
    #[error("reporter {reporter}: invalid option {option}: {reason}")]
    InvalidOption {
        reporter: String,
        option: String,
        reason: String,
    },
    #[error("loading configuration: {0}")]
    Load(String),
}

// Caught and logged where it happens; degrades the affected feature.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("connecting to {endpoint}: {reason}")]
    Connect { endpoint: String, reason: String },
    #[error("transport io: {0}")]
    Io(String),
    #[error("encoding: {0}")]
    Encode(String),
    #[error("rejected by server: {0}")]
    Rejected(String),
    #[error("no acknowledgment within {0:?}")]
    Timeout(Duration),
    #[error("transport is closed")]
    Closed,
}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

// Never re-raised.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("forwarding crash report to {destination}: {reason}")]
    Forward { destination: String, reason: String },
}

/// One error swallowed on a best-effort path, tagged with the component it
/// came from.
#[derive(Debug)]
pub struct CollectedError {
    pub source: String,
    pub error: TelemetryError,
}

impl fmt::Display for CollectedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.source, self.error)
    }
}

/// Errors gathered from close/stop paths instead of being raised one by one.
#[derive(Debug, Default)]
pub struct CollectedErrors {
    entries: Vec<CollectedError>,
}

impl CollectedErrors {
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, source: impl Into<String>, error: impl Into<TelemetryError>) {
        self.entries.push(CollectedError {
            source: source.into(),
            error: error.into(),
        });
    }

    pub fn extend(&mut self, other: Self) {
        self.entries.extend(other.entries);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CollectedError> {
        self.entries.iter()
    }

    pub fn sources(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.source.as_str()).collect()
    }
}

impl IntoIterator for CollectedErrors {
    type Item = CollectedError;
    type IntoIter = std::vec::IntoIter<CollectedError>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a CollectedErrors {
    type Item = &'a CollectedError;
    type IntoIter = std::slice::Iter<'a, CollectedError>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl fmt::Display for CollectedErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.entries.is_empty() {
            return f.write_str("no errors");
        }
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}", entry)?;
        }
        Ok(())
    }
}
