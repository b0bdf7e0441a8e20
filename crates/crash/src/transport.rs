use mockall::automock;
use parking_lot::Mutex;
use sentinel_errors::CaptureError;
use std::{
    fs::{File, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use crate::report::CrashReport;

/// Delivers crash reports to a crash-reporting service.
///
/// Called from inside the panic hook, so implementations are synchronous and
/// must not panic.
#[automock]
pub trait CrashTransport: Send + Sync {
    fn forward(&self, destination: &str, report: &CrashReport) -> Result<(), CaptureError>;
}

/// Appends one JSON document per report to a local file. Used for
/// `file://` destinations.
pub struct JsonLinesTransport {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl JsonLinesTransport {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: Mutex::new(None),
        }
    }

    /// Parses a `file://` destination.
    pub fn from_destination(destination: &str) -> Option<Self> {
        destination
            .strip_prefix("file://")
            .filter(|path| !path.is_empty())
            .map(Self::new)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, line: &[u8]) -> std::io::Result<()> {
        let mut slot = self.file.lock();
        let file = match slot.take() {
            Some(file) => file,
            None => OpenOptions::new().create(true).append(true).open(&self.path)?,
        };
        let file = slot.insert(file);
        file.write_all(line)?;
        file.flush()
    }
}

impl CrashTransport for JsonLinesTransport {
    fn forward(&self, destination: &str, report: &CrashReport) -> Result<(), CaptureError> {
        let forward_error = |reason: String| CaptureError::Forward {
            destination: destination.to_string(),
            reason,
        };
        let mut line = serde_json::to_vec(report).map_err(|e| forward_error(e.to_string()))?;
        line.push(b'\n');
        self.append(&line).map_err(|e| forward_error(e.to_string()))
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_reports_are_appended_as_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crashes.jsonl");
        let destination = format!("file://{}", path.display());
        let transport = JsonLinesTransport::from_destination(&destination).unwrap();

        transport.forward(&destination, &CrashReport::new("first")).unwrap();
        transport.forward(&destination, &CrashReport::new("second")).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let messages: Vec<String> = text
            .lines()
            .map(|line| serde_json::from_str::<CrashReport>(line).unwrap().message)
            .collect();
        assert_eq!(messages, vec!["first", "second"]);
    }

    #[test]
    fn test_only_file_destinations_are_parsed() {
        assert!(JsonLinesTransport::from_destination("https://key@crash.example/1").is_none());
        assert!(JsonLinesTransport::from_destination("file://").is_none());
        assert_eq!(
            JsonLinesTransport::from_destination("file:///tmp/c.jsonl")
                .unwrap()
                .path(),
            Path::new("/tmp/c.jsonl")
        );
    }

    #[test]
    fn test_unwritable_path_is_a_forward_error() {
        let dir = tempfile::tempdir().unwrap();
        let transport = JsonLinesTransport::new(dir.path());
        let result = transport.forward("file://dir", &CrashReport::new("x"));
        assert!(matches!(result, Err(CaptureError::Forward { .. })));
    }
}
