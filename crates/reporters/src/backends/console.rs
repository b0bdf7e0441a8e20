use async_trait::async_trait;
use parking_lot::Mutex;
use sentinel_errors::TransportError;
use sentinel_events::utils::epoch_seconds;
use sentinel_registry::RegistrySnapshot;
use std::{
    fmt::Write as _,
    io::{self, Write},
};

use crate::backend::ReportBackend;

/// Writes a human-readable report, one block per instrument.
pub struct ConsoleBackend {
    out: Mutex<Box<dyn Write + Send>>,
}

impl ConsoleBackend {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    pub fn new(out: impl Write + Send + 'static) -> Self {
        Self {
            out: Mutex::new(Box::new(out)),
        }
    }
}

pub(crate) fn render(snapshot: &RegistrySnapshot, timestamp: i64) -> String {
    let mut text = String::new();
    let _ = writeln!(text, "=== {} ({} metrics) ===", timestamp, snapshot.len());
    for (alias, instrument) in snapshot {
        let _ = writeln!(text, "{}", alias);
        for (field, value) in instrument.fields() {
            let _ = writeln!(text, "  {:>10} = {}", field, value);
        }
    }
    text
}

#[async_trait]
impl ReportBackend for ConsoleBackend {
    fn name(&self) -> String {
        "console".to_string()
    }

    async fn report(&self, snapshot: &RegistrySnapshot) -> Result<(), TransportError> {
        let text = render(snapshot, epoch_seconds());
        let mut out = self.out.lock();
        out.write_all(text.as_bytes())?;
        out.flush()?;
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.out.lock().flush()?;
        Ok(())
    }
}
