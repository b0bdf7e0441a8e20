use async_trait::async_trait;
use parking_lot::RwLock;
use sentinel_errors::TransportError;
use sentinel_registry::{MetricRegistry, RegistrySnapshot};
use std::{fmt::Write as _, sync::Arc};

use crate::backend::ReportBackend;

/// Serves the registry to a management endpoint on demand, one
/// `alias{field} value` line per instrument field.
pub struct ExpositionBackend {
    registry: Arc<MetricRegistry>,
    last_report: RwLock<String>,
}

impl ExpositionBackend {
    pub fn new(registry: Arc<MetricRegistry>) -> Self {
        Self {
            registry,
            last_report: RwLock::new(String::new()),
        }
    }

    /// The view captured by the most recent flush.
    pub fn last_report(&self) -> String {
        self.last_report.read().clone()
    }
}

pub fn render_exposition(snapshot: &RegistrySnapshot) -> String {
    let mut text = String::new();
    for (alias, field, value) in snapshot.flatten() {
        let _ = writeln!(text, "{}{{{}}} {}", alias, field, value);
    }
    text
}

#[async_trait]
impl ReportBackend for ExpositionBackend {
    fn name(&self) -> String {
        "exposition".to_string()
    }

    async fn report(&self, snapshot: &RegistrySnapshot) -> Result<(), TransportError> {
        *self.last_report.write() = render_exposition(snapshot);
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.last_report.write().clear();
        Ok(())
    }

    fn expose(&self) -> Option<String> {
        Some(render_exposition(&self.registry.snapshot()))
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_expose_reads_live_registry() {
        let registry = Arc::new(MetricRegistry::new());
        let backend = ExpositionBackend::new(registry.clone());

        registry.increment("hits", 1).unwrap();
        assert_eq!(backend.expose().as_deref(), Some("hits{count} 1\n"));

        registry.increment("hits", 1).unwrap();
        assert_eq!(backend.expose().as_deref(), Some("hits{count} 2\n"));
    }

    #[tokio::test]
    async fn test_flush_refreshes_cached_view() {
        let registry = Arc::new(MetricRegistry::new());
        let backend = ExpositionBackend::new(registry.clone());
        registry.gauge("pool.size", || 4.0).unwrap();

        assert!(backend.last_report().is_empty());
        backend.report(&registry.snapshot()).await.unwrap();
        assert_eq!(backend.last_report(), "pool.size{value} 4\n");

        backend.close().await.unwrap();
        assert!(backend.last_report().is_empty());
    }
}
