use async_trait::async_trait;
use mockall::automock;
use sentinel_errors::TransportError;
use sentinel_registry::RegistrySnapshot;

/// Export target of one reporter.
///
/// Backends receive a detached [`RegistrySnapshot`] per export, so a slow or
/// unreachable backend never holds a lock on the registry.
#[automock]
#[async_trait]
pub trait ReportBackend: Send + Sync {
    fn name(&self) -> String;

    async fn report(&self, snapshot: &RegistrySnapshot) -> Result<(), TransportError>;

    /// Releases connections or other resources held by the backend.
    async fn close(&self) -> Result<(), TransportError>;

    /// Renders the current view on demand. Only on-demand backends answer.
    fn expose(&self) -> Option<String> {
        None
    }
}
