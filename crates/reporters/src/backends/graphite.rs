use async_trait::async_trait;
use sentinel_errors::{ConfigError, TransportError};
use sentinel_events::utils::epoch_seconds;
use sentinel_registry::{MetricAlias, RegistrySnapshot};
use std::{fmt::Write as _, time::Duration};
use tokio::{
    io::AsyncWriteExt,
    net::TcpStream,
    sync::Mutex,
};
use tracing::{debug, warn};

use crate::{backend::ReportBackend, config::ReporterConfig};

pub const DEFAULT_GRAPHITE_PORT: u16 = 2003;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Pushes `prefix.alias.field value timestamp` lines to a Graphite carbon
/// receiver. The connection is opened lazily and dropped after any failure.
pub struct GraphiteBackend {
    endpoint: String,
    prefix: MetricAlias,
    write_timeout: Duration,
    stream: Mutex<Option<TcpStream>>,
}

impl GraphiteBackend {
    pub fn new(host: &str, port: u16, prefix: impl Into<MetricAlias>) -> Self {
        Self {
            endpoint: format!("{}:{}", host, port),
            prefix: prefix.into(),
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            stream: Mutex::new(None),
        }
    }

    /// Bounds each report's write to the receiver.
    pub const fn with_write_timeout(mut self, write_timeout: Duration) -> Self {
        self.write_timeout = write_timeout;
        self
    }

    /// Options: `host` (default `localhost`), `port` (default 2003), `prefix`,
    /// `write_timeout` in seconds (default 5).
    pub fn from_config(config: &ReporterConfig) -> Result<Self, ConfigError> {
        let host = config
            .option_str("host")?
            .unwrap_or_else(|| "localhost".to_string());
        let port = config.option_u16("port")?.unwrap_or(DEFAULT_GRAPHITE_PORT);
        let prefix = config.option_str("prefix")?.unwrap_or_default();
        let write_timeout = config
            .option_f32("write_timeout")?
            .filter(|secs| secs.is_finite() && *secs > 0.0)
            .map_or(DEFAULT_WRITE_TIMEOUT, Duration::from_secs_f32);
        Ok(Self::new(&host, port, prefix).with_write_timeout(write_timeout))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn connect(&self) -> Result<TcpStream, TransportError> {
        let connect_error = |reason: String| TransportError::Connect {
            endpoint: self.endpoint.clone(),
            reason,
        };
        match tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(&self.endpoint)).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(e)) => Err(connect_error(e.to_string())),
            Err(_) => Err(connect_error(format!("timed out after {:?}", CONNECT_TIMEOUT))),
        }
    }
}

pub(crate) fn render_plaintext(prefix: &MetricAlias, snapshot: &RegistrySnapshot, timestamp: i64) -> String {
    let mut text = String::new();
    for (alias, field, value) in snapshot.flatten() {
        let path = alias.prefixed(prefix).child(field);
        if value.is_finite() {
            let _ = writeln!(text, "{} {} {}", path, value, timestamp);
        }
    }
    text
}

#[async_trait]
impl ReportBackend for GraphiteBackend {
    fn name(&self) -> String {
        "graphite".to_string()
    }

    async fn report(&self, snapshot: &RegistrySnapshot) -> Result<(), TransportError> {
        let text = render_plaintext(&self.prefix, snapshot, epoch_seconds());
        if text.is_empty() {
            return Ok(());
        }

        let mut slot = self.stream.lock().await;
        let mut stream = match slot.take() {
            Some(stream) => stream,
            None => {
                debug!(endpoint = %self.endpoint, "connecting to graphite");
                self.connect().await?
            }
        };
        let write = async {
            stream.write_all(text.as_bytes()).await?;
            stream.flush().await
        };
        // On any failure the stream is dropped and the next report reconnects.
        match tokio::time::timeout(self.write_timeout, write).await {
            Ok(Ok(())) => {
                *slot = Some(stream);
                Ok(())
            }
            Ok(Err(e)) => Err(e.into()),
            Err(_) => {
                warn!(endpoint = %self.endpoint, timeout = ?self.write_timeout, "graphite receiver stalled");
                Err(TransportError::Timeout(self.write_timeout))
            }
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        if let Some(mut stream) = self.stream.lock().await.take() {
            stream.shutdown().await?;
        }
        Ok(())
    }
}
