use parking_lot::Mutex;
use sentinel_errors::{CollectedErrors, TransportError};
use serde::{Deserialize, Serialize};
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use tracing::{debug, info, warn};

use crate::{
    event::{Event, EventDefaults, WireEvent},
    transport::{DatagramTransport, EventTransport, StreamTransport, TransportKind},
};

pub const DEFAULT_EVENTS_PORT: u16 = 5555;
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_millis(100);

/// Errors swallowed while closing an [`EventClient`].
pub type CloseReport = CollectedErrors;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    pub host: String,
    pub port: u16,
    pub transport: TransportKind,
    /// Buffer this many events and send them as one batch. Unset or zero
    /// sends every event on its own.
    pub batch_size: Option<usize>,
    pub ack_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    pub defaults: EventDefaults,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_EVENTS_PORT,
            transport: TransportKind::Stream,
            batch_size: None,
            ack_timeout_ms: 100,
            connect_timeout_ms: 1000,
            defaults: EventDefaults::default(),
        }
    }
}

impl EventsConfig {
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub const fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// What happened to an event handed to [`EventClient::send`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// The service acknowledged the batch containing the event.
    Acknowledged,
    /// The event is waiting in the batch buffer.
    Buffered,
    /// No acknowledgment arrived within the ack timeout.
    TimedOut,
    Failed(TransportError),
    /// No event client is configured.
    Disabled,
}

impl SendOutcome {
    pub const fn is_acknowledged(&self) -> bool {
        matches!(self, Self::Acknowledged)
    }
}

pub struct EventClient {
    transport: Arc<dyn EventTransport>,
    batch_size: Option<usize>,
    ack_timeout: Duration,
    defaults: EventDefaults,
    buffer: Mutex<Vec<WireEvent>>,
    closed: AtomicBool,
}

impl EventClient {
    /// Connects the configured transport. A failed connection is logged and
    /// yields `None`, which callers treat as event sending being disabled.
    pub async fn connect(config: &EventsConfig) -> Option<Self> {
        let endpoint = config.endpoint();
        let transport: Result<Arc<dyn EventTransport>, TransportError> = match config.transport {
            TransportKind::Stream => StreamTransport::connect(endpoint.clone(), config.connect_timeout())
                .await
                .map(|t| Arc::new(t) as Arc<dyn EventTransport>),
            TransportKind::Datagram => DatagramTransport::connect(endpoint.clone())
                .await
                .map(|t| Arc::new(t) as Arc<dyn EventTransport>),
        };

        match transport {
            Ok(transport) => {
                info!(%endpoint, transport = %config.transport, "event client connected");
                Some(
                    Self::with_transport(transport, config.batch_size, config.ack_timeout())
                        .with_defaults(config.defaults.clone()),
                )
            }
            Err(e) => {
                warn!(%endpoint, error = %e, "event client unavailable, event sending disabled");
                None
            }
        }
    }

    pub fn with_transport(
        transport: Arc<dyn EventTransport>,
        batch_size: Option<usize>,
        ack_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            batch_size: batch_size.filter(|size| *size > 1),
            ack_timeout,
            defaults: EventDefaults::default(),
            buffer: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Sets the defaults that callers without their own should merge over.
    pub fn with_defaults(mut self, defaults: EventDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub const fn defaults(&self) -> &EventDefaults {
        &self.defaults
    }

    pub const fn ack_timeout(&self) -> Duration {
        self.ack_timeout
    }

    pub fn buffered(&self) -> usize {
        self.buffer.lock().len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Merges `event` over `defaults` and sends it, waiting at most the ack
    /// timeout. Failures are logged and reported in the outcome.
    pub async fn send(&self, defaults: &EventDefaults, event: &Event) -> SendOutcome {
        if self.is_closed() {
            debug!("dropping event sent after close");
            return SendOutcome::Failed(TransportError::Closed);
        }
        let wire = event.merge(defaults);

        let Some(batch_size) = self.batch_size else {
            return self.dispatch(vec![wire]).await;
        };

        let ready = {
            let mut buffer = self.buffer.lock();
            buffer.push(wire);
            (buffer.len() >= batch_size).then(|| std::mem::take(&mut *buffer))
        };
        match ready {
            Some(batch) => self.dispatch(batch).await,
            None => SendOutcome::Buffered,
        }
    }

    /// Merges every event over `defaults` and sends them as one batch under a
    /// single ack timeout, bypassing the buffer. Returns `None` for an empty
    /// slice.
    pub async fn send_batch(&self, defaults: &EventDefaults, events: &[Event]) -> Option<SendOutcome> {
        if events.is_empty() {
            return None;
        }
        if self.is_closed() {
            debug!(events = events.len(), "dropping batch sent after close");
            return Some(SendOutcome::Failed(TransportError::Closed));
        }
        let batch = events.iter().map(|event| event.merge(defaults)).collect();
        Some(self.dispatch(batch).await)
    }

    /// Sends whatever is buffered. Returns `None` when the buffer was empty.
    pub async fn flush(&self) -> Option<SendOutcome> {
        let batch = std::mem::take(&mut *self.buffer.lock());
        if batch.is_empty() {
            return None;
        }
        Some(self.dispatch(batch).await)
    }

    /// Flushes and releases the transport. Later calls do nothing.
    pub async fn close(&self) -> CloseReport {
        let mut report = CloseReport::new();
        if self.closed.swap(true, Ordering::AcqRel) {
            return report;
        }

        match self.flush().await {
            Some(SendOutcome::Failed(e)) => report.push("events.flush", e),
            Some(SendOutcome::TimedOut) => {
                report.push("events.flush", TransportError::Timeout(self.ack_timeout));
            }
            _ => {}
        }

        match tokio::time::timeout(self.ack_timeout, self.transport.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(error = %e, "closing event transport");
                report.push("events.close", e);
            }
            Err(_) => {
                warn!(timeout = ?self.ack_timeout, "closing event transport timed out");
                report.push("events.close", TransportError::Timeout(self.ack_timeout));
            }
        }
        info!(errors = report.len(), "event client closed");
        report
    }

    async fn dispatch(&self, batch: Vec<WireEvent>) -> SendOutcome {
        let size = batch.len();
        match tokio::time::timeout(self.ack_timeout, self.transport.send(&batch)).await {
            Ok(Ok(())) => SendOutcome::Acknowledged,
            Ok(Err(e)) => {
                warn!(error = %e, events = size, "sending events");
                SendOutcome::Failed(e)
            }
            Err(_) => {
                warn!(timeout = ?self.ack_timeout, events = size, "no acknowledgment for events");
                SendOutcome::TimedOut
            }
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::transport::{Ack, MockEventTransport, decode_message, encode_ack, read_frame, write_frame};
    use async_trait::async_trait;
    use std::time::Instant;
    use tokio::net::TcpListener;

    struct SlowTransport {
        delay: Duration,
    }

    #[async_trait]
    impl EventTransport for SlowTransport {
        async fn send(&self, _events: &[WireEvent]) -> Result<(), TransportError> {
            tokio::time::sleep(self.delay).await;
            Ok(())
        }

        async fn close(&self) -> Result<(), TransportError> {
            Ok(())
        }
    }

    fn client(mock: MockEventTransport, batch_size: Option<usize>) -> EventClient {
        EventClient::with_transport(Arc::new(mock), batch_size, DEFAULT_ACK_TIMEOUT)
    }

    #[tokio::test]
    async fn test_unbatched_send_is_acknowledged() {
        let mut mock = MockEventTransport::new();
        mock.expect_send()
            .withf(|events| events.len() == 1 && events[0].service == "svc")
            .times(1)
            .returning(|_| Ok(()));

        let client = client(mock, None);
        let outcome = client
            .send(&EventDefaults::default(), &Event::new().service("svc"))
            .await;
        assert_eq!(outcome, SendOutcome::Acknowledged);
    }

    #[tokio::test]
    async fn test_send_returns_within_ack_timeout() {
        let client = EventClient::with_transport(
            Arc::new(SlowTransport {
                delay: Duration::from_secs(5),
            }),
            None,
            DEFAULT_ACK_TIMEOUT,
        );

        let started = Instant::now();
        let outcome = client
            .send(&EventDefaults::default(), &Event::new())
            .await;
        let elapsed = started.elapsed();

        assert_eq!(outcome, SendOutcome::TimedOut);
        assert!(elapsed >= Duration::from_millis(100));
        assert!(elapsed < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_batch_waits_once_for_a_stalled_service() {
        let client = EventClient::with_transport(
            Arc::new(SlowTransport {
                delay: Duration::from_secs(5),
            }),
            None,
            Duration::from_millis(100),
        );
        let events: Vec<Event> = (0..500).map(|i| Event::new().service(format!("svc {}", i))).collect();

        let started = Instant::now();
        let outcome = client.send_batch(&EventDefaults::default(), &events).await;
        assert_eq!(outcome, Some(SendOutcome::TimedOut));
        assert!(started.elapsed() < Duration::from_secs(2));

        assert_eq!(client.send_batch(&EventDefaults::default(), &[]).await, None);
        client.close().await;
        assert_eq!(
            client.send_batch(&EventDefaults::default(), &events).await,
            Some(SendOutcome::Failed(TransportError::Closed))
        );
    }

    #[tokio::test]
    async fn test_transport_failure_is_reported_not_raised() {
        let mut mock = MockEventTransport::new();
        mock.expect_send()
            .returning(|_| Err(TransportError::Io("broken pipe".to_string())));

        let client = client(mock, None);
        let outcome = client.send(&EventDefaults::default(), &Event::new()).await;
        assert_eq!(
            outcome,
            SendOutcome::Failed(TransportError::Io("broken pipe".to_string()))
        );
    }

    #[tokio::test]
    async fn test_batch_is_held_until_full() {
        let mut mock = MockEventTransport::new();
        mock.expect_send()
            .withf(|events| events.len() == 3)
            .times(1)
            .returning(|_| Ok(()));

        let client = client(mock, Some(3));
        let defaults = EventDefaults::default();
        assert_eq!(client.send(&defaults, &Event::new()).await, SendOutcome::Buffered);
        assert_eq!(client.send(&defaults, &Event::new()).await, SendOutcome::Buffered);
        assert_eq!(client.buffered(), 2);
        assert_eq!(
            client.send(&defaults, &Event::new()).await,
            SendOutcome::Acknowledged
        );
        assert_eq!(client.buffered(), 0);
    }

    #[tokio::test]
    async fn test_flush_sends_partial_batch() {
        let mut mock = MockEventTransport::new();
        mock.expect_send()
            .withf(|events| events.len() == 2)
            .times(1)
            .returning(|_| Ok(()));

        let client = client(mock, Some(10));
        let defaults = EventDefaults::default();
        client.send(&defaults, &Event::new()).await;
        client.send(&defaults, &Event::new()).await;

        assert_eq!(client.flush().await, Some(SendOutcome::Acknowledged));
        assert_eq!(client.flush().await, None);
    }

    #[tokio::test]
    async fn test_close_flushes_and_swallows_errors() {
        let mut mock = MockEventTransport::new();
        mock.expect_send()
            .times(1)
            .returning(|_| Err(TransportError::Rejected("full".to_string())));
        mock.expect_close()
            .times(1)
            .returning(|| Err(TransportError::Io("reset".to_string())));

        let client = client(mock, Some(5));
        client.send(&EventDefaults::default(), &Event::new()).await;

        let report = client.close().await;
        assert_eq!(report.sources(), vec!["events.flush", "events.close"]);
        assert!(client.close().await.is_empty());
        assert_eq!(
            client.send(&EventDefaults::default(), &Event::new()).await,
            SendOutcome::Failed(TransportError::Closed)
        );
    }

    #[tokio::test]
    async fn test_connect_failure_disables_client() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let config = EventsConfig {
            host: "127.0.0.1".to_string(),
            port,
            ..EventsConfig::default()
        };
        assert!(EventClient::connect(&config).await.is_none());
    }

    #[tokio::test]
    async fn test_connected_client_merges_defaults_on_the_wire() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let frame = read_frame(&mut socket).await.unwrap();
            write_frame(&mut socket, &encode_ack(&Ack::ok()).unwrap())
                .await
                .unwrap();
            decode_message(&frame).unwrap()
        });

        let config = EventsConfig {
            host: "127.0.0.1".to_string(),
            port,
            ack_timeout_ms: 1000,
            defaults: EventDefaults {
                host: Some("h1".to_string()),
                tags: ["x".to_string()].into_iter().collect(),
                ..EventDefaults::default()
            },
            ..EventsConfig::default()
        };
        let client = EventClient::connect(&config).await.unwrap();
        assert_eq!(client.defaults(), &config.defaults);
        let outcome = client
            .send(client.defaults(), &Event::new().service("svc").tag("y"))
            .await;
        assert_eq!(outcome, SendOutcome::Acknowledged);

        let received = server.await.unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].host, "h1");
        assert_eq!(received[0].service, "svc");
        assert_eq!(received[0].tags.len(), 2);
        assert!(client.close().await.is_empty());
    }

    #[test]
    fn test_config_defaults() {
        let config: EventsConfig = serde_json::from_str(r#"{"host": "riemann"}"#).unwrap();
        assert_eq!(config.port, DEFAULT_EVENTS_PORT);
        assert_eq!(config.transport, TransportKind::Stream);
        assert_eq!(config.ack_timeout(), DEFAULT_ACK_TIMEOUT);
        assert_eq!(config.endpoint(), "riemann:5555");
    }
}
