use async_trait::async_trait;
use mockall::automock;
use parking_lot::Mutex;
use sentinel_errors::TransportError;
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::{TcpStream, UdpSocket},
};
use tracing::debug;

use crate::event::WireEvent;

/// Frames larger than this are refused when reading.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Delivers batches of resolved events to the monitoring service.
///
/// `send` returns once the service has acknowledged the batch. Callers bound
/// it with their own timeout, so implementations must tolerate being dropped
/// mid-send.
#[automock]
#[async_trait]
pub trait EventTransport: Send + Sync {
    async fn send(&self, events: &[WireEvent]) -> Result<(), TransportError>;
    async fn close(&self) -> Result<(), TransportError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// TCP, length-prefixed frames with an acknowledgment per batch.
    #[default]
    Stream,
    /// UDP, one datagram per batch, no acknowledgment.
    Datagram,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stream => f.write_str("stream"),
            Self::Datagram => f.write_str("datagram"),
        }
    }
}

#[derive(Serialize)]
struct OutboundMessage<'a> {
    events: &'a [WireEvent],
}

#[derive(Deserialize)]
struct InboundMessage {
    events: Vec<WireEvent>,
}

/// Acknowledgment frame sent back by the service for each batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Ack {
    pub const fn ok() -> Self {
        Self {
            ok: true,
            error: None,
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(reason.into()),
        }
    }
}

pub fn encode_message(events: &[WireEvent]) -> Result<Vec<u8>, TransportError> {
    serde_json::to_vec(&OutboundMessage { events })
        .map_err(|e| TransportError::Encode(e.to_string()))
}

pub fn decode_message(bytes: &[u8]) -> Result<Vec<WireEvent>, TransportError> {
    serde_json::from_slice::<InboundMessage>(bytes)
        .map(|message| message.events)
        .map_err(|e| TransportError::Encode(e.to_string()))
}

pub fn encode_ack(ack: &Ack) -> Result<Vec<u8>, TransportError> {
    serde_json::to_vec(ack).map_err(|e| TransportError::Encode(e.to_string()))
}

pub fn decode_ack(bytes: &[u8]) -> Result<Ack, TransportError> {
    serde_json::from_slice(bytes).map_err(|e| TransportError::Encode(e.to_string()))
}

/// Writes `payload` behind a 4-byte big-endian length prefix.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin + Send,
{
    let len = u32::try_from(payload.len())
        .map_err(|_| TransportError::Encode(format!("frame of {} bytes", payload.len())))?;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

pub async fn read_frame<R>(reader: &mut R) -> Result<Vec<u8>, TransportError>
where
    R: AsyncRead + Unpin + Send,
{
    let len = reader.read_u32().await? as usize;
    if len > MAX_FRAME_LEN {
        return Err(TransportError::Io(format!(
            "frame of {} bytes exceeds limit of {}",
            len, MAX_FRAME_LEN
        )));
    }
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(payload)
}

async fn open_stream(endpoint: &str, connect_timeout: Duration) -> Result<TcpStream, TransportError> {
    let connect_error = |reason: String| TransportError::Connect {
        endpoint: endpoint.to_string(),
        reason,
    };
    match tokio::time::timeout(connect_timeout, TcpStream::connect(endpoint)).await {
        Ok(Ok(stream)) => {
            stream.set_nodelay(true).map_err(|e| connect_error(e.to_string()))?;
            Ok(stream)
        }
        Ok(Err(e)) => Err(connect_error(e.to_string())),
        Err(_) => Err(connect_error(format!("timed out after {:?}", connect_timeout))),
    }
}

/// TCP transport. The connection is taken out of its slot for the duration
/// of a send and only put back after a complete exchange, so a send that is
/// dropped half-way leaves the slot empty and the next send reconnects.
pub struct StreamTransport {
    endpoint: String,
    connect_timeout: Duration,
    stream: Mutex<Option<TcpStream>>,
    closed: AtomicBool,
}

impl StreamTransport {
    pub async fn connect(
        endpoint: impl Into<String>,
        connect_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let endpoint = endpoint.into();
        let stream = open_stream(&endpoint, connect_timeout).await?;
        debug!(%endpoint, "event stream connected");
        Ok(Self {
            endpoint,
            connect_timeout,
            stream: Mutex::new(Some(stream)),
            closed: AtomicBool::new(false),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl EventTransport for StreamTransport {
    async fn send(&self, events: &[WireEvent]) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        let payload = encode_message(events)?;

        let existing = self.stream.lock().take();
        let mut stream = match existing {
            Some(stream) => stream,
            None => {
                debug!(endpoint = %self.endpoint, "reconnecting event stream");
                open_stream(&self.endpoint, self.connect_timeout).await?
            }
        };

        write_frame(&mut stream, &payload).await?;
        let ack = decode_ack(&read_frame(&mut stream).await?)?;

        if !self.closed.load(Ordering::Acquire) {
            *self.stream.lock() = Some(stream);
        }

        if ack.ok {
            Ok(())
        } else {
            Err(TransportError::Rejected(ack.error.unwrap_or_default()))
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let stream = self.stream.lock().take();
        if let Some(mut stream) = stream {
            stream.shutdown().await?;
        }
        Ok(())
    }
}

/// UDP transport. A successful write counts as acknowledged.
pub struct DatagramTransport {
    endpoint: String,
    socket: UdpSocket,
    closed: AtomicBool,
}

impl DatagramTransport {
    pub async fn connect(endpoint: impl Into<String>) -> Result<Self, TransportError> {
        let endpoint = endpoint.into();
        let connect_error = |e: std::io::Error| TransportError::Connect {
            endpoint: endpoint.clone(),
            reason: e.to_string(),
        };
        let target = tokio::net::lookup_host(&endpoint)
            .await
            .map_err(connect_error)?
            .next()
            .ok_or_else(|| TransportError::Connect {
                endpoint: endpoint.clone(),
                reason: "no address resolved".to_string(),
            })?;
        let local = if target.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(local).await.map_err(connect_error)?;
        socket.connect(target).await.map_err(connect_error)?;
        debug!(%endpoint, "event datagram socket ready");
        Ok(Self {
            endpoint,
            socket,
            closed: AtomicBool::new(false),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl EventTransport for DatagramTransport {
    async fn send(&self, events: &[WireEvent]) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        let payload = encode_message(events)?;
        self.socket.send(&payload).await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
