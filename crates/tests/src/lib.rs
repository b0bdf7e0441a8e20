#![cfg(test)]

use anyhow::Result;
use sentinel::{EventSink, MetricHolder, TelemetryLifecycle, load_config, logs::init_logging};
use sentinel_events::{
    Ack, Event, EventClient, EventsConfig, SendOutcome, TransportKind, WireEvent, decode_message,
    encode_ack, read_frame, write_frame,
};
use std::{fs, io::Write, panic, path::Path};
use tempfile::TempDir;
use tokio::{
    io::AsyncReadExt,
    net::{TcpListener, UdpSocket},
    sync::mpsc,
    task::JoinHandle,
    time::{Duration, timeout},
};
use tracing::info;

/// Accepts connections and acknowledges every frame, forwarding the decoded
/// events to the returned channel.
async fn spawn_event_server() -> Result<(u16, mpsc::UnboundedReceiver<WireEvent>)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let tx = tx.clone();
            tokio::spawn(async move {
                while let Ok(frame) = read_frame(&mut socket).await {
                    let ack = match decode_message(&frame) {
                        Ok(events) => {
                            for event in events {
                                let _ = tx.send(event);
                            }
                            Ack::ok()
                        }
                        Err(e) => Ack::rejected(e.to_string()),
                    };
                    let Ok(bytes) = encode_ack(&ack) else { break };
                    if write_frame(&mut socket, &bytes).await.is_err() {
                        break;
                    }
                }
            });
        }
    });
    Ok((port, rx))
}

/// Reads one graphite connection to the end.
async fn spawn_graphite_server() -> Result<(u16, JoinHandle<String>)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();
    let handle = tokio::spawn(async move {
        let mut text = String::new();
        if let Ok((mut socket, _)) = listener.accept().await {
            let _ = socket.read_to_string(&mut text).await;
        }
        text
    });
    Ok((port, handle))
}

fn write_config(dir: &Path, text: &str) -> Result<std::path::PathBuf> {
    let path = dir.join("sentinel.toml");
    let mut file = fs::File::create(&path)?;
    file.write_all(text.as_bytes())?;
    Ok(path)
}

fn drain(rx: &mut mpsc::UnboundedReceiver<WireEvent>) -> Vec<WireEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_full_lifecycle_against_live_services() -> Result<()> {
    init_logging("debug");

    let (events_port, mut received) = spawn_event_server().await?;
    let (graphite_port, graphite) = spawn_graphite_server().await?;
    let dir = TempDir::new()?;
    let crash_path = dir.path().join("crashes.jsonl");

    let config_path = write_config(
        dir.path(),
        &format!(
            r#"
            [crash]
            destination = "file://{crash}"
            environment = "integration"

            [[metrics.reporters]]
            kind = "graphite"
            interval = 3600
            host = "127.0.0.1"
            port = {graphite_port}
            prefix = "app"

            [[metrics.reporters]]
            kind = "events"
            interval = 3600

            [events]
            host = "127.0.0.1"
            port = {events_port}
            ack_timeout_ms = 1000

            [events.defaults]
            host = "web-1"
            tags = ["integration"]
            "#,
            crash = crash_path.display(),
        ),
    )?;

    let mut telemetry = TelemetryLifecycle::new(load_config(Some(&config_path))?);
    telemetry.start().await?;
    assert!(telemetry.is_running());

    let metrics = telemetry.metrics();
    metrics.increment("requests");
    metrics.increment("requests");
    metrics.decrement("requests");

    let outcome = telemetry
        .events()
        .send_event(Event::new().service("checkout").metric(12.5).tag("manual"))
        .await;
    assert_eq!(outcome, SendOutcome::Acknowledged);

    let result = panic::catch_unwind(|| panic!("integration panic"));
    assert!(result.is_err());
    assert_eq!(telemetry.crash_sink().map(|s| s.captured()), Some(1));

    let summary = telemetry.stop().await;
    info!(?summary, "telemetry stopped");
    assert!(summary.is_clean());
    assert_eq!(summary.reporters.flushed, vec!["graphite", "events"]);

    let events = drain(&mut received);
    let checkout = events.iter().find(|e| e.service == "checkout").unwrap();
    assert_eq!(checkout.host, "web-1");
    assert_eq!(checkout.metric, Some(12.5));
    assert!(checkout.tags.contains("integration") && checkout.tags.contains("manual"));
    let reported = events.iter().find(|e| e.service == "requests count").unwrap();
    assert_eq!(reported.metric, Some(1.0));

    let graphite_text = timeout(Duration::from_secs(5), graphite).await??;
    assert!(graphite_text.starts_with("app.requests.count 1 "));

    let crashes = fs::read_to_string(&crash_path)?;
    let report: serde_json::Value = serde_json::from_str(crashes.lines().next().unwrap())?;
    assert_eq!(report["message"], "integration panic");
    assert_eq!(report["environment"], "integration");

    assert!(!telemetry.stop().await.was_running);
    Ok(())
}

#[tokio::test]
async fn test_unreachable_event_service_disables_events() -> Result<()> {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        listener.local_addr()?.port()
    };
    let dir = TempDir::new()?;
    let config_path = write_config(
        dir.path(),
        &format!(
            r#"
            [events]
            host = "127.0.0.1"
            port = {port}

            [[metrics.reporters]]
            kind = "exposition"
            "#
        ),
    )?;

    let mut telemetry = TelemetryLifecycle::new(load_config(Some(&config_path))?);
    telemetry.start().await?;

    let outcome = telemetry.events().send_event(Event::new().service("lost")).await;
    assert_eq!(outcome, SendOutcome::Disabled);

    telemetry.metrics().mark("logins", 3);
    let exposition = telemetry.exposition().unwrap();
    assert!(exposition.contains("logins{count} 3"));

    assert!(telemetry.stop().await.is_clean());
    Ok(())
}

#[tokio::test]
async fn test_datagram_batches_arrive_together() -> Result<()> {
    let socket = UdpSocket::bind("127.0.0.1:0").await?;
    let config = EventsConfig {
        host: "127.0.0.1".to_string(),
        port: socket.local_addr()?.port(),
        transport: TransportKind::Datagram,
        batch_size: Some(3),
        ..EventsConfig::default()
    };
    let client = EventClient::connect(&config).await.unwrap();

    for service in ["a", "b"] {
        let outcome = client.send(client.defaults(), &Event::new().service(service)).await;
        assert_eq!(outcome, SendOutcome::Buffered);
    }
    let outcome = client.send(client.defaults(), &Event::new().service("c")).await;
    assert_eq!(outcome, SendOutcome::Acknowledged);

    let mut buf = vec![0u8; 64 * 1024];
    let len = timeout(Duration::from_secs(5), socket.recv(&mut buf)).await??;
    let services: Vec<String> = decode_message(&buf[..len])?
        .into_iter()
        .map(|e| e.service)
        .collect();
    assert_eq!(services, vec!["a", "b", "c"]);

    assert!(client.close().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_runtime_gauges_are_exported() -> Result<()> {
    let mut telemetry = TelemetryLifecycle::new(sentinel::TelemetryConfig::from_toml(
        r#"
        [[metrics.reporters]]
        kind = "exposition"
        "#,
    )?);
    telemetry.start().await?;

    let registered = telemetry.instrument("proc", &sentinel::RuntimeSources::process());
    assert!(registered > 0);
    let registry = telemetry.registry().unwrap();
    assert!(
        registry
            .aliases()
            .iter()
            .any(|alias| alias.to_string() == "proc.attributes.pid")
    );
    assert!(telemetry.exposition().unwrap().contains("proc.attributes.pid{value}"));

    telemetry.stop().await;
    assert_eq!(telemetry.instrument("proc", &sentinel::RuntimeSources::process()), 0);
    Ok(())
}
