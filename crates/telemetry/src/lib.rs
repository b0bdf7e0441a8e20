#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! # Sentinel
//!
//! Process-wide telemetry behind one start/stop contract. A
//! [`TelemetryLifecycle`] owns a metric registry with its periodic
//! reporters, a client for a push-based event-monitoring service and a crash
//! sink hooked into the panic handler, each built only when configured.
//!
//! Application code instruments itself through the [`MetricHolder`] and
//! [`EventSink`] handles, which keep working as no-ops when the matching
//! feature is disabled.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sentinel::{EventSink, MetricHolder, TelemetryLifecycle, load_config};
//! use sentinel_events::Event;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     sentinel::logs::init_logging("info");
//!
//!     let config = load_config(None)?;
//!     let mut telemetry = TelemetryLifecycle::new(config);
//!     telemetry.start().await?;
//!
//!     let metrics = telemetry.metrics();
//!     metrics.increment("jobs.accepted");
//!     let rows = metrics.time_sync("jobs.duration", || 42);
//!
//!     telemetry
//!         .events()
//!         .send_event(Event::new().service("jobs").metric(f64::from(rows)))
//!         .await;
//!
//!     let summary = telemetry.stop().await;
//!     if !summary.is_clean() {
//!         tracing::warn!("telemetry stopped with errors");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! Loaded by [`load_config`] from `~/.sentinel/config.toml` (or an explicit
//! path) and `SENTINEL_*` environment variables:
//!
//! ```toml
//! [crash]
//! destination = "file:///var/log/app/crashes.jsonl"
//! environment = "production"
//!
//! [[metrics.reporters]]
//! kind = "graphite"
//! interval = 10
//! host = "graphite.local"
//!
//! [events]
//! host = "riemann.local"
//! batch_size = 50
//! ```

mod config;
mod holder;
mod lifecycle;
pub mod logs;
pub mod runtime;

pub use config::{ENV_PREFIX, TelemetryConfig, default_config_path, load_config};
pub use holder::{EventSink, Events, MetricHolder, Metrics, MockEventSink};
pub use lifecycle::{StopSummary, TelemetryLifecycle};
pub use runtime::{FnSource, RuntimeSource, RuntimeSources};
pub use sentinel_errors::{
    CaptureError, CollectedError, CollectedErrors, ConfigError, TelemetryError, TransportError,
};
