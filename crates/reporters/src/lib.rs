#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! # Sentinel Reporters
//!
//! Periodic and on-demand export of a [`sentinel_registry::MetricRegistry`].
//! A [`ReporterSupervisor`] turns the `[[metrics.reporters]]` configuration
//! into one [`ReporterHandle`] per entry, starts them together and, on
//! shutdown, gives each one a final flush before stopping it.

mod backend;
pub mod backends;
mod config;
mod handle;
mod supervisor;

pub use backend::{MockReportBackend, ReportBackend};
pub use config::{MetricsConfig, ReporterConfig, ReporterKind, ReporterOptions, ReporterSection};
pub use handle::ReporterHandle;
pub use supervisor::{ReporterSupervisor, StopReport};
