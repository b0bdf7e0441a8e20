#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! # Sentinel Crash
//!
//! Capture of uncaught failures. A [`CrashSink`] logs every failure and
//! forwards it through an optional [`CrashTransport`];
//! [`FailureHookRegistration`] routes panics into a sink for as long as the
//! registration lives.

mod config;
mod hook;
mod report;
mod sink;
mod transport;

pub use config::{CrashConfig, TlsConfig};
pub use hook::FailureHookRegistration;
pub use report::CrashReport;
pub use sink::{CaptureOutcome, CrashSink};
pub use transport::{CrashTransport, JsonLinesTransport, MockCrashTransport};
