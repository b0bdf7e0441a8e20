//! Process-runtime gauges.
//!
//! A [`RuntimeSource`] publishes a fixed set of named values. The lifecycle
//! registers one gauge per name under `prefix.<group>.<name>` for each of the
//! five groups in [`RuntimeSources`].

use std::{collections::BTreeMap, fs, sync::Arc};

pub const ATTRIBUTES: &str = "attributes";
pub const MEMORY: &str = "memory";
pub const FD_USAGE: &str = "fd_usage";
pub const GC: &str = "gc";
pub const THREADS: &str = "threads";

pub trait RuntimeSource: Send + Sync {
    /// Names of the values this source publishes. Read once at registration.
    fn names(&self) -> Vec<String>;

    /// Current value of `name`, or `None` when it cannot be read right now.
    fn value(&self, name: &str) -> Option<f64>;
}

type ValueFn = Arc<dyn Fn() -> f64 + Send + Sync>;

/// A source backed by closures, one per name.
#[derive(Default, Clone)]
pub struct FnSource {
    values: BTreeMap<String, ValueFn>,
}

impl FnSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn() -> f64 + Send + Sync + 'static,
    {
        self.values.insert(name.into(), Arc::new(f));
        self
    }
}

impl RuntimeSource for FnSource {
    fn names(&self) -> Vec<String> {
        self.values.keys().cloned().collect()
    }

    fn value(&self, name: &str) -> Option<f64> {
        self.values.get(name).map(|f| f())
    }
}

/// The five runtime gauge groups. Unset groups register nothing.
#[derive(Default, Clone)]
pub struct RuntimeSources {
    pub attributes: Option<Arc<dyn RuntimeSource>>,
    pub memory: Option<Arc<dyn RuntimeSource>>,
    pub fd_usage: Option<Arc<dyn RuntimeSource>>,
    pub gc: Option<Arc<dyn RuntimeSource>>,
    pub threads: Option<Arc<dyn RuntimeSource>>,
}

impl RuntimeSources {
    /// Sources reading this process's own statistics from `/proc/self`.
    /// Rust has no collector, so the `gc` group stays empty.
    pub fn process() -> Self {
        Self {
            attributes: Some(Arc::new(ProcessAttributes::new())),
            memory: Some(Arc::new(ProcStatus::new(&[("rss_bytes", "VmRSS"), ("virtual_bytes", "VmSize")]))),
            fd_usage: Some(Arc::new(FdUsage)),
            gc: None,
            threads: Some(Arc::new(ProcStatus::new(&[("count", "Threads")]))),
        }
    }

    /// `(group suffix, source)` pairs in registration order.
    pub fn groups(&self) -> Vec<(&'static str, Arc<dyn RuntimeSource>)> {
        [
            (ATTRIBUTES, &self.attributes),
            (MEMORY, &self.memory),
            (FD_USAGE, &self.fd_usage),
            (GC, &self.gc),
            (THREADS, &self.threads),
        ]
        .into_iter()
        .filter_map(|(suffix, source)| source.clone().map(|s| (suffix, s)))
        .collect()
    }
}

struct ProcessAttributes {
    started: std::time::Instant,
}

impl ProcessAttributes {
    fn new() -> Self {
        Self {
            started: std::time::Instant::now(),
        }
    }
}

impl RuntimeSource for ProcessAttributes {
    fn names(&self) -> Vec<String> {
        vec!["pid".to_string(), "uptime_seconds".to_string(), "cpus".to_string()]
    }

    fn value(&self, name: &str) -> Option<f64> {
        match name {
            "pid" => Some(f64::from(std::process::id())),
            "uptime_seconds" => Some(self.started.elapsed().as_secs_f64()),
            "cpus" => std::thread::available_parallelism()
                .ok()
                .and_then(|n| u32::try_from(n.get()).ok())
                .map(f64::from),
            _ => None,
        }
    }
}

/// Reads `/proc/self/status` fields. Sizes reported in kB are scaled to bytes.
struct ProcStatus {
    fields: Vec<(String, String)>,
}

impl ProcStatus {
    fn new(fields: &[(&str, &str)]) -> Self {
        Self {
            fields: fields
                .iter()
                .map(|(name, key)| ((*name).to_string(), (*key).to_string()))
                .collect(),
        }
    }
}

fn status_field(status: &str, key: &str) -> Option<f64> {
    let rest = status
        .lines()
        .find_map(|line| line.strip_prefix(key)?.strip_prefix(':'))?;
    let mut parts = rest.split_whitespace();
    let value: f64 = parts.next()?.parse().ok()?;
    match parts.next() {
        Some("kB") => Some(value * 1024.0),
        _ => Some(value),
    }
}

impl RuntimeSource for ProcStatus {
    fn names(&self) -> Vec<String> {
        self.fields.iter().map(|(name, _)| name.clone()).collect()
    }

    fn value(&self, name: &str) -> Option<f64> {
        let (_, key) = self.fields.iter().find(|(n, _)| n == name)?;
        let status = fs::read_to_string("/proc/self/status").ok()?;
        status_field(&status, key)
    }
}

/// Open descriptors against the soft limit, as `open`, `max` and `ratio`.
struct FdUsage;

impl FdUsage {
    fn open() -> Option<f64> {
        let count = fs::read_dir("/proc/self/fd").ok()?.count();
        u32::try_from(count).ok().map(f64::from)
    }

    fn max() -> Option<f64> {
        let limits = fs::read_to_string("/proc/self/limits").ok()?;
        let line = limits.lines().find(|l| l.starts_with("Max open files"))?;
        line.trim_start_matches("Max open files")
            .split_whitespace()
            .next()?
            .parse()
            .ok()
    }
}

impl RuntimeSource for FdUsage {
    fn names(&self) -> Vec<String> {
        vec!["open".to_string(), "max".to_string(), "ratio".to_string()]
    }

    fn value(&self, name: &str) -> Option<f64> {
        match name {
            "open" => Self::open(),
            "max" => Self::max(),
            "ratio" => {
                let max = Self::max().filter(|m| *m > 0.0)?;
                Some(Self::open()? / max)
            }
            _ => None,
        }
    }
}
