use sentinel_errors::ConfigError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::{DurationSeconds, serde_as};
use std::{collections::BTreeMap, fmt, str::FromStr, time::Duration};

/// Backend-specific settings of one reporter.
pub type ReporterOptions = BTreeMap<String, Value>;

/// The `[metrics]` section: reporters in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub reporters: Vec<ReporterSection>,
}

/// One `[[metrics.reporters]]` entry as written in configuration, before the
/// kind has been checked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReporterSection {
    pub kind: String,
    /// Seconds between exports.
    #[serde(default)]
    pub interval: Option<u64>,
    #[serde(flatten)]
    pub options: ReporterOptions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReporterKind {
    /// Human-readable report on stdout.
    Console,
    /// Rendered on demand for a management endpoint. Has no interval.
    Exposition,
    /// Graphite plaintext protocol over TCP.
    Graphite,
    /// One event per instrument field through the shared event client.
    Events,
}

impl ReporterKind {
    pub const ALL: [Self; 4] = [Self::Console, Self::Exposition, Self::Graphite, Self::Events];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Console => "console",
            Self::Exposition => "exposition",
            Self::Graphite => "graphite",
            Self::Events => "events",
        }
    }

    /// Whether this kind exports on a schedule.
    pub const fn is_periodic(&self) -> bool {
        !matches!(self, Self::Exposition)
    }
}

impl fmt::Display for ReporterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReporterKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == name)
            .ok_or_else(|| ConfigError::UnsupportedReporterKind(s.to_string()))
    }
}

/// A validated reporter definition.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReporterConfig {
    pub kind: ReporterKind,
    #[serde_as(as = "Option<DurationSeconds<u64>>")]
    #[serde(default)]
    pub interval: Option<Duration>,
    #[serde(flatten)]
    pub options: ReporterOptions,
}

impl ReporterConfig {
    pub const fn new(kind: ReporterKind, interval: Option<Duration>) -> Self {
        Self {
            kind,
            interval,
            options: BTreeMap::new(),
        }
    }

    pub fn periodic(kind: ReporterKind, interval: Duration) -> Self {
        Self::new(kind, Some(interval))
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Checks that periodic kinds carry a positive interval.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.kind.is_periodic() && self.interval.is_none_or(|i| i.is_zero()) {
            return Err(ConfigError::InvalidInterval(self.kind.to_string()));
        }
        Ok(())
    }

    fn invalid(&self, option: &str, reason: impl Into<String>) -> ConfigError {
        ConfigError::InvalidOption {
            reporter: self.kind.to_string(),
            option: option.to_string(),
            reason: reason.into(),
        }
    }

    pub fn option_str(&self, key: &str) -> Result<Option<String>, ConfigError> {
        match self.options.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(Value::Number(n)) => Ok(Some(n.to_string())),
            Some(other) => Err(self.invalid(key, format!("expected a string, got {}", other))),
        }
    }

    pub fn option_u16(&self, key: &str) -> Result<Option<u16>, ConfigError> {
        match self.options.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => n
                .as_u64()
                .and_then(|n| u16::try_from(n).ok())
                .map(Some)
                .ok_or_else(|| self.invalid(key, format!("{} is out of range", n))),
            Some(Value::String(s)) => s
                .trim()
                .parse()
                .map(Some)
                .map_err(|e| self.invalid(key, format!("{}: {}", s, e))),
            Some(other) => Err(self.invalid(key, format!("expected a port, got {}", other))),
        }
    }

    pub fn option_f32(&self, key: &str) -> Result<Option<f32>, ConfigError> {
        match self.options.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => n
                .as_f64()
                .map(|n| Some(n as f32))
                .ok_or_else(|| self.invalid(key, format!("{} is not a number", n))),
            Some(Value::String(s)) => s
                .trim()
                .parse()
                .map(Some)
                .map_err(|e| self.invalid(key, format!("{}: {}", s, e))),
            Some(other) => Err(self.invalid(key, format!("expected a number, got {}", other))),
        }
    }

    /// Accepts a list of strings or a single comma-separated string.
    pub fn option_strings(&self, key: &str) -> Result<Vec<String>, ConfigError> {
        match self.options.get(key) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::String(s)) => Ok(s
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ToString::to_string)
                .collect()),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s.clone()),
                    other => Err(self.invalid(key, format!("expected strings, got {}", other))),
                })
                .collect(),
            Some(other) => Err(self.invalid(key, format!("expected a list, got {}", other))),
        }
    }
}

impl TryFrom<&ReporterSection> for ReporterConfig {
    type Error = ConfigError;

    fn try_from(section: &ReporterSection) -> Result<Self, Self::Error> {
        let kind: ReporterKind = section.kind.parse()?;
        let interval = match (kind.is_periodic(), section.interval) {
            (false, _) => None,
            (true, Some(0) | None) => return Err(ConfigError::InvalidInterval(kind.to_string())),
            (true, Some(secs)) => Some(Duration::from_secs(secs)),
        };
        Ok(Self {
            kind,
            interval,
            options: section.options.clone(),
        })
    }
}

impl MetricsConfig {
    /// Converts every section, failing on the first invalid one.
    pub fn reporter_configs(&self) -> Result<Vec<ReporterConfig>, ConfigError> {
        self.reporters.iter().map(ReporterConfig::try_from).collect()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use serde_json::json;

    fn section(value: Value) -> ReporterSection {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!("Graphite".parse::<ReporterKind>().unwrap(), ReporterKind::Graphite);
        assert_eq!(" events ".parse::<ReporterKind>().unwrap(), ReporterKind::Events);
        assert_eq!(
            "carrier-pigeon".parse::<ReporterKind>().unwrap_err(),
            ConfigError::UnsupportedReporterKind("carrier-pigeon".to_string())
        );
    }

    #[test]
    fn test_section_keeps_backend_options() {
        let section = section(json!({
            "kind": "graphite",
            "interval": 10,
            "host": "graphite.local",
            "port": 2003,
            "prefix": "app"
        }));
        let config = ReporterConfig::try_from(&section).unwrap();

        assert_eq!(config.kind, ReporterKind::Graphite);
        assert_eq!(config.interval, Some(Duration::from_secs(10)));
        assert_eq!(config.option_str("host").unwrap().as_deref(), Some("graphite.local"));
        assert_eq!(config.option_u16("port").unwrap(), Some(2003));
        assert_eq!(config.option_str("missing").unwrap(), None);
    }

    #[test]
    fn test_periodic_kind_requires_interval() {
        let missing = section(json!({"kind": "console"}));
        let zero = section(json!({"kind": "console", "interval": 0}));
        for s in [missing, zero] {
            assert_eq!(
                ReporterConfig::try_from(&s).unwrap_err(),
                ConfigError::InvalidInterval("console".to_string())
            );
        }
    }

    #[test]
    fn test_exposition_ignores_interval() {
        let config =
            ReporterConfig::try_from(&section(json!({"kind": "exposition", "interval": 5}))).unwrap();
        assert_eq!(config.interval, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_option_conversions() {
        let config = ReporterConfig::periodic(ReporterKind::Events, Duration::from_secs(1))
            .with_option("port", "2004")
            .with_option("ttl", 12.5)
            .with_option("tags", "a, b,,c")
            .with_option("state", json!(["not", "a", "string"]));

        assert_eq!(config.option_u16("port").unwrap(), Some(2004));
        assert_eq!(config.option_f32("ttl").unwrap(), Some(12.5));
        assert_eq!(config.option_strings("tags").unwrap(), vec!["a", "b", "c"]);
        assert!(matches!(
            config.option_str("state"),
            Err(ConfigError::InvalidOption { .. })
        ));
    }

    #[test]
    fn test_port_out_of_range() {
        let config = ReporterConfig::periodic(ReporterKind::Graphite, Duration::from_secs(1))
            .with_option("port", 70_000);
        assert!(matches!(
            config.option_u16("port"),
            Err(ConfigError::InvalidOption { .. })
        ));
    }

    #[test]
    fn test_metrics_config_preserves_order() {
        let config: MetricsConfig = serde_json::from_value(json!({
            "reporters": [
                {"kind": "events", "interval": 10},
                {"kind": "console", "interval": 60},
                {"kind": "exposition"}
            ]
        }))
        .unwrap();
        let kinds: Vec<_> = config
            .reporter_configs()
            .unwrap()
            .into_iter()
            .map(|c| c.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![ReporterKind::Events, ReporterKind::Console, ReporterKind::Exposition]
        );
    }

    #[test]
    fn test_typed_config_interval_in_seconds() {
        let config: ReporterConfig =
            serde_json::from_value(json!({"kind": "console", "interval": 30})).unwrap();
        assert_eq!(config.interval, Some(Duration::from_secs(30)));
    }
}
