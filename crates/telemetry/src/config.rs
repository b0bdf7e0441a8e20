use anyhow::{Context, Result};
use config::{Config as ConfigSource, Environment, File, FileFormat};
use dirs::home_dir;
use sentinel_crash::CrashConfig;
use sentinel_errors::ConfigError;
use sentinel_events::EventsConfig;
use sentinel_reporters::MetricsConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variables with this prefix override file settings, with `__`
/// between nested keys: `SENTINEL_EVENTS__PORT=5556`.
pub const ENV_PREFIX: &str = "SENTINEL";

/// Each section is optional; an absent section disables that feature.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub crash: Option<CrashConfig>,
    pub metrics: Option<MetricsConfig>,
    pub events: Option<EventsConfig>,
}

impl TelemetryConfig {
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Load(e.to_string()))
    }

    /// True when no section is configured and `start` would do nothing.
    pub const fn is_empty(&self) -> bool {
        self.crash.is_none() && self.metrics.is_none() && self.events.is_none()
    }
}

/// `~/.sentinel/config.toml`, when a home directory is known.
pub fn default_config_path() -> Option<PathBuf> {
    home_dir().map(|home| home.join(".sentinel").join("config.toml"))
}

/// Loads configuration from `path` (or the default path, which may be
/// missing) and then from `SENTINEL_*` environment variables. A `.env` file
/// in the working directory is read first.
pub fn load_config(path: Option<&Path>) -> Result<TelemetryConfig> {
    dotenvy::dotenv().ok();
    load_config_with(path, env_source())
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

fn load_config_with(path: Option<&Path>, env: Environment) -> Result<TelemetryConfig> {
    let mut builder = ConfigSource::builder();
    match path {
        Some(path) => {
            let name = path.to_str().context("config path is not valid UTF-8")?;
            builder = builder.add_source(File::new(name, FileFormat::Toml).required(true));
        }
        None => {
            if let Some(default) = default_config_path().and_then(|p| p.to_str().map(String::from)) {
                debug!(path = %default, "looking for default config");
                builder = builder.add_source(File::new(&default, FileFormat::Toml).required(false));
            }
        }
    }

    let config_source = builder
        .add_source(env)
        .build()
        .context("Failed to build config")?;

    config_source
        .try_deserialize()
        .context("Failed to deserialize telemetry config")
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use sentinel_events::TransportKind;
    use sentinel_reporters::{ReporterKind, backends::GraphiteBackend};
    use std::{io::Write, time::Duration};

    const SAMPLE: &str = r#"
        [crash]
        destination = "https://key@crash.example/1"
        environment = "production"

        [[metrics.reporters]]
        kind = "console"
        interval = 60

        [[metrics.reporters]]
        kind = "graphite"
        interval = 10
        host = "graphite.local"
        port = 2003
        prefix = "app"

        [events]
        host = "riemann.local"
        transport = "datagram"
        batch_size = 50

        [events.defaults]
        service = "app"
        tags = ["prod"]
        ttl = 60.0
    "#;

    #[test]
    fn test_parses_every_section() {
        let config = TelemetryConfig::from_toml(SAMPLE).unwrap();

        let crash = config.crash.unwrap();
        assert_eq!(crash.destination, "https://key@crash.example/1");
        assert_eq!(crash.environment.as_deref(), Some("production"));

        let reporters = config.metrics.unwrap().reporter_configs().unwrap();
        assert_eq!(reporters.len(), 2);
        assert_eq!(reporters[1].interval, Some(Duration::from_secs(10)));
        assert_eq!(reporters[1].option_str("host").unwrap().as_deref(), Some("graphite.local"));

        let events = config.events.unwrap();
        assert_eq!(events.port, 5555);
        assert_eq!(events.transport, TransportKind::Datagram);
        assert_eq!(events.batch_size, Some(50));
        assert_eq!(events.ack_timeout(), Duration::from_millis(100));
        assert_eq!(events.defaults.ttl, Some(60.0));
    }

    #[test]
    fn test_empty_config_disables_everything() {
        let config = TelemetryConfig::from_toml("").unwrap();
        assert!(config.is_empty());
    }

    #[test]
    fn test_malformed_toml_is_a_load_error() {
        assert!(matches!(
            TelemetryConfig::from_toml("[events\nhost ="),
            Err(ConfigError::Load(_))
        ));
    }

    fn sample_file() -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        file
    }

    fn env_with(vars: &[(&str, &str)]) -> Environment {
        let vars: config::Map<String, String> = vars
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        env_source().source(Some(vars))
    }

    #[test]
    fn test_load_from_file_with_env_override() {
        let file = sample_file();
        let env = env_with(&[
            ("SENTINEL_EVENTS__PORT", "6000"),
            ("SENTINEL_EVENTS__ACK_TIMEOUT_MS", "750"),
            ("OTHER_EVENTS__PORT", "7000"),
        ]);

        let events = load_config_with(Some(file.path()), env).unwrap().events.unwrap();
        assert_eq!(events.host, "riemann.local");
        assert_eq!(events.port, 6000);
        assert_eq!(events.ack_timeout_ms, 750);
        assert_eq!(events.ack_timeout(), Duration::from_millis(750));
        assert_eq!(events.batch_size, Some(50));
    }

    #[test]
    fn test_loaded_reporter_options_survive() {
        let file = sample_file();
        let config = load_config_with(Some(file.path()), env_with(&[])).unwrap();

        let reporters = config.metrics.unwrap().reporter_configs().unwrap();
        assert_eq!(reporters.len(), 2);
        let graphite = &reporters[1];
        assert_eq!(graphite.kind, ReporterKind::Graphite);
        assert_eq!(graphite.interval, Some(Duration::from_secs(10)));
        assert_eq!(graphite.option_str("host").unwrap().as_deref(), Some("graphite.local"));
        assert_eq!(graphite.option_u16("port").unwrap(), Some(2003));
        assert_eq!(graphite.option_str("prefix").unwrap().as_deref(), Some("app"));

        let backend = GraphiteBackend::from_config(graphite).unwrap();
        assert_eq!(backend.endpoint(), "graphite.local:2003");
    }

    #[test]
    fn test_missing_explicit_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_config(Some(&dir.path().join("absent.toml"))).is_err());
    }

    #[test]
    fn test_default_path_is_under_home() {
        if let Some(path) = default_config_path() {
            assert!(path.ends_with(".sentinel/config.toml"));
        }
    }
}
