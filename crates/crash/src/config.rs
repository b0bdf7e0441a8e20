use sentinel_errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrashConfig {
    /// Crash-reporting endpoint, e.g. `https://key@crash.example/1` or
    /// `file:///var/log/app/crashes.jsonl`.
    pub destination: String,
    pub environment: Option<String>,
    pub tls: Option<TlsConfig>,
}

/// Certificate material for transports that talk TLS.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    pub ca_path: Option<PathBuf>,
    pub cert_path: Option<PathBuf>,
    pub key_path: Option<PathBuf>,
}

impl CrashConfig {
    pub fn new(destination: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            ..Self::default()
        }
    }

    /// Checks that a destination is set and that configured TLS files exist.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |option: &str, reason: String| ConfigError::InvalidOption {
            reporter: "crash".to_string(),
            option: option.to_string(),
            reason,
        };
        if self.destination.trim().is_empty() {
            return Err(invalid("destination", "must not be empty".to_string()));
        }
        let Some(tls) = &self.tls else {
            return Ok(());
        };
        if tls.cert_path.is_some() != tls.key_path.is_some() {
            return Err(invalid(
                "tls",
                "cert_path and key_path must be set together".to_string(),
            ));
        }
        for (option, path) in [
            ("tls.ca_path", &tls.ca_path),
            ("tls.cert_path", &tls.cert_path),
            ("tls.key_path", &tls.key_path),
        ] {
            if let Some(path) = path {
                if !path.is_file() {
                    return Err(invalid(option, format!("{} is not a file", path.display())));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_destination_is_required() {
        assert!(matches!(
            CrashConfig::default().validate(),
            Err(ConfigError::InvalidOption { option, .. }) if option == "destination"
        ));
        assert!(CrashConfig::new("https://crash.example/1").validate().is_ok());
    }

    #[test]
    fn test_tls_files_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let ca = dir.path().join("ca.pem");
        std::fs::write(&ca, "pem").unwrap();

        let mut config = CrashConfig::new("https://crash.example/1");
        config.tls = Some(TlsConfig {
            ca_path: Some(ca),
            ..TlsConfig::default()
        });
        assert!(config.validate().is_ok());

        config.tls = Some(TlsConfig {
            ca_path: Some(dir.path().join("missing.pem")),
            ..TlsConfig::default()
        });
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidOption { option, .. }) if option == "tls.ca_path"
        ));
    }

    #[test]
    fn test_cert_without_key_is_rejected() {
        let mut config = CrashConfig::new("https://crash.example/1");
        config.tls = Some(TlsConfig {
            cert_path: Some(PathBuf::from("/nonexistent/cert.pem")),
            ..TlsConfig::default()
        });
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidOption { option, .. }) if option == "tls"
        ));
    }
}
