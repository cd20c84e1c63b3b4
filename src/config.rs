use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

const DEFAULT_HOSTED_ORIGIN: &str = "https://happyplantsclub.base44.app";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read host config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("failed to parse hosted origin: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("hosted origin must use http or https, got {0}")]
    UnsupportedScheme(String),
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    #[error("hosted origin must be a bare origin such as {expected}, got {got}")]
    UnnormalizedOrigin { got: String, expected: String },
}

/// On-disk shape. Every key is optional so a partial file only overrides
/// what it names.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    hosted_origin: Option<String>,
    poll_interval_ms: Option<u64>,
    probe_retry_delay_ms: Option<u64>,
    probe_max_attempts: Option<u32>,
    link_retry_delay_ms: Option<u64>,
    link_max_attempts: Option<u32>,
    relay_initial_delay_ms: Option<u64>,
    relay_retry_delay_ms: Option<u64>,
    relay_max_attempts: Option<u32>,
    request_permission: Option<bool>,
}

/// Deployment constants for the bridge host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostConfig {
    /// ASCII serialization of the hosted page's origin, e.g. `https://app.example`.
    pub hosted_origin: String,
    /// Spacing of bridge readiness polls (link watcher and relay arming).
    pub poll_interval: Duration,
    pub probe_retry_delay: Duration,
    pub probe_max_attempts: u32,
    pub link_retry_delay: Duration,
    pub link_max_attempts: u32,
    pub relay_initial_delay: Duration,
    pub relay_retry_delay: Duration,
    pub relay_max_attempts: u32,
    pub request_permission: bool,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            hosted_origin: DEFAULT_HOSTED_ORIGIN.to_string(),
            poll_interval: Duration::from_millis(500),
            probe_retry_delay: Duration::from_millis(500),
            probe_max_attempts: 20,
            link_retry_delay: Duration::from_millis(1000),
            link_max_attempts: 5,
            relay_initial_delay: Duration::from_millis(2000),
            relay_retry_delay: Duration::from_millis(500),
            relay_max_attempts: 10,
            request_permission: true,
        }
    }
}

impl HostConfig {
    /// Load the config from `config_path`, falling back to defaults when the
    /// path is absent or does not exist.
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let file = match config_path {
            Some(path) if path.exists() => {
                let contents = fs::read_to_string(path)?;
                if contents.trim().is_empty() {
                    ConfigFile::default()
                } else {
                    serde_yaml::from_str(&contents)?
                }
            }
            _ => ConfigFile::default(),
        };

        Self::from_file(file)
    }

    /// Platform config location, e.g. `~/.config/notify-bridge/config.yaml`.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("club", "happyplants", "notify-bridge")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// Replace the hosted origin, normalizing it the same way the loader does.
    pub fn with_hosted_origin(mut self, origin: &str) -> Result<Self, ConfigError> {
        self.hosted_origin = normalize_origin(origin)?;
        Ok(self)
    }

    fn from_file(file: ConfigFile) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let hosted_origin = match file.hosted_origin {
            Some(raw) => normalize_origin(&raw)?,
            None => defaults.hosted_origin,
        };

        let config = Self {
            hosted_origin,
            poll_interval: millis_or(file.poll_interval_ms, defaults.poll_interval),
            probe_retry_delay: millis_or(file.probe_retry_delay_ms, defaults.probe_retry_delay),
            probe_max_attempts: file.probe_max_attempts.unwrap_or(defaults.probe_max_attempts),
            link_retry_delay: millis_or(file.link_retry_delay_ms, defaults.link_retry_delay),
            link_max_attempts: file.link_max_attempts.unwrap_or(defaults.link_max_attempts),
            relay_initial_delay: millis_or(
                file.relay_initial_delay_ms,
                defaults.relay_initial_delay,
            ),
            relay_retry_delay: millis_or(file.relay_retry_delay_ms, defaults.relay_retry_delay),
            relay_max_attempts: file.relay_max_attempts.unwrap_or(defaults.relay_max_attempts),
            request_permission: file.request_permission.unwrap_or(defaults.request_permission),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let expected = normalize_origin(&self.hosted_origin)?;
        if expected != self.hosted_origin {
            return Err(ConfigError::UnnormalizedOrigin {
                got: self.hosted_origin.clone(),
                expected,
            });
        }

        let spacings = [
            ("poll_interval_ms", self.poll_interval),
            ("probe_retry_delay_ms", self.probe_retry_delay),
            ("link_retry_delay_ms", self.link_retry_delay),
            ("relay_retry_delay_ms", self.relay_retry_delay),
        ];
        if let Some((name, _)) = spacings.iter().find(|(_, delay)| delay.is_zero()) {
            return Err(ConfigError::Zero(*name));
        }
        if self.probe_max_attempts == 0 {
            return Err(ConfigError::Zero("probe_max_attempts"));
        }
        if self.link_max_attempts == 0 {
            return Err(ConfigError::Zero("link_max_attempts"));
        }
        if self.relay_max_attempts == 0 {
            return Err(ConfigError::Zero("relay_max_attempts"));
        }
        Ok(())
    }
}

fn millis_or(value: Option<u64>, fallback: Duration) -> Duration {
    value.map(Duration::from_millis).unwrap_or(fallback)
}

fn normalize_origin(raw: &str) -> Result<String, ConfigError> {
    let url = Url::parse(raw.trim())?;
    match url.scheme() {
        "http" | "https" => Ok(url.origin().ascii_serialization()),
        other => Err(ConfigError::UnsupportedScheme(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn loads_default() {
        let config = HostConfig::load(None).unwrap();
        assert_eq!(config, HostConfig::default());
        assert_eq!(config.hosted_origin, "https://happyplantsclub.base44.app");
    }

    #[test]
    fn missing_file_uses_defaults() {
        let config = HostConfig::load(Some(PathBuf::from("/nonexistent/notify.yaml"))).unwrap();
        assert_eq!(config.relay_max_attempts, 10);
    }

    #[test]
    fn loads_partial_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "hosted_origin: https://app.example/some/path\npoll_interval_ms: 250\nlink_max_attempts: 2"
        )
        .unwrap();
        let config = HostConfig::load(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(config.hosted_origin, "https://app.example");
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.link_max_attempts, 2);
        assert_eq!(config.relay_retry_delay, Duration::from_millis(500));
    }

    #[test]
    fn empty_file_uses_defaults() {
        let file = NamedTempFile::new().unwrap();
        let config = HostConfig::load(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(config, HostConfig::default());
    }

    #[test]
    fn overrides_origin_in_code() {
        let config = HostConfig::default()
            .with_hosted_origin("HTTPS://App.Example:443/index.html")
            .unwrap();
        assert_eq!(config.hosted_origin, "https://app.example");
    }

    #[test]
    fn rejects_non_http_origin() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "hosted_origin: file:///tmp/index.html").unwrap();
        let err = HostConfig::load(Some(file.path().to_path_buf())).unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedScheme(_)));
    }

    #[test]
    fn rejects_zero_budget() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "relay_max_attempts: 0").unwrap();
        let err = HostConfig::load(Some(file.path().to_path_buf())).unwrap_err();
        assert!(matches!(err, ConfigError::Zero("relay_max_attempts")));
    }

    #[test]
    fn rejects_zero_retry_spacing() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "link_retry_delay_ms: 0").unwrap();
        let err = HostConfig::load(Some(file.path().to_path_buf())).unwrap_err();
        assert!(matches!(err, ConfigError::Zero("link_retry_delay_ms")));

        let config = HostConfig {
            relay_retry_delay: Duration::ZERO,
            ..HostConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Zero("relay_retry_delay_ms"))
        ));
    }

    #[test]
    fn rejects_unnormalized_origin_in_struct() {
        let config = HostConfig {
            hosted_origin: "https://app.example/".to_string(),
            ..HostConfig::default()
        };
        match config.validate() {
            Err(ConfigError::UnnormalizedOrigin { expected, .. }) => {
                assert_eq!(expected, "https://app.example");
            }
            other => panic!("unexpected result: {other:?}"),
        }

        let config = HostConfig {
            hosted_origin: "https://app.example".to_string(),
            ..HostConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_unknown_keys() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "relays:\n  - wss://relay.example").unwrap();
        assert!(HostConfig::load(Some(file.path().to_path_buf())).is_err());
    }
}
