//! TOML configuration for the outbreakwatch daemon.
//!
//! Every section has compiled-in defaults, so a missing file or a partial
//! file is always usable. Resolution order: explicit `--config` path, the
//! `OUTBREAKWATCH_CONFIG` environment variable, the system location, then
//! defaults.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub const CONFIG_ENV: &str = "OUTBREAKWATCH_CONFIG";
pub const SYSTEM_CONFIG_PATH: &str = "/etc/outbreakwatch/outbreakwatch.toml";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub sweep: SweepConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// An explicit path must load; the fallbacks only warn.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            let path = PathBuf::from(&env_path);
            match Self::load(&path) {
                Ok(cfg) => return Ok(cfg),
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "{} set but file could not be loaded, trying fallback",
                        CONFIG_ENV
                    );
                }
            }
        }

        let system_path = Path::new(SYSTEM_CONFIG_PATH);
        if system_path.exists() {
            match Self::load(system_path) {
                Ok(cfg) => return Ok(cfg),
                Err(e) => {
                    warn!(
                        path = %system_path.display(),
                        error = %e,
                        "system config file exists but could not be loaded, using defaults"
                    );
                }
            }
        }

        debug!("no config file found, using compiled-in defaults");
        Ok(Self::default())
    }
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address and port for the HTTP API.
    pub bind: String,
    /// Allow any origin (dashboard served from another host).
    pub permissive_cors: bool,
    /// Language used by `/outbreaks/check` when the request names none.
    pub default_language: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
            permissive_cors: true,
            default_language: "en".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("data/outbreakwatch.db"),
        }
    }
}

// ---------------------------------------------------------------------------
// Sweep
// ---------------------------------------------------------------------------

/// Daily detection pass over every district and tracked disease.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    /// Run the sweep from the background scheduler.
    pub enabled: bool,
    /// Six-field cron expression (`sec min hour day month weekday`), UTC.
    pub cron: String,
    /// Diseases checked in every district.
    pub diseases: Vec<String>,
    /// Locale of broadcast messages.
    pub language: String,
    /// Pairs analysed at the same time.
    pub max_concurrency: usize,
    /// Budget for analysing one pair, and separately for its notifier call.
    pub pair_timeout_secs: u64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cron: "0 0 6 * * *".to_string(),
            diseases: ["Dengue", "Malaria", "COVID-19", "Food Poisoning"]
                .iter()
                .map(|d| d.to_string())
                .collect(),
            language: "hi".to_string(),
            max_concurrency: 4,
            pair_timeout_secs: 30,
        }
    }
}

// ---------------------------------------------------------------------------
// Notify
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// Messaging gateway endpoint. Unset means alerts are only logged.
    pub webhook_url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout_secs: 10,
        }
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum tracing level (`trace`, `debug`, `info`, `warn`, `error`).
    /// `RUST_LOG` takes precedence when set.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        let cfg = Config::default();

        assert_eq!(cfg.server.bind, "0.0.0.0:8080");
        assert_eq!(cfg.server.default_language, "en");
        assert_eq!(cfg.storage.db_path, PathBuf::from("data/outbreakwatch.db"));

        assert!(cfg.sweep.enabled);
        assert_eq!(cfg.sweep.cron, "0 0 6 * * *");
        assert_eq!(cfg.sweep.diseases.len(), 4);
        assert_eq!(cfg.sweep.language, "hi");
        assert_eq!(cfg.sweep.max_concurrency, 4);

        assert!(cfg.notify.webhook_url.is_none());
        assert_eq!(cfg.logging.level, "info");
        assert!(!cfg.logging.json);
    }

    #[test]
    fn test_parse_example_toml() {
        let toml_str = r#"
[server]
bind = "127.0.0.1:9000"
permissive_cors = false

[storage]
db_path = "/var/lib/outbreakwatch/watch.db"

[sweep]
enabled = false
cron = "0 30 5 * * *"
diseases = ["Cholera", "Typhoid"]
language = "en"
max_concurrency = 2
pair_timeout_secs = 5

[notify]
webhook_url = "http://gateway.local/send"
timeout_secs = 3

[logging]
level = "debug"
json = true
"#;

        let cfg: Config = toml::from_str(toml_str).unwrap();

        assert_eq!(cfg.server.bind, "127.0.0.1:9000");
        assert!(!cfg.server.permissive_cors);
        assert_eq!(cfg.storage.db_path, PathBuf::from("/var/lib/outbreakwatch/watch.db"));
        assert!(!cfg.sweep.enabled);
        assert_eq!(cfg.sweep.diseases, vec!["Cholera".to_string(), "Typhoid".into()]);
        assert_eq!(cfg.sweep.pair_timeout_secs, 5);
        assert_eq!(cfg.notify.webhook_url.as_deref(), Some("http://gateway.local/send"));
        assert_eq!(cfg.notify.timeout_secs, 3);
        assert!(cfg.logging.json);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let cfg: Config = toml::from_str("[sweep]\nlanguage = \"en\"\n").unwrap();
        assert_eq!(cfg.sweep.language, "en");
        assert_eq!(cfg.sweep.cron, "0 0 6 * * *");
        assert_eq!(cfg.server.bind, "0.0.0.0:8080");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("outbreakwatch.toml");
        std::fs::write(&path, "[server]\nbind = \"0.0.0.0:9999\"\n").unwrap();

        let cfg = Config::resolve(Some(&path)).unwrap();
        assert_eq!(cfg.server.bind, "0.0.0.0:9999");
    }

    #[test]
    fn test_explicit_missing_file_errors() {
        assert!(Config::resolve(Some(Path::new("/nonexistent/outbreakwatch.toml"))).is_err());
    }

    #[test]
    fn test_serialization_roundtrip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let back: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(back.sweep.diseases, cfg.sweep.diseases);
        assert_eq!(back.storage.db_path, cfg.storage.db_path);
    }
}
