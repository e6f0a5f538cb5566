//! Configuration for the zwbridge binary.
//!
//! A TOML file in the platform config directory, overridden by
//! `ZWBRIDGE_*` environment variables, translated into
//! `zwbridge_core::ControllerConfig`. Also provides [`FileSettings`],
//! the on-disk store for the controller's persisted port.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use zwbridge_core::{ControllerConfig, ControllerSettings, CoreError, SettingsStore};

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("failed to parse {path}: {source}")]
    Deserialization {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config ─────────────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// WebSocket URL of the driver gateway.
    #[serde(default = "default_gateway")]
    pub gateway: String,

    /// Serial port to use when none has been stored yet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,

    /// Seconds between driver config writes while connected. 0 disables.
    #[serde(default = "default_write_config_interval")]
    pub write_config_interval_secs: u64,

    /// How long one-shot commands wait for the network scan.
    #[serde(default = "default_scan_timeout")]
    pub scan_timeout_secs: u64,

    /// Override for the controller state file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gateway: default_gateway(),
            port: None,
            write_config_interval_secs: default_write_config_interval(),
            scan_timeout_secs: default_scan_timeout(),
            settings_path: None,
        }
    }
}

fn default_gateway() -> String {
    "ws://127.0.0.1:3000".into()
}
fn default_write_config_interval() -> u64 {
    60 * 60
}
fn default_scan_timeout() -> u64 {
    60
}

impl Config {
    /// Parse and check the gateway URL.
    pub fn gateway_url(&self) -> Result<Url, ConfigError> {
        parse_gateway(&self.gateway)
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.scan_timeout_secs)
    }

    /// Where the controller's persisted settings live.
    pub fn state_path(&self) -> PathBuf {
        self.settings_path.clone().unwrap_or_else(default_state_path)
    }

    /// Translate into the core's runtime configuration.
    pub fn to_controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            write_config_interval: Duration::from_secs(self.write_config_interval_secs),
            ..ControllerConfig::default()
        }
    }
}

/// Parse a gateway URL, accepting only `ws` and `wss`.
pub fn parse_gateway(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|e| ConfigError::Validation {
        field: "gateway".into(),
        reason: e.to_string(),
    })?;
    match url.scheme() {
        "ws" | "wss" => Ok(url),
        other => Err(ConfigError::Validation {
            field: "gateway".into(),
            reason: format!("expected ws:// or wss://, got {other}://"),
        }),
    }
}

// ── Paths ───────────────────────────────────────────────────────────

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("org", "zwbridge", "zwbridge")
}

fn dirs_fallback(kind: &str) -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(kind);
    p.push("zwbridge");
    p
}

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    project_dirs().map_or_else(
        || dirs_fallback(".config").join("config.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

/// Default location of the controller state file.
pub fn default_state_path() -> PathBuf {
    project_dirs().map_or_else(
        || dirs_fallback(".local/share").join("state.toml"),
        |dirs| dirs.data_dir().join("state.toml"),
    )
}

// ── Loading / saving ────────────────────────────────────────────────

/// Defaults → TOML file at `path` → `ZWBRIDGE_*` environment.
pub fn figment_from(path: &Path) -> Figment {
    Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("ZWBRIDGE_"))
}

/// Load the config from the canonical path plus environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load the config from `path` plus environment. A missing file is fine.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let config: Config = figment_from(path).extract()?;
    config.gateway_url()?;
    Ok(config)
}

/// Load config, returning a default if loading fails.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

/// Serialize config to TOML and write it to `path`.
pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

/// Serialize config to TOML and write it to the canonical path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

// ── FileSettings ────────────────────────────────────────────────────

/// On-disk layout of the state file.
#[derive(Debug, Default, Deserialize, Serialize)]
struct StateFile {
    #[serde(default)]
    controllers: BTreeMap<String, ControllerSettings>,
}

/// [`SettingsStore`] backed by a TOML state file.
///
/// Every save rewrites the whole file; records under other keys are kept.
#[derive(Debug, Clone)]
pub struct FileSettings {
    path: PathBuf,
}

impl FileSettings {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<StateFile, ConfigError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(StateFile::default()),
            Err(e) => return Err(e.into()),
        };
        toml::from_str(&raw).map_err(|source| ConfigError::Deserialization {
            path: self.path.clone(),
            source,
        })
    }

    fn write(&self, state: &StateFile) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, toml::to_string_pretty(state)?)?;
        Ok(())
    }
}

fn settings_error(err: &ConfigError) -> CoreError {
    CoreError::Settings {
        message: err.to_string(),
    }
}

impl SettingsStore for FileSettings {
    fn load(&self, key: &str) -> Result<Option<ControllerSettings>, CoreError> {
        let state = self.read().map_err(|e| settings_error(&e))?;
        Ok(state.controllers.get(key).cloned())
    }

    fn save(&self, key: &str, settings: &ControllerSettings) -> Result<(), CoreError> {
        let mut state = self.read().map_err(|e| settings_error(&e))?;
        state.controllers.insert(key.to_owned(), settings.clone());
        self.write(&state).map_err(|e| settings_error(&e))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.gateway, "ws://127.0.0.1:3000");
        assert_eq!(cfg.write_config_interval_secs, 3600);
        assert_eq!(cfg.scan_timeout(), Duration::from_secs(60));
        assert_eq!(
            cfg.to_controller_config().write_config_interval,
            Duration::from_secs(3600)
        );
    }

    #[test]
    fn gateway_must_be_websocket() {
        assert!(parse_gateway("ws://10.0.0.2:3000").is_ok());
        assert!(parse_gateway("wss://hub.local/zwave").is_ok());
        assert!(matches!(
            parse_gateway("http://10.0.0.2:3000"),
            Err(ConfigError::Validation { .. })
        ));
        assert!(parse_gateway("not a url").is_err());
    }

    #[test]
    fn env_overrides_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                r#"
                    gateway = "ws://10.0.0.2:3000"
                    scan_timeout_secs = 5
                "#,
            )?;
            jail.set_env("ZWBRIDGE_SCAN_TIMEOUT_SECS", "9");
            jail.set_env("ZWBRIDGE_PORT", "/dev/ttyACM0");

            let cfg: Config = figment_from(Path::new("config.toml")).extract()?;
            assert_eq!(cfg.gateway, "ws://10.0.0.2:3000");
            assert_eq!(cfg.scan_timeout_secs, 9);
            assert_eq!(cfg.port.as_deref(), Some("/dev/ttyACM0"));
            assert_eq!(cfg.write_config_interval_secs, 3600);
            Ok(())
        });
    }
}
