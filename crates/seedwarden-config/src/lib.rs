//! Configuration for seedwarden hosts.
//!
//! TOML file + `SEEDWARDEN_` environment overrides, validation, translation
//! to `seedwarden_core::EngineConfig`, and tracing subscriber setup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use seedwarden_core::EngineConfig;

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

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

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub engine: EngineSettings,
    pub logging: LoggingConfig,
}

/// Engine tunables in file-friendly units.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineSettings {
    pub poll_interval_secs: u64,
    pub skip_window_secs: u64,
    pub max_batch_size: usize,
    pub run_timeout_secs: u64,
    pub free_space_cooldown_secs: u64,
    pub min_overlap_percent: f64,
    pub program_concurrency: usize,
    pub processed_retention_secs: u64,
    pub rule_run_retention_secs: u64,
    pub cooldown_retention_secs: u64,
    pub audit_max_age_days: u64,
    pub audit_max_records: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        let d = EngineConfig::default();
        Self {
            poll_interval_secs: d.poll_interval.as_secs(),
            skip_window_secs: d.skip_window.as_secs(),
            max_batch_size: d.max_batch_size,
            run_timeout_secs: d.run_timeout.as_secs(),
            free_space_cooldown_secs: d.free_space_cooldown.as_secs(),
            min_overlap_percent: d.min_overlap_percent,
            program_concurrency: d.program_concurrency,
            processed_retention_secs: d.processed_retention.as_secs(),
            rule_run_retention_secs: d.rule_run_retention.as_secs(),
            cooldown_retention_secs: d.cooldown_retention.as_secs(),
            audit_max_age_days: d.audit_max_age.as_secs() / 86_400,
            audit_max_records: d.audit_max_records,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    #[default]
    Compact,
    Json,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. "info" or "seedwarden_core=debug".
    /// `RUST_LOG` takes precedence when set.
    pub level: String,
    pub format: LogFormat,
    pub with_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: LogFormat::default(),
            with_target: false,
        }
    }
}

// ── Validation / translation ────────────────────────────────────────

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let e = &self.engine;
        if e.poll_interval_secs == 0 {
            return Err(invalid("engine.poll_interval_secs", "must be at least 1"));
        }
        if e.max_batch_size == 0 {
            return Err(invalid("engine.max_batch_size", "must be at least 1"));
        }
        if e.run_timeout_secs == 0 {
            return Err(invalid("engine.run_timeout_secs", "must be at least 1"));
        }
        if !(e.min_overlap_percent > 0.0 && e.min_overlap_percent <= 100.0) {
            return Err(invalid(
                "engine.min_overlap_percent",
                format!("expected a value in (0, 100], got {}", e.min_overlap_percent),
            ));
        }
        if e.program_concurrency == 0 {
            return Err(invalid("engine.program_concurrency", "must be at least 1"));
        }
        if e.audit_max_records == 0 {
            return Err(invalid("engine.audit_max_records", "must be at least 1"));
        }
        EnvFilter::try_new(&self.logging.level)
            .map_err(|err| invalid("logging.level", err.to_string()))?;
        Ok(())
    }

    /// Validate and convert to the engine's runtime configuration.
    pub fn to_engine_config(&self) -> Result<EngineConfig, ConfigError> {
        self.validate()?;
        let e = &self.engine;
        Ok(EngineConfig {
            poll_interval: Duration::from_secs(e.poll_interval_secs),
            skip_window: Duration::from_secs(e.skip_window_secs),
            max_batch_size: e.max_batch_size,
            run_timeout: Duration::from_secs(e.run_timeout_secs),
            free_space_cooldown: Duration::from_secs(e.free_space_cooldown_secs),
            min_overlap_percent: e.min_overlap_percent,
            program_concurrency: e.program_concurrency,
            processed_retention: Duration::from_secs(e.processed_retention_secs),
            rule_run_retention: Duration::from_secs(e.rule_run_retention_secs),
            cooldown_retention: Duration::from_secs(e.cooldown_retention_secs),
            audit_max_age: Duration::from_secs(e.audit_max_age_days.saturating_mul(86_400)),
            audit_max_records: e.audit_max_records,
        })
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("org", "seedwarden", "seedwarden").map_or_else(
        || PathBuf::from(".seedwarden").join("config.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

// ── Config loading ──────────────────────────────────────────────────

/// Load from the canonical path + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Defaults, then the TOML file at `path` (if present), then
/// `SEEDWARDEN_` variables with `__` separating nested keys
/// (`SEEDWARDEN_ENGINE__MAX_BATCH_SIZE=20`).
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    tracing::debug!(path = %path.display(), "loading config");
    let config: Config = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("SEEDWARDEN_").split("__"))
        .extract()?;
    config.validate()?;
    Ok(config)
}

// ── Config saving ───────────────────────────────────────────────────

pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Tracing ─────────────────────────────────────────────────────────

/// Install the global `fmt` subscriber. `RUST_LOG` overrides the
/// configured level.
pub fn init_tracing(cfg: &LoggingConfig) -> Result<(), ConfigError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&cfg.level)
            .map_err(|err| invalid("logging.level", err.to_string()))?,
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(cfg.with_target);
    let installed = match cfg.format {
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|err| invalid("logging", err.to_string()))
}
