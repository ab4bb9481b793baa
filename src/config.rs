//! Application configuration
//!
//! Defaults come from the embedded `config.toml`; environment variables
//! (optionally loaded from a `.env` file) override them.

use crate::error::AppError;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

const CONFIG_TOML: &str = include_str!("../config.toml");

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    #[serde(default)]
    pub export: ExportConfig,
}

/// Where the answering service lives and how long to wait for it
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub base_url: String,
    pub stream_path: String,
    pub fallback_path: String,
    pub health_path: String,
    pub connect_timeout_secs: u64,
    pub first_frame_timeout_secs: u64,
    pub fallback_timeout_secs: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExportConfig {
    /// Custom export location (None = use default)
    pub directory: Option<PathBuf>,
}

impl ServiceConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn first_frame_timeout(&self) -> Duration {
        Duration::from_secs(self.first_frame_timeout_secs)
    }

    pub fn fallback_timeout(&self) -> Duration {
        Duration::from_secs(self.fallback_timeout_secs)
    }
}

impl Config {
    /// Parse a TOML document and validate it
    pub fn from_toml(contents: &str) -> Result<Self, AppError> {
        let config: Config =
            toml::from_str(contents).map_err(|e| AppError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a key lookup (normally the process environment)
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("ASKSTREAM_BASE_URL") {
            self.service.base_url = url;
        }
        if let Some(secs) = lookup("ASKSTREAM_FIRST_FRAME_TIMEOUT_SECS") {
            self.service.first_frame_timeout_secs = secs.trim().parse().map_err(|_| {
                AppError::Config(format!("Invalid first frame timeout: {secs}"))
            })?;
        }
        if let Some(dir) = lookup("ASKSTREAM_EXPORT_DIR") {
            self.export.directory = Some(PathBuf::from(dir));
        }
        self.validate()
    }

    fn validate(&self) -> Result<(), AppError> {
        let parsed = url::Url::parse(&self.service.base_url)
            .map_err(|e| AppError::Config(format!("Invalid base_url: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(AppError::Config(format!(
                "Unsupported base_url scheme: {}",
                parsed.scheme()
            )));
        }
        let timeouts = [
            ("connect_timeout_secs", self.service.connect_timeout_secs),
            ("first_frame_timeout_secs", self.service.first_frame_timeout_secs),
            ("fallback_timeout_secs", self.service.fallback_timeout_secs),
        ];
        if let Some((name, _)) = timeouts.iter().find(|(_, secs)| *secs == 0) {
            return Err(AppError::Config(format!("{name} must be greater than zero")));
        }
        Ok(())
    }
}

/// Load the embedded configuration, then apply `.env` and environment overrides
pub fn load_config() -> Result<Config, AppError> {
    if let Ok(path) = dotenvy::dotenv() {
        info!("Loaded environment from {:?}", path);
    }
    let mut config = Config::from_toml(CONFIG_TOML)?;
    config.apply_overrides(|key| std::env::var(key).ok())?;
    Ok(config)
}
