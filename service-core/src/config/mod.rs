use crate::error::AppError;
use config::{Config as Cfg, File};
use serde::Deserialize;

/// Ambient fragment shared by every crate in the workspace — service
/// identity and the log level, not the domain-specific `AaaConfig`.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_service_name() -> String {
    "aaa-service".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    pub fn load() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let config = Cfg::builder()
            .add_source(File::with_name("configuration").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Reads an environment variable with a default, the way the teacher's
    /// auth-service config layer does — required in production, defaulted
    /// elsewhere.
    pub fn get_env(key: &str, default: &str, is_prod: bool) -> Result<String, AppError> {
        match std::env::var(key) {
            Ok(val) if !val.is_empty() => Ok(val),
            _ if is_prod => Err(AppError::ConfigError(anyhow::anyhow!(
                "missing required environment variable {key} in production"
            ))),
            _ => Ok(default.to_string()),
        }
    }
}
