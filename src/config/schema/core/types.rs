use super::super::{AuditConfig, DelimiterConfig, ProviderConfig};
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to config.toml - computed at load time, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,

    #[serde(default)]
    pub provider: ProviderConfig,

    #[serde(default)]
    pub audit: AuditConfig,

    #[serde(default)]
    pub delimiters: DelimiterConfig,

    /// Hard rules applied to every session in addition to per-run rules.
    #[serde(default)]
    pub constraints: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config_path: PathBuf::new(),
            provider: ProviderConfig::default(),
            audit: AuditConfig::default(),
            delimiters: DelimiterConfig::default(),
            constraints: Vec::new(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.provider.base_url.trim().is_empty() {
            return Err(ConfigError::Validation(
                "provider.base_url must not be empty".into(),
            ));
        }
        if self.provider.generator_model.trim().is_empty()
            || self.provider.auditor_model.trim().is_empty()
        {
            return Err(ConfigError::Validation(
                "provider.generator_model and provider.auditor_model are required".into(),
            ));
        }
        if self.provider.request_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "provider.request_timeout_secs must be greater than zero".into(),
            ));
        }
        self.audit.validate()?;
        self.delimiters.validate()?;
        Ok(())
    }
}
