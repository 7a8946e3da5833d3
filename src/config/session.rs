use super::{AuditConfig, Config, DelimiterConfig};

/// Immutable per-session slice of the configuration.
///
/// Built once and shared behind an `Arc`; sessions never read process-wide
/// state, so concurrent sessions cannot interfere with one another.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub generator_model: String,
    pub auditor_model: String,
    pub audit: AuditConfig,
    pub delimiters: DelimiterConfig,
}

impl SessionConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            generator_model: config.provider.generator_model.clone(),
            auditor_model: config.provider.auditor_model.clone(),
            audit: config.audit.clone(),
            delimiters: config.delimiters.clone(),
        }
    }

    /// Same bounds as [`Config::default`], with explicit model ids.
    pub fn with_models(generator_model: impl Into<String>, auditor_model: impl Into<String>) -> Self {
        Self {
            generator_model: generator_model.into(),
            auditor_model: auditor_model.into(),
            audit: AuditConfig::default(),
            delimiters: DelimiterConfig::default(),
        }
    }
}
