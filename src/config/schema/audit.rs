use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Bounds and tuning for the speculative auditing loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Failed audits tolerated at one reasoning position before escalation.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Takeovers tolerated across the whole session.
    #[serde(default = "default_max_takeovers")]
    pub max_takeovers: u32,
    /// Restarts after a truncated or broken generation stream.
    #[serde(default = "default_max_stream_restarts")]
    pub max_stream_restarts: u32,
    /// Re-asks when the auditor answers outside the verdict protocol.
    #[serde(default = "default_max_protocol_retries")]
    pub max_protocol_retries: u32,
    #[serde(default = "default_chunk_timeout_ms")]
    pub chunk_timeout_ms: u64,
    #[serde(default = "default_audit_timeout_ms")]
    pub audit_timeout_ms: u64,
    #[serde(default)]
    pub base_temperature: f64,
    #[serde(default = "default_temperature_step")]
    pub temperature_step: f64,
    #[serde(default = "default_max_temperature")]
    pub max_temperature: f64,
    #[serde(default = "default_auditor_temperature")]
    pub auditor_temperature: f64,
    #[serde(default = "default_true")]
    pub speculative_prefetch: bool,
    #[serde(default = "default_max_lookahead_chunks")]
    pub max_lookahead_chunks: usize,
    /// Committed assistant messages shown to the auditor as context.
    #[serde(default = "default_auditor_history_window")]
    pub auditor_history_window: usize,
}

fn default_max_retries() -> u32 {
    3
}

fn default_max_takeovers() -> u32 {
    100
}

fn default_max_stream_restarts() -> u32 {
    2
}

fn default_max_protocol_retries() -> u32 {
    2
}

fn default_chunk_timeout_ms() -> u64 {
    60_000
}

fn default_audit_timeout_ms() -> u64 {
    30_000
}

fn default_temperature_step() -> f64 {
    0.1
}

fn default_max_temperature() -> f64 {
    1.0
}

fn default_auditor_temperature() -> f64 {
    0.1
}

fn default_true() -> bool {
    true
}

fn default_max_lookahead_chunks() -> usize {
    64
}

fn default_auditor_history_window() -> usize {
    6
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            max_takeovers: default_max_takeovers(),
            max_stream_restarts: default_max_stream_restarts(),
            max_protocol_retries: default_max_protocol_retries(),
            chunk_timeout_ms: default_chunk_timeout_ms(),
            audit_timeout_ms: default_audit_timeout_ms(),
            base_temperature: 0.0,
            temperature_step: default_temperature_step(),
            max_temperature: default_max_temperature(),
            auditor_temperature: default_auditor_temperature(),
            speculative_prefetch: true,
            max_lookahead_chunks: default_max_lookahead_chunks(),
            auditor_history_window: default_auditor_history_window(),
        }
    }
}

impl AuditConfig {
    pub fn chunk_timeout(&self) -> Duration {
        Duration::from_millis(self.chunk_timeout_ms)
    }

    pub fn audit_timeout(&self) -> Duration {
        Duration::from_millis(self.audit_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_timeout_ms == 0 || self.audit_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "audit timeouts must be greater than zero".into(),
            ));
        }

        for (field, value) in [
            ("base_temperature", self.base_temperature),
            ("max_temperature", self.max_temperature),
            ("auditor_temperature", self.auditor_temperature),
        ] {
            if !(0.0..=2.0).contains(&value) {
                return Err(ConfigError::Validation(format!(
                    "audit.{field} must be within 0.0..=2.0 (got {value})"
                )));
            }
        }

        if self.temperature_step < 0.0 {
            return Err(ConfigError::Validation(
                "audit.temperature_step must not be negative".into(),
            ));
        }

        if self.max_temperature < self.base_temperature {
            return Err(ConfigError::Validation(
                "audit.max_temperature must not be below audit.base_temperature".into(),
            ));
        }

        if self.max_takeovers == 0 {
            return Err(ConfigError::Validation(
                "audit.max_takeovers must be at least 1".into(),
            ));
        }

        Ok(())
    }
}
