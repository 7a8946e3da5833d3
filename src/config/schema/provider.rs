use serde::{Deserialize, Serialize};

/// Connection settings for the OpenAI-compatible endpoint that serves both
/// the generator and the auditor model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_provider_name")]
    pub name: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_generator_model")]
    pub generator_model: String,
    #[serde(default = "default_auditor_model")]
    pub auditor_model: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_transport_retries")]
    pub max_transport_retries: u32,
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,
}

fn default_provider_name() -> String {
    "openrouter".into()
}

fn default_base_url() -> String {
    "https://openrouter.ai/api/v1".into()
}

fn default_generator_model() -> String {
    "deepseek/deepseek-v3.2".into()
}

fn default_auditor_model() -> String {
    "anthropic/claude-haiku-4.5".into()
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_max_transport_retries() -> u32 {
    2
}

fn default_base_backoff_ms() -> u64 {
    500
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: default_provider_name(),
            base_url: default_base_url(),
            api_key: None,
            generator_model: default_generator_model(),
            auditor_model: default_auditor_model(),
            request_timeout_secs: default_request_timeout_secs(),
            max_transport_retries: default_max_transport_retries(),
            base_backoff_ms: default_base_backoff_ms(),
        }
    }
}

impl ProviderConfig {
    /// A configured key counts only when it is plausibly real.
    pub fn has_api_key(&self) -> bool {
        self.api_key
            .as_deref()
            .is_some_and(|key| key.trim().len() > 5)
    }
}
