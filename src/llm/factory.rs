use super::compatible::OpenAiCompatibleProvider;
use super::reliable::ReliableProvider;
use crate::config::ProviderConfig;
use std::sync::Arc;

/// Resolve the API key for a provider from config and environment variables.
///
/// Resolution order:
/// 1. Explicitly configured key (trimmed, filtered if empty)
/// 2. Provider-specific environment variable (e.g. `OPENROUTER_API_KEY`)
/// 3. Generic fallback variables (`THINKTWICE_API_KEY`, `API_KEY`)
pub fn resolve_api_key(name: &str, explicit_api_key: Option<&str>) -> Option<String> {
    if let Some(key) = explicit_api_key.map(str::trim).filter(|k| !k.is_empty()) {
        return Some(key.to_string());
    }

    let provider_env_candidates: &[&str] = match name {
        "openrouter" => &["OPENROUTER_API_KEY"],
        "openai" => &["OPENAI_API_KEY"],
        "deepseek" => &["DEEPSEEK_API_KEY"],
        "groq" => &["GROQ_API_KEY"],
        "mistral" => &["MISTRAL_API_KEY"],
        "together" | "together-ai" => &["TOGETHER_API_KEY"],
        _ => &[],
    };

    provider_env_candidates
        .iter()
        .chain(["THINKTWICE_API_KEY", "API_KEY"].iter())
        .find_map(|env_var| {
            std::env::var(env_var)
                .ok()
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        })
}

/// Build the retrying provider that backs both generator and auditor.
pub fn create_resilient_provider(config: &ProviderConfig) -> Arc<ReliableProvider> {
    let api_key = resolve_api_key(&config.name, config.api_key.as_deref());
    let provider_config = ProviderConfig {
        api_key,
        ..config.clone()
    };
    let primary = OpenAiCompatibleProvider::from_config(&provider_config);

    Arc::new(ReliableProvider::new(
        config.name.clone(),
        Box::new(primary),
        config.max_transport_retries,
        config.base_backoff_ms,
    ))
}
