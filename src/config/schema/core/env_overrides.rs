use super::Config;

impl Config {
    pub fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("THINKTWICE_API_KEY").or_else(|_| std::env::var("API_KEY"))
            && !key.is_empty()
        {
            self.provider.api_key = Some(key);
        }

        if let Ok(base_url) = std::env::var("THINKTWICE_BASE_URL")
            && !base_url.is_empty()
        {
            self.provider.base_url = base_url;
        }

        if let Ok(model) = std::env::var("THINKTWICE_GENERATOR_MODEL")
            && !model.is_empty()
        {
            self.provider.generator_model = model;
        }

        if let Ok(model) = std::env::var("THINKTWICE_AUDITOR_MODEL")
            && !model.is_empty()
        {
            self.provider.auditor_model = model;
        }

        if let Ok(retries) = std::env::var("THINKTWICE_MAX_RETRIES")
            && let Ok(retries) = retries.parse::<u32>()
        {
            self.audit.max_retries = retries;
        }
    }
}
