use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// Markers the generator wraps reasoning steps and the final answer in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelimiterConfig {
    #[serde(default = "default_idea_open")]
    pub idea_open: String,
    #[serde(default = "default_idea_close")]
    pub idea_close: String,
    #[serde(default = "default_answer_open")]
    pub answer_open: String,
    #[serde(default = "default_answer_close")]
    pub answer_close: String,
}

fn default_idea_open() -> String {
    "<idea>".into()
}

fn default_idea_close() -> String {
    "</idea>".into()
}

fn default_answer_open() -> String {
    "<final_answer>".into()
}

fn default_answer_close() -> String {
    "</final_answer>".into()
}

impl Default for DelimiterConfig {
    fn default() -> Self {
        Self {
            idea_open: default_idea_open(),
            idea_close: default_idea_close(),
            answer_open: default_answer_open(),
            answer_close: default_answer_close(),
        }
    }
}

impl DelimiterConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("idea_open", &self.idea_open),
            ("idea_close", &self.idea_close),
            ("answer_open", &self.answer_open),
            ("answer_close", &self.answer_close),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "delimiters.{field} must not be empty"
                )));
            }
        }

        if self.idea_open == self.idea_close || self.answer_open == self.answer_close {
            return Err(ConfigError::Validation(
                "opening and closing delimiters must differ".into(),
            ));
        }

        // Both opening markers are scanned for at once outside a block.
        if self.idea_open.starts_with(&self.answer_open)
            || self.answer_open.starts_with(&self.idea_open)
        {
            return Err(ConfigError::Validation(format!(
                "delimiters `{}` and `{}` are ambiguous",
                self.idea_open, self.answer_open
            )));
        }

        Ok(())
    }

    /// Wraps an idea body the way the generator is asked to write it.
    pub fn wrap_idea(&self, body: &str) -> String {
        format!("{}{body}{}", self.idea_open, self.idea_close)
    }

    pub fn wrap_answer(&self, body: &str) -> String {
        format!("{}{body}{}", self.answer_open, self.answer_close)
    }
}
