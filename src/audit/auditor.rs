//! Independent per-idea verification.
//!
//! The auditor runs against its own evaluator and model, sees only the task,
//! the constraints, a short window of accepted steps and the idea under
//! review, and must answer in the tagged verdict format. Anything it cannot
//! parse is retried a bounded number of times and then surfaced; an
//! unreadable verdict never counts as a pass.

use super::constraints::ConstraintSet;
use super::idea::IdeaUnit;
use super::log::{ConversationLog, Message, Role};
use super::prompts::PromptTemplates;
use crate::config::SessionConfig;
use crate::error::{AuditError, TransportError};
use crate::llm::{Evaluator, sanitize_api_error};
use serde::Serialize;
use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Outcome {
    Pass,
    Fail,
}

/// Why a failure verdict was issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ReasonCode {
    /// The auditor judged the idea to break a rule.
    ConstraintViolation,
    /// The auditor did not answer within `audit_timeout_ms`.
    AuditorTimeout,
    /// The generator stalled before completing the idea.
    GenerationTimeout,
}

impl ReasonCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ConstraintViolation => "constraint_violation",
            Self::AuditorTimeout => "auditor_timeout",
            Self::GenerationTimeout => "generation_timeout",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditVerdict {
    pub outcome: Outcome,
    /// Always present on failure.
    pub reason: Option<String>,
    /// `None` for a pass.
    pub code: Option<ReasonCode>,
    /// Byte range into the idea's raw text.
    pub offending_span: Option<Range<usize>>,
    /// Corrected step proposed by the auditor.
    pub suggestion: Option<String>,
}

impl AuditVerdict {
    pub fn pass() -> Self {
        Self {
            outcome: Outcome::Pass,
            reason: None,
            code: None,
            offending_span: None,
            suggestion: None,
        }
    }

    pub fn fail(code: ReasonCode, reason: impl Into<String>) -> Self {
        Self {
            outcome: Outcome::Fail,
            reason: Some(reason.into()),
            code: Some(code),
            offending_span: None,
            suggestion: None,
        }
    }

    pub fn auditor_timeout(timeout: Duration) -> Self {
        Self::fail(
            ReasonCode::AuditorTimeout,
            format!(
                "The auditor did not return a verdict within {}ms, so this step could not be verified.",
                timeout.as_millis()
            ),
        )
    }

    pub fn generation_timeout(timeout: Duration) -> Self {
        Self::fail(
            ReasonCode::GenerationTimeout,
            format!(
                "Generation stalled for {}ms before this step was completed.",
                timeout.as_millis()
            ),
        )
    }

    #[must_use]
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    #[must_use]
    pub fn with_span(mut self, span: Range<usize>) -> Self {
        self.offending_span = Some(span);
        self
    }

    pub fn is_pass(&self) -> bool {
        self.outcome == Outcome::Pass
    }

    pub fn reason_text(&self) -> &str {
        self.reason.as_deref().unwrap_or_default()
    }
}

fn tag_content<'a>(response: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = response.find(&open)? + open.len();
    let end = response[start..].find(&close).map_or(response.len(), |i| start + i);
    Some(response[start..end].trim()).filter(|content| !content.is_empty())
}

/// Parse a tagged verdict. `None` is a protocol violation: no recognizable
/// status, or a failure that does not say why.
pub fn parse_verdict(response: &str, idea: &IdeaUnit) -> Option<AuditVerdict> {
    let status = tag_content(response, "status")?.to_ascii_uppercase();
    match status.as_str() {
        "PASS" | "OK" => Some(AuditVerdict::pass()),
        "FAIL" => {
            let reason = tag_content(response, "reason")?;
            let mut verdict = AuditVerdict::fail(ReasonCode::ConstraintViolation, reason);
            if let Some(quoted) = tag_content(response, "span")
                && let Some(start) = idea.raw_text().find(quoted)
            {
                verdict = verdict.with_span(start..start + quoted.len());
            }
            if let Some(fix) = tag_content(response, "fix") {
                verdict = verdict.with_suggestion(fix);
            }
            Some(verdict)
        }
        _ => None,
    }
}

pub struct Auditor {
    evaluator: Arc<dyn Evaluator>,
    config: Arc<SessionConfig>,
    prompts: Arc<PromptTemplates>,
}

impl Auditor {
    pub fn new(
        evaluator: Arc<dyn Evaluator>,
        config: Arc<SessionConfig>,
        prompts: Arc<PromptTemplates>,
    ) -> Self {
        Self {
            evaluator,
            config,
            prompts,
        }
    }

    pub fn model(&self) -> &str {
        &self.config.auditor_model
    }

    /// Judge one idea. A timeout is a failing verdict, not an error.
    pub async fn evaluate(
        &self,
        idea: &IdeaUnit,
        constraints: &ConstraintSet,
        history: &ConversationLog,
        task: &str,
    ) -> Result<AuditVerdict, AuditError> {
        let audit = &self.config.audit;
        let accepted: Vec<&str> = history
            .recent(Role::Assistant, audit.auditor_history_window)
            .into_iter()
            .map(Message::content)
            .collect();

        let system = self.prompts.auditor_system()?;
        let request = self.prompts.auditor_request(
            task,
            constraints,
            &accepted,
            idea,
            &self.config.delimiters,
        )?;

        let attempts = audit.max_protocol_retries + 1;
        let mut last_response = String::new();

        for attempt in 1..=attempts {
            let call = self.evaluator.complete(
                Some(system.as_str()),
                &request,
                &self.config.auditor_model,
                audit.auditor_temperature,
            );

            let response = match tokio::time::timeout(audit.audit_timeout(), call).await {
                Err(_) => {
                    tracing::warn!(
                        model = self.model(),
                        timeout_ms = audit.audit_timeout_ms,
                        "Auditor timed out; treating as failed verdict"
                    );
                    return Ok(AuditVerdict::auditor_timeout(audit.audit_timeout()));
                }
                Ok(Err(e)) => {
                    return Err(TransportError::from_provider(self.evaluator.name(), &e).into());
                }
                Ok(Ok(response)) => response,
            };

            if let Some(verdict) = parse_verdict(&response, idea) {
                tracing::debug!(
                    outcome = %verdict.outcome,
                    attempt,
                    "Auditor verdict parsed"
                );
                return Ok(verdict);
            }

            tracing::warn!(
                attempt,
                attempts,
                response = %sanitize_api_error(&response),
                "Auditor response violated the verdict protocol"
            );
            last_response = response;
        }

        Err(AuditError::AuditorProtocol {
            attempts,
            last_response: sanitize_api_error(&last_response),
        })
    }
}
