//! Side-by-side runs of the same prompts: one unaudited completion against
//! one full audited session. Results are plain data for JSON output.

use crate::audit::{
    AuditObserver, AuditSession, ConstraintSet, Message, NullObserver, ReasonCode,
};
use crate::config::SessionConfig;
use crate::llm::{Evaluator, Generator};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, Serialize)]
pub struct RawResult {
    pub output: Option<String>,
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TakeoverSummary {
    pub position: usize,
    pub retry_count: u32,
    pub rejected_idea: String,
    pub code: Option<ReasonCode>,
    pub reason: Option<String>,
    pub suggestion: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditedResult {
    pub answer: Option<String>,
    pub committed_ideas: Vec<String>,
    pub takeovers: Vec<TakeoverSummary>,
    pub attempts: u32,
    pub error: Option<String>,
    pub elapsed_ms: u64,
    /// Full conversation log, interventions included.
    pub transcript: Vec<Message>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PromptComparison {
    pub prompt: String,
    pub raw: RawResult,
    pub audited: AuditedResult,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComparisonReport {
    pub started_at: DateTime<Utc>,
    pub generator_model: String,
    pub auditor_model: String,
    pub constraints: Vec<String>,
    pub results: Vec<PromptComparison>,
}

pub struct ComparisonRunner {
    generator: Arc<dyn Generator>,
    evaluator: Arc<dyn Evaluator>,
    config: Arc<SessionConfig>,
    constraints: Arc<ConstraintSet>,
    observer: Arc<dyn AuditObserver>,
}

impl ComparisonRunner {
    pub fn new(
        generator: Arc<dyn Generator>,
        evaluator: Arc<dyn Evaluator>,
        config: Arc<SessionConfig>,
        constraints: Arc<ConstraintSet>,
    ) -> Self {
        Self {
            generator,
            evaluator,
            config,
            constraints,
            observer: Arc::new(NullObserver),
        }
    }

    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn AuditObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Prompts run one after another; within a prompt both modes run
    /// concurrently.
    pub async fn run_all(&self, prompts: &[String]) -> ComparisonReport {
        let started_at = Utc::now();
        let mut results = Vec::with_capacity(prompts.len());
        for (index, prompt) in prompts.iter().enumerate() {
            tracing::info!(prompt = index + 1, total = prompts.len(), "Running comparison");
            results.push(self.run_prompt(prompt).await);
        }

        ComparisonReport {
            started_at,
            generator_model: self.config.generator_model.clone(),
            auditor_model: self.config.auditor_model.clone(),
            constraints: self.constraints.rules().to_vec(),
            results,
        }
    }

    pub async fn run_prompt(&self, prompt: &str) -> PromptComparison {
        let (raw, audited) = tokio::join!(self.run_raw(prompt), self.run_audited(prompt));
        PromptComparison {
            prompt: prompt.to_string(),
            raw,
            audited,
        }
    }

    /// Single completion, no system prompt, no audit.
    async fn run_raw(&self, prompt: &str) -> RawResult {
        let started = Instant::now();
        let result = self
            .evaluator
            .complete(None, prompt, &self.config.generator_model, 0.0)
            .await;
        let elapsed_ms = elapsed_ms(started);

        match result {
            Ok(output) => RawResult {
                output: Some(output),
                error: None,
                elapsed_ms,
            },
            Err(e) => {
                tracing::warn!("Raw completion failed: {e:#}");
                RawResult {
                    output: None,
                    error: Some(crate::llm::sanitize_api_error(&format!("{e:#}"))),
                    elapsed_ms,
                }
            }
        }
    }

    async fn run_audited(&self, prompt: &str) -> AuditedResult {
        let started = Instant::now();
        let mut session = match AuditSession::new(
            Arc::clone(&self.config),
            Arc::clone(&self.generator),
            Arc::clone(&self.evaluator),
        ) {
            Ok(session) => session.with_observer(Arc::clone(&self.observer)),
            Err(e) => {
                return AuditedResult {
                    answer: None,
                    committed_ideas: Vec::new(),
                    takeovers: Vec::new(),
                    attempts: 0,
                    error: Some(e.to_string()),
                    elapsed_ms: elapsed_ms(started),
                    transcript: Vec::new(),
                };
            }
        };

        let outcome = session.run(prompt, Arc::clone(&self.constraints)).await;

        let (answer, committed_ideas, error) = match outcome {
            Ok(answer) => (
                Some(answer.display_text()),
                answer.ideas().map(str::to_string).collect(),
                None,
            ),
            Err(e) => (None, Vec::new(), Some(e.to_string())),
        };

        AuditedResult {
            answer,
            committed_ideas,
            takeovers: session
                .takeovers()
                .iter()
                .map(|record| TakeoverSummary {
                    position: record.position,
                    retry_count: record.retry_count,
                    rejected_idea: record.failed_idea.text().to_string(),
                    code: record.verdict.code,
                    reason: record.verdict.reason.clone(),
                    suggestion: record.verdict.suggestion.clone(),
                })
                .collect(),
            attempts: session.attempts(),
            error,
            elapsed_ms: elapsed_ms(started),
            transcript: session.log().messages().to_vec(),
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
