//! Verdict handling: commit on pass, append-only intervention on failure,
//! bounded escalation.
//!
//! ```text
//! Idle ──submit──▶ AwaitingVerdict ──pass──▶ Committing ──▶ Idle
//!   ▲                    │
//!   │                    └──fail──▶ Intervening ──submit──▶ AwaitingVerdict
//!   │                                    │
//!   └────────────── complete ◀───────────┘
//! any failure past a bound ──▶ Escalated (terminal)
//! ```

use super::answer::{FinalAnswer, Segment, SegmentKind};
use super::auditor::AuditVerdict;
use super::constraints::ConstraintSet;
use super::idea::IdeaUnit;
use super::log::{ConversationLog, Message, Origin, Role};
use super::prompts::PromptTemplates;
use crate::config::{AuditConfig, DelimiterConfig, SessionConfig};
use crate::error::{AuditError, EscalationError};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ControllerState {
    Idle,
    AwaitingVerdict { position: usize },
    Committing,
    Intervening,
    Escalated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EscalationReason {
    /// One reasoning position failed more than `max_retries` times.
    PositionRetriesExceeded,
    /// The session as a whole exceeded `max_takeovers`.
    TotalTakeoversExceeded,
}

impl EscalationReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PositionRetriesExceeded => "position_retries_exceeded",
            Self::TotalTakeoversExceeded => "total_takeovers_exceeded",
        }
    }
}

/// One rejected idea and the correction it produced.
#[derive(Debug, Clone, Serialize)]
pub struct TakeoverRecord {
    pub failed_idea: IdeaUnit,
    pub verdict: AuditVerdict,
    pub position: usize,
    pub retry_count: u32,
    pub intervention_message: Message,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Committed { position: usize },
    Intervened { position: usize, retry_count: u32 },
}

/// What an intervention re-anchors the generator to.
#[derive(Debug, Clone, Copy)]
pub struct Anchor<'a> {
    pub task: &'a str,
    pub constraints: &'a ConstraintSet,
}

pub struct TakeoverController {
    state: ControllerState,
    /// Index of the next idea to be committed.
    position: usize,
    retries_at_position: u32,
    total_takeovers: u32,
    limits: AuditConfig,
    delimiters: DelimiterConfig,
    prompts: Arc<PromptTemplates>,
    trail: Vec<TakeoverRecord>,
    segments: Vec<Segment>,
    pending_narrative: String,
}

impl TakeoverController {
    pub fn new(config: &SessionConfig, prompts: Arc<PromptTemplates>) -> Self {
        Self {
            state: ControllerState::Idle,
            position: 0,
            retries_at_position: 0,
            total_takeovers: 0,
            limits: config.audit.clone(),
            delimiters: config.delimiters.clone(),
            prompts,
            trail: Vec::new(),
            segments: Vec::new(),
            pending_narrative: String::new(),
        }
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn retries_at_position(&self) -> u32 {
        self.retries_at_position
    }

    pub fn total_takeovers(&self) -> u32 {
        self.total_takeovers
    }

    pub fn trail(&self) -> &[TakeoverRecord] {
        &self.trail
    }

    /// Generation temperature for the next attempt.
    ///
    /// Rises by `temperature_step` for every retry beyond the first at the
    /// current position so repeated failures explore other paths.
    pub fn temperature(&self) -> f64 {
        let bumps = f64::from(self.retries_at_position.saturating_sub(1));
        (self.limits.base_temperature + bumps * self.limits.temperature_step)
            .min(self.limits.max_temperature)
    }

    /// Buffer pass-through text until the next commit decides its fate.
    pub fn note_narrative(&mut self, text: &str) {
        self.pending_narrative.push_str(text);
    }

    /// Drop whatever a broken attempt buffered. Committed state is kept.
    pub fn discard_attempt(&mut self) {
        if !self.pending_narrative.is_empty() {
            tracing::debug!(
                position = self.position,
                discarded_bytes = self.pending_narrative.len(),
                "Discarding narrative from broken attempt"
            );
        }
        self.pending_narrative.clear();
    }

    pub fn submit(&mut self, idea: &mut IdeaUnit) -> Result<usize, AuditError> {
        match self.state {
            ControllerState::Idle | ControllerState::Intervening => {}
            other => return Err(invalid(other, "submit")),
        }
        idea.begin_audit()?;
        self.state = ControllerState::AwaitingVerdict {
            position: self.position,
        };
        Ok(self.position)
    }

    pub fn resolve(
        &mut self,
        mut idea: IdeaUnit,
        verdict: AuditVerdict,
        log: &mut ConversationLog,
        anchor: &Anchor<'_>,
    ) -> Result<Resolution, AuditError> {
        let ControllerState::AwaitingVerdict { position } = self.state else {
            return Err(invalid(self.state, "resolve"));
        };

        if verdict.is_pass() {
            self.commit(idea, position, log)
        } else {
            idea.mark_rejected()?;
            self.intervene(idea, verdict, position, log, anchor)
        }
    }

    /// End the session with the answer block (or without one when the
    /// stream ended cleanly). Only valid with no idea awaiting a verdict.
    pub fn complete(
        &mut self,
        answer: Option<String>,
        log: &mut ConversationLog,
    ) -> Result<FinalAnswer, AuditError> {
        match self.state {
            ControllerState::Idle | ControllerState::Intervening => {}
            other => return Err(invalid(other, "complete")),
        }

        let narrative = std::mem::take(&mut self.pending_narrative);
        let narrative = narrative.trim();
        let answer = answer.map(|a| a.trim().to_string());

        let mut content = narrative.to_string();
        if let Some(answer) = &answer {
            if !content.is_empty() {
                content.push('\n');
            }
            content.push_str(&self.delimiters.wrap_answer(answer));
        }
        if !content.is_empty() {
            log.append(Role::Assistant, Origin::Generator, &content);
        }

        if !narrative.is_empty() {
            self.push_segment(SegmentKind::Narrative, narrative);
        }
        if let Some(answer) = answer.as_deref().filter(|a| !a.is_empty()) {
            self.push_segment(SegmentKind::Answer, answer);
        }

        self.state = ControllerState::Idle;
        Ok(FinalAnswer::new(std::mem::take(&mut self.segments), answer))
    }

    fn commit(
        &mut self,
        mut idea: IdeaUnit,
        position: usize,
        log: &mut ConversationLog,
    ) -> Result<Resolution, AuditError> {
        self.state = ControllerState::Committing;
        idea.mark_passed()?;

        let narrative = std::mem::take(&mut self.pending_narrative);
        let narrative = narrative.trim();
        let mut content = narrative.to_string();
        if !content.is_empty() {
            content.push('\n');
        }
        content.push_str(&self.delimiters.wrap_idea(idea.raw_text()));
        log.append(Role::Assistant, Origin::Generator, &content);

        if !narrative.is_empty() {
            self.push_segment(SegmentKind::Narrative, narrative);
        }
        self.push_segment(SegmentKind::Idea, idea.text());

        self.position += 1;
        self.retries_at_position = 0;
        self.state = ControllerState::Idle;
        tracing::debug!(position, "Idea committed");
        Ok(Resolution::Committed { position })
    }

    fn intervene(
        &mut self,
        idea: IdeaUnit,
        verdict: AuditVerdict,
        position: usize,
        log: &mut ConversationLog,
        anchor: &Anchor<'_>,
    ) -> Result<Resolution, AuditError> {
        // Narrative leading into a rejected idea belongs to the discarded attempt.
        self.pending_narrative.clear();
        self.retries_at_position += 1;
        self.total_takeovers += 1;

        let escalation = if self.retries_at_position > self.limits.max_retries {
            Some(EscalationReason::PositionRetriesExceeded)
        } else if self.total_takeovers > self.limits.max_takeovers {
            Some(EscalationReason::TotalTakeoversExceeded)
        } else {
            None
        };

        if let Some(reason) = escalation {
            self.state = ControllerState::Escalated;
            tracing::warn!(
                reason = reason.as_str(),
                position,
                failures = self.retries_at_position,
                takeovers = self.trail.len(),
                "Audit loop escalated"
            );
            return Err(EscalationError {
                reason,
                position,
                failures: self.retries_at_position,
                max_retries: self.limits.max_retries,
                final_idea: idea,
                final_verdict: verdict,
                trail: self.trail.clone(),
            }
            .into());
        }

        self.state = ControllerState::Intervening;
        let content = self.prompts.intervention(
            &idea,
            &verdict,
            anchor.task,
            anchor.constraints,
            &self.delimiters,
        )?;
        let intervention_message = log
            .append(Role::Intervention, Origin::Controller, &content)
            .clone();

        let retry_count = self.retries_at_position;
        tracing::info!(
            position,
            retry = retry_count,
            total_takeovers = self.total_takeovers,
            code = verdict.code.map(|c| c.as_str()),
            "Takeover: intervention appended"
        );
        self.trail.push(TakeoverRecord {
            failed_idea: idea,
            verdict,
            position,
            retry_count,
            intervention_message,
        });

        Ok(Resolution::Intervened {
            position,
            retry_count,
        })
    }

    fn push_segment(&mut self, kind: SegmentKind, text: &str) {
        self.segments.push(Segment {
            kind,
            text: text.to_string(),
        });
    }
}

fn invalid(state: ControllerState, event: &'static str) -> AuditError {
    AuditError::InvalidTransition {
        state: format!("controller {state}"),
        event,
    }
}
