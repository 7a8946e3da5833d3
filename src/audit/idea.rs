use crate::error::AuditError;
use serde::Serialize;
use std::ops::Range;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IdeaState {
    Pending,
    Auditing,
    Passed,
    Rejected,
}

/// One delimited reasoning step, as it appeared in the generator stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdeaUnit {
    raw_text: String,
    start_offset: usize,
    end_offset: usize,
    state: IdeaState,
}

impl IdeaUnit {
    /// `start_offset..end_offset` covers the delimiters in the attempt's stream.
    pub fn new(raw_text: impl Into<String>, start_offset: usize, end_offset: usize) -> Self {
        Self {
            raw_text: raw_text.into(),
            start_offset,
            end_offset,
            state: IdeaState::Pending,
        }
    }

    /// Text between the delimiters, untrimmed.
    pub fn raw_text(&self) -> &str {
        &self.raw_text
    }

    pub fn text(&self) -> &str {
        self.raw_text.trim()
    }

    pub fn start_offset(&self) -> usize {
        self.start_offset
    }

    pub fn end_offset(&self) -> usize {
        self.end_offset
    }

    pub fn span(&self) -> Range<usize> {
        self.start_offset..self.end_offset
    }

    pub fn state(&self) -> IdeaState {
        self.state
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, IdeaState::Passed | IdeaState::Rejected)
    }

    pub fn begin_audit(&mut self) -> Result<(), AuditError> {
        self.transition(IdeaState::Pending, IdeaState::Auditing, "begin_audit")
    }

    pub fn mark_passed(&mut self) -> Result<(), AuditError> {
        self.transition(IdeaState::Auditing, IdeaState::Passed, "mark_passed")
    }

    pub fn mark_rejected(&mut self) -> Result<(), AuditError> {
        self.transition(IdeaState::Auditing, IdeaState::Rejected, "mark_rejected")
    }

    fn transition(
        &mut self,
        from: IdeaState,
        to: IdeaState,
        event: &'static str,
    ) -> Result<(), AuditError> {
        if self.state != from {
            return Err(AuditError::InvalidTransition {
                state: format!("idea {}", self.state),
                event,
            });
        }
        self.state = to;
        Ok(())
    }
}
