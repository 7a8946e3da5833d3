use super::auditor::ReasonCode;
use super::takeover::EscalationReason;
use serde::Serialize;
use tokio::sync::mpsc;

/// Progress notifications emitted by an [`AuditSession`](super::AuditSession).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    AttemptStarted {
        attempt: u32,
        temperature: f64,
    },
    /// Pass-through text, forwarded as soon as it is settled.
    Narrative {
        text: String,
    },
    IdeaSubmitted {
        position: usize,
        text: String,
    },
    IdeaPassed {
        position: usize,
        text: String,
    },
    IdeaRejected {
        position: usize,
        text: String,
        code: ReasonCode,
        reason: String,
    },
    Takeover {
        position: usize,
        retry_count: u32,
        total_takeovers: u32,
        suggestion: Option<String>,
    },
    AnswerReady {
        answer: String,
    },
    Escalated {
        reason: EscalationReason,
        position: usize,
        failures: u32,
    },
    StreamRestarted {
        restarts: u32,
        cause: String,
    },
}

/// Sink for session events. Implementations must not block.
pub trait AuditObserver: Send + Sync {
    fn record_event(&self, event: &SessionEvent);

    fn name(&self) -> &str;
}

pub struct NullObserver;

impl AuditObserver for NullObserver {
    #[inline(always)]
    fn record_event(&self, _event: &SessionEvent) {}

    fn name(&self) -> &str {
        "null"
    }
}

/// Forwards events to an unbounded channel. Events sent after the receiver
/// is dropped are discarded.
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl ChannelObserver {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl AuditObserver for ChannelObserver {
    fn record_event(&self, event: &SessionEvent) {
        let _ = self.tx.send(event.clone());
    }

    fn name(&self) -> &str {
        "channel"
    }
}
