use crate::audit::takeover::{EscalationReason, TakeoverRecord};
use crate::audit::{AuditVerdict, IdeaUnit};
use crate::llm::sanitize_api_error;
use thiserror::Error;

// ─── Top-level error hierarchy ───────────────────────────────────────────────

/// Structured error hierarchy for `ThinkTwice`.
///
/// The audit loop reports through [`AuditError`]; everything around it
/// (config, providers, templates) has its own variant. Binary glue code keeps
/// using `anyhow::Result` for ad-hoc context chains.
#[derive(Debug, Error)]
pub enum ThinkTwiceError {
    // ── Config ───────────────────────────────────────────────────────────
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    // ── Audit loop ───────────────────────────────────────────────────────
    #[error("audit: {0}")]
    Audit(#[from] AuditError),

    // ── Transport ────────────────────────────────────────────────────────
    #[error("transport: {0}")]
    Transport(#[from] TransportError),

    // ── Prompt / Template ────────────────────────────────────────────────
    #[error("prompt: {0}")]
    Prompt(#[from] PromptError),

    // ── Generic fallthrough (wraps anyhow for interop) ──────────────────
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ─── Config errors ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load config: {0}")]
    Load(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

// ─── Transport errors ───────────────────────────────────────────────────────

/// Failures at the I/O boundary. Retries with backoff happen before one of
/// these is surfaced; the audit state machine never retries them itself.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("provider {provider} request failed: {message}")]
    Request { provider: String, message: String },

    #[error("provider {provider} authentication failed")]
    Auth { provider: String },

    #[error("generation stream from {provider} broke: {message}")]
    Stream { provider: String, message: String },

    #[error("provider {provider} did not open a stream within {timeout_ms}ms")]
    Timeout { provider: String, timeout_ms: u64 },
}

impl TransportError {
    /// Classify a provider failure that survived the retry layer.
    pub fn from_provider(provider: &str, err: &anyhow::Error) -> Self {
        let message = sanitize_api_error(&format!("{err:#}"));
        if message.contains("API key not set") || message.contains("401") {
            Self::Auth {
                provider: provider.to_string(),
            }
        } else {
            Self::Request {
                provider: provider.to_string(),
                message,
            }
        }
    }
}

// ─── Prompt / Template errors ───────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("template render failed: {0}")]
    Render(String),

    #[error("template not found: {0}")]
    NotFound(String),
}

// ─── Audit loop errors ──────────────────────────────────────────────────────

/// The generator stream ended while a delimited block was still open.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("stream ended inside an open {block} block (opened at offset {open_offset}, expected `{expected}`)")]
pub struct MalformedStreamError {
    pub block: &'static str,
    pub expected: String,
    pub open_offset: usize,
    pub partial: String,
}

/// Terminal failure: the retry bound was exceeded. Carries the full takeover
/// trail so the caller can see every rejected idea and every intervention.
#[derive(Debug, Clone, Error)]
#[error(
    "escalated: reason={reason} position={position} failures={failures} max_retries={max_retries} takeovers={}",
    .trail.len()
)]
pub struct EscalationError {
    pub reason: EscalationReason,
    pub position: usize,
    pub failures: u32,
    pub max_retries: u32,
    pub final_idea: IdeaUnit,
    pub final_verdict: AuditVerdict,
    pub trail: Vec<TakeoverRecord>,
}

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("malformed stream after {restarts} restart(s): {source}")]
    MalformedStream {
        restarts: u32,
        #[source]
        source: MalformedStreamError,
    },

    #[error("auditor violated the verdict protocol {attempts} time(s); last response: {last_response}")]
    AuditorProtocol { attempts: u32, last_response: String },

    #[error(transparent)]
    Escalated(Box<EscalationError>),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Prompt(#[from] PromptError),

    #[error("invalid transition: {event} while {state}")]
    InvalidTransition { state: String, event: &'static str },

    #[error("session cancelled")]
    Cancelled,

    #[error("session already ran; start a new session for a new request")]
    SessionReused,
}

impl From<EscalationError> for AuditError {
    fn from(err: EscalationError) -> Self {
        Self::Escalated(Box::new(err))
    }
}

impl AuditError {
    /// The escalation trail, if this error is a bounded-retry escalation.
    pub fn escalation(&self) -> Option<&EscalationError> {
        match self {
            Self::Escalated(err) => Some(err),
            _ => None,
        }
    }
}

// ─── Convenience re-exports ─────────────────────────────────────────────────

/// Shorthand result type for the crate.
pub type Result<T> = std::result::Result<T, ThinkTwiceError>;
