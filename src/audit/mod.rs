//! The speculative auditing loop.
//!
//! Leaves first: [`ConversationLog`] holds the causal history,
//! [`IdeaExtractor`] segments the generator stream, [`Auditor`] judges each
//! idea, [`TakeoverController`] commits or intervenes, and [`AuditSession`]
//! drives all of them for one request.

pub mod answer;
pub mod auditor;
pub mod constraints;
pub mod extractor;
pub mod idea;
pub mod log;
pub mod observer;
pub mod prompts;
pub mod session;
pub mod takeover;

pub use answer::{FinalAnswer, Segment, SegmentKind};
pub use auditor::{AuditVerdict, Auditor, Outcome, ReasonCode, parse_verdict};
pub use constraints::ConstraintSet;
pub use extractor::{ExtractEvent, IdeaExtractor, extract_events};
pub use idea::{IdeaState, IdeaUnit};
pub use log::{ConversationLog, Message, Origin, Role};
pub use observer::{AuditObserver, ChannelObserver, NullObserver, SessionEvent};
pub use prompts::PromptTemplates;
pub use session::AuditSession;
pub use takeover::{
    Anchor, ControllerState, EscalationReason, Resolution, TakeoverController, TakeoverRecord,
};
