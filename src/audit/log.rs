use chrono::{DateTime, Utc};
use serde::Serialize;

/// Who a message is addressed as on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    /// A takeover correction. Sent to the generator in the user's voice.
    Intervention,
}

/// Which component produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Origin {
    /// Seed messages supplied when the session starts.
    Caller,
    Generator,
    Auditor,
    Controller,
}

/// One entry of the conversation log. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    role: Role,
    content: String,
    sequence_index: u64,
    origin: Origin,
    created_at: DateTime<Utc>,
}

impl Message {
    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn sequence_index(&self) -> u64 {
        self.sequence_index
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Ordered, append-only causal history sent to the generator.
///
/// There is no API to edit or remove an entry: every rejected idea and every
/// intervention stays visible for later inspection.
#[derive(Debug, Default, Serialize)]
pub struct ConversationLog {
    messages: Vec<Message>,
    #[serde(skip)]
    next_index: u64,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, role: Role, origin: Origin, content: &str) -> &Message {
        let message = Message {
            role,
            content: content.to_string(),
            sequence_index: self.next_index,
            origin,
            created_at: Utc::now(),
        };
        self.next_index += 1;
        self.messages.push(message);
        &self.messages[self.messages.len() - 1]
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Most recent `limit` messages with the given role, oldest first.
    pub fn recent(&self, role: Role, limit: usize) -> Vec<&Message> {
        let mut recent: Vec<&Message> = self
            .messages
            .iter()
            .rev()
            .filter(|m| m.role == role)
            .take(limit)
            .collect();
        recent.reverse();
        recent
    }

    pub fn count_role(&self, role: Role) -> usize {
        self.messages.iter().filter(|m| m.role == role).count()
    }
}
