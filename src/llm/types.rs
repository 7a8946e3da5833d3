use crate::audit::{Message, Role};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    ContentFilter,
    Error,
}

pub fn map_finish_reason(reason: Option<&str>) -> StopReason {
    match reason {
        Some("length") => StopReason::MaxTokens,
        Some("content_filter") => StopReason::ContentFilter,
        Some("stop") | None => StopReason::EndTurn,
        Some(_) => StopReason::Error,
    }
}

/// Chat-completions message as sent over the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WireMessage {
    pub role: &'static str,
    pub content: String,
}

/// Interventions are spoken to the generator in the user's voice.
pub fn wire_role(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User | Role::Intervention => "user",
        Role::Assistant => "assistant",
    }
}

/// Flatten the conversation log into chat-completions messages.
///
/// Committed ideas are logged one message at a time; adjacent messages that
/// map to the same wire role are merged so providers see alternating turns.
pub fn to_wire_messages(messages: &[Message]) -> Vec<WireMessage> {
    let mut wire: Vec<WireMessage> = Vec::with_capacity(messages.len());
    for message in messages {
        let role = wire_role(message.role());
        match wire.last_mut() {
            Some(last) if last.role == role => {
                last.content.push('\n');
                last.content.push_str(message.content());
            }
            _ => wire.push(WireMessage {
                role,
                content: message.content().to_string(),
            }),
        }
    }
    wire
}
