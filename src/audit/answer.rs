use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SegmentKind {
    Narrative,
    Idea,
    Answer,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Segment {
    pub kind: SegmentKind,
    pub text: String,
}

/// Verified output of a session.
///
/// Built only from committed ideas, the narrative that led up to them and
/// the final-answer block. Rejected ideas never reach it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FinalAnswer {
    segments: Vec<Segment>,
    answer: Option<String>,
}

impl FinalAnswer {
    pub fn new(segments: Vec<Segment>, answer: Option<String>) -> Self {
        Self { segments, answer }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Contents of the final-answer block, if the generator wrote one.
    pub fn answer(&self) -> Option<&str> {
        self.answer.as_deref()
    }

    /// Committed idea texts, in order.
    pub fn ideas(&self) -> impl Iterator<Item = &str> {
        self.segments
            .iter()
            .filter(|s| s.kind == SegmentKind::Idea)
            .map(|s| s.text.as_str())
    }

    /// Every committed segment joined by newlines.
    pub fn content(&self) -> String {
        self.segments
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// What a user should see: the answer block, or everything committed
    /// when the generator never wrote one.
    pub fn display_text(&self) -> String {
        self.answer.clone().unwrap_or_else(|| self.content())
    }
}
