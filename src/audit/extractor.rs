//! Streaming segmentation of generator output into ideas, narrative and the
//! final answer.
//!
//! Chunks may split a delimiter anywhere (including inside a multi-byte
//! character), so any buffer suffix that could still grow into a delimiter is
//! held back until the next chunk settles it.

use super::idea::IdeaUnit;
use crate::config::DelimiterConfig;
use crate::error::MalformedStreamError;
use crate::llm::{StreamEvent, TextStream};
use futures_util::{Stream, StreamExt};
use std::pin::Pin;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractEvent {
    /// Text outside any block. Passed through to the caller as it arrives.
    Narrative(String),
    IdeaComplete(IdeaUnit),
    AnswerComplete {
        text: String,
        start_offset: usize,
        end_offset: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    Idea,
    Answer,
}

impl BlockKind {
    fn label(self) -> &'static str {
        match self {
            Self::Idea => "idea",
            Self::Answer => "final_answer",
        }
    }
}

#[derive(Debug)]
enum Mode {
    Outside,
    InBlock {
        kind: BlockKind,
        open_offset: usize,
        body: String,
    },
}

#[derive(Debug)]
pub struct IdeaExtractor {
    delimiters: DelimiterConfig,
    mode: Mode,
    /// Unsettled text. Starts at stream offset `offset`.
    buffer: String,
    offset: usize,
}

impl IdeaExtractor {
    pub fn new(delimiters: DelimiterConfig) -> Self {
        Self {
            delimiters,
            mode: Mode::Outside,
            buffer: String::new(),
            offset: 0,
        }
    }

    /// Bytes consumed so far, including held-back text.
    pub fn stream_len(&self) -> usize {
        self.offset + self.buffer.len()
    }

    pub fn in_block(&self) -> bool {
        matches!(self.mode, Mode::InBlock { .. })
    }

    pub fn push(&mut self, chunk: &str) -> Vec<ExtractEvent> {
        self.buffer.push_str(chunk);
        let mut events = Vec::new();

        loop {
            let progressed = match &self.mode {
                Mode::Outside => self.scan_outside(&mut events),
                Mode::InBlock { kind, .. } => {
                    let kind = *kind;
                    self.scan_block(kind, &mut events)
                }
            };
            if !progressed {
                break;
            }
        }

        events
    }

    /// Flush held-back narrative at end of stream.
    ///
    /// An open block at this point means the generator was truncated.
    pub fn finish(mut self) -> Result<Vec<ExtractEvent>, MalformedStreamError> {
        match std::mem::replace(&mut self.mode, Mode::Outside) {
            Mode::Outside => {
                let mut events = Vec::new();
                if !self.buffer.is_empty() {
                    events.push(ExtractEvent::Narrative(std::mem::take(&mut self.buffer)));
                }
                Ok(events)
            }
            Mode::InBlock {
                kind,
                open_offset,
                mut body,
            } => {
                body.push_str(&self.buffer);
                Err(MalformedStreamError {
                    block: kind.label(),
                    expected: self.close_for(kind).to_string(),
                    open_offset,
                    partial: body,
                })
            }
        }
    }

    /// Give up on the stream, returning whatever block was still open.
    pub fn abandon(mut self) -> Option<IdeaUnit> {
        let end = self.stream_len();
        match std::mem::replace(&mut self.mode, Mode::Outside) {
            Mode::Outside => None,
            Mode::InBlock {
                open_offset,
                mut body,
                ..
            } => {
                body.push_str(&self.buffer);
                Some(IdeaUnit::new(body, open_offset, end))
            }
        }
    }

    fn close_for(&self, kind: BlockKind) -> &str {
        match kind {
            BlockKind::Idea => &self.delimiters.idea_close,
            BlockKind::Answer => &self.delimiters.answer_close,
        }
    }

    fn scan_outside(&mut self, events: &mut Vec<ExtractEvent>) -> bool {
        let idea = self
            .buffer
            .find(&self.delimiters.idea_open)
            .map(|pos| (pos, BlockKind::Idea, self.delimiters.idea_open.len()));
        let answer = self
            .buffer
            .find(&self.delimiters.answer_open)
            .map(|pos| (pos, BlockKind::Answer, self.delimiters.answer_open.len()));

        let earliest = match (idea, answer) {
            (Some(a), Some(b)) => Some(if b.0 < a.0 { b } else { a }),
            (a, b) => a.or(b),
        };

        if let Some((pos, kind, open_len)) = earliest {
            if pos > 0 {
                events.push(ExtractEvent::Narrative(self.buffer[..pos].to_string()));
            }
            let open_offset = self.offset + pos;
            self.consume(pos + open_len);
            self.mode = Mode::InBlock {
                kind,
                open_offset,
                body: String::new(),
            };
            return true;
        }

        let hold = held_suffix_len(&self.buffer, &self.delimiters.idea_open)
            .max(held_suffix_len(&self.buffer, &self.delimiters.answer_open));
        let settled = self.buffer.len() - hold;
        if settled > 0 {
            events.push(ExtractEvent::Narrative(self.buffer[..settled].to_string()));
            self.consume(settled);
        }
        false
    }

    fn scan_block(&mut self, kind: BlockKind, events: &mut Vec<ExtractEvent>) -> bool {
        let close = self.close_for(kind).to_string();

        if let Some(pos) = self.buffer.find(&close) {
            let end_offset = self.offset + pos + close.len();
            let head = self.buffer[..pos].to_string();
            self.consume(pos + close.len());

            if let Mode::InBlock {
                open_offset,
                mut body,
                ..
            } = std::mem::replace(&mut self.mode, Mode::Outside)
            {
                body.push_str(&head);
                events.push(match kind {
                    BlockKind::Idea => {
                        ExtractEvent::IdeaComplete(IdeaUnit::new(body, open_offset, end_offset))
                    }
                    BlockKind::Answer => ExtractEvent::AnswerComplete {
                        text: body,
                        start_offset: open_offset,
                        end_offset,
                    },
                });
            }
            return true;
        }

        let hold = held_suffix_len(&self.buffer, &close);
        let settled = self.buffer.len() - hold;
        if settled > 0 {
            let head = self.buffer[..settled].to_string();
            self.consume(settled);
            if let Mode::InBlock { body, .. } = &mut self.mode {
                body.push_str(&head);
            }
        }
        false
    }

    fn consume(&mut self, len: usize) {
        self.buffer.drain(..len);
        self.offset += len;
    }
}

/// Length of the longest proper suffix of `buffer` that starts `delimiter`.
fn held_suffix_len(buffer: &str, delimiter: &str) -> usize {
    let max = delimiter.len().saturating_sub(1).min(buffer.len());
    (1..=max)
        .rev()
        .find(|&k| {
            let start = buffer.len() - k;
            buffer.is_char_boundary(start) && delimiter.starts_with(&buffer[start..])
        })
        .unwrap_or(0)
}

/// Lazy adapter: generator stream in, extraction events out.
///
/// Ends after the final answer or the provider's end-of-stream signal;
/// a truncated block surfaces as an error item.
pub fn extract_events(
    mut stream: TextStream,
    delimiters: DelimiterConfig,
) -> Pin<Box<dyn Stream<Item = anyhow::Result<ExtractEvent>> + Send>> {
    Box::pin(async_stream::try_stream! {
        let mut extractor = IdeaExtractor::new(delimiters);
        let mut answered = false;

        while let Some(event) = stream.next().await {
            match event? {
                StreamEvent::TextDelta { text } => {
                    for extracted in extractor.push(&text) {
                        answered = matches!(extracted, ExtractEvent::AnswerComplete { .. });
                        yield extracted;
                        if answered {
                            break;
                        }
                    }
                    if answered {
                        break;
                    }
                }
                StreamEvent::Done { .. } => break,
            }
        }

        if !answered {
            for extracted in extractor.finish()? {
                yield extracted;
            }
        }
    })
}
