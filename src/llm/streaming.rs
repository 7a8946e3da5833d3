use super::types::StopReason;
use anyhow::Result;
use futures_util::{Stream, StreamExt, stream};
use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// Incremental generator output. The stream is consumed exactly once.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send + 'static>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamEvent {
    TextDelta { text: String },
    /// Explicit end-of-stream signal from the provider.
    Done { stop_reason: Option<StopReason> },
}

/// Replay pre-split chunks as a stream terminated by `Done`.
pub fn text_stream_from_chunks<I, S>(chunks: I) -> TextStream
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut events: Vec<Result<StreamEvent>> = chunks
        .into_iter()
        .map(|chunk| Ok(StreamEvent::TextDelta { text: chunk.into() }))
        .collect();
    events.push(Ok(StreamEvent::Done {
        stop_reason: Some(StopReason::EndTurn),
    }));
    Box::pin(stream::iter(events))
}

/// Drain a stream into its full text.
pub async fn collect_text(mut stream: TextStream) -> Result<String> {
    let mut text = String::new();
    while let Some(event) = stream.next().await {
        match event? {
            StreamEvent::TextDelta { text: delta } => text.push_str(&delta),
            StreamEvent::Done { .. } => break,
        }
    }
    Ok(text)
}
