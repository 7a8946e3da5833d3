use super::streaming::TextStream;
use crate::audit::Message;
use std::future::Future;
use std::pin::Pin;

/// Incremental text generation over a full, caller-supplied history.
///
/// Stateless per call: every attempt resends the whole conversation log.
pub trait Generator: Send + Sync {
    /// Provider identifier (e.g. "openrouter").
    fn name(&self) -> &str;

    fn stream<'a>(
        &'a self,
        messages: &'a [Message],
        model: &'a str,
        temperature: f64,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<TextStream>> + Send + 'a>>;

    /// Warm up the HTTP connection pool.
    fn warmup(&self) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        Box::pin(async move { Ok(()) })
    }
}

/// One-shot request/response completion, used for verdicts.
pub trait Evaluator: Send + Sync {
    fn name(&self) -> &str;

    fn complete<'a>(
        &'a self,
        system_prompt: Option<&'a str>,
        prompt: &'a str,
        model: &'a str,
        temperature: f64,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send + 'a>>;
}

/// A backend that can serve both sides of the loop.
pub trait Provider: Generator + Evaluator {}

impl<T: Generator + Evaluator> Provider for T {}
