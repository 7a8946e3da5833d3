use super::streaming::TextStream;
use super::traits::{Evaluator, Generator, Provider};
use crate::audit::Message;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Check if an error is non-retryable (client errors that won't resolve with retries).
fn is_non_retryable(err: &anyhow::Error) -> bool {
    let msg = err.to_string();
    if is_quota_exhausted(&msg) || msg.contains("API key not set") {
        return true;
    }

    // Check for reqwest status errors (returned by .error_for_status())
    if let Some(reqwest_err) = err.downcast_ref::<reqwest::Error>()
        && let Some(status) = reqwest_err.status()
    {
        let code = status.as_u16();
        // 4xx client errors are non-retryable, except:
        // - 429 Too Many Requests (rate limiting, transient)
        // - 408 Request Timeout (transient)
        return status.is_client_error() && code != 429 && code != 408;
    }
    // String fallback: scan for any 4xx status code in error message
    for word in msg.split(|c: char| !c.is_ascii_digit()) {
        if let Ok(code) = word.parse::<u16>()
            && (400..500).contains(&code)
        {
            return code != 429 && code != 408;
        }
    }
    false
}

fn is_quota_exhausted(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("insufficient_quota")
        || lower.contains("exceeded your current quota")
        || lower.contains("billing")
}

/// Provider wrapper with retry behavior.
///
/// This is the I/O boundary: transport failures are retried here with
/// exponential backoff, never inside the audit state machine. Only stream
/// *establishment* is retried; a stream that breaks midway is surfaced to
/// the session, which restarts the attempt from the log.
pub struct ReliableProvider {
    name: String,
    inner: Box<dyn Provider>,
    max_retries: u32,
    base_backoff_ms: u64,
}

impl ReliableProvider {
    pub fn new(
        name: impl Into<String>,
        inner: Box<dyn Provider>,
        max_retries: u32,
        base_backoff_ms: u64,
    ) -> Self {
        Self {
            name: name.into(),
            inner,
            max_retries,
            base_backoff_ms: base_backoff_ms.max(50),
        }
    }

    async fn call_with_retries<'a, T, F>(&'a self, operation: &'static str, call: F) -> anyhow::Result<T>
    where
        F: Fn(&'a dyn Provider) -> BoxFuture<'a, anyhow::Result<T>> + Send + Sync,
        T: Send,
    {
        let mut failures = Vec::new();
        let mut backoff_ms = self.base_backoff_ms;

        for attempt in 0..=self.max_retries {
            match call(self.inner.as_ref()).await {
                Ok(resp) => {
                    if attempt > 0 {
                        tracing::info!(
                            provider = self.name.as_str(),
                            operation,
                            attempt,
                            "Provider recovered after retries"
                        );
                    }
                    return Ok(resp);
                }
                Err(e) => {
                    let non_retryable = is_non_retryable(&e);
                    failures.push(format!(
                        "attempt {}/{}: {e}",
                        attempt + 1,
                        self.max_retries + 1
                    ));

                    if non_retryable {
                        tracing::warn!(
                            provider = self.name.as_str(),
                            operation,
                            "Non-retryable error, giving up"
                        );
                        break;
                    }

                    if attempt < self.max_retries {
                        tracing::warn!(
                            provider = self.name.as_str(),
                            operation,
                            attempt = attempt + 1,
                            max_retries = self.max_retries,
                            "Provider call failed, retrying"
                        );
                        tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                        backoff_ms = (backoff_ms.saturating_mul(2)).min(10_000);
                    }
                }
            }
        }

        anyhow::bail!(
            "{} {operation} failed. Attempts:\n{}",
            self.name,
            failures.join("\n")
        )
    }
}

impl Generator for ReliableProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn stream<'a>(
        &'a self,
        messages: &'a [Message],
        model: &'a str,
        temperature: f64,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<TextStream>> + Send + 'a>> {
        Box::pin(async move {
            self.call_with_retries("stream", |provider| {
                Generator::stream(provider, messages, model, temperature)
            })
            .await
        })
    }

    fn warmup(&self) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        Box::pin(async move {
            tracing::info!(
                provider = self.name.as_str(),
                "Warming up provider connection pool"
            );
            if let Err(e) = self.inner.warmup().await {
                tracing::warn!(provider = self.name.as_str(), "Warmup failed (non-fatal): {e}");
            }
            Ok(())
        })
    }
}

impl Evaluator for ReliableProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn complete<'a>(
        &'a self,
        system_prompt: Option<&'a str>,
        prompt: &'a str,
        model: &'a str,
        temperature: f64,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send + 'a>> {
        Box::pin(async move {
            self.call_with_retries("complete", |provider| {
                Evaluator::complete(provider, system_prompt, prompt, model, temperature)
            })
            .await
        })
    }
}
