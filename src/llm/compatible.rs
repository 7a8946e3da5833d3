//! Generic OpenAI-compatible provider.
//! OpenRouter, OpenAI, Ollama and most gateways speak the same
//! `/chat/completions` format, so one implementation serves both the
//! generator and the auditor side of the loop.

use super::http_client::build_provider_client_with_timeout;
use super::scrub::api_error;
use super::sse::{SseBuffer, parse_data_lines};
use super::streaming::{StreamEvent, TextStream};
use super::traits::{Evaluator, Generator};
use super::types::{WireMessage, map_finish_reason, to_wire_messages};
use crate::audit::Message;
use crate::config::ProviderConfig;
use anyhow::Context;
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use zeroize::Zeroizing;

pub struct OpenAiCompatibleProvider {
    pub(crate) name: String,
    api_key: Option<Zeroizing<String>>,
    /// Pre-computed chat completions URL (avoids `format!` per request).
    cached_chat_url: String,
    client: Client,
}

impl OpenAiCompatibleProvider {
    pub fn new(name: &str, base_url: &str, api_key: Option<&str>) -> Self {
        Self::with_client(
            name,
            base_url,
            api_key,
            build_provider_client_with_timeout(120),
        )
    }

    pub fn from_config(config: &ProviderConfig) -> Self {
        Self::with_client(
            &config.name,
            &config.base_url,
            config.api_key.as_deref(),
            build_provider_client_with_timeout(config.request_timeout_secs),
        )
    }

    fn with_client(name: &str, base_url: &str, api_key: Option<&str>, client: Client) -> Self {
        let base_url = base_url.trim_end_matches('/');
        let cached_chat_url = if base_url.contains("chat/completions") {
            base_url.to_string()
        } else {
            format!("{base_url}/chat/completions")
        };

        Self {
            name: name.to_string(),
            api_key: api_key
                .filter(|key| !key.trim().is_empty())
                .map(|key| Zeroizing::new(key.to_string())),
            cached_chat_url,
            client,
        }
    }

    fn authorized_post(&self) -> anyhow::Result<reqwest::RequestBuilder> {
        let Some(key) = &self.api_key else {
            anyhow::bail!(
                "{} API key not set. Add it to config.toml or set THINKTWICE_API_KEY.",
                self.name
            );
        };
        Ok(self
            .client
            .post(&self.cached_chat_url)
            .bearer_auth(key.as_str()))
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<WireMessage>,
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

fn sse_response_to_text_stream(response: reqwest::Response) -> TextStream {
    let mut byte_stream = response.bytes_stream();

    let stream = async_stream::try_stream! {
        let mut sse_buffer = SseBuffer::new();
        let mut finished = false;

        while let Some(chunk_result) = byte_stream.next().await {
            let chunk = chunk_result?;
            sse_buffer.push_chunk(&chunk);

            while let Some(event_block) = sse_buffer.next_event_block() {
                for data in parse_data_lines(&event_block) {
                    if data.trim() == "[DONE]" {
                        if !finished {
                            finished = true;
                            yield StreamEvent::Done { stop_reason: None };
                        }
                        continue;
                    }

                    let Ok(chunk) = serde_json::from_str::<ChatCompletionChunk>(data) else {
                        tracing::debug!("Skipping unparseable stream chunk");
                        continue;
                    };

                    for choice in chunk.choices {
                        if let Some(content) = choice.delta.content
                            && !content.is_empty()
                        {
                            yield StreamEvent::TextDelta { text: content };
                        }

                        if let Some(finish) = choice.finish_reason.as_deref()
                            && !finished
                        {
                            finished = true;
                            yield StreamEvent::Done {
                                stop_reason: Some(map_finish_reason(Some(finish))),
                            };
                        }
                    }
                }
            }
        }
    };

    Box::pin(stream)
}

impl Generator for OpenAiCompatibleProvider {
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
            let request = ChatRequest {
                model: model.to_string(),
                messages: to_wire_messages(messages),
                temperature,
                stream: Some(true),
            };

            let response = self
                .authorized_post()?
                .json(&request)
                .send()
                .await
                .with_context(|| format!("{} streaming request failed", self.name))?;

            if !response.status().is_success() {
                return Err(api_error(&self.name, response).await);
            }

            Ok(sse_response_to_text_stream(response))
        })
    }

    fn warmup(&self) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        Box::pin(async move {
            // Any response (even 404) means the TLS session is established.
            let _ = self.client.get(&self.cached_chat_url).send().await;
            Ok(())
        })
    }
}

impl Evaluator for OpenAiCompatibleProvider {
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
            let mut messages = Vec::with_capacity(2);
            if let Some(system) = system_prompt {
                messages.push(WireMessage {
                    role: "system",
                    content: system.to_string(),
                });
            }
            messages.push(WireMessage {
                role: "user",
                content: prompt.to_string(),
            });

            let request = ChatRequest {
                model: model.to_string(),
                messages,
                temperature,
                stream: None,
            };

            let response = self
                .authorized_post()?
                .json(&request)
                .send()
                .await
                .with_context(|| format!("{} chat completions request failed", self.name))?;

            if !response.status().is_success() {
                return Err(api_error(&self.name, response).await);
            }

            let chat: ChatResponse = response
                .json()
                .await
                .with_context(|| format!("{} chat completions JSON decode failed", self.name))?;

            chat.choices
                .into_iter()
                .next()
                .map(|choice| choice.message.content.unwrap_or_default())
                .ok_or_else(|| anyhow::anyhow!("No response from {}", self.name))
        })
    }
}
