#![allow(dead_code)]

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use thinktwice::audit::{AuditSession, ConstraintSet, Message, Role};
use thinktwice::config::SessionConfig;
use thinktwice::llm::{Evaluator, Generator, StopReason, StreamEvent, TextStream};

/// One step of a scripted generation stream.
#[derive(Debug, Clone)]
pub enum Beat {
    Text(String),
    Sleep(Duration),
    /// Never yields again.
    Stall,
    /// Mid-stream transport failure.
    Fail(String),
}

pub fn text(chunk: &str) -> Beat {
    Beat::Text(chunk.to_string())
}

pub fn chunks(parts: &[&str]) -> Vec<Beat> {
    parts.iter().map(|part| text(part)).collect()
}

/// Replays one script per `stream` call; the last script repeats once the
/// queue runs dry.
pub struct ScriptedGenerator {
    scripts: Mutex<VecDeque<Vec<Beat>>>,
    last: Mutex<Vec<Beat>>,
    seen_messages: Mutex<Vec<Vec<(Role, String)>>>,
    temperatures: Mutex<Vec<f64>>,
    yielded_chunks: Arc<AtomicUsize>,
}

impl ScriptedGenerator {
    pub fn new(scripts: Vec<Vec<Beat>>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(VecDeque::from(scripts)),
            last: Mutex::new(Vec::new()),
            seen_messages: Mutex::new(Vec::new()),
            temperatures: Mutex::new(Vec::new()),
            yielded_chunks: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Every call gets the same chunks.
    pub fn repeating(parts: &[&str]) -> Arc<Self> {
        Self::new(vec![chunks(parts)])
    }

    pub fn calls(&self) -> usize {
        self.seen_messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn seen_messages(&self) -> Vec<Vec<(Role, String)>> {
        self.seen_messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn temperatures(&self) -> Vec<f64> {
        self.temperatures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Text chunks actually pulled off the streams so far.
    pub fn yielded_chunks(&self) -> usize {
        self.yielded_chunks.load(Ordering::SeqCst)
    }

    fn next_script(&self) -> Vec<Beat> {
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(script) = self
            .scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
        {
            last.clone_from(&script);
        }
        last.clone()
    }
}

impl Generator for ScriptedGenerator {
    fn name(&self) -> &str {
        "scripted"
    }

    fn stream<'a>(
        &'a self,
        messages: &'a [Message],
        _model: &'a str,
        temperature: f64,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<TextStream>> + Send + 'a>> {
        Box::pin(async move {
            self.seen_messages
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(
                    messages
                        .iter()
                        .map(|m| (m.role(), m.content().to_string()))
                        .collect(),
                );
            self.temperatures
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(temperature);

            let beats = self.next_script();
            let yielded = Arc::clone(&self.yielded_chunks);
            let stream = async_stream::stream! {
                for beat in beats {
                    match beat {
                        Beat::Text(chunk) => {
                            yielded.fetch_add(1, Ordering::SeqCst);
                            yield Ok(StreamEvent::TextDelta { text: chunk });
                        }
                        Beat::Sleep(pause) => tokio::time::sleep(pause).await,
                        Beat::Stall => futures_util::future::pending::<()>().await,
                        Beat::Fail(message) => {
                            yield Err(anyhow::anyhow!(message));
                            return;
                        }
                    }
                }
                yield Ok(StreamEvent::Done {
                    stop_reason: Some(StopReason::EndTurn),
                });
            };
            Ok(Box::pin(stream) as TextStream)
        })
    }
}

type Judge = Box<dyn Fn(&str) -> String + Send + Sync>;

/// Auditor double: judges the idea embedded in each audit request.
///
/// Requests without an idea block (raw comparison runs) get `raw_reply`.
pub struct ScriptedEvaluator {
    judge: Judge,
    delays: Mutex<VecDeque<Duration>>,
    reviewed: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    raw_reply: String,
}

impl ScriptedEvaluator {
    pub fn new(judge: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        Self {
            judge: Box::new(judge),
            delays: Mutex::new(VecDeque::new()),
            reviewed: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            raw_reply: "raw output".to_string(),
        }
    }

    pub fn approving() -> Self {
        Self::new(|_| "<status>PASS</status>".to_string())
    }

    /// Rejects any idea containing `needle`, case-insensitively.
    pub fn rejecting(needle: &'static str) -> Self {
        Self::new(move |idea| {
            if idea.to_lowercase().contains(&needle.to_lowercase()) {
                format!(
                    "<status>FAIL</status><reason>Uses forbidden text '{needle}'</reason>\
                     <span>{needle}</span><fix>Rephrase without '{needle}'</fix>"
                )
            } else {
                "<status>PASS</status>".to_string()
            }
        })
    }

    /// Delays applied to successive calls, in order.
    #[must_use]
    pub fn with_delays(self, delays: Vec<Duration>) -> Self {
        *self.delays.lock().unwrap_or_else(PoisonError::into_inner) = VecDeque::from(delays);
        self
    }

    pub fn reviewed(&self) -> Vec<String> {
        self.reviewed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

/// Text of the last `<idea>` block in an audit request.
pub fn idea_under_review(prompt: &str) -> Option<&str> {
    let start = prompt.rfind("<idea>")? + "<idea>".len();
    let len = prompt[start..].find("</idea>")?;
    Some(&prompt[start..start + len])
}

impl Evaluator for ScriptedEvaluator {
    fn name(&self) -> &str {
        "scripted-auditor"
    }

    fn complete<'a>(
        &'a self,
        _system_prompt: Option<&'a str>,
        prompt: &'a str,
        _model: &'a str,
        _temperature: f64,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send + 'a>> {
        Box::pin(async move {
            let Some(idea) = idea_under_review(prompt) else {
                return Ok(self.raw_reply.clone());
            };

            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            self.reviewed
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(idea.trim().to_string());

            let delay = self
                .delays
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_front();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            let reply = (self.judge)(idea);
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(reply)
        })
    }
}

pub fn session_config(tweak: impl FnOnce(&mut SessionConfig)) -> Arc<SessionConfig> {
    let mut config = SessionConfig::with_models("generator-model", "auditor-model");
    config.audit.chunk_timeout_ms = 2_000;
    config.audit.audit_timeout_ms = 2_000;
    tweak(&mut config);
    Arc::new(config)
}

pub fn session(
    config: Arc<SessionConfig>,
    generator: &Arc<ScriptedGenerator>,
    evaluator: &Arc<ScriptedEvaluator>,
) -> AuditSession {
    AuditSession::new(
        config,
        Arc::clone(generator) as Arc<dyn Generator>,
        Arc::clone(evaluator) as Arc<dyn Evaluator>,
    )
    .unwrap()
}

pub fn constraints(rules: &[&str]) -> Arc<ConstraintSet> {
    Arc::new(ConstraintSet::new(rules.iter().copied()))
}

pub fn roles(messages: &[Message]) -> Vec<Role> {
    messages.iter().map(Message::role).collect()
}
