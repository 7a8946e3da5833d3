//! Top-level orchestration of one audited generation.
//!
//! A session owns its log and controller outright; nothing is shared with
//! other sessions except the read-only config, constraint set and provider
//! handles. Each attempt streams from the current log, feeds the extractor,
//! and blocks every completed idea on its verdict. While a verdict is
//! pending, further chunks may be buffered (speculative prefetch); they are
//! dropped untouched if the idea is rejected.

use super::answer::FinalAnswer;
use super::auditor::{AuditVerdict, Auditor, ReasonCode};
use super::constraints::ConstraintSet;
use super::extractor::{ExtractEvent, IdeaExtractor};
use super::idea::IdeaUnit;
use super::log::{ConversationLog, Origin, Role};
use super::observer::{AuditObserver, NullObserver, SessionEvent};
use super::prompts::PromptTemplates;
use super::takeover::{Anchor, ControllerState, Resolution, TakeoverController, TakeoverRecord};
use crate::config::SessionConfig;
use crate::error::{AuditError, MalformedStreamError, TransportError};
use crate::llm::{Evaluator, Generator, StreamEvent, TextStream, sanitize_api_error};
use futures_util::StreamExt;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

enum AttemptOutcome {
    Completed(FinalAnswer),
    TakenOver,
    Broken(StreamFault),
}

enum StreamFault {
    Malformed(MalformedStreamError),
    Interrupted(String),
}

enum Step {
    Continue,
    Finished(AttemptOutcome),
}

/// One attempt's generator stream plus chunks read ahead during an audit.
struct AttemptFeed {
    stream: TextStream,
    lookahead: VecDeque<anyhow::Result<StreamEvent>>,
    exhausted: bool,
}

pub struct AuditSession {
    id: Uuid,
    config: Arc<SessionConfig>,
    generator: Arc<dyn Generator>,
    auditor: Auditor,
    prompts: Arc<PromptTemplates>,
    controller: TakeoverController,
    log: ConversationLog,
    observer: Arc<dyn AuditObserver>,
    cancel: CancellationToken,
    attempts: u32,
    stream_restarts: u32,
}

impl AuditSession {
    pub fn new(
        config: Arc<SessionConfig>,
        generator: Arc<dyn Generator>,
        evaluator: Arc<dyn Evaluator>,
    ) -> Result<Self, AuditError> {
        let prompts = Arc::new(PromptTemplates::new()?);
        Ok(Self {
            id: Uuid::new_v4(),
            auditor: Auditor::new(evaluator, Arc::clone(&config), Arc::clone(&prompts)),
            controller: TakeoverController::new(&config, Arc::clone(&prompts)),
            config,
            generator,
            prompts,
            log: ConversationLog::new(),
            observer: Arc::new(NullObserver),
            cancel: CancellationToken::new(),
            attempts: 0,
            stream_restarts: 0,
        })
    }

    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn AuditObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Use an externally owned token; cancelling it stops the session at its
    /// next suspension point.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Full causal history, including every intervention.
    pub fn log(&self) -> &ConversationLog {
        &self.log
    }

    pub fn takeovers(&self) -> &[TakeoverRecord] {
        self.controller.trail()
    }

    /// Generation streams opened so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn state(&self) -> ControllerState {
        self.controller.state()
    }

    /// Drive the loop to a verified answer or an escalation.
    ///
    /// A session runs once; its log is left intact afterwards for inspection.
    pub async fn run(
        &mut self,
        user_request: &str,
        constraints: Arc<ConstraintSet>,
    ) -> Result<FinalAnswer, AuditError> {
        if !self.log.is_empty() {
            return Err(AuditError::SessionReused);
        }

        let system = self
            .prompts
            .generator_system(&constraints, &self.config.delimiters)?;
        self.log.append(Role::System, Origin::Caller, &system);
        self.log.append(Role::User, Origin::Caller, user_request);

        tracing::info!(
            session_id = %self.id,
            generator_model = self.config.generator_model.as_str(),
            auditor_model = self.config.auditor_model.as_str(),
            constraints = constraints.len(),
            "Audit session started"
        );

        let anchor = Anchor {
            task: user_request,
            constraints: &constraints,
        };

        loop {
            if self.cancel.is_cancelled() {
                return Err(self.cancelled());
            }

            self.attempts += 1;
            let temperature = self.controller.temperature();
            tracing::debug!(
                session_id = %self.id,
                attempt = self.attempts,
                position = self.controller.position(),
                temperature,
                "Starting generation attempt"
            );
            self.emit(SessionEvent::AttemptStarted {
                attempt: self.attempts,
                temperature,
            });

            match self.attempt(&anchor, temperature).await? {
                AttemptOutcome::Completed(answer) => {
                    tracing::info!(
                        session_id = %self.id,
                        attempts = self.attempts,
                        takeovers = self.controller.trail().len(),
                        ideas = answer.ideas().count(),
                        "Audit session completed"
                    );
                    return Ok(answer);
                }
                AttemptOutcome::TakenOver => {}
                AttemptOutcome::Broken(fault) => self.restart_after(fault)?,
            }
        }
    }

    async fn attempt(
        &mut self,
        anchor: &Anchor<'_>,
        temperature: f64,
    ) -> Result<AttemptOutcome, AuditError> {
        let generator = Arc::clone(&self.generator);
        let opened = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return Err(self.cancelled()),
            opened = generator.stream(self.log.messages(), &self.config.generator_model, temperature) => opened,
        };
        let stream = opened.map_err(|e| TransportError::from_provider(generator.name(), &e))?;

        let mut feed = AttemptFeed {
            stream,
            lookahead: VecDeque::new(),
            exhausted: false,
        };
        let mut extractor = IdeaExtractor::new(self.config.delimiters.clone());
        let chunk_timeout = self.config.audit.chunk_timeout();

        loop {
            let next = match feed.lookahead.pop_front() {
                Some(buffered) => Some(buffered),
                None if feed.exhausted => None,
                None => tokio::select! {
                    biased;
                    () = self.cancel.cancelled() => return Err(self.cancelled()),
                    next = tokio::time::timeout(chunk_timeout, feed.stream.next()) => match next {
                        Ok(next) => next,
                        Err(_) => return self.generation_timed_out(extractor, anchor),
                    },
                },
            };

            let text = match next {
                Some(Ok(StreamEvent::TextDelta { text })) => text,
                None | Some(Ok(StreamEvent::Done { .. })) => {
                    return self.end_of_stream(extractor);
                }
                Some(Err(e)) => {
                    let cause = sanitize_api_error(&format!("{e:#}"));
                    return Ok(AttemptOutcome::Broken(StreamFault::Interrupted(cause)));
                }
            };

            for event in extractor.push(&text) {
                if let Step::Finished(outcome) = self.handle_event(event, &mut feed, anchor).await? {
                    return Ok(outcome);
                }
            }
        }
    }

    async fn handle_event(
        &mut self,
        event: ExtractEvent,
        feed: &mut AttemptFeed,
        anchor: &Anchor<'_>,
    ) -> Result<Step, AuditError> {
        match event {
            ExtractEvent::Narrative(text) => {
                self.controller.note_narrative(&text);
                self.emit(SessionEvent::Narrative { text });
                Ok(Step::Continue)
            }
            ExtractEvent::IdeaComplete(idea) => self.audit_idea(idea, feed, anchor).await,
            ExtractEvent::AnswerComplete { text, .. } => {
                let answer = self.controller.complete(Some(text), &mut self.log)?;
                self.emit(SessionEvent::AnswerReady {
                    answer: answer.display_text(),
                });
                Ok(Step::Finished(AttemptOutcome::Completed(answer)))
            }
        }
    }

    async fn audit_idea(
        &mut self,
        mut idea: IdeaUnit,
        feed: &mut AttemptFeed,
        anchor: &Anchor<'_>,
    ) -> Result<Step, AuditError> {
        let position = self.controller.submit(&mut idea)?;
        tracing::debug!(
            session_id = %self.id,
            position,
            offset = idea.start_offset(),
            "Idea submitted for audit"
        );
        self.emit(SessionEvent::IdeaSubmitted {
            position,
            text: idea.text().to_string(),
        });

        let prefetch = self.config.audit.speculative_prefetch;
        let max_lookahead = self.config.audit.max_lookahead_chunks;

        let verdict = {
            let audit = self
                .auditor
                .evaluate(&idea, anchor.constraints, &self.log, anchor.task);
            tokio::pin!(audit);

            loop {
                tokio::select! {
                    biased;
                    () = self.cancel.cancelled() => return Err(self.cancelled()),
                    verdict = &mut audit => break verdict?,
                    next = feed.stream.next(),
                        if prefetch && !feed.exhausted && feed.lookahead.len() < max_lookahead =>
                    {
                        match next {
                            Some(item) => feed.lookahead.push_back(item),
                            None => feed.exhausted = true,
                        }
                    }
                }
            }
        };

        let step = self.settle(idea, verdict, anchor)?;
        if matches!(step, Step::Finished(AttemptOutcome::TakenOver)) && !feed.lookahead.is_empty() {
            tracing::debug!(
                session_id = %self.id,
                discarded_chunks = feed.lookahead.len(),
                "Discarding speculative lookahead"
            );
            feed.lookahead.clear();
        }
        Ok(step)
    }

    /// Hand a verdict to the controller and report the result.
    fn settle(
        &mut self,
        idea: IdeaUnit,
        verdict: AuditVerdict,
        anchor: &Anchor<'_>,
    ) -> Result<Step, AuditError> {
        let text = idea.text().to_string();
        let rejected = (!verdict.is_pass()).then(|| {
            (
                verdict.code.unwrap_or(ReasonCode::ConstraintViolation),
                verdict.reason_text().to_string(),
                verdict.suggestion.clone(),
            )
        });

        let resolution = self.controller.resolve(idea, verdict, &mut self.log, anchor);

        if let Some((code, reason, _)) = &rejected {
            let position = match &resolution {
                Ok(Resolution::Intervened { position, .. }) => *position,
                _ => self.controller.position(),
            };
            self.emit(SessionEvent::IdeaRejected {
                position,
                text: text.clone(),
                code: *code,
                reason: reason.clone(),
            });
        }

        match resolution {
            Ok(Resolution::Committed { position }) => {
                tracing::info!(session_id = %self.id, position, "Idea passed audit");
                self.emit(SessionEvent::IdeaPassed { position, text });
                Ok(Step::Continue)
            }
            Ok(Resolution::Intervened {
                position,
                retry_count,
            }) => {
                tracing::warn!(
                    session_id = %self.id,
                    position,
                    retry = retry_count,
                    "Idea rejected; restarting generation from the corrected log"
                );
                self.emit(SessionEvent::Takeover {
                    position,
                    retry_count,
                    total_takeovers: self.controller.total_takeovers(),
                    suggestion: rejected.and_then(|(_, _, suggestion)| suggestion),
                });
                Ok(Step::Finished(AttemptOutcome::TakenOver))
            }
            Err(err) => {
                if let Some(escalation) = err.escalation() {
                    tracing::error!(
                        session_id = %self.id,
                        reason = escalation.reason.as_str(),
                        position = escalation.position,
                        failures = escalation.failures,
                        "Audit session escalated"
                    );
                    self.emit(SessionEvent::Escalated {
                        reason: escalation.reason,
                        position: escalation.position,
                        failures: escalation.failures,
                    });
                }
                Err(err)
            }
        }
    }

    /// A stalled stream is a failed idea: it goes through the same takeover
    /// path as a rejected verdict.
    fn generation_timed_out(
        &mut self,
        extractor: IdeaExtractor,
        anchor: &Anchor<'_>,
    ) -> Result<AttemptOutcome, AuditError> {
        let end = extractor.stream_len();
        let mut idea = extractor
            .abandon()
            .unwrap_or_else(|| IdeaUnit::new("", end, end));
        tracing::warn!(
            session_id = %self.id,
            timeout_ms = self.config.audit.chunk_timeout_ms,
            "Generation stalled"
        );

        self.controller.submit(&mut idea)?;
        let verdict = AuditVerdict::generation_timeout(self.config.audit.chunk_timeout());
        match self.settle(idea, verdict, anchor)? {
            Step::Finished(outcome) => Ok(outcome),
            Step::Continue => Ok(AttemptOutcome::TakenOver),
        }
    }

    fn end_of_stream(&mut self, extractor: IdeaExtractor) -> Result<AttemptOutcome, AuditError> {
        let events = match extractor.finish() {
            Ok(events) => events,
            Err(malformed) => return Ok(AttemptOutcome::Broken(StreamFault::Malformed(malformed))),
        };

        for event in events {
            if let ExtractEvent::Narrative(text) = event {
                self.controller.note_narrative(&text);
                self.emit(SessionEvent::Narrative { text });
            }
        }

        let answer = self.controller.complete(None, &mut self.log)?;
        self.emit(SessionEvent::AnswerReady {
            answer: answer.display_text(),
        });
        Ok(AttemptOutcome::Completed(answer))
    }

    /// Broken attempts leave the log untouched and are retried from it.
    fn restart_after(&mut self, fault: StreamFault) -> Result<(), AuditError> {
        self.controller.discard_attempt();
        self.stream_restarts += 1;
        let cause = match &fault {
            StreamFault::Malformed(err) => err.to_string(),
            StreamFault::Interrupted(message) => message.clone(),
        };

        if self.stream_restarts > self.config.audit.max_stream_restarts {
            let restarts = self.stream_restarts - 1;
            tracing::error!(
                session_id = %self.id,
                restarts,
                cause = cause.as_str(),
                "Giving up on broken generation stream"
            );
            return Err(match fault {
                StreamFault::Malformed(source) => AuditError::MalformedStream { restarts, source },
                StreamFault::Interrupted(message) => TransportError::Stream {
                    provider: self.generator.name().to_string(),
                    message,
                }
                .into(),
            });
        }

        tracing::warn!(
            session_id = %self.id,
            restarts = self.stream_restarts,
            cause = cause.as_str(),
            "Generation stream broke; restarting attempt"
        );
        self.emit(SessionEvent::StreamRestarted {
            restarts: self.stream_restarts,
            cause,
        });
        Ok(())
    }

    fn cancelled(&self) -> AuditError {
        tracing::info!(
            session_id = %self.id,
            messages = self.log.len(),
            "Audit session cancelled"
        );
        AuditError::Cancelled
    }

    fn emit(&self, event: SessionEvent) {
        self.observer.record_event(&event);
    }
}
