use std::sync::Arc;
use std::time::Duration;

use thinktwice::AuditError;
use thinktwice::audit::{ChannelObserver, ReasonCode, Role, SessionEvent};
use thinktwice::error::TransportError;

use super::scripted::{
    Beat, ScriptedEvaluator, ScriptedGenerator, chunks, constraints, session, session_config, text,
};

#[tokio::test]
async fn stalled_stream_is_taken_over_as_a_generation_timeout() {
    let generator = ScriptedGenerator::new(vec![
        vec![text("<idea>half a th"), Beat::Stall],
        chunks(&["<idea>whole</idea><final_answer>w</final_answer>"]),
    ]);
    let evaluator = Arc::new(ScriptedEvaluator::approving());
    let config = session_config(|config| config.audit.chunk_timeout_ms = 50);
    let mut session = session(config, &generator, &evaluator);

    let answer = session.run("Think.", constraints(&[])).await.unwrap();

    assert_eq!(answer.answer(), Some("w"));
    let trail = session.takeovers();
    assert_eq!(trail.len(), 1);
    assert_eq!(trail[0].verdict.code, Some(ReasonCode::GenerationTimeout));
    assert_eq!(trail[0].failed_idea.text(), "half a th");
    assert_eq!(session.log().count_role(Role::Intervention), 1);
    // The partial idea never went to the auditor.
    assert_eq!(evaluator.reviewed(), vec!["whole"]);
}

#[tokio::test]
async fn stall_outside_any_idea_still_counts_against_the_position() {
    let generator = ScriptedGenerator::new(vec![vec![text("thinking "), Beat::Stall]]);
    let evaluator = Arc::new(ScriptedEvaluator::approving());
    let config = session_config(|config| {
        config.audit.chunk_timeout_ms = 30;
        config.audit.max_retries = 1;
    });
    let mut session = session(config, &generator, &evaluator);

    let err = session.run("Think.", constraints(&[])).await.unwrap_err();

    let escalation = err.escalation().expect("escalation error");
    assert_eq!(
        escalation.final_verdict.code,
        Some(ReasonCode::GenerationTimeout)
    );
    assert_eq!(generator.calls(), 2);
    assert!(evaluator.reviewed().is_empty());
}

#[tokio::test]
async fn truncated_idea_restarts_without_touching_the_log() {
    let generator = ScriptedGenerator::new(vec![
        chunks(&["<idea>never clo"]),
        chunks(&["<idea>closed</idea><final_answer>c</final_answer>"]),
    ]);
    let evaluator = Arc::new(ScriptedEvaluator::approving());
    let (observer, mut events) = ChannelObserver::channel();
    let mut session =
        session(session_config(|_| {}), &generator, &evaluator).with_observer(Arc::new(observer));

    let answer = session.run("Think.", constraints(&[])).await.unwrap();

    assert_eq!(answer.answer(), Some("c"));
    assert_eq!(session.attempts(), 2);
    assert!(session.takeovers().is_empty());

    // Both attempts started from the same two seed messages.
    let seen = generator.seen_messages();
    assert_eq!(seen[0], seen[1]);
    assert_eq!(seen[1].len(), 2);

    let mut restarted = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let SessionEvent::StreamRestarted { restarts, cause } = event {
            restarted.push((restarts, cause));
        }
    }
    assert_eq!(restarted.len(), 1);
    assert_eq!(restarted[0].0, 1);
    assert!(restarted[0].1.contains("</idea>"));
}

#[tokio::test]
async fn narrative_from_a_broken_attempt_is_not_committed() {
    let generator = ScriptedGenerator::new(vec![
        chunks(&["Let me think. <idea>never clo"]),
        chunks(&["Let me think. <idea>ok</idea><final_answer>x</final_answer>"]),
    ]);
    let evaluator = Arc::new(ScriptedEvaluator::approving());
    let mut session = session(session_config(|_| {}), &generator, &evaluator);

    let answer = session.run("Think.", constraints(&[])).await.unwrap();

    assert_eq!(answer.content(), "Let me think.\nok\nx");
    assert_eq!(answer.content().matches("Let me think.").count(), 1);
    let committed: Vec<_> = session.log().messages()[2..]
        .iter()
        .map(|m| m.content().to_string())
        .collect();
    assert_eq!(
        committed,
        vec![
            "Let me think.\n<idea>ok</idea>",
            "<final_answer>x</final_answer>"
        ]
    );
}

#[tokio::test]
async fn narrative_before_a_transport_break_is_dropped() {
    let generator = ScriptedGenerator::new(vec![
        vec![text("Half a plan. "), Beat::Fail("connection reset".into())],
        chunks(&["<idea>whole</idea><final_answer>w</final_answer>"]),
    ]);
    let evaluator = Arc::new(ScriptedEvaluator::approving());
    let mut session = session(session_config(|_| {}), &generator, &evaluator);

    let answer = session.run("Plan.", constraints(&[])).await.unwrap();

    assert_eq!(answer.content(), "whole\nw");
    assert_eq!(session.attempts(), 2);
    assert!(
        session
            .log()
            .messages()
            .iter()
            .all(|m| !m.content().contains("Half a plan"))
    );
}

#[tokio::test]
async fn repeated_truncation_surfaces_a_malformed_stream_error() {
    let generator = ScriptedGenerator::repeating(&["ok <final_answer>cut sh"]);
    let evaluator = Arc::new(ScriptedEvaluator::approving());
    let config = session_config(|config| config.audit.max_stream_restarts = 1);
    let mut session = session(config, &generator, &evaluator);

    let err = session.run("Think.", constraints(&[])).await.unwrap_err();

    let AuditError::MalformedStream { restarts, source } = err else {
        panic!("expected malformed stream, got {err:?}");
    };
    assert_eq!(restarts, 1);
    assert_eq!(source.block, "final_answer");
    assert_eq!(source.expected, "</final_answer>");
    assert_eq!(generator.calls(), 2);
    assert_eq!(session.log().len(), 2);
}

#[tokio::test]
async fn broken_transport_mid_stream_is_restarted_then_reported() {
    let generator = ScriptedGenerator::new(vec![vec![
        text("<idea>par"),
        Beat::Fail("connection reset by peer".into()),
    ]]);
    let evaluator = Arc::new(ScriptedEvaluator::approving());
    let config = session_config(|config| config.audit.max_stream_restarts = 2);
    let mut session = session(config, &generator, &evaluator);

    let err = session.run("Think.", constraints(&[])).await.unwrap_err();

    let AuditError::Transport(TransportError::Stream { provider, message }) = err else {
        panic!("expected stream transport error, got {err:?}");
    };
    assert_eq!(provider, "scripted");
    assert!(message.contains("connection reset"));
    assert_eq!(generator.calls(), 3);
    assert_eq!(session.log().len(), 2);
}

#[tokio::test]
async fn cancellation_stops_the_session_and_leaves_a_valid_log() {
    let generator = ScriptedGenerator::new(vec![vec![
        text("<idea>committed</idea>"),
        Beat::Sleep(Duration::from_millis(20)),
        text("<idea>pend"),
        Beat::Stall,
    ]]);
    let evaluator = Arc::new(ScriptedEvaluator::approving());
    let mut session = session(session_config(|_| {}), &generator, &evaluator);

    let token = session.cancellation_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        token.cancel();
    });

    let err = session.run("Think.", constraints(&[])).await.unwrap_err();

    assert!(matches!(err, AuditError::Cancelled));
    let messages = session.log().messages();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[2].role(), Role::Assistant);
    assert_eq!(messages[2].content(), "<idea>committed</idea>");
    assert!(session.takeovers().is_empty());
}

#[tokio::test]
async fn cancelled_before_start_opens_no_stream() {
    let generator = ScriptedGenerator::repeating(&["<final_answer>x</final_answer>"]);
    let evaluator = Arc::new(ScriptedEvaluator::approving());
    let token = tokio_util::sync::CancellationToken::new();
    token.cancel();
    let mut session =
        session(session_config(|_| {}), &generator, &evaluator).with_cancellation(token);

    let err = session.run("Think.", constraints(&[])).await.unwrap_err();

    assert!(matches!(err, AuditError::Cancelled));
    assert_eq!(generator.calls(), 0);
}
