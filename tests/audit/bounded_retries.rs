use std::sync::Arc;

use thinktwice::AuditError;
use thinktwice::audit::{ControllerState, EscalationReason, ReasonCode, Role};

use super::scripted::{
    ScriptedEvaluator, ScriptedGenerator, chunks, constraints, session, session_config,
};

#[tokio::test]
async fn persistent_failure_escalates_after_max_retries() {
    let generator = ScriptedGenerator::repeating(&["<idea>A cat</idea>"]);
    let evaluator = Arc::new(ScriptedEvaluator::rejecting("cat"));
    let config = session_config(|config| config.audit.max_retries = 2);
    let mut session = session(config, &generator, &evaluator);

    let err = session
        .run("Describe a pet.", constraints(&["No cats."]))
        .await
        .unwrap_err();

    let escalation = err.escalation().expect("escalation error");
    assert_eq!(escalation.reason, EscalationReason::PositionRetriesExceeded);
    assert_eq!(escalation.position, 0);
    assert_eq!(escalation.failures, 3);
    assert_eq!(escalation.max_retries, 2);
    assert_eq!(escalation.trail.len(), 2);
    assert_eq!(escalation.final_idea.text(), "A cat");
    assert_eq!(
        escalation.final_verdict.code,
        Some(ReasonCode::ConstraintViolation)
    );

    // max_retries + 1 generations, then nothing more.
    assert_eq!(generator.calls(), 3);
    assert_eq!(session.attempts(), 3);
    assert_eq!(session.state(), ControllerState::Escalated);
    // The escalating failure does not get an intervention of its own.
    assert_eq!(session.log().count_role(Role::Intervention), 2);
    assert_eq!(session.log().count_role(Role::Assistant), 0);
}

#[tokio::test]
async fn temperature_steps_up_with_repeated_failures() {
    let generator = ScriptedGenerator::repeating(&["<idea>A cat</idea>"]);
    let evaluator = Arc::new(ScriptedEvaluator::rejecting("cat"));
    let config = session_config(|config| {
        config.audit.max_retries = 3;
        config.audit.base_temperature = 0.2;
        config.audit.temperature_step = 0.25;
        config.audit.max_temperature = 0.6;
    });
    let mut session = session(config, &generator, &evaluator);

    assert!(session.run("Describe a pet.", constraints(&[])).await.is_err());

    let temperatures = generator.temperatures();
    assert_eq!(temperatures.len(), 4);
    let expected = [0.2, 0.2, 0.45, 0.6];
    for (seen, want) in temperatures.iter().zip(expected) {
        assert!((seen - want).abs() < 1e-9, "{temperatures:?}");
    }
}

#[tokio::test]
async fn session_takeover_cap_escalates_across_positions() {
    // Each position fails once, then passes on the retry.
    let generator = ScriptedGenerator::new(vec![
        chunks(&["<idea>bad one</idea>"]),
        chunks(&["<idea>good one</idea>", "<idea>bad two</idea>"]),
        chunks(&["<idea>good two</idea>", "<idea>bad three</idea>"]),
    ]);
    let evaluator = Arc::new(ScriptedEvaluator::rejecting("bad"));
    let config = session_config(|config| {
        config.audit.max_retries = 5;
        config.audit.max_takeovers = 2;
    });
    let mut session = session(config, &generator, &evaluator);

    let err = session.run("Count.", constraints(&[])).await.unwrap_err();

    let escalation = err.escalation().expect("escalation error");
    assert_eq!(escalation.reason, EscalationReason::TotalTakeoversExceeded);
    assert_eq!(escalation.position, 2);
    assert_eq!(escalation.trail.len(), 2);
    assert_eq!(generator.calls(), 3);
}

#[tokio::test]
async fn retry_count_resets_when_a_position_commits() {
    let generator = ScriptedGenerator::new(vec![
        chunks(&["<idea>bad one</idea>"]),
        chunks(&["<idea>good one</idea>", "<idea>bad two</idea>"]),
        chunks(&["<idea>good two</idea><final_answer>two</final_answer>"]),
    ]);
    let evaluator = Arc::new(ScriptedEvaluator::rejecting("bad"));
    let config = session_config(|config| config.audit.max_retries = 1);
    let mut session = session(config, &generator, &evaluator);

    let answer = session.run("Count.", constraints(&[])).await.unwrap();

    assert_eq!(answer.answer(), Some("two"));
    let positions: Vec<_> = session
        .takeovers()
        .iter()
        .map(|record| (record.position, record.retry_count))
        .collect();
    assert_eq!(positions, vec![(0, 1), (1, 1)]);
}

#[tokio::test]
async fn escalation_is_reported_through_the_error_type() {
    let generator = ScriptedGenerator::repeating(&["<idea>nope</idea>"]);
    let evaluator = Arc::new(ScriptedEvaluator::rejecting("nope"));
    let config = session_config(|config| config.audit.max_retries = 0);
    let mut session = session(config, &generator, &evaluator);

    let err = session.run("Anything.", constraints(&[])).await.unwrap_err();

    assert!(matches!(err, AuditError::Escalated(_)));
    assert!(err.to_string().contains("position_retries_exceeded"));
    assert_eq!(generator.calls(), 1);
    assert!(session.takeovers().is_empty());
}
