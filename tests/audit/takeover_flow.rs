use std::sync::Arc;
use std::time::Duration;

use thinktwice::audit::{ReasonCode, Role, SegmentKind};

use super::scripted::{
    ScriptedEvaluator, ScriptedGenerator, chunks, constraints, roles, session, session_config,
};

const TASK: &str = "Write a short sentence about an animal.";

#[tokio::test]
async fn rejected_idea_appends_exactly_one_intervention() {
    let generator = ScriptedGenerator::new(vec![
        chunks(&["<idea>A cat r", "an</idea>"]),
        chunks(&["<idea>Dogs trot</idea>", "<final_answer>Dogs trot.</final_answer>"]),
    ]);
    let evaluator = Arc::new(ScriptedEvaluator::rejecting("a"));
    let mut session = session(session_config(|_| {}), &generator, &evaluator);

    let answer = session
        .run(TASK, constraints(&["Never use the letter 'a'."]))
        .await
        .unwrap();

    assert_eq!(answer.answer(), Some("Dogs trot."));
    assert_eq!(answer.ideas().collect::<Vec<_>>(), vec!["Dogs trot"]);

    let messages = session.log().messages();
    assert_eq!(
        roles(messages),
        vec![
            Role::System,
            Role::User,
            Role::Intervention,
            Role::Assistant,
            Role::Assistant,
        ]
    );

    // The retry saw the seed plus the single intervention, nothing from the
    // rejected attempt.
    let seen = generator.seen_messages();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[1].len(), 3);
    assert_eq!(seen[1][2].0, Role::Intervention);

    let intervention = messages[2].content();
    assert!(intervention.contains("Uses forbidden text 'a'"));
    assert!(intervention.contains("A cat ran"));
    assert!(intervention.contains(TASK));
    assert!(intervention.contains("Never use the letter 'a'."));

    let trail = session.takeovers();
    assert_eq!(trail.len(), 1);
    assert_eq!(trail[0].position, 0);
    assert_eq!(trail[0].retry_count, 1);
    assert_eq!(trail[0].failed_idea.text(), "A cat ran");
    assert_eq!(trail[0].verdict.code, Some(ReasonCode::ConstraintViolation));
    assert_eq!(trail[0].verdict.offending_span, Some(3..4));
    assert_eq!(trail[0].intervention_message.content(), intervention);
}

#[tokio::test]
async fn consecutive_passes_commit_in_order_without_interventions() {
    let generator = ScriptedGenerator::repeating(&[
        "<idea>first step</idea>",
        "\n<idea>second step</idea>\n",
        "<final_answer>done</final_answer>",
    ]);
    let evaluator = Arc::new(ScriptedEvaluator::approving());
    let mut session = session(session_config(|_| {}), &generator, &evaluator);

    let answer = session.run(TASK, constraints(&[])).await.unwrap();

    assert_eq!(
        answer.ideas().collect::<Vec<_>>(),
        vec!["first step", "second step"]
    );
    assert_eq!(answer.content(), "first step\nsecond step\ndone");
    assert_eq!(generator.calls(), 1);
    assert_eq!(session.attempts(), 1);
    assert!(session.takeovers().is_empty());
    assert_eq!(session.log().count_role(Role::Intervention), 0);
    assert_eq!(evaluator.reviewed(), vec!["first step", "second step"]);
}

#[tokio::test]
async fn rejected_ideas_and_their_lead_in_never_reach_the_answer() {
    let generator = ScriptedGenerator::new(vec![
        chunks(&["intro <idea>good one</idea> filler <idea>REJECTME x</idea> more"]),
        chunks(&["<idea>good two</idea><final_answer>fine</final_answer>"]),
    ]);
    let evaluator = Arc::new(ScriptedEvaluator::rejecting("REJECTME"));
    let mut session = session(session_config(|_| {}), &generator, &evaluator);

    let answer = session.run(TASK, constraints(&[])).await.unwrap();

    assert_eq!(answer.content(), "intro\ngood one\ngood two\nfine");
    assert!(!answer.content().contains("REJECTME"));
    assert!(!answer.content().contains("filler"));
    assert_eq!(answer.segments()[0].kind, SegmentKind::Narrative);

    // The rejected attempt's trailing text was never read into the log.
    for message in session.log().messages() {
        if message.role() == Role::Assistant {
            assert!(!message.content().contains("REJECTME"));
            assert!(!message.content().contains("more"));
        }
    }
}

#[tokio::test]
async fn auditor_timeout_is_a_failed_verdict_with_its_own_code() {
    let generator = ScriptedGenerator::new(vec![
        chunks(&["<idea>slow to judge</idea>"]),
        chunks(&["<idea>quick</idea><final_answer>ok</final_answer>"]),
    ]);
    let evaluator = Arc::new(
        ScriptedEvaluator::approving().with_delays(vec![Duration::from_millis(500)]),
    );
    let config = session_config(|config| config.audit.audit_timeout_ms = 50);
    let mut session = session(config, &generator, &evaluator);

    let answer = session.run(TASK, constraints(&[])).await.unwrap();

    assert_eq!(answer.answer(), Some("ok"));
    let trail = session.takeovers();
    assert_eq!(trail.len(), 1);
    assert_eq!(trail[0].verdict.code, Some(ReasonCode::AuditorTimeout));
    assert_eq!(trail[0].failed_idea.text(), "slow to judge");
    assert!(
        session.log().messages()[2]
            .content()
            .contains("slow to judge")
    );
}

#[tokio::test]
async fn intervention_suggestion_reaches_the_retry() {
    let generator = ScriptedGenerator::new(vec![
        chunks(&["<idea>A cat</idea>"]),
        chunks(&["<final_answer>Felines sprint.</final_answer>"]),
    ]);
    let evaluator = Arc::new(ScriptedEvaluator::rejecting("cat"));
    let mut session = session(session_config(|_| {}), &generator, &evaluator);

    session.run(TASK, constraints(&[])).await.unwrap();

    let retry_view = &generator.seen_messages()[1];
    let (role, intervention) = retry_view.last().unwrap();
    assert_eq!(*role, Role::Intervention);
    assert!(intervention.contains("Rephrase without 'cat'"));
}
