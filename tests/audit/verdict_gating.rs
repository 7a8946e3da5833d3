use std::sync::Arc;
use std::time::Duration;

use thinktwice::audit::{ChannelObserver, SessionEvent};

use super::scripted::{
    ScriptedEvaluator, ScriptedGenerator, chunks, constraints, session, session_config, text,
};

fn drain(events: &mut tokio::sync::mpsc::UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}

#[tokio::test]
async fn each_idea_is_resolved_before_the_next_is_submitted() {
    // Three ideas arrive in one chunk, so all are available at once.
    let generator = ScriptedGenerator::repeating(&[
        "<idea>one</idea><idea>two</idea><idea>three</idea><final_answer>3</final_answer>",
    ]);
    let evaluator = Arc::new(ScriptedEvaluator::approving().with_delays(vec![
        Duration::from_millis(30),
        Duration::from_millis(10),
        Duration::from_millis(20),
    ]));
    let (observer, mut events) = ChannelObserver::channel();
    let mut session =
        session(session_config(|_| {}), &generator, &evaluator).with_observer(Arc::new(observer));

    session.run("Count.", constraints(&[])).await.unwrap();

    assert_eq!(evaluator.max_in_flight(), 1);
    assert_eq!(evaluator.reviewed(), vec!["one", "two", "three"]);

    let mut awaiting: Option<usize> = None;
    let mut passed = Vec::new();
    for event in drain(&mut events) {
        match event {
            SessionEvent::IdeaSubmitted { position, .. } => {
                assert!(awaiting.is_none(), "idea submitted while {awaiting:?} pending");
                awaiting = Some(position);
            }
            SessionEvent::IdeaPassed { position, text } => {
                assert_eq!(awaiting.take(), Some(position));
                passed.push(text);
            }
            SessionEvent::AnswerReady { answer } => {
                assert!(awaiting.is_none());
                assert_eq!(answer, "3");
            }
            _ => {}
        }
    }
    assert_eq!(passed, vec!["one", "two", "three"]);
}

#[tokio::test]
async fn rejection_emits_rejected_then_takeover() {
    let generator = ScriptedGenerator::new(vec![
        chunks(&["<idea>wrong</idea>"]),
        chunks(&["<final_answer>right</final_answer>"]),
    ]);
    let evaluator = Arc::new(ScriptedEvaluator::rejecting("wrong"));
    let (observer, mut events) = ChannelObserver::channel();
    let mut session =
        session(session_config(|_| {}), &generator, &evaluator).with_observer(Arc::new(observer));

    session.run("Decide.", constraints(&[])).await.unwrap();

    let kinds: Vec<_> = drain(&mut events)
        .into_iter()
        .filter_map(|event| match event {
            SessionEvent::AttemptStarted { attempt, .. } => Some(format!("attempt:{attempt}")),
            SessionEvent::IdeaSubmitted { .. } => Some("submitted".into()),
            SessionEvent::IdeaRejected { .. } => Some("rejected".into()),
            SessionEvent::Takeover { retry_count, .. } => Some(format!("takeover:{retry_count}")),
            SessionEvent::AnswerReady { .. } => Some("answer".into()),
            _ => None,
        })
        .collect();
    assert_eq!(
        kinds,
        vec![
            "attempt:1",
            "submitted",
            "rejected",
            "takeover:1",
            "attempt:2",
            "answer"
        ]
    );
}

#[tokio::test]
async fn speculative_chunks_are_discarded_after_a_rejection() {
    let generator = ScriptedGenerator::new(vec![
        vec![
            text("<idea>bad start</idea>"),
            text(" speculative "),
            text("<idea>built on bad</idea>"),
        ],
        chunks(&["<idea>fresh</idea><final_answer>f</final_answer>"]),
    ]);
    let evaluator = Arc::new(
        ScriptedEvaluator::rejecting("bad start").with_delays(vec![Duration::from_millis(100)]),
    );
    let mut session = session(session_config(|_| {}), &generator, &evaluator);

    let answer = session.run("Go.", constraints(&[])).await.unwrap();

    assert_eq!(answer.content(), "fresh\nf");
    // The rest of the first stream was read ahead while the verdict was
    // pending, then thrown away.
    assert_eq!(generator.yielded_chunks(), 4);
    assert_eq!(evaluator.reviewed(), vec!["bad start", "fresh"]);
    assert!(
        session
            .log()
            .messages()
            .iter()
            .all(|m| !m.content().contains("speculative") && !m.content().contains("built on"))
    );
}

#[tokio::test]
async fn prefetch_can_be_disabled() {
    let generator = ScriptedGenerator::new(vec![
        vec![
            text("<idea>bad start</idea>"),
            text(" speculative "),
            text("<idea>built on bad</idea>"),
        ],
        chunks(&["<idea>fresh</idea><final_answer>f</final_answer>"]),
    ]);
    let evaluator = Arc::new(
        ScriptedEvaluator::rejecting("bad start").with_delays(vec![Duration::from_millis(50)]),
    );
    let config = session_config(|config| config.audit.speculative_prefetch = false);
    let mut session = session(config, &generator, &evaluator);

    session.run("Go.", constraints(&[])).await.unwrap();

    assert_eq!(generator.yielded_chunks(), 2);
}

#[tokio::test]
async fn buffered_chunks_are_replayed_after_a_pass() {
    let generator = ScriptedGenerator::repeating(&[
        "<idea>slow</idea>",
        " then ",
        "<idea>next</idea>",
        "<final_answer>done</final_answer>",
    ]);
    let evaluator = Arc::new(
        ScriptedEvaluator::approving().with_delays(vec![Duration::from_millis(60)]),
    );
    let mut session = session(session_config(|_| {}), &generator, &evaluator);

    let answer = session.run("Go.", constraints(&[])).await.unwrap();

    assert_eq!(answer.content(), "slow\nthen\nnext\ndone");
    assert_eq!(evaluator.reviewed(), vec!["slow", "next"]);
    assert_eq!(generator.calls(), 1);
}
