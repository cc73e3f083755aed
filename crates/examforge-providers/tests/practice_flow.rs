//! End-to-end practice sessions driven against the mock collaborators.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::mpsc;

use examforge_core::access::AccessPolicy;
use examforge_core::engine::{
    Collaborators, Command, EngineConfig, PracticeEngine, PracticeReporter,
};
use examforge_core::error::StartError;
use examforge_core::explain::{ExplainHistory, HistoryEntry};
use examforge_core::model::{AccessGrant, Answer, BankId, BankSelection, Question};
use examforge_core::score::SessionScore;
use examforge_core::session::{Session, SubmitReceipt};
use examforge_core::time::{fixed_now, Clock};
use examforge_providers::mock::{
    MockAttemptRecorder, MockExplainer, MockIdentity, MockQuestionStore,
};

#[derive(Default)]
struct StatusLog(Mutex<Vec<String>>);

impl StatusLog {
    fn lines(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

impl PracticeReporter for StatusLog {
    fn on_question(&self, _: &Session) {}
    fn on_tick(&self, _: u32) {}
    fn on_submitted(&self, _: &Session, _: &SubmitReceipt) {}
    fn on_status(&self, message: &str) {
        self.0.lock().unwrap().push(message.to_string());
    }
    fn on_explanation(&self, _: &HistoryEntry) {}
    fn on_history(&self, _: &ExplainHistory) {}
    fn on_finished(&self, _: &Session, _: &SessionScore) {}
}

struct Harness {
    engine: PracticeEngine,
    store: Arc<MockQuestionStore>,
    attempts: Arc<MockAttemptRecorder>,
    explainer: Arc<MockExplainer>,
}

fn harness(
    identity: MockIdentity,
    store: MockQuestionStore,
    attempts: MockAttemptRecorder,
    explainer: MockExplainer,
    config: EngineConfig,
) -> Harness {
    let identity = Arc::new(identity);
    let store = Arc::new(store);
    let attempts = Arc::new(attempts);
    let explainer = Arc::new(explainer);
    let collaborators = Collaborators {
        identity: identity.clone(),
        access: identity,
        questions: store.clone(),
        attempts: attempts.clone(),
        explainer: explainer.clone(),
    };
    Harness {
        engine: PracticeEngine::new(collaborators, config).with_clock(Clock::fixed(fixed_now())),
        store,
        attempts,
        explainer,
    }
}

fn cardiology() -> Vec<Question> {
    vec![
        Question::new(
            "c1",
            "First-line therapy for stable angina?",
            vec![
                Answer::new("Beta blocker", true),
                Answer::new("Digoxin", false),
                Answer::new("Warfarin", false),
            ],
        ),
        Question::new(
            "c2",
            "Murmur of aortic stenosis radiates to?",
            vec![Answer::new("Carotids", true), Answer::new("Axilla", false)],
        ),
    ]
}

fn selection() -> BankSelection {
    BankSelection {
        bank_names: vec!["Cardiology".into()],
        ..BankSelection::new(vec![BankId::from("cardio")])
    }
}

#[tokio::test(start_paused = true)]
async fn granted_learner_completes_a_session() {
    let identity = MockIdentity::signed_in("user-1", "learner@example.com").with_grant(
        AccessGrant {
            email: "learner@example.com".into(),
            allowed: true,
            expires_at: None,
        },
    );
    let config = EngineConfig {
        access: AccessPolicy::allowlist(["admin@example.com"]),
        ..EngineConfig::default()
    };
    let h = harness(
        identity,
        MockQuestionStore::new().with_bank("cardio", "Cardiology", cardiology()),
        MockAttemptRecorder::new(),
        MockExplainer::with_fixed_response("Because **beta blockers** lower demand."),
        config,
    );

    let session = h
        .engine
        .start(selection(), &mut StdRng::seed_from_u64(3))
        .await
        .unwrap();
    assert_eq!(h.store.call_count(), 1);
    assert_eq!(session.len(), 2);
    let first_correct = session.questions()[0].correct_index();
    let second_wrong = (session.questions()[1].correct_index() + 1) % 2;
    let second_stem = session.questions()[1].stem.clone();

    let log = StatusLog::default();
    let (tx, rx) = mpsc::channel(16);
    let script = async {
        tx.send(Command::Select(first_correct)).await.unwrap();
        tx.send(Command::Submit).await.unwrap();
        tx.send(Command::Next).await.unwrap();
        tx.send(Command::Select(second_wrong)).await.unwrap();
        tx.send(Command::Submit).await.unwrap();
        tx.send(Command::Explain).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(Command::Finish).await.unwrap();
        tx.send(Command::Quit).await.unwrap();
    };
    let (session, ()) = tokio::join!(h.engine.driver(session).run(rx, &log), script);

    let score = session.score().unwrap();
    assert_eq!((score.correct, score.total), (1, 2));
    assert_eq!(h.attempts.attempts().len(), 2);
    assert!(h.attempts.attempts().iter().all(|a| a.seconds_spent == 0));

    assert_eq!(h.explainer.call_count(), 1);
    assert_eq!(h.explainer.last_request().unwrap().stem, second_stem);
    assert_eq!(session.history().len(), 1);
    assert!(log.lines().contains(&"Asking mock...".to_string()));

    let report = session.report(fixed_now());
    assert_eq!(report.review_queue, vec![1]);
    assert!(report.to_markdown().contains("### Missed"));
}

#[tokio::test(start_paused = true)]
async fn signed_out_learner_cannot_start() {
    let h = harness(
        MockIdentity::signed_out(),
        MockQuestionStore::new().with_bank("cardio", "Cardiology", cardiology()),
        MockAttemptRecorder::new(),
        MockExplainer::with_fixed_response("unused"),
        EngineConfig::default(),
    );
    let err = h
        .engine
        .start(selection(), &mut StdRng::seed_from_u64(1))
        .await
        .unwrap_err();
    assert!(matches!(err, StartError::NotSignedIn));
    assert_eq!(h.store.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn backend_failures_keep_the_session_usable() {
    let h = harness(
        MockIdentity::signed_in("user-1", "learner@example.com"),
        MockQuestionStore::unreachable(),
        MockAttemptRecorder::failing(),
        MockExplainer::failing("quota exceeded"),
        EngineConfig::default(),
    );
    let session = h
        .engine
        .start(selection(), &mut StdRng::seed_from_u64(1))
        .await
        .unwrap();
    assert_eq!(session.len(), 1);
    assert!(session.current_question().id.is_none());

    let log = StatusLog::default();
    let (tx, rx) = mpsc::channel(16);
    let script = async {
        tx.send(Command::Explain).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(Command::Quit).await.unwrap();
    };
    let (session, ()) = tokio::join!(h.engine.driver(session).run(rx, &log), script);

    assert!(log
        .lines()
        .contains(&"AI explanation failed: quota exceeded".to_string()));
    assert!(session.history().is_empty());
    assert!(h.attempts.attempts().is_empty());
}

#[tokio::test(start_paused = true)]
async fn rejected_attempt_writes_do_not_block_scoring() {
    let h = harness(
        MockIdentity::signed_in("user-1", "learner@example.com"),
        MockQuestionStore::new().with_bank("cardio", "Cardiology", cardiology()),
        MockAttemptRecorder::failing(),
        MockExplainer::with_fixed_response("unused"),
        EngineConfig::default(),
    );
    let session = h
        .engine
        .start(selection(), &mut StdRng::seed_from_u64(9))
        .await
        .unwrap();
    let picks: Vec<usize> = session
        .questions()
        .iter()
        .map(Question::correct_index)
        .collect();

    let (tx, rx) = mpsc::channel(16);
    let script = async {
        for (i, pick) in picks.iter().enumerate() {
            tx.send(Command::Jump(i)).await.unwrap();
            tx.send(Command::Select(*pick)).await.unwrap();
            tx.send(Command::Submit).await.unwrap();
        }
        tx.send(Command::Finish).await.unwrap();
        tx.send(Command::Quit).await.unwrap();
    };
    let log = StatusLog::default();
    let (session, ()) = tokio::join!(
        h.engine.driver(session).run(rx, &log),
        script
    );

    assert_eq!(session.score().unwrap().correct, 2);
    assert!(h.attempts.attempts().is_empty());
}
