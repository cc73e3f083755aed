//! Practice engine orchestrator.
//!
//! `PracticeEngine` gates and builds sessions from the collaborators.
//! `PracticeDriver` runs one session as a single actor: a `tokio::select!`
//! loop over learner commands, countdown ticks and explanation completions.
//! Attempt writes and explanation requests are spawned with by-value inputs
//! and never touch session state directly.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};

use crate::access::AccessPolicy;
use crate::error::{ServiceError, StartError};
use crate::explain::{ExplainHistory, ExplainMode, ExplainTicket, HistoryEntry};
use crate::model::BankSelection;
use crate::score::SessionScore;
use crate::session::{Session, SessionConfig, SubmitOutcome, SubmitReceipt, TickOutcome};
use crate::time::Clock;
use crate::timer::{TimerGeneration, DEFAULT_QUESTION_SECONDS};
use crate::traits::{
    AccessDirectory, AttemptRecord, AttemptRecorder, Explanation, ExplanationService,
    IdentityProvider, QuestionStore,
};

const TICK_PERIOD: Duration = Duration::from_secs(1);

/// Configuration for the practice engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Countdown length per question in timed sessions.
    pub question_seconds: u32,
    /// Initial explanation mode.
    pub explain_mode: ExplainMode,
    /// Who may start a session.
    pub access: AccessPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            question_seconds: DEFAULT_QUESTION_SECONDS,
            explain_mode: ExplainMode::default(),
            access: AccessPolicy::open(),
        }
    }
}

/// The backends a practice session talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub identity: Arc<dyn IdentityProvider>,
    pub access: Arc<dyn AccessDirectory>,
    pub questions: Arc<dyn QuestionStore>,
    pub attempts: Arc<dyn AttemptRecorder>,
    pub explainer: Arc<dyn ExplanationService>,
}

/// A learner action fed into a running session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Select(usize),
    MoveSelection(isize),
    Submit,
    Next,
    Previous,
    Jump(usize),
    ToggleFlag,
    SetTimed(bool),
    ToggleTimed,
    Explain,
    FollowUp(String),
    ToggleExplainMode,
    ShowHistory,
    Finish,
    Review,
    Quit,
}

/// Progress reporting trait.
pub trait PracticeReporter: Send + Sync {
    /// The current question changed or needs redrawing.
    fn on_question(&self, session: &Session);
    fn on_tick(&self, remaining_secs: u32);
    fn on_submitted(&self, session: &Session, receipt: &SubmitReceipt);
    /// One-line status for the learner.
    fn on_status(&self, message: &str);
    fn on_explanation(&self, entry: &HistoryEntry);
    fn on_history(&self, history: &ExplainHistory);
    fn on_finished(&self, session: &Session, score: &SessionScore);
}

/// No-op progress reporter.
pub struct NoopReporter;

impl PracticeReporter for NoopReporter {
    fn on_question(&self, _: &Session) {}
    fn on_tick(&self, _: u32) {}
    fn on_submitted(&self, _: &Session, _: &SubmitReceipt) {}
    fn on_status(&self, _: &str) {}
    fn on_explanation(&self, _: &HistoryEntry) {}
    fn on_history(&self, _: &ExplainHistory) {}
    fn on_finished(&self, _: &Session, _: &SessionScore) {}
}

/// Builds practice sessions.
pub struct PracticeEngine {
    collaborators: Collaborators,
    config: EngineConfig,
    clock: Clock,
}

impl PracticeEngine {
    pub fn new(collaborators: Collaborators, config: EngineConfig) -> Self {
        Self {
            collaborators,
            config,
            clock: Clock::System,
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Start a session for the signed-in learner.
    ///
    /// A failing question fetch is logged and treated as an empty bank, so
    /// the learner lands on the placeholder question. A failing grants fetch
    /// is treated as no grants.
    pub async fn start<R>(
        &self,
        selection: BankSelection,
        rng: &mut R,
    ) -> Result<Session, StartError>
    where
        R: Rng + Send + ?Sized,
    {
        let user = self
            .collaborators
            .identity
            .current_user()
            .await?
            .ok_or(StartError::NotSignedIn)?;

        if selection.bank_ids.is_empty() {
            return Err(StartError::NoBanksSelected);
        }

        if self.config.access.enforce {
            let grants = match self.collaborators.access.access_grants().await {
                Ok(grants) => grants,
                Err(e) => {
                    tracing::warn!("failed to fetch access grants: {e:#}");
                    Vec::new()
                }
            };
            self.config.access.check(&user, &grants, self.clock.now())?;
        }

        let questions = match self
            .collaborators
            .questions
            .fetch_questions(&selection.bank_ids)
            .await
        {
            Ok(questions) => questions,
            Err(e) => {
                tracing::warn!(banks = selection.bank_ids.len(), "failed to fetch questions: {e:#}");
                Vec::new()
            }
        };

        Ok(Session::start(
            selection,
            user,
            questions,
            SessionConfig {
                question_seconds: self.config.question_seconds,
            },
            rng,
            self.clock.now(),
        ))
    }

    /// Wrap a started session in a driver wired to this engine's collaborators.
    pub fn driver(&self, session: Session) -> PracticeDriver {
        PracticeDriver::new(
            session,
            Arc::clone(&self.collaborators.attempts),
            Arc::clone(&self.collaborators.explainer),
            self.config.explain_mode,
            self.clock,
        )
    }
}

type ExplainCompletion = (ExplainTicket, anyhow::Result<Explanation>);

/// Runs one session until the learner quits.
pub struct PracticeDriver {
    session: Session,
    attempts: Arc<dyn AttemptRecorder>,
    explainer: Arc<dyn ExplanationService>,
    explain_mode: ExplainMode,
    clock: Clock,
    ticks_tx: mpsc::UnboundedSender<TimerGeneration>,
    ticks_rx: mpsc::UnboundedReceiver<TimerGeneration>,
    explain_tx: mpsc::UnboundedSender<ExplainCompletion>,
    explain_rx: mpsc::UnboundedReceiver<ExplainCompletion>,
    ticker: Option<(TimerGeneration, JoinHandle<()>)>,
    explain_task: Option<JoinHandle<()>>,
    writes: JoinSet<()>,
}

impl PracticeDriver {
    pub fn new(
        session: Session,
        attempts: Arc<dyn AttemptRecorder>,
        explainer: Arc<dyn ExplanationService>,
        explain_mode: ExplainMode,
        clock: Clock,
    ) -> Self {
        let (ticks_tx, ticks_rx) = mpsc::unbounded_channel();
        let (explain_tx, explain_rx) = mpsc::unbounded_channel();
        Self {
            session,
            attempts,
            explainer,
            explain_mode,
            clock,
            ticks_tx,
            ticks_rx,
            explain_tx,
            explain_rx,
            ticker: None,
            explain_task: None,
            writes: JoinSet::new(),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn explain_mode(&self) -> ExplainMode {
        self.explain_mode
    }

    /// Process commands until `Command::Quit` or the sender is dropped.
    ///
    /// Pending attempt writes are flushed before the session is returned.
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        reporter: &dyn PracticeReporter,
    ) -> Session {
        reporter.on_question(&self.session);
        self.sync_timer();

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Quit) | None => break,
                    Some(command) => self.dispatch(command, reporter),
                },
                Some(generation) = self.ticks_rx.recv() => self.on_tick(generation, reporter),
                Some((ticket, result)) = self.explain_rx.recv() => {
                    self.on_explanation(&ticket, result, reporter);
                }
                Some(joined) = self.writes.join_next(), if !self.writes.is_empty() => {
                    if let Err(e) = joined {
                        tracing::warn!("attempt write task failed: {e}");
                    }
                }
            }
            self.sync_timer();
        }

        self.shutdown().await;
        self.session
    }

    fn dispatch(&mut self, command: Command, reporter: &dyn PracticeReporter) {
        tracing::debug!(?command, current = self.session.current(), "dispatch");
        let now = self.clock.now();
        match command {
            Command::Select(index) => match self.session.select_answer(index) {
                Ok(true) => reporter.on_question(&self.session),
                Ok(false) => reporter.on_status("Answer already submitted."),
                Err(e) => reporter.on_status(&e.to_string()),
            },
            Command::MoveSelection(delta) => {
                if self.session.move_selection(delta).is_some() {
                    reporter.on_question(&self.session);
                }
            }
            Command::Submit => match self.session.submit(now) {
                Ok(SubmitOutcome::Locked(receipt)) => self.on_locked(receipt, reporter),
                Ok(SubmitOutcome::AlreadySubmitted) => {
                    reporter.on_status("Answer already submitted.");
                }
                Err(e) => reporter.on_status(&e.to_string()),
            },
            Command::Next => {
                self.session.next(now);
                reporter.on_question(&self.session);
            }
            Command::Previous => {
                self.session.previous(now);
                reporter.on_question(&self.session);
            }
            Command::Jump(index) => match self.session.jump(index, now) {
                Ok(()) => reporter.on_question(&self.session),
                Err(e) => reporter.on_status(&e.to_string()),
            },
            Command::ToggleFlag => {
                let flagged = self.session.toggle_flag();
                reporter.on_status(if flagged { "Flagged." } else { "Flag removed." });
            }
            Command::SetTimed(timed) => self.set_timed(timed, reporter),
            Command::ToggleTimed => self.set_timed(!self.session.is_timed(), reporter),
            Command::Explain => self.request_explanation(None, reporter),
            Command::FollowUp(text) => self.request_explanation(Some(text), reporter),
            Command::ToggleExplainMode => {
                self.explain_mode = self.explain_mode.toggled();
                reporter.on_status(&format!("Explanation mode: {}", self.explain_mode));
            }
            Command::ShowHistory => reporter.on_history(self.session.history()),
            Command::Finish => match self.session.finish(now) {
                Ok(score) => {
                    reporter.on_finished(&self.session, &score);
                    if self.session.is_review_mode() {
                        reporter.on_question(&self.session);
                    }
                }
                Err(e) => reporter.on_status(&e.to_string()),
            },
            Command::Review => match self.session.enter_review(now) {
                Ok(()) => reporter.on_question(&self.session),
                Err(e) => reporter.on_status(&e.to_string()),
            },
            Command::Quit => {}
        }
    }

    fn set_timed(&mut self, timed: bool, reporter: &dyn PracticeReporter) {
        self.session.set_timed(timed);
        reporter.on_status(if timed { "Timer on." } else { "Timer off." });
    }

    fn on_tick(&mut self, generation: TimerGeneration, reporter: &dyn PracticeReporter) {
        match self.session.tick(generation, self.clock.now()) {
            TickOutcome::Stale => {}
            TickOutcome::Running(remaining) => reporter.on_tick(remaining),
            TickOutcome::Expired(SubmitOutcome::Locked(receipt)) => {
                reporter.on_tick(0);
                reporter.on_status("Time's up.");
                self.on_locked(receipt, reporter);
            }
            // Revisiting a locked question re-arms the countdown but expiry changes nothing.
            TickOutcome::Expired(SubmitOutcome::AlreadySubmitted) => {
                tracing::debug!(
                    current = self.session.current(),
                    "countdown expired on a locked question"
                );
            }
        }
    }

    fn on_locked(&mut self, receipt: SubmitReceipt, reporter: &dyn PracticeReporter) {
        if let Some(attempt) = receipt.attempt.clone() {
            self.record_attempt(attempt);
        }
        reporter.on_submitted(&self.session, &receipt);
    }

    fn record_attempt(&mut self, attempt: AttemptRecord) {
        let recorder = Arc::clone(&self.attempts);
        self.writes.spawn(async move {
            if let Err(e) = recorder.log_attempt(&attempt).await {
                tracing::warn!(question_id = %attempt.question_id, "failed to log attempt: {e:#}");
            }
        });
    }

    fn request_explanation(&mut self, follow_up: Option<String>, reporter: &dyn PracticeReporter) {
        let (ticket, request) = match self
            .session
            .begin_explanation(follow_up.as_deref(), self.explain_mode)
        {
            Ok(pair) => pair,
            Err(e) => {
                reporter.on_status(&e.to_string());
                return;
            }
        };
        reporter.on_status(&format!("Asking {}...", self.explainer.name()));

        let explainer = Arc::clone(&self.explainer);
        let tx = self.explain_tx.clone();
        self.explain_task = Some(tokio::spawn(async move {
            let result = explainer.explain(&request).await;
            // The receiver lives as long as the driver; a send error means it quit.
            let _ = tx.send((ticket, result));
        }));
    }

    fn on_explanation(
        &mut self,
        ticket: &ExplainTicket,
        result: anyhow::Result<Explanation>,
        reporter: &dyn PracticeReporter,
    ) {
        self.explain_task = None;
        let now = self.clock.now();
        match self.session.complete_explanation(ticket, result, now) {
            Ok(entry) => reporter.on_explanation(entry),
            Err(e) => {
                tracing::warn!(question = ticket.question_index, "explanation failed: {e:#}");
                reporter.on_status(&explain_failure_status(&e));
            }
        }
    }

    /// Keep exactly one ticker running for the countdown's live generation.
    fn sync_timer(&mut self) {
        let live = self.session.countdown().generation();
        if self.ticker.as_ref().map(|(g, _)| *g) == live {
            return;
        }
        if let Some((_, handle)) = self.ticker.take() {
            handle.abort();
        }
        if let Some(generation) = live {
            let tx = self.ticks_tx.clone();
            let handle = tokio::spawn(async move {
                let start = tokio::time::Instant::now() + TICK_PERIOD;
                let mut interval = tokio::time::interval_at(start, TICK_PERIOD);
                loop {
                    interval.tick().await;
                    if tx.send(generation).is_err() {
                        break;
                    }
                }
            });
            self.ticker = Some((generation, handle));
        }
    }

    async fn shutdown(&mut self) {
        if let Some((_, handle)) = self.ticker.take() {
            handle.abort();
        }
        if let Some(handle) = self.explain_task.take() {
            handle.abort();
        }
        while let Some(joined) = self.writes.join_next().await {
            if let Err(e) = joined {
                tracing::warn!("attempt write task failed: {e}");
            }
        }
    }
}

/// Status line for a failed explanation request.
fn explain_failure_status(e: &anyhow::Error) -> String {
    let Some(service) = e.downcast_ref::<ServiceError>() else {
        return format!("AI explanation failed: {e}");
    };
    match service.retry_after_ms() {
        Some(ms) => format!(
            "AI explanation failed: rate limited. Try again in {}s.",
            ms.div_ceil(1000)
        ),
        None if service.is_permanent() => {
            format!("AI explanation failed: {service}. Check the explainer settings.")
        }
        None => format!("AI explanation failed: {service}"),
    }
}
