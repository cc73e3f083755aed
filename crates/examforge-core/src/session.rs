//! Practice session state machine.
//!
//! A `Session` owns one quiz attempt: the shuffled questions, one
//! `Submission` per question, the cursor, the countdown and the review queue.
//! It performs no I/O. Operations that need the wall clock take `now`, and
//! operations that produce side effects (attempt logging, explanation
//! requests) hand back by-value records for the caller to dispatch.
//!
//! `questions` and `submissions` are index-aligned and never change length
//! after `start`.

use chrono::{DateTime, Utc};
use rand::Rng;
use uuid::Uuid;

use crate::error::SessionError;
use crate::explain::{
    format_explanation, history_stem, ExplainGate, ExplainHistory, ExplainMode, ExplainTicket,
    HistoryEntry,
};
use crate::model::{BankSelection, Question, QuestionId, Submission, User};
use crate::report::{QuestionOutcome, SessionReport};
use crate::score::{review_queue, seconds_spent, SessionScore};
use crate::shuffle::shuffle_session;
use crate::timer::{Countdown, Tick, TimerGeneration, DEFAULT_QUESTION_SECONDS};
use crate::traits::{AttemptRecord, ExplainRequest, Explanation};

/// Tunables for a single session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Countdown length per question when the session is timed.
    pub question_seconds: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            question_seconds: DEFAULT_QUESTION_SECONDS,
        }
    }
}

/// What a submit did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The submission was locked by this call.
    Locked(SubmitReceipt),
    /// The submission was already locked; nothing changed.
    AlreadySubmitted,
}

/// Details of a freshly locked submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitReceipt {
    pub index: usize,
    pub correct: bool,
    /// The countdown forced the submission with nothing selected.
    pub skipped: bool,
    /// Telemetry to hand to the attempt recorder. `None` for the placeholder question.
    pub attempt: Option<AttemptRecord>,
}

/// What a countdown tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Stale,
    Running(u32),
    /// The countdown hit zero and forced a submission.
    Expired(SubmitOutcome),
}

#[derive(Debug)]
pub struct Session {
    id: Uuid,
    user: User,
    selection: BankSelection,
    title: String,
    questions: Vec<Question>,
    submissions: Vec<Submission>,
    current: usize,
    timed: bool,
    countdown: Countdown,
    review_mode: bool,
    review_queue: Vec<usize>,
    score: Option<SessionScore>,
    started_at: DateTime<Utc>,
    question_started_at: DateTime<Utc>,
    integrity_issues: Vec<usize>,
    /// Ids of fetched questions left out because they cannot be answered.
    dropped: Vec<QuestionId>,
    explain_gate: ExplainGate,
    history: ExplainHistory,
}

impl Session {
    /// Build a session from fetched questions.
    ///
    /// An empty `questions` list is replaced by the empty-bank placeholder so
    /// the session always has at least one question.
    pub fn start<R: Rng + ?Sized>(
        selection: BankSelection,
        user: User,
        mut questions: Vec<Question>,
        config: SessionConfig,
        rng: &mut R,
        now: DateTime<Utc>,
    ) -> Self {
        let mut dropped = Vec::new();
        questions.retain(|q| {
            if q.is_playable() {
                return true;
            }
            tracing::warn!(
                question_id = ?q.id,
                answers = q.answers.len(),
                "dropping question with too few answers"
            );
            dropped.extend(q.id.clone());
            false
        });

        if questions.is_empty() {
            tracing::info!("no questions for selected banks, using placeholder");
            questions.push(Question::empty_bank_placeholder());
        }

        shuffle_session(&mut questions, rng);

        let integrity_issues: Vec<usize> = questions
            .iter()
            .enumerate()
            .filter(|(_, q)| q.correct_answer().is_integrity_issue())
            .map(|(i, _)| i)
            .collect();
        for &i in &integrity_issues {
            let q = &questions[i];
            tracing::warn!(
                question_id = ?q.id,
                resolved = ?q.correct_answer(),
                "question does not have exactly one correct answer"
            );
        }

        let submissions = questions
            .iter()
            .map(|q| Submission::unanswered(q.id.clone()))
            .collect();

        let timed = selection.timed;
        let mut session = Self {
            id: Uuid::new_v4(),
            user,
            title: selection.title(),
            selection,
            questions,
            submissions,
            current: 0,
            timed,
            countdown: Countdown::new(config.question_seconds),
            review_mode: false,
            review_queue: Vec::new(),
            score: None,
            started_at: now,
            question_started_at: now,
            integrity_issues,
            dropped,
            explain_gate: ExplainGate::default(),
            history: ExplainHistory::default(),
        };
        session.rearm_countdown();
        tracing::debug!(
            session = %session.id,
            questions = session.questions.len(),
            timed,
            "session started"
        );
        session
    }

    // -- selection ---------------------------------------------------------

    /// Select an answer on the current question.
    ///
    /// Returns `Ok(false)` without changes when the question is already locked.
    pub fn select_answer(&mut self, index: usize) -> Result<bool, SessionError> {
        let available = self.questions[self.current].answers.len();
        let submission = &mut self.submissions[self.current];
        if submission.submitted {
            return Ok(false);
        }
        if index >= available {
            return Err(SessionError::AnswerOutOfRange { index, available });
        }
        submission.selected = Some(index);
        submission.correct = None;
        Ok(true)
    }

    /// Move the selection up or down by `delta`, clamped to the option list.
    pub fn move_selection(&mut self, delta: isize) -> Option<usize> {
        let available = self.questions[self.current].answers.len();
        let submission = &self.submissions[self.current];
        if submission.submitted || available == 0 {
            return None;
        }
        let from = submission.selected.unwrap_or(0) as isize;
        let to = (from + delta).clamp(0, available as isize - 1) as usize;
        self.select_answer(to).ok().filter(|changed| *changed).map(|_| to)
    }

    // -- submission --------------------------------------------------------

    /// Lock the current question's selection.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::SelectionRequired` when nothing is selected.
    pub fn submit(&mut self, now: DateTime<Utc>) -> Result<SubmitOutcome, SessionError> {
        if self.submissions[self.current].submitted {
            return Ok(SubmitOutcome::AlreadySubmitted);
        }
        let selected = self.submissions[self.current]
            .selected
            .ok_or(SessionError::SelectionRequired)?;
        self.countdown.disarm();
        Ok(SubmitOutcome::Locked(self.lock(Some(selected), now)))
    }

    fn force_submit(&mut self, now: DateTime<Utc>) -> SubmitOutcome {
        if self.submissions[self.current].submitted {
            return SubmitOutcome::AlreadySubmitted;
        }
        let selected = self.submissions[self.current].selected;
        SubmitOutcome::Locked(self.lock(selected, now))
    }

    fn lock(&mut self, selected: Option<usize>, now: DateTime<Utc>) -> SubmitReceipt {
        let index = self.current;
        let question = &self.questions[index];
        let correct = selected == Some(question.correct_index());
        let skipped = selected.is_none();

        let submission = &mut self.submissions[index];
        submission.submitted = true;
        submission.correct = Some(correct);
        submission.skipped = skipped;

        let attempt = question.id.clone().map(|question_id| AttemptRecord {
            user_id: self.user.id.clone(),
            question_id,
            selected_index: selected,
            selected_text: selected.and_then(|i| question.answers.get(i)).map(|a| a.text.clone()),
            is_correct: correct,
            seconds_spent: seconds_spent(self.question_started_at, now),
        });

        tracing::debug!(index, correct, skipped, "submission locked");
        SubmitReceipt {
            index,
            correct,
            skipped,
            attempt,
        }
    }

    // -- timer -------------------------------------------------------------

    /// Feed one countdown tick. On expiry the current question is force-submitted.
    pub fn tick(&mut self, generation: TimerGeneration, now: DateTime<Utc>) -> TickOutcome {
        match self.countdown.tick(generation) {
            Tick::Stale => TickOutcome::Stale,
            Tick::Running(remaining) => TickOutcome::Running(remaining),
            Tick::Expired => TickOutcome::Expired(self.force_submit(now)),
        }
    }

    /// Turn timing on or off mid-session; restarts the countdown.
    pub fn set_timed(&mut self, timed: bool) {
        self.timed = timed;
        self.rearm_countdown();
    }

    fn rearm_countdown(&mut self) {
        if self.timed {
            self.countdown.arm();
        } else {
            self.countdown.disarm();
        }
    }

    // -- navigation --------------------------------------------------------

    pub fn next(&mut self, now: DateTime<Utc>) -> usize {
        let target = if self.review_mode && !self.review_queue.is_empty() {
            match self.review_queue.iter().position(|&i| i == self.current) {
                Some(pos) if pos + 1 < self.review_queue.len() => self.review_queue[pos + 1],
                _ => self.review_queue[0],
            }
        } else {
            (self.current + 1) % self.questions.len()
        };
        self.move_to(target, now);
        target
    }

    pub fn previous(&mut self, now: DateTime<Utc>) -> usize {
        let target = if self.review_mode && !self.review_queue.is_empty() {
            match self.review_queue.iter().position(|&i| i == self.current) {
                Some(pos) if pos > 0 => self.review_queue[pos - 1],
                _ => self.review_queue[self.review_queue.len() - 1],
            }
        } else {
            let len = self.questions.len();
            (self.current + len - 1) % len
        };
        self.move_to(target, now);
        target
    }

    /// # Errors
    ///
    /// Returns `SessionError::IndexOutOfBounds` with no state change when
    /// `index` is not a question of this session.
    pub fn jump(&mut self, index: usize, now: DateTime<Utc>) -> Result<(), SessionError> {
        if index >= self.questions.len() {
            return Err(SessionError::IndexOutOfBounds {
                index,
                len: self.questions.len(),
            });
        }
        self.move_to(index, now);
        Ok(())
    }

    fn move_to(&mut self, index: usize, now: DateTime<Utc>) {
        self.current = index;
        self.question_started_at = now;
        self.rearm_countdown();
    }

    // -- flagging ----------------------------------------------------------

    /// Toggle the flag on the current question and return the new value.
    pub fn toggle_flag(&mut self) -> bool {
        let submission = &mut self.submissions[self.current];
        submission.flagged = !submission.flagged;
        submission.flagged
    }

    // -- finish ------------------------------------------------------------

    /// Score the session and build the review queue.
    ///
    /// Entering review mode moves the cursor to the first missed question.
    /// Calling again while in review mode recomputes the score in place.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::IncompleteSession` with no state change while
    /// any question is unsubmitted.
    pub fn finish(&mut self, now: DateTime<Utc>) -> Result<SessionScore, SessionError> {
        if !self.is_complete() {
            return Err(SessionError::IncompleteSession);
        }
        let score = SessionScore::compute(&self.submissions, self.started_at, now);
        self.review_queue = review_queue(&self.submissions);
        self.score = Some(score);

        if self.review_queue.is_empty() {
            self.review_mode = false;
        } else if !self.review_mode {
            self.review_mode = true;
            self.move_to(self.review_queue[0], now);
        }
        tracing::debug!(summary = %score.summary(), review = self.review_queue.len(), "session finished");
        Ok(score)
    }

    /// Re-enter review mode at the first missed question.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NoMistakes` when the review queue is empty.
    pub fn enter_review(&mut self, now: DateTime<Utc>) -> Result<(), SessionError> {
        let Some(&first) = self.review_queue.first() else {
            return Err(SessionError::NoMistakes);
        };
        self.review_mode = true;
        self.move_to(first, now);
        Ok(())
    }

    // -- explanations ------------------------------------------------------

    /// Capture the current question for an explanation request.
    ///
    /// The correct index is resolved against the shuffled answer order.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::ExplanationInFlight` while another request is
    /// outstanding, or `SessionError::FollowUpRequired` for a blank follow-up.
    pub fn begin_explanation(
        &mut self,
        follow_up: Option<&str>,
        mode: ExplainMode,
    ) -> Result<(ExplainTicket, ExplainRequest), SessionError> {
        let follow_up = match follow_up.map(str::trim) {
            Some("") => return Err(SessionError::FollowUpRequired),
            other => other.map(String::from),
        };
        let id = self.explain_gate.acquire()?;
        let question = &self.questions[self.current];
        let request = ExplainRequest {
            stem: question.stem.clone(),
            answers: question.answer_texts(),
            correct_index: question.correct_index(),
            follow_up: follow_up.clone(),
            mode,
        };
        let ticket = ExplainTicket {
            id,
            question_index: self.current,
            question_id: question.id.clone(),
            stem: question.stem.clone(),
            mode,
            follow_up,
        };
        Ok((ticket, request))
    }

    /// Record the outcome of an explanation request and release the gate.
    ///
    /// The entry is attributed to the ticket's question, not to whatever
    /// question is current when the response arrives.
    pub fn complete_explanation(
        &mut self,
        ticket: &ExplainTicket,
        result: anyhow::Result<Explanation>,
        now: DateTime<Utc>,
    ) -> anyhow::Result<&HistoryEntry> {
        if !self.explain_gate.release(ticket) {
            anyhow::bail!("explanation response does not match the outstanding request");
        }
        let explanation = result?;
        let text = match format_explanation(&explanation.text) {
            t if t.is_empty() => "No response".to_string(),
            t => t,
        };
        self.history.push(HistoryEntry {
            question_id: ticket.question_id.clone(),
            stem: history_stem(&ticket.stem),
            mode: ticket.mode,
            follow_up: ticket.follow_up.clone(),
            text,
            at: now,
        });
        self.history
            .latest()
            .ok_or_else(|| anyhow::anyhow!("explanation history is empty"))
    }

    pub fn explanation_pending(&self) -> bool {
        self.explain_gate.is_busy()
    }

    pub fn history(&self) -> &ExplainHistory {
        &self.history
    }

    // -- reporting ---------------------------------------------------------

    /// Snapshot of the session for JSON export.
    pub fn report(&self, now: DateTime<Utc>) -> SessionReport {
        let outcomes = self
            .questions
            .iter()
            .zip(&self.submissions)
            .map(|(q, s)| QuestionOutcome {
                question_id: q.id.clone(),
                stem: q.stem.clone(),
                selected: s.selected.and_then(|i| q.answers.get(i)).map(|a| a.text.clone()),
                correct_answer: q.answers.get(q.correct_index()).map(|a| a.text.clone()),
                submitted: s.submitted,
                correct: s.correct,
                skipped: s.skipped,
                flagged: s.flagged,
            })
            .collect();
        SessionReport {
            id: self.id,
            user_id: self.user.id.clone(),
            created_at: now,
            started_at: self.started_at,
            title: self.title.clone(),
            bank_ids: self.selection.bank_ids.clone(),
            timed: self.timed,
            score: self.score,
            review_queue: self.review_queue.clone(),
            integrity_issues: self
                .integrity_issues
                .iter()
                .filter_map(|&i| self.questions[i].id.clone())
                .chain(self.dropped.iter().cloned())
                .collect(),
            questions: outcomes,
        }
    }

    // -- accessors ---------------------------------------------------------

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn selection(&self) -> &BankSelection {
        &self.selection
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn submissions(&self) -> &[Submission] {
        &self.submissions
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn current_question(&self) -> &Question {
        &self.questions[self.current]
    }

    pub fn current_submission(&self) -> &Submission {
        &self.submissions[self.current]
    }

    /// `"3 / 10"` style progress label.
    pub fn progress(&self) -> String {
        format!("{} / {}", self.current + 1, self.questions.len())
    }

    pub fn is_timed(&self) -> bool {
        self.timed
    }

    pub fn countdown(&self) -> &Countdown {
        &self.countdown
    }

    pub fn is_complete(&self) -> bool {
        self.submissions.iter().all(|s| s.submitted)
    }

    pub fn is_review_mode(&self) -> bool {
        self.review_mode
    }

    pub fn review_queue(&self) -> &[usize] {
        &self.review_queue
    }

    pub fn score(&self) -> Option<SessionScore> {
        self.score
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Indices of questions without exactly one correct answer.
    pub fn integrity_issues(&self) -> &[usize] {
        &self.integrity_issues
    }

    /// Fetched questions that were left out for having too few answers.
    pub fn dropped_questions(&self) -> &[QuestionId] {
        &self.dropped
    }
}
