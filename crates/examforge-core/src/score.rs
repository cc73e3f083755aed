//! Session scoring and review-queue construction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::Submission;

/// Final numbers for a completed session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionScore {
    pub correct: usize,
    pub total: usize,
    /// `round(100 * correct / total)`.
    pub accuracy_pct: u32,
    /// Whole minutes since the session started, at least 1.
    pub elapsed_minutes: u64,
}

impl SessionScore {
    pub fn compute(
        submissions: &[Submission],
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    ) -> Self {
        let correct = submissions
            .iter()
            .filter(|s| s.correct == Some(true))
            .count();
        let total = submissions.len();
        Self {
            correct,
            total,
            accuracy_pct: accuracy_pct(correct, total),
            elapsed_minutes: elapsed_minutes(started_at, finished_at),
        }
    }

    /// One-line summary, e.g. `Score: 7/10 (70%) • 4 min`.
    pub fn summary(&self) -> String {
        format!(
            "Score: {}/{} ({}%) • {} min",
            self.correct, self.total, self.accuracy_pct, self.elapsed_minutes
        )
    }
}

/// Percentage of correct answers, rounded half away from zero.
pub fn accuracy_pct(correct: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    (correct as f64 * 100.0 / total as f64).round() as u32
}

fn elapsed_minutes(started_at: DateTime<Utc>, finished_at: DateTime<Utc>) -> u64 {
    let ms = (finished_at - started_at).num_milliseconds().max(0);
    ((ms as f64 / 60_000.0).round() as u64).max(1)
}

/// Seconds spent on a question, rounded, at least 1.
pub fn seconds_spent(question_started_at: DateTime<Utc>, submitted_at: DateTime<Utc>) -> u64 {
    let ms = (submitted_at - question_started_at).num_milliseconds().max(0);
    ((ms as f64 / 1000.0).round() as u64).max(1)
}

/// Indices of submitted-but-incorrect questions, in session order.
pub fn review_queue(submissions: &[Submission]) -> Vec<usize> {
    submissions
        .iter()
        .enumerate()
        .filter(|(_, s)| s.is_missed())
        .map(|(i, _)| i)
        .collect()
}
