//! Core data model types for examforge.
//!
//! Questions and answers are loaded from a question store, shuffled into a
//! session, and paired with one `Submission` per question.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fewest options a question may offer.
pub const MIN_ANSWERS: usize = 2;
/// Most options a question may offer; the CLI maps them to keys `1`-`6`.
pub const MAX_ANSWERS: usize = 6;

/// Stem shown when the selected banks yield no questions.
pub const EMPTY_BANK_STEM: &str = "No questions found for the selected banks.";

/// Identifier of a question record in the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuestionId(pub String);

impl fmt::Display for QuestionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for QuestionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for QuestionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Identifier of a question bank.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BankId(pub String);

impl fmt::Display for BankId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BankId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A named collection of questions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bank {
    pub id: BankId,
    pub name: String,
}

/// One answer option. Owned by exactly one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(rename = "isCorrect", default)]
    pub is_correct: bool,
}

impl Answer {
    pub fn new(text: impl Into<String>, is_correct: bool) -> Self {
        Self {
            text: text.into(),
            explanation: None,
            is_correct,
        }
    }

    #[must_use]
    pub fn with_explanation(mut self, explanation: impl Into<String>) -> Self {
        self.explanation = Some(explanation.into());
        self
    }
}

/// A multiple-choice question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    /// Backend id. `None` only for the empty-bank placeholder.
    pub id: Option<QuestionId>,
    pub stem: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub answers: Vec<Answer>,
}

/// How the correct option of a question was determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrectAnswer {
    /// Exactly one answer is flagged correct.
    Flagged(usize),
    /// No answer is flagged; the first option stands in.
    Fallback,
    /// Several answers are flagged; the first flagged one is used.
    Ambiguous(usize),
}

impl CorrectAnswer {
    pub fn index(self) -> usize {
        match self {
            CorrectAnswer::Flagged(i) | CorrectAnswer::Ambiguous(i) => i,
            CorrectAnswer::Fallback => 0,
        }
    }

    /// Whether the question data needs attention.
    pub fn is_integrity_issue(self) -> bool {
        !matches!(self, CorrectAnswer::Flagged(_))
    }
}

impl Question {
    pub fn new(id: impl Into<QuestionId>, stem: impl Into<String>, answers: Vec<Answer>) -> Self {
        Self {
            id: Some(id.into()),
            stem: stem.into(),
            image_url: None,
            answers,
        }
    }

    /// Placeholder used when a session would otherwise have no questions.
    pub fn empty_bank_placeholder() -> Self {
        Self {
            id: None,
            stem: EMPTY_BANK_STEM.to_string(),
            image_url: None,
            answers: vec![Answer::new("Return", true), Answer::new("Contact admin", false)],
        }
    }

    /// Resolve the correct option against the current answer order.
    pub fn correct_answer(&self) -> CorrectAnswer {
        let mut flagged = self
            .answers
            .iter()
            .enumerate()
            .filter(|(_, a)| a.is_correct)
            .map(|(i, _)| i);
        match (flagged.next(), flagged.next()) {
            (Some(i), None) => CorrectAnswer::Flagged(i),
            (Some(i), Some(_)) => CorrectAnswer::Ambiguous(i),
            (None, _) => CorrectAnswer::Fallback,
        }
    }

    pub fn correct_index(&self) -> usize {
        self.correct_answer().index()
    }

    /// Whether the question offers enough options to be answered.
    pub fn is_playable(&self) -> bool {
        self.answers.len() >= MIN_ANSWERS
    }

    pub fn answer_texts(&self) -> Vec<String> {
        self.answers.iter().map(|a| a.text.clone()).collect()
    }
}

/// Per-question learner response within one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub question_id: Option<QuestionId>,
    pub selected: Option<usize>,
    pub submitted: bool,
    pub correct: Option<bool>,
    pub flagged: bool,
    /// Set when the countdown forced a submission with nothing selected.
    #[serde(default)]
    pub skipped: bool,
}

impl Submission {
    pub fn unanswered(question_id: Option<QuestionId>) -> Self {
        Self {
            question_id,
            selected: None,
            submitted: false,
            correct: None,
            flagged: false,
            skipped: false,
        }
    }

    pub fn is_missed(&self) -> bool {
        self.submitted && self.correct == Some(false)
    }
}

/// Signed-in learner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
}

/// A row of the access-grant table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessGrant {
    pub email: String,
    #[serde(default = "default_true")]
    pub allowed: bool,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

fn default_true() -> bool {
    true
}

/// What the learner picked on the dashboard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankSelection {
    pub bank_ids: Vec<BankId>,
    #[serde(default)]
    pub bank_names: Vec<String>,
    #[serde(default)]
    pub timed: bool,
    #[serde(default)]
    pub years: Vec<String>,
    #[serde(default)]
    pub subjects: Vec<String>,
}

impl BankSelection {
    pub fn new(bank_ids: Vec<BankId>) -> Self {
        Self {
            bank_ids,
            ..Default::default()
        }
    }

    /// Display title: the first bank name, with a count of the rest.
    pub fn title(&self) -> String {
        match self.bank_names.as_slice() {
            [] => "Practice".to_string(),
            [only] => only.clone(),
            [first, rest @ ..] => format!("{first} + {} more", rest.len()),
        }
    }

    /// Year and subject tags joined for the session bar.
    pub fn tags(&self) -> String {
        [self.years.join(", "), self.subjects.join(", ")]
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" • ")
    }
}
