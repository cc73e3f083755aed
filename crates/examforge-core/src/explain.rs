//! Explanation prompts, response cleanup, history, and the single-flight gate.

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::SessionError;
use crate::model::QuestionId;
use crate::traits::ExplainRequest;

/// Model used when none is configured or the configured value is unusable.
pub const DEFAULT_MODEL: &str = "@preset/ai-explainer";

/// System prompt sent with every explanation request.
pub const SYSTEM_PROMPT: &str =
    "You are a concise medical explainer for exam prep. Spell out abbreviations on first mention.";

/// Entries kept in the explanation history.
pub const HISTORY_LIMIT: usize = 5;

const HISTORY_STEM_CHARS: usize = 80;

/// Length and depth of generated explanations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExplainMode {
    #[default]
    Concise,
    Detailed,
}

impl ExplainMode {
    pub fn word_limit(self) -> u32 {
        match self {
            ExplainMode::Concise => 180,
            ExplainMode::Detailed => 400,
        }
    }

    pub fn max_tokens(self) -> u32 {
        match self {
            ExplainMode::Concise => 550,
            ExplainMode::Detailed => 1100,
        }
    }

    #[must_use]
    pub fn toggled(self) -> Self {
        match self {
            ExplainMode::Concise => ExplainMode::Detailed,
            ExplainMode::Detailed => ExplainMode::Concise,
        }
    }
}

impl fmt::Display for ExplainMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExplainMode::Concise => write!(f, "concise"),
            ExplainMode::Detailed => write!(f, "detailed"),
        }
    }
}

impl FromStr for ExplainMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "concise" => Ok(ExplainMode::Concise),
            "detailed" => Ok(ExplainMode::Detailed),
            other => Err(format!("unknown explain mode: {other}")),
        }
    }
}

/// Build the user prompt for an explanation request.
pub fn build_prompt(request: &ExplainRequest) -> String {
    let answers = request
        .answers
        .iter()
        .enumerate()
        .map(|(i, a)| {
            let marker = if i == request.correct_index {
                " (correct)"
            } else {
                ""
            };
            format!("{}. {a}{marker}", i + 1)
        })
        .collect::<Vec<_>>()
        .join("\n");

    let follow_up = request
        .follow_up
        .as_deref()
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(|f| format!("Follow-up: {f}"));

    [
        Some(format!(
            "You are a concise medical explainer. Spell out abbreviations on first mention. \
             Explain the correct answer, why the others are wrong, and briefly describe the \
             underlying disease/pathology. Keep it under {} words.",
            request.mode.word_limit()
        )),
        Some(format!("Question: {}", request.stem)),
        Some("Answers:".to_string()),
        Some(answers),
        follow_up,
        Some(
            "Return a clear teaching explanation with abbreviations expanded the first time they appear."
                .to_string(),
        ),
    ]
    .into_iter()
    .flatten()
    .collect::<Vec<_>>()
    .join("\n\n")
}

static BOLD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*\*(.*?)\*\*").expect("valid regex"));
static EMPHASIS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*(.*?)\*").expect("valid regex"));
static UNDERLINE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"__(.*?)__").expect("valid regex"));
static CODE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"`([^`]*)`").expect("valid regex"));
static BULLET: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^- ").expect("valid regex"));

/// Strip markdown emphasis and normalize bullets for plain-text display.
pub fn format_explanation(text: &str) -> String {
    let text = BOLD.replace_all(text, "$1");
    let text = EMPHASIS.replace_all(&text, "$1");
    let text = UNDERLINE.replace_all(&text, "$1");
    let text = CODE.replace_all(&text, "$1");
    let text = BULLET.replace_all(&text, "• ");
    text.trim().to_string()
}

/// First model name from a comma or whitespace separated list.
pub fn sanitize_model(model: Option<&str>) -> String {
    model
        .and_then(|m| {
            m.split(|c: char| c == ',' || c.is_whitespace())
                .find(|s| !s.is_empty())
        })
        .unwrap_or(DEFAULT_MODEL)
        .to_string()
}

/// One explanation shown to the learner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub question_id: Option<QuestionId>,
    /// Question stem, truncated for display.
    pub stem: String,
    pub mode: ExplainMode,
    pub follow_up: Option<String>,
    pub text: String,
    pub at: DateTime<Utc>,
}

/// Most recent explanations, newest first.
#[derive(Debug, Clone, Default)]
pub struct ExplainHistory {
    entries: VecDeque<HistoryEntry>,
}

impl ExplainHistory {
    pub fn push(&mut self, entry: HistoryEntry) {
        self.entries.push_front(entry);
        self.entries.truncate(HISTORY_LIMIT);
    }

    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn latest(&self) -> Option<&HistoryEntry> {
        self.entries.front()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Identifies the question an outstanding explanation was requested for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExplainTicket {
    pub(crate) id: u64,
    pub question_index: usize,
    pub question_id: Option<QuestionId>,
    pub stem: String,
    pub mode: ExplainMode,
    pub follow_up: Option<String>,
}

/// Allows at most one explanation request in flight.
#[derive(Debug, Default)]
pub struct ExplainGate {
    next_id: u64,
    in_flight: Option<u64>,
}

impl ExplainGate {
    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    pub(crate) fn acquire(&mut self) -> Result<u64, SessionError> {
        if self.in_flight.is_some() {
            return Err(SessionError::ExplanationInFlight);
        }
        self.next_id += 1;
        self.in_flight = Some(self.next_id);
        Ok(self.next_id)
    }

    /// Release the gate. Returns `false` for a ticket that is not the current one.
    pub(crate) fn release(&mut self, ticket: &ExplainTicket) -> bool {
        if self.in_flight == Some(ticket.id) {
            self.in_flight = None;
            true
        } else {
            false
        }
    }
}

pub(crate) fn history_stem(stem: &str) -> String {
    stem.chars().take(HISTORY_STEM_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(follow_up: Option<&str>) -> ExplainRequest {
        ExplainRequest {
            stem: "Which drug reverses heparin?".into(),
            answers: vec!["Vitamin K".into(), "Protamine sulfate".into(), "Naloxone".into()],
            correct_index: 1,
            follow_up: follow_up.map(String::from),
            mode: ExplainMode::Concise,
        }
    }

    #[test]
    fn prompt_marks_correct_answer() {
        let prompt = build_prompt(&request(None));
        assert!(prompt.contains("Question: Which drug reverses heparin?"));
        assert!(prompt.contains("1. Vitamin K\n2. Protamine sulfate (correct)\n3. Naloxone"));
        assert!(prompt.contains("under 180 words"));
        assert!(!prompt.contains("Follow-up"));
    }

    #[test]
    fn prompt_includes_follow_up_and_detailed_limit() {
        let mut req = request(Some("  List red flags "));
        req.mode = ExplainMode::Detailed;
        let prompt = build_prompt(&req);
        assert!(prompt.contains("Follow-up: List red flags"));
        assert!(prompt.contains("under 400 words"));
    }

    #[test]
    fn formatting_strips_markdown() {
        let raw = "**Protamine** binds *heparin*.\n- Use __slowly__\n- Dose by `units`\n";
        assert_eq!(
            format_explanation(raw),
            "Protamine binds heparin.\n• Use slowly\n• Dose by units"
        );
    }

    #[test]
    fn model_sanitization() {
        assert_eq!(sanitize_model(None), DEFAULT_MODEL);
        assert_eq!(sanitize_model(Some("")), DEFAULT_MODEL);
        assert_eq!(sanitize_model(Some(" , ")), DEFAULT_MODEL);
        assert_eq!(
            sanitize_model(Some("openai/gpt-4o-mini, anthropic/claude")),
            "openai/gpt-4o-mini"
        );
    }

    #[test]
    fn mode_parse_and_toggle() {
        assert_eq!("Detailed".parse::<ExplainMode>().unwrap(), ExplainMode::Detailed);
        assert!("verbose".parse::<ExplainMode>().is_err());
        assert_eq!(ExplainMode::Concise.toggled(), ExplainMode::Detailed);
        assert_eq!(ExplainMode::Concise.max_tokens(), 550);
        assert_eq!(ExplainMode::Detailed.max_tokens(), 1100);
    }

    #[test]
    fn history_keeps_five_newest() {
        let mut history = ExplainHistory::default();
        for i in 0..7 {
            history.push(HistoryEntry {
                question_id: None,
                stem: format!("q{i}"),
                mode: ExplainMode::Concise,
                follow_up: None,
                text: String::new(),
                at: crate::time::fixed_now(),
            });
        }
        assert_eq!(history.len(), HISTORY_LIMIT);
        assert_eq!(history.latest().unwrap().stem, "q6");
        assert_eq!(history.entries().nth(4).unwrap().stem, "q2");
    }

    #[test]
    fn gate_is_single_flight() {
        let mut gate = ExplainGate::default();
        let id = gate.acquire().unwrap();
        assert_eq!(gate.acquire(), Err(SessionError::ExplanationInFlight));
        let stale = ExplainTicket {
            id: id + 100,
            question_index: 0,
            question_id: None,
            stem: String::new(),
            mode: ExplainMode::Concise,
            follow_up: None,
        };
        assert!(!gate.release(&stale));
        assert!(gate.is_busy());
        let ticket = ExplainTicket { id, ..stale };
        assert!(gate.release(&ticket));
        assert!(gate.acquire().is_ok());
    }

    #[test]
    fn history_stem_truncates_on_char_boundary() {
        let stem = "é".repeat(100);
        assert_eq!(history_stem(&stem).chars().count(), 80);
    }
}
