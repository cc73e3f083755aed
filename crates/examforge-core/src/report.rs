//! Session report types with JSON persistence.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{BankId, QuestionId};
use crate::score::SessionScore;

/// Snapshot of one practice session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    /// Session identifier.
    pub id: Uuid,
    pub user_id: String,
    /// When the report was created.
    pub created_at: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    pub title: String,
    pub bank_ids: Vec<BankId>,
    pub timed: bool,
    /// Present once the session has been finished.
    pub score: Option<SessionScore>,
    /// Indices into `questions` of the missed questions.
    pub review_queue: Vec<usize>,
    /// Questions without exactly one correct answer.
    pub integrity_issues: Vec<QuestionId>,
    pub questions: Vec<QuestionOutcome>,
}

/// How the learner did on a single question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionOutcome {
    pub question_id: Option<QuestionId>,
    pub stem: String,
    pub selected: Option<String>,
    pub correct_answer: Option<String>,
    pub submitted: bool,
    pub correct: Option<bool>,
    pub skipped: bool,
    pub flagged: bool,
}

impl SessionReport {
    /// Save the report as JSON to a file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize report")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        Ok(())
    }

    /// Load a report from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read report from {}", path.display()))?;
        let report: SessionReport =
            serde_json::from_str(&content).context("failed to parse report JSON")?;
        Ok(report)
    }

    pub fn flagged(&self) -> impl Iterator<Item = &QuestionOutcome> {
        self.questions.iter().filter(|q| q.flagged)
    }

    pub fn skipped_count(&self) -> usize {
        self.questions.iter().filter(|q| q.skipped).count()
    }

    /// Markdown summary for sharing or pasting into notes.
    pub fn to_markdown(&self) -> String {
        let mut md = format!("## {}\n\n", self.title);

        match &self.score {
            Some(score) => md.push_str(&format!("**{}**\n\n", score.summary())),
            None => md.push_str("_Session not finished._\n\n"),
        }

        let skipped = self.skipped_count();
        if skipped > 0 {
            md.push_str(&format!("Timed out: {skipped}\n\n"));
        }

        let missed: Vec<&QuestionOutcome> = self
            .review_queue
            .iter()
            .filter_map(|&i| self.questions.get(i))
            .collect();
        if !missed.is_empty() {
            md.push_str("### Missed\n\n");
            md.push_str("| Question | Your answer | Correct answer |\n");
            md.push_str("|----------|-------------|----------------|\n");
            for q in missed {
                let yours = if q.skipped {
                    "(timed out)"
                } else {
                    q.selected.as_deref().unwrap_or("-")
                };
                md.push_str(&format!(
                    "| {} | {} | {} |\n",
                    q.stem,
                    yours,
                    q.correct_answer.as_deref().unwrap_or("-")
                ));
            }
            md.push('\n');
        }

        let flagged: Vec<&QuestionOutcome> = self.flagged().collect();
        if !flagged.is_empty() {
            md.push_str("### Flagged\n\n");
            for q in flagged {
                md.push_str(&format!("- {}\n", q.stem));
            }
        }

        md
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    fn outcome(stem: &str, correct: bool, skipped: bool, flagged: bool) -> QuestionOutcome {
        QuestionOutcome {
            question_id: Some(QuestionId::from(stem)),
            stem: stem.into(),
            selected: (!skipped).then(|| "B".to_string()),
            correct_answer: Some("A".into()),
            submitted: true,
            correct: Some(correct),
            skipped,
            flagged,
        }
    }

    fn make_report() -> SessionReport {
        SessionReport {
            id: Uuid::nil(),
            user_id: "u1".into(),
            created_at: fixed_now(),
            started_at: fixed_now(),
            title: "Cardiology".into(),
            bank_ids: vec![BankId::from("cardio")],
            timed: true,
            score: Some(SessionScore {
                correct: 1,
                total: 3,
                accuracy_pct: 33,
                elapsed_minutes: 2,
            }),
            review_queue: vec![1, 2],
            integrity_issues: vec![],
            questions: vec![
                outcome("q1", true, false, false),
                outcome("q2", false, false, true),
                outcome("q3", false, true, false),
            ],
        }
    }

    #[test]
    fn json_roundtrip() {
        let report = make_report();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/report.json");

        report.save_json(&path).unwrap();
        let loaded = SessionReport::load_json(&path).unwrap();

        assert_eq!(loaded.title, "Cardiology");
        assert_eq!(loaded.questions, report.questions);
        assert_eq!(loaded.score, report.score);
    }

    #[test]
    fn load_missing_file_has_context() {
        let err = SessionReport::load_json(Path::new("/nonexistent/report.json")).unwrap_err();
        assert!(err.to_string().contains("failed to read report"));
    }

    #[test]
    fn markdown_lists_misses_and_flags() {
        let md = make_report().to_markdown();
        assert!(md.contains("Score: 1/3 (33%) • 2 min"));
        assert!(md.contains("| q2 | B | A |"));
        assert!(md.contains("| q3 | (timed out) | A |"));
        assert!(md.contains("### Flagged\n\n- q2"));
    }

    #[test]
    fn markdown_counts_timed_out_questions() {
        let md = make_report().to_markdown();
        assert!(md.contains("Timed out: 1"));

        let mut report = make_report();
        report.questions.retain(|q| !q.skipped);
        assert!(!report.to_markdown().contains("Timed out"));
    }

    #[test]
    fn unfinished_report() {
        let mut report = make_report();
        report.score = None;
        report.review_queue.clear();
        assert!(report.to_markdown().contains("not finished"));
        assert_eq!(report.skipped_count(), 1);
    }
}
