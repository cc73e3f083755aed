//! TOML question bank parser.
//!
//! Loads question banks from TOML files and directories, and validates them.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::model::{Answer, Bank, BankId, CorrectAnswer, Question, QuestionId};
pub use crate::model::{MAX_ANSWERS, MIN_ANSWERS};

/// A bank loaded from disk together with its questions.
#[derive(Debug, Clone, PartialEq)]
pub struct BankFile {
    pub bank: Bank,
    pub questions: Vec<Question>,
}

/// Intermediate TOML structure for parsing bank files.
#[derive(Debug, Deserialize)]
struct TomlBankFile {
    bank: TomlBankHeader,
    #[serde(default)]
    questions: Vec<TomlQuestion>,
}

#[derive(Debug, Deserialize)]
struct TomlBankHeader {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct TomlQuestion {
    id: String,
    stem: String,
    #[serde(default)]
    image_url: Option<String>,
    #[serde(default)]
    answers: Vec<TomlAnswer>,
}

#[derive(Debug, Deserialize)]
struct TomlAnswer {
    text: String,
    #[serde(default)]
    correct: bool,
    #[serde(default)]
    explanation: Option<String>,
}

/// Parse a single TOML file into a `BankFile`.
pub fn parse_bank_file(path: &Path) -> Result<BankFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read bank file: {}", path.display()))?;

    parse_bank_str(&content, path)
}

/// Parse a TOML string into a `BankFile`.
pub fn parse_bank_str(content: &str, source_path: &Path) -> Result<BankFile> {
    let parsed: TomlBankFile = toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))?;

    let questions = parsed
        .questions
        .into_iter()
        .map(|q| Question {
            id: Some(QuestionId(q.id)),
            stem: q.stem,
            image_url: q.image_url,
            answers: q
                .answers
                .into_iter()
                .map(|a| Answer {
                    text: a.text,
                    explanation: a.explanation,
                    is_correct: a.correct,
                })
                .collect(),
        })
        .collect();

    Ok(BankFile {
        bank: Bank {
            id: BankId(parsed.bank.id),
            name: parsed.bank.name,
        },
        questions,
    })
}

/// Recursively load all `.toml` bank files from a directory.
pub fn load_bank_directory(dir: &Path) -> Result<Vec<BankFile>> {
    let mut banks = Vec::new();

    if !dir.is_dir() {
        anyhow::bail!("not a directory: {}", dir.display());
    }

    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
    {
        let entry = entry?;
        let path = entry.path();

        if path.is_dir() {
            banks.extend(load_bank_directory(&path)?);
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            match parse_bank_file(&path) {
                Ok(bank) => banks.push(bank),
                Err(e) => {
                    tracing::warn!("skipping {}: {}", path.display(), e);
                }
            }
        }
    }

    Ok(banks)
}

/// A warning from bank validation.
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    /// The question ID (if applicable).
    pub question_id: Option<String>,
    /// Warning message.
    pub message: String,
}

/// Validate a bank for common authoring mistakes.
pub fn validate_bank(bank: &BankFile) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();
    let warn = |q: &Question, message: String| ValidationWarning {
        question_id: q.id.as_ref().map(|id| id.0.clone()),
        message,
    };

    if bank.questions.is_empty() {
        warnings.push(ValidationWarning {
            question_id: None,
            message: format!("bank '{}' has no questions", bank.bank.id),
        });
    }

    let mut seen_ids = HashSet::new();
    for q in &bank.questions {
        if let Some(id) = &q.id {
            if !seen_ids.insert(id) {
                warnings.push(warn(q, format!("duplicate question ID: {id}")));
            }
        }

        if q.stem.trim().is_empty() {
            warnings.push(warn(q, "stem is empty".into()));
        }

        let n = q.answers.len();
        if !(MIN_ANSWERS..=MAX_ANSWERS).contains(&n) {
            warnings.push(warn(
                q,
                format!("has {n} answers, expected {MIN_ANSWERS} to {MAX_ANSWERS}"),
            ));
        }

        match q.correct_answer() {
            CorrectAnswer::Flagged(_) => {}
            CorrectAnswer::Fallback => {
                warnings.push(warn(q, "no answer is marked correct".into()));
            }
            CorrectAnswer::Ambiguous(_) => {
                warnings.push(warn(q, "more than one answer is marked correct".into()));
            }
        }

        if q.answers.iter().any(|a| a.text.trim().is_empty()) {
            warnings.push(warn(q, "an answer has empty text".into()));
        }
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const VALID_TOML: &str = r#"
[bank]
id = "cardio-2024"
name = "Cardiology 2024"

[[questions]]
id = "c1"
stem = "First-line treatment for stable angina?"

[[questions.answers]]
text = "Beta blocker"
correct = true
explanation = "Reduces myocardial oxygen demand."

[[questions.answers]]
text = "Digoxin"

[[questions.answers]]
text = "Warfarin"

[[questions]]
id = "c2"
stem = "Most common cause of mitral stenosis?"
image_url = "https://example.com/ms.png"

[[questions.answers]]
text = "Rheumatic fever"
correct = true

[[questions.answers]]
text = "Endocarditis"
"#;

    fn parse(content: &str) -> BankFile {
        parse_bank_str(content, &PathBuf::from("test.toml")).unwrap()
    }

    #[test]
    fn parse_valid_toml() {
        let bank = parse(VALID_TOML);
        assert_eq!(bank.bank.id, BankId::from("cardio-2024"));
        assert_eq!(bank.bank.name, "Cardiology 2024");
        assert_eq!(bank.questions.len(), 2);
        let q1 = &bank.questions[0];
        assert_eq!(q1.id, Some(QuestionId::from("c1")));
        assert_eq!(q1.correct_answer(), CorrectAnswer::Flagged(0));
        assert_eq!(
            q1.answers[0].explanation.as_deref(),
            Some("Reduces myocardial oxygen demand.")
        );
        assert_eq!(
            bank.questions[1].image_url.as_deref(),
            Some("https://example.com/ms.png")
        );
        assert!(validate_bank(&bank).is_empty());
    }

    #[test]
    fn parse_bank_without_questions() {
        let bank = parse("[bank]\nid = \"empty\"\nname = \"Empty\"\n");
        assert!(bank.questions.is_empty());
        let warnings = validate_bank(&bank);
        assert!(warnings.iter().any(|w| w.message.contains("no questions")));
    }

    #[test]
    fn parse_malformed_toml() {
        let bad = "this is not [valid toml }{";
        let result = parse_bank_str(bad, &PathBuf::from("bad.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn validate_flags_authoring_mistakes() {
        let toml = r#"
[bank]
id = "messy"
name = "Messy"

[[questions]]
id = "same"
stem = "  "
[[questions.answers]]
text = "Only option"

[[questions]]
id = "same"
stem = "Two correct"
[[questions.answers]]
text = "A"
correct = true
[[questions.answers]]
text = "B"
correct = true
"#;
        let warnings = validate_bank(&parse(toml));
        let messages: Vec<&str> = warnings.iter().map(|w| w.message.as_str()).collect();
        assert!(messages.iter().any(|m| m.contains("duplicate question ID")));
        assert!(messages.contains(&"stem is empty"));
        assert!(messages.iter().any(|m| m.contains("has 1 answers")));
        assert!(messages.contains(&"no answer is marked correct"));
        assert!(messages.contains(&"more than one answer is marked correct"));
    }

    #[test]
    fn load_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("cardio.toml"), VALID_TOML).unwrap();
        std::fs::write(dir.path().join("broken.toml"), "not = [toml").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let banks = load_bank_directory(dir.path()).unwrap();
        assert_eq!(banks.len(), 1);
        assert_eq!(banks[0].bank.name, "Cardiology 2024");
    }

    #[test]
    fn load_directory_rejects_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("x.toml");
        std::fs::write(&file, VALID_TOML).unwrap();
        assert!(load_bank_directory(&file).is_err());
    }
}
