//! CLI integration tests using assert_cmd.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const ENV_OVERRIDES: [&str; 5] = [
    "EXAMFORGE_SUPABASE_URL",
    "EXAMFORGE_SUPABASE_ANON_KEY",
    "EXAMFORGE_ACCESS_TOKEN",
    "EXAMFORGE_OPENROUTER_KEY",
    "OPENROUTER_API_KEY",
];

const TWO_QUESTION_BANK: &str = r#"
[bank]
id = "renal"
name = "Renal"

[[questions]]
id = "renal-001"
stem = "Most common kidney stone composition?"
[[questions.answers]]
text = "Calcium oxalate"
correct = true
[[questions.answers]]
text = "Uric acid"

[[questions]]
id = "renal-002"
stem = "Loop diuretics act on which segment?"
[[questions.answers]]
text = "Thick ascending limb"
correct = true
[[questions.answers]]
text = "Collecting duct"
"#;

fn examforge() -> Command {
    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("examforge").unwrap();
    for var in ENV_OVERRIDES {
        cmd.env_remove(var);
    }
    cmd
}

/// A temp dir holding an empty config and a two-question bank.
fn practice_dir() -> TempDir {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("examforge.toml"), "").unwrap();
    std::fs::write(dir.path().join("renal.toml"), TWO_QUESTION_BANK).unwrap();
    dir
}

#[test]
fn validate_sample_bank() {
    examforge()
        .arg("validate")
        .arg("--bank-file")
        .arg("../../banks/cardiology.toml")
        .assert()
        .success()
        .stdout(predicate::str::contains("3 questions"))
        .stdout(predicate::str::contains("All banks valid"));
}

#[test]
fn validate_directory() {
    examforge()
        .arg("validate")
        .arg("--bank-file")
        .arg("../../banks")
        .assert()
        .success()
        .stdout(predicate::str::contains("Cardiology"))
        .stdout(predicate::str::contains("Pharmacology"));
}

#[test]
fn validate_reports_warnings() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.toml");
    std::fs::write(
        &path,
        r#"
[bank]
id = "broken"
name = "Broken"

[[questions]]
id = "b1"
stem = "No correct answer"
[[questions.answers]]
text = "a"
[[questions.answers]]
text = "b"
"#,
    )
    .unwrap();

    examforge()
        .arg("validate")
        .arg("--bank-file")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("[b1] WARNING: no answer is marked correct"))
        .stdout(predicate::str::contains("1 warning(s) found"));
}

#[test]
fn validate_nonexistent_file() {
    examforge()
        .arg("validate")
        .arg("--bank-file")
        .arg("nonexistent.toml")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn init_creates_files() {
    let dir = TempDir::new().unwrap();

    examforge()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Created examforge.toml"))
        .stdout(predicate::str::contains("Created banks/example.toml"));

    assert!(dir.path().join("examforge.toml").exists());
    assert!(dir.path().join("banks/example.toml").exists());

    examforge()
        .current_dir(dir.path())
        .arg("validate")
        .arg("--bank-file")
        .arg("banks/example.toml")
        .assert()
        .success()
        .stdout(predicate::str::contains("All banks valid"));
}

#[test]
fn init_skips_existing() {
    let dir = TempDir::new().unwrap();

    examforge()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success();

    examforge()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("already exists"));
}

#[test]
fn banks_lists_local_files() {
    examforge()
        .arg("banks")
        .arg("--local")
        .arg("../../banks")
        .assert()
        .success()
        .stdout(predicate::str::contains("cardiology"))
        .stdout(predicate::str::contains("Pharmacology"));
}

#[test]
fn practice_local_session_to_report() {
    let dir = practice_dir();
    let report = dir.path().join("report.json");

    examforge()
        .current_dir(dir.path())
        .args(["practice", "--local", "renal.toml", "--seed", "7", "--output"])
        .arg(&report)
        .write_stdin("1\ns\nn\n1\ns\nfinish\nq\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("[1 / 2] Renal"))
        .stdout(predicate::str::contains("Score: "))
        .stderr(predicate::str::contains("Report saved to"));

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&report).unwrap()).unwrap();
    assert_eq!(json["score"]["total"], 2);
    assert_eq!(json["questions"].as_array().unwrap().len(), 2);

    let log = std::fs::read_to_string(dir.path().join("examforge-attempts.jsonl")).unwrap();
    assert_eq!(log.lines().count(), 2);
}

#[test]
fn practice_header_carries_tags_and_mode() {
    let dir = practice_dir();

    examforge()
        .current_dir(dir.path())
        .args(["practice", "--local", "renal.toml", "--year", "2024"])
        .args(["--subject", "Nephrology", "--mode", "detailed"])
        .write_stdin("mode
q
")
        .assert()
        .success()
        .stdout(predicate::str::contains("[1 / 2] Renal (2024 • Nephrology)"))
        .stdout(predicate::str::contains("Explanation mode: concise"));
}

#[test]
fn practice_rejects_unknown_mode() {
    examforge()
        .args(["practice", "--local", "renal.toml", "--mode", "verbose"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown explain mode: verbose"));
}

#[test]
fn report_renders_saved_session() {
    let dir = practice_dir();
    let report = dir.path().join("report.json");

    examforge()
        .current_dir(dir.path())
        .args(["practice", "--local", "renal.toml", "--seed", "7", "--output"])
        .arg(&report)
        .write_stdin("1\ns\nf\nn\n1\ns\nfinish\nq\n")
        .assert()
        .success();

    examforge()
        .args(["report", "--input"])
        .arg(&report)
        .assert()
        .success()
        .stdout(predicate::str::starts_with("## Renal"))
        .stdout(predicate::str::contains("Score: "))
        .stdout(predicate::str::contains("### Flagged"));

    let md = dir.path().join("summary.md");
    examforge()
        .args(["report", "--input"])
        .arg(&report)
        .arg("--markdown")
        .arg(&md)
        .assert()
        .success()
        .stderr(predicate::str::contains("Markdown saved to"));
    assert!(std::fs::read_to_string(&md).unwrap().starts_with("## Renal"));
}

#[test]
fn report_missing_input_fails() {
    examforge()
        .args(["report", "--input", "/nonexistent/report.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read report"));
}

#[test]
fn practice_rejects_early_finish() {
    let dir = practice_dir();

    examforge()
        .current_dir(dir.path())
        .args(["practice", "--local", "renal.toml"])
        .write_stdin("finish\n1\ns\ns\nq\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Submit all questions first."))
        .stdout(predicate::str::contains("Answer already submitted."))
        .stdout(predicate::str::contains("Session ended: 1/2 answered."));
}

#[test]
fn practice_without_supabase_needs_local() {
    let dir = practice_dir();

    examforge()
        .current_dir(dir.path())
        .args(["practice", "--bank", "renal"])
        .write_stdin("q\n")
        .assert()
        .failure()
        .stderr(predicate::str::contains("no [supabase] section"));
}

#[test]
fn help_output() {
    examforge()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Terminal exam-practice runner"));
}

#[test]
fn version_output() {
    examforge()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("examforge"));
}
