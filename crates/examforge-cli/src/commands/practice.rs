//! The `examforge practice` command.

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use comfy_table::{Cell, Table};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::mpsc;

use examforge_core::engine::{Collaborators, Command, PracticeEngine, PracticeReporter};
use examforge_core::explain::{ExplainHistory, ExplainMode, HistoryEntry};
use examforge_core::model::{BankId, BankSelection, Submission};
use examforge_core::score::SessionScore;
use examforge_core::session::{Session, SubmitReceipt};
use examforge_core::traits::{AttemptRecorder, QuestionStore};
use examforge_providers::config::{create_explainer, load_config_from};
use examforge_providers::local::{FileQuestionStore, JsonlAttemptLog, LocalIdentity};

const COMMAND_BUFFER: usize = 64;

const HELP: &str = "\
Commands:
  1-6          select an answer      up / down   move the selection
  s            submit                n / p       next / previous question
  g <n>        jump to question n    f           flag or unflag
  t            toggle the timer      e           explain the current question
  ask <text>   follow-up question    mode        toggle concise/detailed
  history      recent explanations   finish      score the session
  review       revisit missed ones   q           quit";

pub struct PracticeArgs {
    pub banks: Vec<String>,
    pub timed: bool,
    pub local: Option<PathBuf>,
    pub years: Vec<String>,
    pub subjects: Vec<String>,
    pub mode: Option<ExplainMode>,
    pub seed: Option<u64>,
    pub output: Option<PathBuf>,
    pub attempt_log: PathBuf,
    pub email: Option<String>,
    pub config: Option<PathBuf>,
}

/// Prints session events to stdout.
struct ConsoleReporter;

impl PracticeReporter for ConsoleReporter {
    fn on_question(&self, session: &Session) {
        println!();
        for line in render_question(session) {
            println!("{line}");
        }
    }

    fn on_tick(&self, remaining_secs: u32) {
        if remaining_secs > 0 && (remaining_secs <= 5 || remaining_secs % 10 == 0) {
            println!("  {remaining_secs}s left");
        }
    }

    fn on_submitted(&self, session: &Session, receipt: &SubmitReceipt) {
        let question = &session.questions()[receipt.index];
        let correct = question.answers.get(question.correct_index());
        let correct_text = correct.map(|a| a.text.as_str()).unwrap_or("?");

        if receipt.correct {
            println!("Correct.");
        } else if receipt.skipped {
            println!("Skipped. Correct answer: {correct_text}");
        } else {
            println!("Incorrect. Correct answer: {correct_text}");
        }
        if let Some(explanation) = correct.and_then(|a| a.explanation.as_deref()) {
            println!("  {explanation}");
        }
        self.on_question(session);
    }

    fn on_status(&self, message: &str) {
        println!("{message}");
    }

    fn on_explanation(&self, entry: &HistoryEntry) {
        match &entry.follow_up {
            Some(follow_up) => println!("\nExplanation ({}, \"{follow_up}\"):", entry.mode),
            None => println!("\nExplanation ({}):", entry.mode),
        }
        println!("{}", entry.text);
    }

    fn on_history(&self, history: &ExplainHistory) {
        if history.is_empty() {
            println!("No explanations yet.");
            return;
        }

        let mut table = Table::new();
        table.set_header(vec!["#", "Question", "Mode", "Follow-up", "When"]);
        for (i, entry) in history.entries().enumerate() {
            table.add_row(vec![
                Cell::new(i + 1),
                Cell::new(&entry.stem),
                Cell::new(entry.mode),
                Cell::new(entry.follow_up.as_deref().unwrap_or("-")),
                Cell::new(entry.at.format("%H:%M:%S")),
            ]);
        }
        println!("{table}");
    }

    fn on_finished(&self, session: &Session, score: &SessionScore) {
        println!("\n{}", score.summary());
        print_missed(session);
    }
}

fn print_missed(session: &Session) {
    let missed: Vec<(usize, &Submission)> = session
        .submissions()
        .iter()
        .enumerate()
        .filter(|(_, s)| s.is_missed() || s.flagged)
        .collect();
    if missed.is_empty() {
        return;
    }

    let mut table = Table::new();
    table.set_header(vec!["#", "Question", "Result"]);
    for (i, submission) in missed {
        let result = match (submission.skipped, submission.correct, submission.flagged) {
            (true, _, _) => "timed out",
            (_, Some(false), _) => "incorrect",
            (_, _, true) => "flagged",
            _ => "unanswered",
        };
        table.add_row(vec![
            Cell::new(i + 1),
            Cell::new(&session.questions()[i].stem),
            Cell::new(result),
        ]);
    }
    println!("{table}");
    println!("Type `review` to revisit these questions.");
}

/// Lines describing the current question, its answers and their state.
fn render_question(session: &Session) -> Vec<String> {
    let question = session.current_question();
    let submission = session.current_submission();

    let mut header = format!("[{}] {}", session.progress(), session.title());
    let tags = session.selection().tags();
    if !tags.is_empty() {
        header.push_str(&format!(" ({tags})"));
    }
    if session.is_review_mode() {
        header.push_str(" (review)");
    }
    if submission.flagged {
        header.push_str(" [flagged]");
    }
    if session.countdown().is_armed() {
        header.push_str(&format!(" {}s", session.countdown().remaining()));
    }

    let mut lines = vec![header, question.stem.clone()];
    if let Some(url) = &question.image_url {
        lines.push(format!("  image: {url}"));
    }
    let correct = question.correct_index();
    for (i, answer) in question.answers.iter().enumerate() {
        lines.push(format!(
            " {} {}. {}",
            answer_marker(submission, i, correct),
            i + 1,
            answer.text
        ));
    }
    lines
}

fn answer_marker(submission: &Submission, index: usize, correct: usize) -> char {
    let selected = submission.selected == Some(index);
    match (submission.submitted, selected, index == correct) {
        (true, _, true) => '+',
        (true, true, false) => 'x',
        (false, true, _) => '>',
        _ => ' ',
    }
}

/// Map one line of learner input to a command.
fn parse_command(line: &str) -> Option<Command> {
    let line = line.trim();
    let (word, rest) = line
        .split_once(char::is_whitespace)
        .map(|(w, r)| (w, r.trim()))
        .unwrap_or((line, ""));

    let command = match word.to_lowercase().as_str() {
        "up" | "k" => Command::MoveSelection(-1),
        "down" | "j" => Command::MoveSelection(1),
        "s" | "submit" => Command::Submit,
        "n" | "next" => Command::Next,
        "p" | "prev" | "previous" => Command::Previous,
        "g" | "go" => {
            let n: usize = rest.parse().ok()?;
            Command::Jump(n.checked_sub(1)?)
        }
        "f" | "flag" => Command::ToggleFlag,
        "t" | "timer" => Command::ToggleTimed,
        "e" | "explain" => Command::Explain,
        "ask" if !rest.is_empty() => Command::FollowUp(rest.to_string()),
        "mode" => Command::ToggleExplainMode,
        "history" => Command::ShowHistory,
        "finish" => Command::Finish,
        "review" => Command::Review,
        "q" | "quit" | "exit" => Command::Quit,
        digits if rest.is_empty() => {
            let n: usize = digits.parse().ok()?;
            if !(1..=6).contains(&n) {
                return None;
            }
            Command::Select(n - 1)
        }
        _ => return None,
    };
    Some(command)
}

/// Forward stdin lines to the driver from a dedicated thread.
///
/// Dropping the sender at end of input ends the session.
fn spawn_input(tx: mpsc::Sender<Command>) {
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            match parse_command(&line) {
                Some(command) => {
                    let quit = command == Command::Quit;
                    if tx.blocking_send(command).is_err() || quit {
                        break;
                    }
                }
                None if line.trim().is_empty() => {}
                None => println!("{HELP}"),
            }
        }
    });
}

pub async fn execute(args: PracticeArgs) -> Result<()> {
    let config = load_config_from(args.config.as_deref())?;
    let supabase = config.supabase_client().map(Arc::new);
    let explainer = create_explainer(
        &config.explainer,
        config.supabase.as_ref().zip(supabase.clone()),
    )?;

    let mut bank_ids: Vec<BankId> = args.banks.iter().map(|b| BankId::from(b.as_str())).collect();

    let (collaborators, bank_names) = match &args.local {
        Some(path) => {
            let store = FileQuestionStore::open(path)?;
            if bank_ids.is_empty() {
                bank_ids = store.bank_ids();
            }
            let names = store.bank_names(&bank_ids);
            let identity = Arc::new(LocalIdentity::default());
            let attempts: Arc<dyn AttemptRecorder> =
                Arc::new(JsonlAttemptLog::new(args.attempt_log.clone()));
            let collaborators = Collaborators {
                identity: identity.clone(),
                access: identity,
                questions: Arc::new(store),
                attempts,
                explainer,
            };
            (collaborators, names)
        }
        None => {
            let client = supabase.context(
                "no [supabase] section in config; pass --local to practice from bank files",
            )?;
            if let Some(email) = &args.email {
                let password = std::env::var("EXAMFORGE_PASSWORD")
                    .context("set EXAMFORGE_PASSWORD to sign in with --email")?;
                let user = client.sign_in_with_password(email, &password).await?;
                eprintln!("Signed in as {}", user.email);
            }
            let names = match client.list_banks().await {
                Ok(banks) => bank_ids
                    .iter()
                    .filter_map(|id| banks.iter().find(|b| &b.id == id))
                    .map(|b| b.name.clone())
                    .collect(),
                Err(e) => {
                    tracing::warn!("failed to list banks: {e:#}");
                    Vec::new()
                }
            };
            let collaborators = Collaborators {
                identity: client.clone(),
                access: client.clone(),
                questions: client.clone(),
                attempts: client,
                explainer,
            };
            (collaborators, names)
        }
    };

    let selection = BankSelection {
        bank_ids,
        bank_names,
        timed: args.timed,
        years: args.years.clone(),
        subjects: args.subjects.clone(),
    };

    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    let mut engine_config = config.engine_config();
    if let Some(mode) = args.mode {
        engine_config.explain_mode = mode;
    }

    let engine = PracticeEngine::new(collaborators, engine_config);
    let session = engine.start(selection, &mut rng).await?;
    eprintln!(
        "examforge v{}: {} ({} questions). Type `help` for commands.",
        env!("CARGO_PKG_VERSION"),
        session.title(),
        session.len()
    );
    if !session.dropped_questions().is_empty() {
        eprintln!(
            "Skipped {} question(s) with fewer than two answers.",
            session.dropped_questions().len()
        );
    }

    let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
    spawn_input(tx);

    let session = engine.driver(session).run(rx, &ConsoleReporter).await;

    let answered = session.submissions().iter().filter(|s| s.submitted).count();
    if session.score().is_none() {
        println!("\nSession ended: {answered}/{} answered.", session.len());
    }

    if let Some(path) = &args.output {
        session
            .report(chrono::Utc::now())
            .save_json(path)
            .with_context(|| format!("failed to save report: {}", path.display()))?;
        eprintln!("Report saved to: {}", path.display());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use examforge_core::model::{Answer, Question, User};
    use examforge_core::session::{SessionConfig, SubmitOutcome};
    use examforge_core::time::fixed_now;

    #[test]
    fn parses_selection_digits() {
        assert_eq!(parse_command("1"), Some(Command::Select(0)));
        assert_eq!(parse_command(" 6 "), Some(Command::Select(5)));
        assert_eq!(parse_command("0"), None);
        assert_eq!(parse_command("7"), None);
    }

    #[test]
    fn parses_navigation() {
        assert_eq!(parse_command("n"), Some(Command::Next));
        assert_eq!(parse_command("p"), Some(Command::Previous));
        assert_eq!(parse_command("up"), Some(Command::MoveSelection(-1)));
        assert_eq!(parse_command("down"), Some(Command::MoveSelection(1)));
        assert_eq!(parse_command("g 3"), Some(Command::Jump(2)));
        assert_eq!(parse_command("g 0"), None);
        assert_eq!(parse_command("g"), None);
    }

    #[test]
    fn parses_follow_up_text() {
        assert_eq!(
            parse_command("ask why not digoxin?"),
            Some(Command::FollowUp("why not digoxin?".into()))
        );
        assert_eq!(parse_command("ask"), None);
    }

    #[test]
    fn parses_session_commands() {
        assert_eq!(parse_command("S"), Some(Command::Submit));
        assert_eq!(parse_command("f"), Some(Command::ToggleFlag));
        assert_eq!(parse_command("t"), Some(Command::ToggleTimed));
        assert_eq!(parse_command("e"), Some(Command::Explain));
        assert_eq!(parse_command("mode"), Some(Command::ToggleExplainMode));
        assert_eq!(parse_command("history"), Some(Command::ShowHistory));
        assert_eq!(parse_command("finish"), Some(Command::Finish));
        assert_eq!(parse_command("review"), Some(Command::Review));
        assert_eq!(parse_command("q"), Some(Command::Quit));
        assert_eq!(parse_command("dance"), None);
        assert_eq!(parse_command(""), None);
    }

    fn session() -> Session {
        let question = Question::new(
            "q1",
            "Reverses heparin?",
            vec![Answer::new("Vitamin K", false), Answer::new("Protamine", true)],
        );
        Session::start(
            BankSelection {
                bank_names: vec!["Pharm".into()],
                ..BankSelection::new(vec![BankId::from("pharm")])
            },
            User {
                id: "u".into(),
                email: "u@example.com".into(),
            },
            vec![question],
            SessionConfig::default(),
            &mut StdRng::seed_from_u64(1),
            fixed_now(),
        )
    }

    #[test]
    fn header_shows_year_and_subject_tags() {
        let question = Question::new(
            "r1",
            "First sign of hyperkalemia on ECG?",
            vec![Answer::new("Peaked T waves", true), Answer::new("U waves", false)],
        );
        let session = Session::start(
            BankSelection {
                bank_names: vec!["Renal".into()],
                years: vec!["2024".into()],
                subjects: vec!["Nephrology".into()],
                ..BankSelection::new(vec![BankId::from("renal")])
            },
            User {
                id: "u".into(),
                email: "u@example.com".into(),
            },
            vec![question],
            SessionConfig::default(),
            &mut StdRng::seed_from_u64(1),
            fixed_now(),
        );
        assert_eq!(render_question(&session)[0], "[1 / 1] Renal (2024 • Nephrology)");
    }

    #[test]
    fn renders_selection_then_result() {
        let mut session = session();
        let wrong = session
            .current_question()
            .answers
            .iter()
            .position(|a| !a.is_correct)
            .unwrap();
        session.select_answer(wrong).unwrap();

        let lines = render_question(&session);
        assert_eq!(lines[0], "[1 / 1] Pharm");
        assert!(lines[2 + wrong].starts_with(" > "));

        assert!(matches!(
            session.submit(fixed_now()).unwrap(),
            SubmitOutcome::Locked(_)
        ));
        let lines = render_question(&session);
        let correct = session.current_question().correct_index();
        assert!(lines[2 + wrong].starts_with(" x "));
        assert!(lines[2 + correct].starts_with(" + "));
    }
}
