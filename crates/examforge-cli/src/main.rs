//! examforge CLI: the user-facing command-line interface.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use examforge_core::explain::ExplainMode;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "examforge", version, about = "Terminal exam-practice runner")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an interactive practice session
    Practice {
        /// Bank IDs to practice (repeatable; defaults to every local bank)
        #[arg(long = "bank")]
        banks: Vec<String>,

        /// Start with the per-question countdown on
        #[arg(long)]
        timed: bool,

        /// Practice offline from a bank file or directory
        #[arg(long)]
        local: Option<PathBuf>,

        /// Exam year tag shown in the session bar (repeatable)
        #[arg(long = "year")]
        years: Vec<String>,

        /// Subject tag shown in the session bar (repeatable)
        #[arg(long = "subject")]
        subjects: Vec<String>,

        /// Initial explanation mode: concise or detailed
        #[arg(long)]
        mode: Option<ExplainMode>,

        /// Shuffle seed for a reproducible question order
        #[arg(long)]
        seed: Option<u64>,

        /// Write the session report JSON here on exit
        #[arg(long)]
        output: Option<PathBuf>,

        /// Attempt log for offline sessions
        #[arg(long, default_value = "examforge-attempts.jsonl")]
        attempt_log: PathBuf,

        /// Sign in with this email (password read from EXAMFORGE_PASSWORD)
        #[arg(long)]
        email: Option<String>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// List available question banks
    Banks {
        /// List banks from a local file or directory instead of Supabase
        #[arg(long)]
        local: Option<PathBuf>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Summarize a saved session report as Markdown
    Report {
        /// Report JSON written by `practice --output`
        #[arg(long)]
        input: PathBuf,

        /// Write the Markdown here instead of stdout
        #[arg(long)]
        markdown: Option<PathBuf>,
    },

    /// Validate question bank TOML files
    Validate {
        /// Path to a bank file or directory
        #[arg(long)]
        bank_file: PathBuf,
    },

    /// Create starter config and example bank
    Init,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("examforge=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Practice {
            banks,
            timed,
            local,
            years,
            subjects,
            mode,
            seed,
            output,
            attempt_log,
            email,
            config,
        } => {
            commands::practice::execute(commands::practice::PracticeArgs {
                banks,
                timed,
                local,
                years,
                subjects,
                mode,
                seed,
                output,
                attempt_log,
                email,
                config,
            })
            .await
        }
        Commands::Banks { local, config } => commands::banks::execute(local, config).await,
        Commands::Report { input, markdown } => commands::report::execute(input, markdown),
        Commands::Validate { bank_file } => commands::validate::execute(bank_file),
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
