//! The `examforge report` command.

use std::path::PathBuf;

use anyhow::{Context, Result};

use examforge_core::report::SessionReport;

pub fn execute(input: PathBuf, markdown: Option<PathBuf>) -> Result<()> {
    let report = SessionReport::load_json(&input)?;
    let md = report.to_markdown();

    match markdown {
        Some(path) => {
            std::fs::write(&path, md)
                .with_context(|| format!("failed to write markdown to {}", path.display()))?;
            eprintln!("Markdown saved to: {}", path.display());
        }
        None => print!("{md}"),
    }
    Ok(())
}
