//! The `examforge banks` command.

use std::path::PathBuf;

use anyhow::{Context, Result};
use comfy_table::{Cell, Table};

use examforge_core::traits::QuestionStore;
use examforge_providers::config::load_config_from;
use examforge_providers::local::FileQuestionStore;

pub async fn execute(local: Option<PathBuf>, config_path: Option<PathBuf>) -> Result<()> {
    let banks = match local {
        Some(path) => FileQuestionStore::open(&path)?.list_banks().await?,
        None => {
            let config = load_config_from(config_path.as_deref())?;
            let client = config.supabase_client().context(
                "no [supabase] section in config; pass --local to list bank files",
            )?;
            client.list_banks().await?
        }
    };

    if banks.is_empty() {
        println!("No banks found.");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["ID", "Name"]);
    for bank in &banks {
        table.add_row(vec![Cell::new(&bank.id), Cell::new(&bank.name)]);
    }
    println!("{table}");

    Ok(())
}
