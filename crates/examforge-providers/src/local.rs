//! Offline collaborators: TOML bank files, a local learner, and a JSON-lines
//! attempt log.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use examforge_core::model::{AccessGrant, Bank, BankId, Question, User};
use examforge_core::parser::{load_bank_directory, parse_bank_file, BankFile};
use examforge_core::traits::{
    AccessDirectory, AttemptRecord, AttemptRecorder, IdentityProvider, QuestionStore,
};

/// Question store over bank files loaded from disk.
#[derive(Debug, Clone)]
pub struct FileQuestionStore {
    banks: Vec<BankFile>,
}

impl FileQuestionStore {
    pub fn new(banks: Vec<BankFile>) -> Self {
        Self { banks }
    }

    /// Load a single bank file, or every `.toml` bank under a directory.
    pub fn open(path: &Path) -> Result<Self> {
        let banks = if path.is_dir() {
            load_bank_directory(path)?
        } else {
            vec![parse_bank_file(path)?]
        };
        tracing::debug!(banks = banks.len(), path = %path.display(), "loaded local banks");
        Ok(Self { banks })
    }

    pub fn bank_ids(&self) -> Vec<BankId> {
        self.banks.iter().map(|b| b.bank.id.clone()).collect()
    }

    pub fn bank_names(&self, ids: &[BankId]) -> Vec<String> {
        ids.iter()
            .filter_map(|id| self.banks.iter().find(|b| &b.bank.id == id))
            .map(|b| b.bank.name.clone())
            .collect()
    }
}

#[async_trait]
impl QuestionStore for FileQuestionStore {
    async fn fetch_questions(&self, bank_ids: &[BankId]) -> anyhow::Result<Vec<Question>> {
        Ok(self
            .banks
            .iter()
            .filter(|b| bank_ids.contains(&b.bank.id))
            .flat_map(|b| b.questions.iter().cloned())
            .collect())
    }

    async fn list_banks(&self) -> anyhow::Result<Vec<Bank>> {
        Ok(self.banks.iter().map(|b| b.bank.clone()).collect())
    }
}

/// A fixed learner for offline practice, with no access grants.
#[derive(Debug, Clone)]
pub struct LocalIdentity {
    user: User,
}

impl LocalIdentity {
    pub fn new(user: User) -> Self {
        Self { user }
    }
}

impl Default for LocalIdentity {
    fn default() -> Self {
        Self::new(User {
            id: "local".into(),
            email: "local@localhost".into(),
        })
    }
}

#[async_trait]
impl IdentityProvider for LocalIdentity {
    async fn current_user(&self) -> anyhow::Result<Option<User>> {
        Ok(Some(self.user.clone()))
    }
}

#[async_trait]
impl AccessDirectory for LocalIdentity {
    async fn access_grants(&self) -> anyhow::Result<Vec<AccessGrant>> {
        Ok(Vec::new())
    }
}

/// Appends each attempt as one JSON object per line.
#[derive(Debug, Clone)]
pub struct JsonlAttemptLog {
    path: PathBuf,
}

impl JsonlAttemptLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl AttemptRecorder for JsonlAttemptLog {
    async fn log_attempt(&self, attempt: &AttemptRecord) -> anyhow::Result<()> {
        let mut line = serde_json::to_string(attempt).context("failed to serialize attempt")?;
        line.push('\n');
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("failed to open attempt log: {}", self.path.display()))?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}
