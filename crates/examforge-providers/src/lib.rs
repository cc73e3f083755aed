//! examforge-providers: Backend integrations.
//!
//! Implements the collaborator traits from `examforge-core` against Supabase
//! (auth, questions, banks, attempts, access grants), OpenRouter and the
//! `ai-explain` edge function, plus offline file-backed stores and mocks.

pub mod config;
pub mod edge_function;
mod error;
pub mod local;
pub mod mock;
pub mod openrouter;
pub mod supabase;

pub use config::{
    create_explainer, load_config, load_config_from, ExamforgeConfig, ExplainerConfig,
    PracticeConfig, SupabaseConfig,
};
pub use examforge_core::error::ServiceError;
pub use supabase::SupabaseClient;
