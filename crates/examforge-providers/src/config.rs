//! Configuration loading and collaborator factory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use examforge_core::access::AccessPolicy;
use examforge_core::engine::EngineConfig;
use examforge_core::explain::ExplainMode;
use examforge_core::timer::DEFAULT_QUESTION_SECONDS;
use examforge_core::traits::ExplanationService;

use crate::edge_function::EdgeFunctionExplainer;
use crate::openrouter::OpenRouterExplainer;
use crate::supabase::SupabaseClient;

/// Supabase project settings.
///
/// Note: Custom Debug impl masks keys to prevent accidental exposure in logs.
#[derive(Clone, Serialize, Deserialize)]
pub struct SupabaseConfig {
    pub url: String,
    pub anon_key: String,
    /// Session token from an earlier sign-in.
    #[serde(default)]
    pub access_token: Option<String>,
}

impl std::fmt::Debug for SupabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseConfig")
            .field("url", &self.url)
            .field("anon_key", &"***")
            .field("access_token", &self.access_token.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Which service produces explanations.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ExplainerConfig {
    #[serde(rename = "openrouter")]
    OpenRouter {
        #[serde(default)]
        api_key: Option<String>,
        #[serde(default)]
        model: Option<String>,
        #[serde(default)]
        base_url: Option<String>,
        /// Look up the project's shared key in the `ai_keys` table first.
        #[serde(default = "default_true")]
        use_shared_key: bool,
    },
    EdgeFunction {
        #[serde(default)]
        endpoint: Option<String>,
    },
}

impl std::fmt::Debug for ExplainerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExplainerConfig::OpenRouter {
                api_key,
                model,
                base_url,
                use_shared_key,
            } => f
                .debug_struct("OpenRouter")
                .field("api_key", &api_key.as_ref().map(|_| "***"))
                .field("model", model)
                .field("base_url", base_url)
                .field("use_shared_key", use_shared_key)
                .finish(),
            ExplainerConfig::EdgeFunction { endpoint } => f
                .debug_struct("EdgeFunction")
                .field("endpoint", endpoint)
                .finish(),
        }
    }
}

impl Default for ExplainerConfig {
    fn default() -> Self {
        ExplainerConfig::OpenRouter {
            api_key: None,
            model: None,
            base_url: None,
            use_shared_key: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Session defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PracticeConfig {
    /// Countdown per question in timed sessions.
    #[serde(default = "default_question_seconds")]
    pub question_seconds: u32,
    #[serde(default)]
    pub explain_mode: ExplainMode,
}

fn default_question_seconds() -> u32 {
    DEFAULT_QUESTION_SECONDS
}

impl Default for PracticeConfig {
    fn default() -> Self {
        Self {
            question_seconds: default_question_seconds(),
            explain_mode: ExplainMode::default(),
        }
    }
}

/// Top-level examforge configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExamforgeConfig {
    #[serde(default)]
    pub supabase: Option<SupabaseConfig>,
    #[serde(default)]
    pub explainer: ExplainerConfig,
    #[serde(default)]
    pub practice: PracticeConfig,
    #[serde(default)]
    pub access: AccessPolicy,
}

impl ExamforgeConfig {
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            question_seconds: self.practice.question_seconds,
            explain_mode: self.practice.explain_mode,
            access: self.access.clone(),
        }
    }

    /// Build a Supabase client, if the project is configured.
    pub fn supabase_client(&self) -> Option<SupabaseClient> {
        self.supabase.as_ref().map(|s| {
            SupabaseClient::new(&s.url, &s.anon_key).with_access_token(s.access_token.clone())
        })
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
fn resolve_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    while let Some(start) = result.find("${") {
        if let Some(end) = result[start..].find('}') {
            let var_name = &result[start + 2..start + end];
            let value = std::env::var(var_name).unwrap_or_default();
            result = format!(
                "{}{}{}",
                &result[..start],
                value,
                &result[start + end + 1..]
            );
        } else {
            break;
        }
    }
    result
}

fn resolve_opt(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(resolve_env_vars)
        .filter(|v| !v.is_empty())
}

/// Resolve env vars in every string setting.
fn resolve_config(config: &mut ExamforgeConfig) {
    if let Some(s) = config.supabase.as_mut() {
        s.url = resolve_env_vars(&s.url);
        s.anon_key = resolve_env_vars(&s.anon_key);
        s.access_token = resolve_opt(&s.access_token);
    }
    config.explainer = match &config.explainer {
        ExplainerConfig::OpenRouter {
            api_key,
            model,
            base_url,
            use_shared_key,
        } => ExplainerConfig::OpenRouter {
            api_key: resolve_opt(api_key),
            model: resolve_opt(model),
            base_url: resolve_opt(base_url),
            use_shared_key: *use_shared_key,
        },
        ExplainerConfig::EdgeFunction { endpoint } => ExplainerConfig::EdgeFunction {
            endpoint: resolve_opt(endpoint),
        },
    };
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `examforge.toml` in the current directory
/// 2. `~/.config/examforge/config.toml`
///
/// Environment variable overrides: `EXAMFORGE_SUPABASE_URL`,
/// `EXAMFORGE_SUPABASE_ANON_KEY`, `EXAMFORGE_ACCESS_TOKEN`,
/// `EXAMFORGE_OPENROUTER_KEY`.
pub fn load_config() -> Result<ExamforgeConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<ExamforgeConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from("examforge.toml");
        if local.exists() {
            Some(local)
        } else {
            dirs_path()
                .map(|home| home.join("config.toml"))
                .filter(|global| global.exists())
        }
    };

    let mut config = match config_path {
        Some(path) => {
            tracing::debug!("loading config from {}", path.display());
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            parse_config(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => ExamforgeConfig::default(),
    };

    apply_env_overrides(&mut config, |name| std::env::var(name).ok());
    resolve_config(&mut config);

    Ok(config)
}

/// Parse a config document.
pub fn parse_config(content: &str) -> Result<ExamforgeConfig> {
    Ok(toml::from_str::<ExamforgeConfig>(content)?)
}

fn apply_env_overrides(config: &mut ExamforgeConfig, env: impl Fn(&str) -> Option<String>) {
    let url = env("EXAMFORGE_SUPABASE_URL");
    let anon_key = env("EXAMFORGE_SUPABASE_ANON_KEY");
    if config.supabase.is_none() && (url.is_some() || anon_key.is_some()) {
        config.supabase = Some(SupabaseConfig {
            url: String::new(),
            anon_key: String::new(),
            access_token: None,
        });
    }
    if let Some(s) = config.supabase.as_mut() {
        if let Some(url) = url {
            s.url = url;
        }
        if let Some(key) = anon_key {
            s.anon_key = key;
        }
        if let Some(token) = env("EXAMFORGE_ACCESS_TOKEN") {
            s.access_token = Some(token);
        }
    }

    if let Some(key) = env("EXAMFORGE_OPENROUTER_KEY") {
        if let ExplainerConfig::OpenRouter { api_key, .. } = &mut config.explainer {
            *api_key = Some(key);
        }
    }
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("examforge"))
}

/// Create the configured explanation service.
///
/// `supabase` supplies the shared OpenRouter key and the edge function host.
pub fn create_explainer(
    config: &ExplainerConfig,
    supabase: Option<(&SupabaseConfig, Arc<SupabaseClient>)>,
) -> Result<Arc<dyn ExplanationService>> {
    match config {
        ExplainerConfig::OpenRouter {
            api_key,
            model,
            base_url,
            use_shared_key,
        } => {
            let mut explainer =
                OpenRouterExplainer::new(api_key.clone(), model.clone(), base_url.clone());
            if let (true, Some((_, client))) = (*use_shared_key, supabase) {
                explainer = explainer.with_key_source(client);
            }
            Ok(Arc::new(explainer))
        }
        ExplainerConfig::EdgeFunction { endpoint } => {
            let (base_url, anon_key) = match (supabase, endpoint) {
                (Some((s, _)), _) => (s.url.clone(), s.anon_key.clone()),
                (None, Some(_)) => (String::new(), String::new()),
                (None, None) => {
                    anyhow::bail!("edge-function explainer needs a [supabase] section or an endpoint")
                }
            };
            Ok(Arc::new(EdgeFunctionExplainer::new(
                &base_url,
                &anon_key,
                endpoint.clone(),
            )))
        }
    }
}
