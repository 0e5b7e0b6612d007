use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::api_connection::endpoints::{Provider, DEFAULT_CHAT_MODEL, TOGETHER_BASE_URL};
use crate::cli::Cli;
use crate::search::DistanceMetric;

pub const API_KEY_ENV_VAR: &str = "TOGETHER_API_KEY";
pub const BASE_URL_ENV_VAR: &str = "LLM_BASE_URL";
pub const MODEL_ENV_VAR: &str = "LLM_MODEL";
pub const DEFAULT_DATASET_PATH: &str = "logistics_cost_data.csv";
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Where and how the language model is reached.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmSettings {
    pub api_key_env_var: String,
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
}

impl LlmSettings {
    /// Reads overrides from the environment; `.env` must already be loaded.
    pub fn from_env(timeout_secs: Option<u64>) -> Self {
        Self {
            api_key_env_var: API_KEY_ENV_VAR.to_string(),
            base_url: non_empty_var(BASE_URL_ENV_VAR)
                .unwrap_or_else(|| TOGETHER_BASE_URL.to_string()),
            model: non_empty_var(MODEL_ENV_VAR).unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string()),
            timeout: Duration::from_secs(timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)),
        }
    }

    pub fn provider(&self) -> Provider {
        Provider::together(&self.api_key_env_var)
            .with_base_url(self.base_url.clone())
            .with_timeout(self.timeout)
    }
}

/// Options shared by every command, resolved from CLI flags.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub dataset_path: PathBuf,
    pub metric: DistanceMetric,
    pub embedding_model: String,
    pub index_cache: Option<PathBuf>,
}

impl Settings {
    pub fn from_cli(cli: &Cli) -> Self {
        Self {
            dataset_path: cli.data.clone(),
            metric: cli.metric,
            embedding_model: cli.embedding_model.clone(),
            index_cache: cli.index_cache.clone(),
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}
