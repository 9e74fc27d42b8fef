//! Configuration loading and management for postcraft.
//!
//! Loads settings from `postcraft.toml` with environment variable overrides for sensitive data.

use crate::agent::{DEFAULT_BASE_URL, DEFAULT_MODEL};
use crate::budget::DEFAULT_TOKEN_CEILING;
use crate::prompt::{PromptError, PromptTemplate, DEFAULT_HUMAN_TEMPLATE, DEFAULT_SYSTEM_TEMPLATE};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const CONFIG_FILE: &str = "postcraft.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("invalid prompt template: {0}")]
    Prompt(#[from] PromptError),
    #[error("invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Model identifier (e.g., "gpt-3.5-turbo"); also selects the tokenizer
    pub model: String,
    /// Base URL of an OpenAI-compatible API
    pub base_url: String,
    /// Timeout for page fetches and each model call
    pub request_timeout_secs: u64,
    /// Map-phase calls allowed in flight at once
    pub map_concurrency: usize,
    /// Also require the legacy 51-character key length
    pub strict_key_check: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout_secs: 120,
            map_concurrency: 1,
            strict_key_check: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    /// Prompt plus chunk must stay below this many tokens
    pub token_ceiling: usize,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            token_ceiling: DEFAULT_TOKEN_CEILING,
        }
    }
}

/// Prompt templates with `{text}`, `{style}` and `{tone}` placeholders
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptsConfig {
    pub system_template: String,
    pub human_template: String,
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            system_template: DEFAULT_SYSTEM_TEMPLATE.to_string(),
            human_template: DEFAULT_HUMAN_TEMPLATE.to_string(),
        }
    }
}

/// API keys configuration (loaded from environment)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ApiConfig {
    #[serde(default)]
    pub openai_key: Option<String>,
}

/// Storage paths configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Base path for the run log
    pub path: PathBuf,
}

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub budget: BudgetConfig,
    #[serde(default)]
    pub prompts: PromptsConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl Config {
    /// Load configuration from the default location (postcraft.toml in cwd or home)
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::find_config_file();
        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml(&content)?;

        // Override API keys from environment variables
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            config.api.openai_key = Some(key);
        }

        Ok(config)
    }

    /// Parse and validate configuration text
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.agent.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "agent.request_timeout_secs",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.agent.map_concurrency == 0 {
            return Err(ConfigError::Invalid {
                key: "agent.map_concurrency",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.budget.token_ceiling == 0 {
            return Err(ConfigError::Invalid {
                key: "budget.token_ceiling",
                reason: "must be greater than zero".to_string(),
            });
        }
        self.prompt_template()?;
        Ok(())
    }

    /// Find the config file in standard locations
    fn find_config_file() -> PathBuf {
        // Check current directory first
        let local_config = PathBuf::from(CONFIG_FILE);
        if local_config.exists() {
            return local_config;
        }

        // Check home directory
        if let Some(home) = dirs::home_dir() {
            let home_config = home.join(".config").join("postcraft").join(CONFIG_FILE);
            if home_config.exists() {
                return home_config;
            }
        }

        // Default to local path (will error on read)
        local_config
    }

    /// Compile the configured prompt templates
    pub fn prompt_template(&self) -> Result<PromptTemplate, PromptError> {
        PromptTemplate::new(&self.prompts.system_template, &self.prompts.human_template)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.agent.request_timeout_secs)
    }

    /// The configured OpenAI key, if any
    pub fn api_key(&self) -> Option<&str> {
        self.api.openai_key.as_deref()
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data"),
        }
    }
}
