//! Settings loaded from `config.json`.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::conversation::DEFAULT_MIN_OUTPUT_TOKENS;
use crate::kernel::{ProcessLauncher, DEFAULT_TIMEOUT_SECS};

/// Default OpenAI-compatible endpoint.
pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// Environment variable consulted when the config has no key.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Default cap on model responses per user input.
pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 25;

/// Built-in system prompt.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an AI code interpreter.
Your goal is to help users do a variety of jobs by executing Python code.

You should:
1. Comprehend the user's requirements carefully & to the letter.
2. Give a brief description for what you plan to do & call the execute_code function to run code
3. Provide results analysis based on the execution output.
4. If error occurred, try to fix it.

Note: If the user uploads a file, you will receive a system message \"User uploaded a file: filename\". Use the filename as the path in the code.";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid config file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Unknown model choice: {0}")]
    UnknownModel(String),
    #[error("{0} is not available for your API key")]
    Unavailable(String),
    #[error("{0} lacks context window information. Please check the config file.")]
    MissingContextWindow(String),
    #[error("No API key configured; set api_key in the config file or OPENAI_API_KEY")]
    MissingApiKey,
}

/// One selectable model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelChoice {
    /// Name sent to the API.
    pub model_name: String,
    #[serde(default = "default_true")]
    pub available: bool,
    #[serde(default)]
    pub context_window: Option<usize>,
}

fn default_true() -> bool {
    true
}

impl ModelChoice {
    pub fn new(model_name: impl Into<String>, context_window: usize) -> Self {
        Self {
            model_name: model_name.into(),
            available: true,
            context_window: Some(context_window),
        }
    }
}

/// Interpreter bridge settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Custom bridge command; the bundled Python bridge when unset.
    pub command: Option<String>,
    pub args: Vec<String>,
    /// Per-execution limit; `0` waits forever.
    pub timeout_secs: u64,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            command: None,
            args: Vec::new(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl KernelConfig {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }

    pub fn launcher(&self) -> ProcessLauncher {
        match &self.command {
            Some(command) => ProcessLauncher::new().with_command(command, self.args.clone()),
            None => ProcessLauncher::new(),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base: String,
    pub api_key: Option<String>,
    /// Display choice -> model.
    pub models: BTreeMap<String, ModelChoice>,
    pub default_model: String,
    pub min_output_tokens: usize,
    pub system_prompt: Option<String>,
    pub max_tool_rounds: usize,
    pub kernel: KernelConfig,
}

impl Default for Config {
    fn default() -> Self {
        let mut models = BTreeMap::new();
        models.insert("GPT-3.5".to_string(), ModelChoice::new("gpt-3.5-turbo", 16385));
        models.insert("GPT-4".to_string(), ModelChoice::new("gpt-4", 8192));

        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: None,
            models,
            default_model: "GPT-3.5".to_string(),
            min_output_tokens: DEFAULT_MIN_OUTPUT_TOKENS,
            system_prompt: None,
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            kernel: KernelConfig::default(),
        }
    }
}

impl Config {
    /// Load from `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&text)?;
        debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// API key from the config, else from the environment.
    pub fn api_key(&self) -> Result<String, ConfigError> {
        self.api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var(API_KEY_ENV).ok().filter(|k| !k.is_empty()))
            .ok_or(ConfigError::MissingApiKey)
    }

    pub fn system_prompt(&self) -> &str {
        self.system_prompt.as_deref().unwrap_or(DEFAULT_SYSTEM_PROMPT)
    }

    /// Look up a model choice that is usable.
    pub fn model(&self, choice: &str) -> Result<&ModelChoice, ConfigError> {
        let model = self
            .models
            .get(choice)
            .ok_or_else(|| ConfigError::UnknownModel(choice.to_string()))?;
        if !model.available {
            return Err(ConfigError::Unavailable(choice.to_string()));
        }
        Ok(model)
    }

    /// Slicing budget for a model choice.
    pub fn context_window(&self, choice: &str) -> Result<usize, ConfigError> {
        let model = self.model(choice)?;
        model
            .context_window
            .ok_or_else(|| ConfigError::MissingContextWindow(model.model_name.clone()))
    }

    /// Names of the choices that can be selected.
    pub fn available_models(&self) -> Vec<&str> {
        self.models
            .iter()
            .filter(|(_, m)| m.available)
            .map(|(name, _)| name.as_str())
            .collect()
    }
}
