//! Configuration management.

mod settings;
mod xdg;

pub use settings::{
    Config, ConfigError, KernelConfig, ModelChoice, API_KEY_ENV, DEFAULT_API_BASE,
    DEFAULT_MAX_TOOL_ROUNDS, DEFAULT_SYSTEM_PROMPT,
};
pub use xdg::XdgDirs;
