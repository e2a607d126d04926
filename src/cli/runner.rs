//! CLI runner for interactive and single-prompt modes.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tracing::debug;

use crate::cli::repl::Repl;
use crate::config::{Config, XdgDirs};
use crate::model::OpenAiClient;
use crate::session::{ChatSession, ConversationStore, SessionError};

/// Options shared by both modes.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Config file; the XDG config file when unset.
    pub config_path: Option<PathBuf>,
    /// Model choice overriding the configured default.
    pub model: Option<String>,
}

fn build_repl(options: &RunOptions) -> anyhow::Result<Repl> {
    let dirs = XdgDirs::new();
    dirs.ensure_dirs()
        .context("Could not create application directories")?;

    let config_path = options
        .config_path
        .clone()
        .unwrap_or_else(|| dirs.config_file());
    let config = Config::load(&config_path)
        .with_context(|| format!("Could not load {}", config_path.display()))?;
    debug!(config = %config_path.display(), "Configuration loaded");

    let client = OpenAiClient::new(config.api_base.clone(), config.api_key()?);
    let mut session = ChatSession::from_config(config, dirs.cache.clone())?;
    if let Some(choice) = &options.model {
        session.select_model(choice)?;
    }

    let store = ConversationStore::new(dirs.sessions_dir());
    Ok(Repl::new(session, Arc::new(client), store).with_history_file(dirs.data.join("history.txt")))
}

/// Run a single prompt and exit.
pub async fn run_single_prompt(options: &RunOptions, prompt: &str) -> anyhow::Result<()> {
    let mut repl = build_repl(options)?;

    let result = repl.handle_prompt(prompt).await;
    repl.shutdown().await;

    match result {
        Ok(_) => Ok(()),
        Err(SessionError::Turn(e)) => Err(anyhow::anyhow!("Turn failed: {}", e)),
        Err(e) => Err(e.into()),
    }
}

/// Run in interactive mode.
pub async fn run_interactive(options: &RunOptions) -> anyhow::Result<()> {
    let mut repl = build_repl(options)?;
    print_banner();
    repl.run().await
}

/// Print the welcome banner.
pub fn print_banner() {
    println!();
    println!(
        "  \x1b[1;33mcodepot\x1b[0m  \x1b[2mv{}\x1b[0m",
        env!("CARGO_PKG_VERSION")
    );
    println!();
    println!("  \x1b[2m🐍 Conversational code interpreter\x1b[0m");
    println!("  \x1b[2mType \x1b[0m\x1b[1;36m/help\x1b[0m\x1b[2m for commands, or ask for something to compute!\x1b[0m");
    println!();
}

/// Get the application version string.
pub fn get_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Banner lines without ANSI codes.
pub fn banner_text_lines() -> Vec<&'static str> {
    vec!["codepot", "Conversational code interpreter", "/help"]
}
