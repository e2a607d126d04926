//! Interactive REPL implementation.

use std::path::PathBuf;
use std::sync::Arc;

use crossterm::style::Color;
use reedline::{FileBackedHistory, Signal};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::cli::completion::{create_reedline, PotCompleter, PotPrompt, COMMANDS};
use crate::cli::render::HistoryRenderer;
use crate::model::ModelClient;
use crate::session::{format_relative_time, ChatSession, ConversationStore, SessionError};
use crate::tokens::format_tokens_with_separator;
use crate::turn::{TurnLoop, TurnSummary};

/// A parsed slash command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Upload(String),
    Undo,
    Restart,
    Model(Option<String>),
    Files,
    Tokens,
    Save(Option<String>),
    Load(String),
    Sessions,
    Quit,
    /// Known command used without a required argument.
    Usage(&'static str),
    Unknown(String),
}

impl Command {
    /// Parse a line; `None` when it is not a slash command.
    pub fn parse(input: &str) -> Option<Self> {
        let rest = input.trim().strip_prefix('/')?;
        let (cmd, args) = match rest.split_once(char::is_whitespace) {
            Some((cmd, args)) => (cmd, args.trim()),
            None => (rest, ""),
        };
        let arg = (!args.is_empty()).then(|| args.to_string());

        let command = match cmd.to_lowercase().as_str() {
            "help" | "h" | "?" => Command::Help,
            "upload" | "u" => match arg {
                Some(path) => Command::Upload(path),
                None => Command::Usage("/upload <path>"),
            },
            "undo" => Command::Undo,
            "restart" | "new" => Command::Restart,
            "model" | "m" => Command::Model(arg),
            "files" | "ls" => Command::Files,
            "tokens" | "context" => Command::Tokens,
            "save" => Command::Save(arg),
            "load" => match arg {
                Some(name) => Command::Load(name),
                None => Command::Usage("/load <name>"),
            },
            "sessions" => Command::Sessions,
            "exit" | "quit" | "q" => Command::Quit,
            other => Command::Unknown(other.to_string()),
        };
        Some(command)
    }
}

/// Expand a leading `~/` to the home directory.
fn expand_path(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

/// REPL state.
pub struct Repl {
    session: ChatSession,
    client: Arc<dyn ModelClient>,
    store: ConversationStore,
    renderer: HistoryRenderer<std::io::Stdout>,
    history_file: Option<PathBuf>,
    current_save: Option<String>,
}

impl Repl {
    pub fn new(session: ChatSession, client: Arc<dyn ModelClient>, store: ConversationStore) -> Self {
        Self {
            session,
            client,
            store,
            renderer: HistoryRenderer::stdout(),
            history_file: None,
            current_save: None,
        }
    }

    /// Persist line-editor history to `path`.
    pub fn with_history_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.history_file = Some(path.into());
        self
    }

    pub fn session(&self) -> &ChatSession {
        &self.session
    }

    /// Stop the interpreter.
    pub async fn shutdown(&mut self) {
        self.session.shutdown().await;
    }

    fn completer(&self) -> PotCompleter {
        let mut completer = PotCompleter::new();
        completer.set_models(
            self.session
                .config()
                .available_models()
                .into_iter()
                .map(str::to_string)
                .collect(),
        );
        completer.set_sessions(
            self.store
                .list()
                .unwrap_or_default()
                .into_iter()
                .map(|s| s.name)
                .collect(),
        );
        completer
    }

    /// Run the REPL loop.
    pub async fn run(&mut self) -> anyhow::Result<()> {
        let mut line_editor = create_reedline(self.completer());
        if let Some(path) = &self.history_file {
            if let Some(parent) = path.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            if let Ok(h) = FileBackedHistory::with_file(500, path.clone()) {
                line_editor = line_editor.with_history(Box::new(h));
            }
        }

        if let Err(e) = self.session.start().await {
            self.error(&format!("Interpreter failed to start: {}", e));
        }

        loop {
            let prompt = PotPrompt::new(self.session.model_choice());

            match line_editor.read_line(&prompt) {
                Ok(Signal::Success(line)) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }

                    match self.handle_input(line).await {
                        Ok(true) => break,
                        Ok(false) => {}
                        Err(e) => self.error(&format!("Error: {}", e)),
                    }
                }
                Ok(Signal::CtrlC) => {
                    println!("^C");
                    continue;
                }
                Ok(Signal::CtrlD) => break,
                Err(err) => {
                    self.error(&format!("Readline error: {}", err));
                    break;
                }
            }
        }

        self.session.shutdown().await;
        println!("👋 Bye!");
        Ok(())
    }

    async fn handle_input(&mut self, input: &str) -> anyhow::Result<bool> {
        match Command::parse(input) {
            Some(command) => self.handle_command(command).await,
            None => match self.handle_prompt(input).await {
                // Turn errors are already on screen as a diagnostic row.
                Ok(_) | Err(SessionError::Turn(_)) => Ok(false),
                Err(e) => Err(e.into()),
            },
        }
    }

    async fn handle_command(&mut self, command: Command) -> anyhow::Result<bool> {
        debug!(?command, "Handling command");

        match command {
            Command::Help => show_help(),
            Command::Quit => return Ok(true),
            Command::Usage(usage) => println!("Usage: {}", usage),
            Command::Unknown(cmd) => {
                println!("❓ Unknown command: /{}", cmd);
                println!("   Type /help for available commands");
            }
            Command::Upload(path) => {
                let stored = self.session.upload_file(&expand_path(&path))?;
                let name = stored
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                println!("📁 Uploaded \x1b[1m{}\x1b[0m \x1b[2m(/undo to revert)\x1b[0m", name);
            }
            Command::Undo => match self.session.undo_upload() {
                Some(record) => println!("↩️  Removed {}", record.path.display()),
                None => println!("Nothing to undo"),
            },
            Command::Restart => {
                self.session.restart().await?;
                self.current_save = None;
                println!("✨ Started a fresh conversation and interpreter");
            }
            Command::Model(None) => self.show_models(),
            Command::Model(Some(choice)) => {
                self.session.select_model(&choice)?;
                println!("✅ Switched to model: \x1b[1;33m{}\x1b[0m", choice);
            }
            Command::Files => {
                let files = self.session.work_dir_files()?;
                println!("\x1b[2m{}\x1b[0m", self.session.work_dir().display());
                if files.is_empty() {
                    println!("  (empty)");
                }
                for file in files {
                    println!("  {}", file);
                }
            }
            Command::Tokens => {
                let usage = self.session.context_usage()?;
                println!(
                    "📊 {} / {} tokens ({:.1}%)",
                    format_tokens_with_separator(usage.tokens),
                    format_tokens_with_separator(usage.context_window),
                    usage.percent()
                );
            }
            Command::Save(name) => self.cmd_save(name)?,
            Command::Load(name) => self.cmd_load(&name)?,
            Command::Sessions => self.cmd_sessions()?,
        }
        Ok(false)
    }

    fn show_models(&self) {
        println!("\n\x1b[1mModels:\x1b[0m");
        for (choice, model) in &self.session.config().models {
            let marker = if choice == self.session.model_choice() {
                "●"
            } else {
                " "
            };
            let note = if model.available { "" } else { " (unavailable)" };
            println!("  {} {} \x1b[2m{}{}\x1b[0m", marker, choice, model.model_name, note);
        }
        println!();
    }

    fn cmd_save(&mut self, name: Option<String>) -> anyhow::Result<()> {
        let name = name
            .or_else(|| self.current_save.clone())
            .unwrap_or_else(|| self.store.generate_name("chat"));
        let meta = self.store.save(
            &name,
            &self.session.conversation().to_vec(),
            self.session.model_choice(),
        )?;
        println!(
            "💾 Saved \x1b[1m{}\x1b[0m ({} messages, ~{} tokens)",
            meta.name,
            meta.message_count,
            format_tokens_with_separator(meta.token_estimate)
        );
        self.current_save = Some(meta.name);
        Ok(())
    }

    fn cmd_load(&mut self, name: &str) -> anyhow::Result<()> {
        let saved = self.store.load(name)?;
        self.session.replace_conversation(saved.messages);
        if let Err(e) = self.session.select_model(&saved.meta.model) {
            warn!(model = %saved.meta.model, error = %e, "Saved model not usable, keeping current");
        }
        self.current_save = Some(saved.meta.name);
        self.renderer.replay(self.session.history())?;
        println!(
            "📂 Loaded \x1b[1m{}\x1b[0m ({} messages)",
            name,
            self.session.conversation().len()
        );
        Ok(())
    }

    fn cmd_sessions(&self) -> anyhow::Result<()> {
        let saved = self.store.list()?;
        if saved.is_empty() {
            println!("No saved conversations");
            return Ok(());
        }
        println!("\n\x1b[1mSaved conversations:\x1b[0m");
        for meta in saved {
            let marker = if self.current_save.as_deref() == Some(meta.name.as_str()) {
                "●"
            } else {
                " "
            };
            println!(
                "  {} {:<24} \x1b[2m{} msgs · {} · {}\x1b[0m",
                marker,
                meta.name,
                meta.message_count,
                meta.model,
                format_relative_time(meta.updated_at)
            );
        }
        println!();
        Ok(())
    }

    /// Send user text and stream the turn to the terminal.
    pub async fn handle_prompt(&mut self, prompt: &str) -> Result<TurnSummary, SessionError> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let turn = TurnLoop::new(self.session.config().max_tool_rounds).with_updates(tx);

        self.session.add_user_input(prompt);
        self.renderer.begin(self.session.history());

        let session = &mut self.session;
        let renderer = &mut self.renderer;
        let client = self.client.as_ref();

        let run = async move {
            let result = session.run_turn(client, &turn).await;
            // Closes the channel so the render loop ends.
            drop(turn);
            result
        };
        let render = async {
            while let Some(history) = rx.recv().await {
                if let Err(e) = renderer.update(&history) {
                    warn!(error = %e, "Terminal render failed");
                }
            }
        };
        let (result, ()) = tokio::join!(run, render);

        if let Err(e) = self.renderer.finish() {
            warn!(error = %e, "Terminal render failed");
        }
        if let Ok(summary) = &result {
            debug!(rounds = summary.rounds, finish_reason = %summary.finish_reason, "Turn finished");
        }
        result
    }

    fn error(&mut self, text: &str) {
        let _ = self.renderer.notice(Color::Red, text);
    }
}

fn show_help() {
    println!("\n\x1b[1mCommands:\x1b[0m");
    for (cmd, desc) in COMMANDS {
        println!("  \x1b[1;36m{:<12}\x1b[0m {}", cmd, desc);
    }
    println!();
    println!("Anything else is sent to the model, which can run Python in the work dir.");
    println!();
}
