//! Conversation sessions.
//!
//! A [`ChatSession`] is the explicit context for one conversation: it owns the visible
//! history, the canonical message log, the interpreter session, the output renderer and
//! the stream decoder, and threads them through every operation. Each session gets a
//! random id that namespaces its interpreter work directory and rendered images under
//! the cache root; restarting takes a fresh id.
//!
//! Saved conversations live in [`store`].

pub mod store;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{Config, ConfigError};
use crate::conversation::{
    ConversationState, DisplayEntry, DisplayHistory, Message, Role, UploadRecord,
};
use crate::decoder::{extract_code, StreamDecoder, TurnContext, TurnError};
use crate::kernel::{EngineError, EngineLauncher, ExecutionSession};
use crate::model::{FinishReason, ModelClient, ToolKind, ToolRegistry};
use crate::output::{code_done, OutputRenderer};
use crate::tokens::{estimate_tokens, usage_percent, EstimatingCounter};
use crate::turn::{TurnLoop, TurnSummary, TurnTarget};

pub use store::{
    format_relative_time, ConversationStore, SavedConversation, SavedMeta, StoreError,
};

/// Prefix of the system message recorded for an upload.
pub const UPLOAD_NOTICE: &str = "User uploaded a file: ";

const WORK_DIR: &str = "work_dir";
const IMAGES_DIR: &str = "images";

/// Display label of an uploaded file.
pub fn upload_label(file_name: &str) -> String {
    format!("📁[{}]", file_name)
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Interpreter error: {0}")]
    Engine(#[from] EngineError),
    #[error("Upload failed: {0}")]
    Upload(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Turn(#[from] TurnError),
}

/// Estimated context usage of the conversation against the active model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextUsage {
    pub tokens: usize,
    pub context_window: usize,
}

impl ContextUsage {
    pub fn percent(&self) -> f64 {
        usage_percent(self.tokens, self.context_window)
    }
}

/// Everything one conversation needs.
pub struct ChatSession {
    id: Uuid,
    cache_root: PathBuf,
    config: Config,
    model_choice: String,
    history: DisplayHistory,
    conversation: ConversationState,
    execution: ExecutionSession,
    renderer: OutputRenderer,
    decoder: StreamDecoder,
}

impl ChatSession {
    /// Create a session using the default model choice.
    ///
    /// The interpreter is launched lazily; call [`start`](Self::start) to launch it now.
    pub fn new(
        config: Config,
        launcher: Arc<dyn EngineLauncher>,
        cache_root: impl Into<PathBuf>,
    ) -> Result<Self, SessionError> {
        let model_choice = config.default_model.clone();
        config.model(&model_choice)?;

        let cache_root = cache_root.into();
        let id = Uuid::new_v4();
        let namespace = namespace(&cache_root, id);

        let execution = ExecutionSession::new(launcher, namespace.join(WORK_DIR))
            .with_timeout(config.kernel.timeout());
        let conversation = ConversationState::new(config.system_prompt())
            .with_min_output_tokens(config.min_output_tokens);

        debug!(session_id = %id, model = %model_choice, "Session created");

        Ok(Self {
            id,
            cache_root,
            model_choice,
            history: DisplayHistory::new(),
            conversation,
            execution,
            renderer: OutputRenderer::new(namespace.join(IMAGES_DIR)),
            decoder: StreamDecoder::new(ToolRegistry::new()),
            config,
        })
    }

    /// Create a session backed by the configured interpreter bridge.
    pub fn from_config(config: Config, cache_root: impl Into<PathBuf>) -> Result<Self, SessionError> {
        let launcher = Arc::new(config.kernel.launcher());
        Self::new(config, launcher, cache_root)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn history(&self) -> &DisplayHistory {
        &self.history
    }

    pub fn conversation(&self) -> &ConversationState {
        &self.conversation
    }

    pub fn work_dir(&self) -> &Path {
        self.execution.work_dir()
    }

    pub fn image_dir(&self) -> &Path {
        self.renderer.image_dir()
    }

    pub fn model_choice(&self) -> &str {
        &self.model_choice
    }

    pub fn finish_reason(&self) -> FinishReason {
        self.decoder.finish_reason()
    }

    /// Launch the interpreter now instead of on first use.
    pub async fn start(&mut self) -> Result<(), SessionError> {
        self.execution.start().await?;
        Ok(())
    }

    /// Record a user message and arm the turn loop.
    ///
    /// Pending uploads stop being undoable once text follows them.
    pub fn add_user_input(&mut self, text: &str) {
        self.conversation.clear_uploads();
        self.history.push(DisplayEntry::user(text));
        self.conversation.append(Message::user(text));
        self.decoder.set_finish_reason(FinishReason::NewInput);
    }

    /// Copy a file into the work dir and tell the model about it.
    ///
    /// Returns the stored path.
    pub fn upload_file(&mut self, source: &Path) -> Result<PathBuf, SessionError> {
        if !source.is_file() {
            return Err(SessionError::Upload(format!(
                "{} is not a file",
                source.display()
            )));
        }
        let file_name = source
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| SessionError::Upload(format!("{} has no file name", source.display())))?;

        let work_dir = self.execution.work_dir().to_path_buf();
        fs::create_dir_all(&work_dir)?;
        let dest = work_dir.join(&file_name);
        fs::copy(source, &dest)?;

        let display = DisplayEntry::user(upload_label(&file_name));
        self.history.push(display.clone());
        self.conversation.register_upload(
            display,
            Message::system(format!("{}{}", UPLOAD_NOTICE, file_name)),
            dest.clone(),
        );

        info!(file = %file_name, dest = %dest.display(), "File uploaded");
        Ok(dest)
    }

    /// Undo the most recent upload; `None` when there is nothing to undo.
    pub fn undo_upload(&mut self) -> Option<UploadRecord> {
        let record = self.conversation.undo_last_upload()?;

        if self.history.last() == Some(&record.display) {
            self.history.pop();
        }
        match fs::remove_file(&record.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %record.path.display(), error = %e, "Could not remove upload"),
        }

        info!(path = %record.path.display(), "Upload undone");
        Some(record)
    }

    /// Switch to another configured model choice.
    pub fn select_model(&mut self, choice: &str) -> Result<(), SessionError> {
        self.config.model(choice)?;
        info!(from = %self.model_choice, to = %choice, "Model switched");
        self.model_choice = choice.to_string();
        Ok(())
    }

    /// API model name and slicing budget of the active choice.
    pub fn target(&self) -> Result<TurnTarget, ConfigError> {
        let model = self.config.model(&self.model_choice)?;
        Ok(TurnTarget {
            model: model.model_name.clone(),
            context_window: self.config.context_window(&self.model_choice)?,
        })
    }

    /// Start over: empty history, bare conversation, fresh namespace and interpreter.
    pub async fn restart(&mut self) -> Result<(), SessionError> {
        self.history.clear();
        self.conversation.reset();
        self.decoder.reset();

        self.id = Uuid::new_v4();
        let namespace = namespace(&self.cache_root, self.id);
        self.renderer = OutputRenderer::new(namespace.join(IMAGES_DIR));

        info!(session_id = %self.id, "Session restarted");
        self.execution.restart(Some(namespace.join(WORK_DIR))).await?;
        Ok(())
    }

    /// File names in the work dir, sorted.
    pub fn work_dir_files(&self) -> Result<Vec<String>, SessionError> {
        let dir = self.execution.work_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                files.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        files.sort();
        Ok(files)
    }

    pub fn context_usage(&self) -> Result<ContextUsage, SessionError> {
        let target = self.target()?;
        let counter = EstimatingCounter::for_model(&target.model);
        Ok(ContextUsage {
            tokens: estimate_tokens(&counter, &self.conversation.to_vec()),
            context_window: target.context_window,
        })
    }

    /// Replace the conversation with stored messages and rebuild the visible history.
    pub fn replace_conversation(&mut self, messages: Vec<Message>) {
        self.conversation = ConversationState::from_messages(self.config.system_prompt(), messages)
            .with_min_output_tokens(self.config.min_output_tokens);
        self.history = history_from_messages(self.conversation.messages(), self.decoder.tools());
        self.decoder.reset();
        debug!(messages = self.conversation.len(), "Conversation replaced");
    }

    /// Run model round-trips for the pending input.
    pub async fn run_turn(
        &mut self,
        model: &dyn ModelClient,
        turn: &TurnLoop,
    ) -> Result<TurnSummary, SessionError> {
        let target = self.target()?;
        let mut ctx = TurnContext {
            history: &mut self.history,
            conversation: &mut self.conversation,
            execution: &mut self.execution,
            renderer: &self.renderer,
        };
        Ok(turn.run(model, &target, &mut self.decoder, &mut ctx).await?)
    }

    /// Add user input and run the turn it starts.
    pub async fn send(
        &mut self,
        text: &str,
        model: &dyn ModelClient,
        turn: &TurnLoop,
    ) -> Result<TurnSummary, SessionError> {
        self.add_user_input(text);
        self.run_turn(model, turn).await
    }

    pub async fn shutdown(&mut self) {
        self.execution.shutdown().await;
    }
}

fn namespace(cache_root: &Path, id: Uuid) -> PathBuf {
    cache_root.join("sessions").join(id.to_string())
}

/// Text-only history for a stored log: user input, uploads, narration and the code
/// the model ran.
fn history_from_messages<'a>(
    messages: impl Iterator<Item = &'a Message>,
    tools: &ToolRegistry,
) -> DisplayHistory {
    let mut history = DisplayHistory::new();
    // A tool result ends a round; the next narration starts its own row.
    let mut new_round = false;

    for message in messages {
        match message.role {
            Role::User => {
                history.push(DisplayEntry::user(message.content.as_str()));
                new_round = false;
            }
            Role::System => {
                if let Some(name) = message.content.strip_prefix(UPLOAD_NOTICE) {
                    history.push(DisplayEntry::user(upload_label(name)));
                    new_round = false;
                }
            }
            Role::Assistant => {
                let text = match message.name.as_deref().and_then(|n| tools.kind_of(n)) {
                    Some(ToolKind::Structured) => extract_code(&message.content, true)
                        .map(|code| code_done(&code)),
                    Some(ToolKind::RawCode) => Some(code_done(&message.content)),
                    None if message.name.is_none() && !message.content.is_empty() => {
                        Some(message.content.clone())
                    }
                    None => None,
                };
                match text {
                    Some(text) if new_round => {
                        history.push(DisplayEntry::bot(text));
                        new_round = false;
                    }
                    Some(text) => history.append_to_last_bot_text(&text),
                    None => {}
                }
            }
            Role::Function | Role::Tool => new_round = true,
        }
    }

    history
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::DisplayContent;
    use crate::kernel::EngineMessage;
    use crate::testing::{text_round, tool_call_round, ScriptedLauncher, ScriptedModel};
    use tempfile::TempDir;

    struct Fixture {
        tmp: TempDir,
        launcher: ScriptedLauncher,
        session: ChatSession,
    }

    fn fixture_with(launcher: ScriptedLauncher, config: Config) -> Fixture {
        let tmp = TempDir::new().unwrap();
        let session =
            ChatSession::new(config, Arc::new(launcher.clone()), tmp.path().join("cache")).unwrap();
        Fixture {
            tmp,
            launcher,
            session,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(ScriptedLauncher::new(), Config::default())
    }

    fn write_file(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, body).unwrap();
        path
    }

    // =========================================================================
    // Construction Tests
    // =========================================================================

    #[test]
    fn test_new_session_namespace() {
        let fx = fixture();
        let id = fx.session.id().to_string();

        assert!(fx.session.work_dir().ends_with(Path::new(&id).join("work_dir")));
        assert!(fx.session.image_dir().ends_with(Path::new(&id).join("images")));
        assert_eq!(fx.session.model_choice(), "GPT-3.5");
        assert_eq!(fx.session.conversation().len(), 1);
        assert!(fx.session.history().is_empty());
        assert_eq!(fx.session.finish_reason(), FinishReason::Idle);
    }

    #[test]
    fn test_unavailable_default_model_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.models.get_mut("GPT-3.5").unwrap().available = false;

        let result = ChatSession::new(config, Arc::new(ScriptedLauncher::new()), tmp.path());
        assert!(matches!(
            result,
            Err(SessionError::Config(ConfigError::Unavailable(_)))
        ));
    }

    // =========================================================================
    // Input and Upload Tests
    // =========================================================================

    #[test]
    fn test_add_user_input() {
        let mut fx = fixture();
        fx.session.add_user_input("plot a sine wave");

        assert_eq!(
            fx.session.history().last(),
            Some(&DisplayEntry::user("plot a sine wave"))
        );
        assert_eq!(
            fx.session.conversation().last(),
            Some(&Message::user("plot a sine wave"))
        );
        assert_eq!(fx.session.finish_reason(), FinishReason::NewInput);
    }

    #[test]
    fn test_upload_copies_file_and_records_messages() {
        let mut fx = fixture();
        let source = write_file(fx.tmp.path(), "data.csv", "a,b\n1,2\n");

        let dest = fx.session.upload_file(&source).unwrap();

        assert_eq!(dest, fx.session.work_dir().join("data.csv"));
        assert_eq!(fs::read_to_string(&dest).unwrap(), "a,b\n1,2\n");
        assert_eq!(
            fx.session.history().last(),
            Some(&DisplayEntry::user("📁[data.csv]"))
        );
        assert_eq!(
            fx.session.conversation().last(),
            Some(&Message::system("User uploaded a file: data.csv"))
        );
        assert_eq!(fx.session.work_dir_files().unwrap(), vec!["data.csv"]);
    }

    #[test]
    fn test_undo_restores_previous_state() {
        let mut fx = fixture();
        fx.session.add_user_input("hello");
        let history_before = fx.session.history().clone();
        let log_before = fx.session.conversation().to_vec();
        let source = write_file(fx.tmp.path(), "notes.txt", "x");

        let dest = fx.session.upload_file(&source).unwrap();
        let record = fx.session.undo_upload().unwrap();

        assert_eq!(record.path, dest);
        assert!(!dest.exists());
        assert_eq!(fx.session.history(), &history_before);
        assert_eq!(fx.session.conversation().to_vec(), log_before);
        assert!(fx.session.undo_upload().is_none());
    }

    #[test]
    fn test_undo_is_lifo() {
        let mut fx = fixture();
        let first = write_file(fx.tmp.path(), "a.txt", "a");
        let second = write_file(fx.tmp.path(), "b.txt", "b");
        fx.session.upload_file(&first).unwrap();
        fx.session.upload_file(&second).unwrap();

        let record = fx.session.undo_upload().unwrap();

        assert!(record.path.ends_with("b.txt"));
        assert_eq!(fx.session.work_dir_files().unwrap(), vec!["a.txt"]);
    }

    #[test]
    fn test_text_input_makes_uploads_permanent() {
        let mut fx = fixture();
        let source = write_file(fx.tmp.path(), "data.csv", "1");
        fx.session.upload_file(&source).unwrap();
        fx.session.add_user_input("analyze it");
        let len = fx.session.conversation().len();

        assert!(fx.session.undo_upload().is_none());
        assert_eq!(fx.session.conversation().len(), len);
        assert_eq!(fx.session.work_dir_files().unwrap(), vec!["data.csv"]);
    }

    #[test]
    fn test_upload_of_missing_file_fails() {
        let mut fx = fixture();
        let missing = fx.tmp.path().join("absent.csv");

        assert!(matches!(
            fx.session.upload_file(&missing),
            Err(SessionError::Upload(_))
        ));
        assert!(fx.session.history().is_empty());
    }

    #[test]
    fn test_work_dir_files_empty_before_start() {
        let fx = fixture();
        assert!(fx.session.work_dir_files().unwrap().is_empty());
    }

    // =========================================================================
    // Model Tests
    // =========================================================================

    #[test]
    fn test_select_model() {
        let mut fx = fixture();

        fx.session.select_model("GPT-4").unwrap();
        assert_eq!(
            fx.session.target().unwrap(),
            TurnTarget {
                model: "gpt-4".into(),
                context_window: 8192
            }
        );

        assert!(fx.session.select_model("Nope").is_err());
        assert_eq!(fx.session.model_choice(), "GPT-4");
    }

    #[test]
    fn test_context_usage() {
        let mut fx = fixture();
        fx.session.add_user_input(&"word ".repeat(100));

        let usage = fx.session.context_usage().unwrap();
        assert!(usage.tokens > 100);
        assert_eq!(usage.context_window, 16385);
        assert!(usage.percent() > 0.0);
    }

    // =========================================================================
    // Turn and Restart Tests
    // =========================================================================

    #[tokio::test]
    async fn test_send_runs_full_turn() {
        let launcher =
            ScriptedLauncher::new().respond("print(1+1)", vec![EngineMessage::stdout("2\n")]);
        let mut fx = fixture_with(launcher, Config::default());
        let model = ScriptedModel::new()
            .round(tool_call_round("print(1+1)"))
            .round(text_round("It prints 2."));

        let summary = fx
            .session
            .send("what does print(1+1) show?", &model, &TurnLoop::new(5))
            .await
            .unwrap();

        assert_eq!(summary.rounds, 2);
        assert_eq!(fx.session.finish_reason(), FinishReason::Stop);
        assert_eq!(model.requests()[0].model, "gpt-3.5-turbo");
        assert!(fx
            .launcher
            .submissions()
            .iter()
            .any(|code| code.contains("os.chdir")));
    }

    #[tokio::test]
    async fn test_turn_error_surfaces_as_session_error() {
        let mut fx = fixture();
        let model = ScriptedModel::new().round(vec![crate::model::ChatDelta::tool_name("rm_rf")]);

        let err = fx
            .session
            .send("go", &model, &TurnLoop::new(5))
            .await
            .unwrap_err();

        assert!(matches!(err, SessionError::Turn(TurnError::UnknownTool(_))));
    }

    #[tokio::test]
    async fn test_missing_context_window_fails_before_request() {
        let mut config = Config::default();
        config.models.get_mut("GPT-3.5").unwrap().context_window = None;
        let mut fx = fixture_with(ScriptedLauncher::new(), config);
        let model = ScriptedModel::new().round(text_round("unused"));

        let err = fx.session.send("hi", &model, &TurnLoop::new(5)).await.unwrap_err();

        assert!(matches!(
            err,
            SessionError::Config(ConfigError::MissingContextWindow(_))
        ));
        assert!(model.requests().is_empty());
    }

    #[tokio::test]
    async fn test_restart_takes_fresh_namespace() {
        let mut fx = fixture();
        fx.session.start().await.unwrap();
        fx.session.add_user_input("x = 1");
        let old_id = fx.session.id();
        let old_work_dir = fx.session.work_dir().to_path_buf();

        fx.session.restart().await.unwrap();

        assert_ne!(fx.session.id(), old_id);
        assert_ne!(fx.session.work_dir(), old_work_dir.as_path());
        assert!(fx.session.history().is_empty());
        assert_eq!(fx.session.conversation().len(), 1);
        assert_eq!(fx.session.finish_reason(), FinishReason::Idle);
        assert_eq!(fx.launcher.launch_count(), 2);
    }

    // =========================================================================
    // Loading Tests
    // =========================================================================

    #[test]
    fn test_replace_conversation_rebuilds_history() {
        let mut fx = fixture();
        fx.session.replace_conversation(vec![
            Message::system("stored prompt"),
            Message::user("sum 1..10"),
            Message::system("User uploaded a file: nums.txt"),
            Message::assistant("Summing."),
            Message::assistant("{\"code\": \"sum(range(11))\"}").with_name("execute_code"),
            Message::new(Role::Function, "55").with_name("execute_code"),
            Message::assistant("The sum is 55."),
        ]);

        assert_eq!(fx.session.conversation().len(), 7);
        assert_eq!(fx.session.conversation().system_message().content, "stored prompt");

        let entries = fx.session.history().entries();
        assert_eq!(entries[0].user.as_deref(), Some("sum 1..10"));
        assert_eq!(entries[1].user.as_deref(), Some("📁[nums.txt]"));
        assert_eq!(
            entries[1].bot,
            Some(DisplayContent::Markdown(format!(
                "Summing.{}",
                code_done("sum(range(11))")
            )))
        );
        assert_eq!(
            entries.last().and_then(|e| e.bot.as_ref()),
            Some(&DisplayContent::Markdown("The sum is 55.".into()))
        );
    }
}
