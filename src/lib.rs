//! codepot library
//!
//! A conversational code interpreter: a language model narrates and calls an
//! `execute_code` tool, the code runs in a persistent interpreter session, and the
//! results are folded back into the conversation so the model can iterate.
//!
//! ## Main Components
//!
//! - [`decoder`] - Streaming response decoder (incremental code extraction, tool calls)
//! - [`turn`] - Turn loop chaining model round-trips through tool executions
//! - [`kernel`] - Interpreter engine boundary and the per-conversation execution session
//! - [`output`] - Result classification for the model and rendering for the user
//! - [`conversation`] - Message log, token-budgeted slicing, visible history, uploads
//! - [`session`] - Per-conversation context and saved conversations
//! - [`model`] - Streaming model client boundary (OpenAI-compatible)
//! - [`config`] - Configuration and XDG directories
//! - [`cli`] - Command-line interface (REPL, live rendering, runner)
//!
//! ## Quick Start
//!
//! ```ignore
//! use codepot::{ChatSession, Config, OpenAiClient, TurnLoop};
//!
//! let config = Config::default();
//! let client = OpenAiClient::new(config.api_base.clone(), config.api_key()?);
//! let mut session = ChatSession::from_config(config, cache_dir)?;
//! session.send("plot a sine wave", &client, &TurnLoop::default()).await?;
//! ```

pub mod cli;
pub mod config;
pub mod conversation;
pub mod decoder;
pub mod kernel;
pub mod model;
pub mod output;
pub mod session;
pub mod tokens;
pub mod turn;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use config::{Config, ConfigError, XdgDirs};
pub use conversation::{ConversationState, DisplayEntry, DisplayHistory, Message, Role};
pub use decoder::{extract_code, StreamDecoder, TurnContext, TurnError};
pub use kernel::{EngineError, ExecutionSession, ProcessLauncher};
pub use model::{ChatDelta, FinishReason, ModelClient, OpenAiClient};
pub use output::{ExecutionOutput, OutputRenderer, ResultFragment};
pub use session::{ChatSession, ConversationStore, SessionError};
pub use tokens::{estimate_tokens, format_tokens_with_separator, usage_percent};
pub use turn::{TurnLoop, TurnSummary, TurnTarget};
