//! CLI components.

pub mod completion;
pub mod render;
pub mod repl;
pub mod runner;

pub use completion::{create_reedline, PotCompleter, PotPrompt, COMMANDS};
pub use render::HistoryRenderer;
pub use repl::{Command, Repl};
pub use runner::{run_interactive, run_single_prompt, RunOptions};
