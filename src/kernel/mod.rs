//! Persistent interpreter sessions.
//!
//! - [`ExecutionEngine`] / [`EngineLauncher`]: the engine boundary
//! - [`ExecutionSession`]: one engine per conversation, with timeout and restart
//! - [`ProcessLauncher`]: child-process bridge speaking JSON lines

mod engine;
mod process;
mod session;

pub use engine::{
    EngineError, EngineLauncher, EngineMessage, ExecutionEngine, MimeBundle, IDLE_STATE,
};
pub use process::{ProcessEngine, ProcessLauncher, BRIDGE_SCRIPT};
pub use session::{ExecutionSession, DEFAULT_TIMEOUT_SECS};
