//! Model streaming boundary.
//!
//! - [`ModelClient`]: anything that can stream a chat completion as [`ChatDelta`]s
//! - [`OpenAiClient`]: OpenAI-compatible HTTP implementation
//! - [`ToolRegistry`]: the tools the model may call

use async_trait::async_trait;

mod openai;
pub mod tools;
mod types;

pub use openai::OpenAiClient;
pub use tools::{ToolKind, ToolRegistry, EXECUTE_CODE_TOOL, RAW_CODE_TOOL};
pub use types::{ChatDelta, ChatRequest, DeltaStream, FinishReason, ModelError, ToolSpec};

/// Streams one model round-trip.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Start a streaming request; the returned stream yields deltas until the
    /// round-trip's finish reason has been delivered.
    async fn stream_chat(&self, request: ChatRequest) -> Result<DeltaStream, ModelError>;
}
