//! Types crossing the model streaming boundary.

use std::fmt;
use std::pin::Pin;

use futures::Stream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::conversation::Message;

/// Status of the current model round-trip.
///
/// `Idle` and `NewInput` never come from the wire: they are set locally before the
/// first request and when the user submits input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    #[default]
    Idle,
    Stop,
    ToolCall,
    Length,
    ContentFilter,
    NewInput,
}

impl FinishReason {
    /// Parse a wire `finish_reason`.
    ///
    /// Both the legacy `function_call` and the newer `tool_calls` spellings map to
    /// [`FinishReason::ToolCall`]. Unknown values are treated as `stop`.
    pub fn from_wire(reason: &str) -> Self {
        match reason {
            "function_call" | "tool_calls" | "tool_call" => FinishReason::ToolCall,
            "length" => FinishReason::Length,
            "content_filter" => FinishReason::ContentFilter,
            _ => FinishReason::Stop,
        }
    }

    /// Whether the turn loop should request another model response.
    pub fn wants_model_response(self) -> bool {
        matches!(self, FinishReason::ToolCall | FinishReason::NewInput)
    }
}

impl fmt::Display for FinishReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FinishReason::Idle => "idle",
            FinishReason::Stop => "stop",
            FinishReason::ToolCall => "tool_call",
            FinishReason::Length => "length",
            FinishReason::ContentFilter => "content_filter",
            FinishReason::NewInput => "new_input",
        };
        f.write_str(s)
    }
}

/// One incremental chunk of a streamed model response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatDelta {
    pub role: Option<String>,
    pub content: Option<String>,
    pub tool_name: Option<String>,
    pub tool_arguments: Option<String>,
    /// Only the final delta of a round-trip carries a finish reason.
    pub finish_reason: Option<FinishReason>,
}

impl ChatDelta {
    pub fn role(role: impl Into<String>) -> Self {
        Self {
            role: Some(role.into()),
            ..Default::default()
        }
    }

    pub fn content(text: impl Into<String>) -> Self {
        Self {
            content: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn tool_name(name: impl Into<String>) -> Self {
        Self {
            tool_name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn arguments(fragment: impl Into<String>) -> Self {
        Self {
            tool_arguments: Some(fragment.into()),
            ..Default::default()
        }
    }

    pub fn finished(reason: FinishReason) -> Self {
        Self {
            finish_reason: Some(reason),
            ..Default::default()
        }
    }

    /// Mark this delta as the terminal one.
    pub fn with_finish(mut self, reason: FinishReason) -> Self {
        self.finish_reason = Some(reason);
        self
    }
}

/// JSON schema description of a callable tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// One outbound streaming request.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSpec>,
}

/// Stream of deltas for one model round-trip.
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<ChatDelta, ModelError>> + Send>>;

/// Errors from the model boundary.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Stream error: {0}")]
    Stream(String),
    #[error("Could not decode stream chunk: {0}")]
    Decode(String),
    #[error("API error: {0}")]
    Api(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_wire_maps_tool_call_spellings() {
        assert_eq!(FinishReason::from_wire("function_call"), FinishReason::ToolCall);
        assert_eq!(FinishReason::from_wire("tool_calls"), FinishReason::ToolCall);
        assert_eq!(FinishReason::from_wire("stop"), FinishReason::Stop);
        assert_eq!(FinishReason::from_wire("length"), FinishReason::Length);
        assert_eq!(
            FinishReason::from_wire("content_filter"),
            FinishReason::ContentFilter
        );
        assert_eq!(FinishReason::from_wire("something_else"), FinishReason::Stop);
    }

    #[test]
    fn test_wants_model_response() {
        assert!(FinishReason::NewInput.wants_model_response());
        assert!(FinishReason::ToolCall.wants_model_response());
        assert!(!FinishReason::Stop.wants_model_response());
        assert!(!FinishReason::Idle.wants_model_response());
        assert!(!FinishReason::Length.wants_model_response());
    }

    #[test]
    fn test_delta_builders() {
        let delta = ChatDelta::arguments("}").with_finish(FinishReason::ToolCall);
        assert_eq!(delta.tool_arguments.as_deref(), Some("}"));
        assert_eq!(delta.finish_reason, Some(FinishReason::ToolCall));
        assert!(delta.content.is_none());
    }

    #[test]
    fn test_model_error_display() {
        let err = ModelError::Status {
            status: 429,
            body: "rate limited".into(),
        };
        assert_eq!(err.to_string(), "API returned status 429: rate limited");
    }
}
