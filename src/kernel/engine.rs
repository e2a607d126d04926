//! Execution engine boundary.
//!
//! An engine accepts one code string at a time and answers with an ordered stream of
//! iopub-style messages terminated by an idle status.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Execution state that ends one `execute` call.
pub const IDLE_STATE: &str = "idle";

/// Errors talking to an execution engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Engine protocol error: {0}")]
    Protocol(String),
    #[error("Engine exited unexpectedly")]
    Exited,
    #[error("Failed to launch engine: {0}")]
    Launch(String),
}

/// Mime-keyed payloads of a rich result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MimeBundle {
    #[serde(rename = "text/plain", default, skip_serializing_if = "Option::is_none")]
    pub text_plain: Option<String>,
    #[serde(rename = "text/html", default, skip_serializing_if = "Option::is_none")]
    pub text_html: Option<String>,
    /// Base64 PNG payload.
    #[serde(rename = "image/png", default, skip_serializing_if = "Option::is_none")]
    pub image_png: Option<String>,
    /// Base64 JPEG payload.
    #[serde(rename = "image/jpeg", default, skip_serializing_if = "Option::is_none")]
    pub image_jpeg: Option<String>,
}

impl MimeBundle {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text_plain: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn png(data: impl Into<String>) -> Self {
        Self {
            image_png: Some(data.into()),
            ..Default::default()
        }
    }
}

/// One message from the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "msg_type", rename_all = "snake_case")]
pub enum EngineMessage {
    Stream {
        name: String,
        text: String,
    },
    ExecuteResult {
        #[serde(default)]
        data: MimeBundle,
    },
    DisplayData {
        #[serde(default)]
        data: MimeBundle,
    },
    Error {
        #[serde(default)]
        traceback: Vec<String>,
    },
    Status {
        execution_state: String,
    },
    #[serde(other)]
    Other,
}

impl EngineMessage {
    pub fn stdout(text: impl Into<String>) -> Self {
        EngineMessage::Stream {
            name: "stdout".to_string(),
            text: text.into(),
        }
    }

    pub fn idle() -> Self {
        EngineMessage::Status {
            execution_state: IDLE_STATE.to_string(),
        }
    }

    /// Whether this message ends the current execution.
    pub fn is_idle(&self) -> bool {
        matches!(self, EngineMessage::Status { execution_state } if execution_state == IDLE_STATE)
    }
}

/// A running interpreter.
#[async_trait]
pub trait ExecutionEngine: Send {
    /// Send one code string for execution.
    async fn submit(&mut self, code: &str) -> Result<(), EngineError>;

    /// Next message of the current execution, `None` once the engine has gone away.
    async fn next_message(&mut self) -> Result<Option<EngineMessage>, EngineError>;

    /// Stop the interpreter.
    async fn shutdown(&mut self) -> Result<(), EngineError>;
}

/// Starts fresh engines.
#[async_trait]
pub trait EngineLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn ExecutionEngine>, EngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_stream_message() {
        let msg: EngineMessage =
            serde_json::from_str(r#"{"msg_type":"stream","name":"stdout","text":"2\n"}"#).unwrap();
        assert_eq!(msg, EngineMessage::stdout("2\n"));
    }

    #[test]
    fn test_parse_display_data_bundle() {
        let msg: EngineMessage = serde_json::from_str(
            r#"{"msg_type":"display_data","data":{"text/plain":"<Figure>","image/png":"iVBOR"}}"#,
        )
        .unwrap();
        match msg {
            EngineMessage::DisplayData { data } => {
                assert_eq!(data.text_plain.as_deref(), Some("<Figure>"));
                assert_eq!(data.image_png.as_deref(), Some("iVBOR"));
                assert!(data.text_html.is_none());
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_parse_unknown_message_type() {
        let msg: EngineMessage =
            serde_json::from_str(r#"{"msg_type":"execute_input","code":"x"}"#).unwrap();
        assert_eq!(msg, EngineMessage::Other);
        assert!(!msg.is_idle());
    }

    #[test]
    fn test_idle_detection() {
        assert!(EngineMessage::idle().is_idle());
        let busy = EngineMessage::Status {
            execution_state: "busy".into(),
        };
        assert!(!busy.is_idle());
    }

    #[test]
    fn test_error_roundtrip_keeps_traceback_order() {
        let msg = EngineMessage::Error {
            traceback: vec!["a".into(), "b".into()],
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""msg_type":"error""#));
        let back: EngineMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
    }
}
