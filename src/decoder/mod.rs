//! Streaming response decoder.
//!
//! [`StreamDecoder`] consumes the deltas of one model round-trip. Narration is mirrored
//! into the visible history as it arrives; tool-call arguments are scanned for the code
//! value while they stream so progress can be shown live; the terminal delta either
//! commits the narration or resolves the code, runs it, and folds the result back into
//! the conversation.

mod accumulator;
pub mod extract;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::conversation::{ConversationState, DisplayEntry, DisplayHistory, Message, Role};
use crate::kernel::{EngineError, ExecutionSession};
use crate::model::{ChatDelta, FinishReason, ModelError, ToolKind, ToolRegistry};
use crate::output::{code_done, code_in_progress, OutputRenderer};

pub use accumulator::{CallState, PendingCall, StreamAccumulator};
pub use extract::extract_code;

/// Errors that end a turn. Each is shown to the user as a diagnostic entry.
#[derive(Debug, Error)]
pub enum TurnError {
    #[error("The model tried to call a tool that does not exist: {0}")]
    UnknownTool(String),
    #[error("The model produced tool arguments that could not be parsed: {0}")]
    MalformedArguments(String),
    #[error("Backend error: {0}")]
    Backend(#[from] EngineError),
    #[error("Model error: {0}")]
    Model(#[from] ModelError),
    #[error("The model stream ended before the response was complete")]
    StreamEnded,
    #[error("Stopped after {0} model responses without a final answer")]
    TooManyRounds(usize),
}

/// Everything a decoder mutates while a turn runs.
pub struct TurnContext<'a> {
    pub history: &'a mut DisplayHistory,
    pub conversation: &'a mut ConversationState,
    pub execution: &'a mut ExecutionSession,
    pub renderer: &'a OutputRenderer,
}

/// Decodes model deltas for one conversation.
#[derive(Debug, Clone, Default)]
pub struct StreamDecoder {
    acc: StreamAccumulator,
    tools: ToolRegistry,
}

impl StreamDecoder {
    pub fn new(tools: ToolRegistry) -> Self {
        Self {
            acc: StreamAccumulator::new(),
            tools,
        }
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn accumulator(&self) -> &StreamAccumulator {
        &self.acc
    }

    pub fn finish_reason(&self) -> FinishReason {
        self.acc.finish_reason()
    }

    pub fn set_finish_reason(&mut self, reason: FinishReason) {
        self.acc.set_finish_reason(reason);
    }

    /// Drop all in-flight state, including the finish reason.
    pub fn reset(&mut self) {
        self.acc = StreamAccumulator::new();
    }

    /// Consume one delta.
    ///
    /// A delta carrying a finish reason is finalized before returning. On error a
    /// diagnostic has already been appended to the visible history.
    pub async fn feed(
        &mut self,
        delta: ChatDelta,
        ctx: &mut TurnContext<'_>,
    ) -> Result<(), TurnError> {
        if let Some(role) = delta.role {
            self.acc.set_role(role);
        }

        if let Some(text) = delta.content {
            let narration = self.acc.push_narration(&text);
            ctx.history.set_last_bot_text(narration);
        }

        if let Some(name) = delta.tool_name {
            match self.tools.kind_of(&name) {
                Some(kind) => {
                    debug!(tool_name = %name, "Tool call started");
                    self.acc.begin_call(name, kind, ctx.history.clone());
                }
                None => return Err(self.abort(TurnError::UnknownTool(name), ctx)),
            }
        }

        if let Some(fragment) = delta.tool_arguments {
            self.show_progress(&fragment, ctx.history);
        }

        if let Some(reason) = delta.finish_reason {
            self.finalize(reason, ctx).await?;
        }

        Ok(())
    }

    /// Refresh the live code block from the arguments streamed so far.
    fn show_progress(&mut self, fragment: &str, history: &mut DisplayHistory) {
        let Some(call) = self.acc.push_arguments(fragment) else {
            debug!("Ignoring tool arguments without a tool name");
            return;
        };

        let code = match call.kind {
            ToolKind::RawCode => Some(call.arguments.clone()),
            ToolKind::Structured => extract_code(&call.arguments, false),
        };
        if let Some(code) = code {
            *history = call.snapshot.clone();
            history.append_to_last_bot_text(&code_in_progress(&code));
        }
    }

    /// Handle the terminal delta of a round-trip.
    pub async fn finalize(
        &mut self,
        reason: FinishReason,
        ctx: &mut TurnContext<'_>,
    ) -> Result<(), TurnError> {
        self.acc.set_finish_reason(reason);
        let role = self.acc.role();

        let narration = self.acc.take_narration();
        if !narration.is_empty() {
            ctx.conversation.append(Message::new(role, narration));
        }

        if reason != FinishReason::ToolCall {
            debug!(finish_reason = %reason, "Model response complete");
            self.acc.reset();
            return Ok(());
        }

        let Some(call) = self.acc.take_call() else {
            return Err(self.abort(TurnError::MalformedArguments(String::new()), ctx));
        };

        let code = match call.kind {
            ToolKind::RawCode => Some(call.arguments.clone()),
            ToolKind::Structured => extract_code(&call.arguments, true),
        };
        let Some(code) = code else {
            return Err(self.abort(TurnError::MalformedArguments(call.arguments), ctx));
        };

        *ctx.history = call.snapshot;
        ctx.history.append_to_last_bot_text(&code_done(&code));

        info!(tool_name = %call.name, code_len = code.len(), "Executing tool call");
        let output = match ctx.execution.execute(&code).await {
            Ok(output) => output,
            Err(e) => return Err(self.abort(TurnError::Backend(e), ctx)),
        };
        debug!(
            fragments = output.fragments.len(),
            failed = output.failed(),
            "Tool call finished"
        );

        ctx.conversation
            .append(Message::new(role, call.arguments).with_name(call.name.as_str()));
        ctx.conversation
            .append(Message::new(Role::Function, output.model_text()).with_name(call.name));
        ctx.renderer.render(&output, ctx.history);

        self.acc.reset();
        Ok(())
    }

    /// Record a fatal error in the visible history and clear in-flight state.
    pub fn abort(&mut self, err: TurnError, ctx: &mut TurnContext<'_>) -> TurnError {
        warn!(error = %err, "Turn aborted");
        ctx.history.push(DisplayEntry::bot(err.to_string()));
        self.reset();
        err
    }
}
