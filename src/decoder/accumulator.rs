//! Per-round-trip accumulation state.

use crate::conversation::{DisplayHistory, Role};
use crate::model::{FinishReason, ToolKind};

/// A tool call that has been named but not yet executed.
#[derive(Debug, Clone)]
pub struct PendingCall {
    pub name: String,
    pub kind: ToolKind,
    /// Raw argument text as streamed.
    pub arguments: String,
    /// Visible history at the moment the call began.
    pub snapshot: DisplayHistory,
}

/// What the current round-trip is producing.
#[derive(Debug, Clone, Default)]
pub enum CallState {
    /// Content deltas are narration.
    #[default]
    Narrating,
    /// A tool call is streaming its arguments.
    Calling(PendingCall),
}

/// Accumulated state of one in-flight model round-trip.
#[derive(Debug, Clone, Default)]
pub struct StreamAccumulator {
    role: Option<String>,
    narration: String,
    call: CallState,
    finish_reason: FinishReason,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_role(&mut self, role: String) {
        self.role = Some(role);
    }

    /// Role for messages committed from this round-trip.
    pub fn role(&self) -> Role {
        self.role
            .as_deref()
            .and_then(|r| r.parse().ok())
            .unwrap_or(Role::Assistant)
    }

    /// Append narration and return the full narration so far.
    pub fn push_narration(&mut self, text: &str) -> &str {
        self.narration.push_str(text);
        &self.narration
    }

    pub fn narration(&self) -> &str {
        &self.narration
    }

    pub fn take_narration(&mut self) -> String {
        std::mem::take(&mut self.narration)
    }

    /// Start a tool call.
    ///
    /// Some servers repeat the name on later chunks of the same call. When the call in
    /// progress already has this name it is left as is: its arguments and its snapshot
    /// (taken before any progress block was drawn) are kept. A different name replaces
    /// the call.
    pub fn begin_call(&mut self, name: String, kind: ToolKind, snapshot: DisplayHistory) {
        if matches!(&self.call, CallState::Calling(call) if call.name == name) {
            return;
        }
        self.call = CallState::Calling(PendingCall {
            name,
            kind,
            arguments: String::new(),
            snapshot,
        });
    }

    /// Append argument text to the call in progress.
    ///
    /// Returns `None` when no call has been named.
    pub fn push_arguments(&mut self, fragment: &str) -> Option<&PendingCall> {
        match &mut self.call {
            CallState::Calling(call) => {
                call.arguments.push_str(fragment);
                Some(call)
            }
            CallState::Narrating => None,
        }
    }

    pub fn call(&self) -> Option<&PendingCall> {
        match &self.call {
            CallState::Calling(call) => Some(call),
            CallState::Narrating => None,
        }
    }

    pub fn take_call(&mut self) -> Option<PendingCall> {
        match std::mem::take(&mut self.call) {
            CallState::Calling(call) => Some(call),
            CallState::Narrating => None,
        }
    }

    pub fn finish_reason(&self) -> FinishReason {
        self.finish_reason
    }

    pub fn set_finish_reason(&mut self, reason: FinishReason) {
        self.finish_reason = reason;
    }

    /// Clear everything except the finish reason.
    pub fn reset(&mut self) {
        let finish_reason = self.finish_reason;
        *self = Self {
            finish_reason,
            ..Self::default()
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::DisplayEntry;

    #[test]
    fn test_narration_accumulates() {
        let mut acc = StreamAccumulator::new();
        acc.push_narration("Hel");
        assert_eq!(acc.push_narration("lo"), "Hello");
        assert_eq!(acc.take_narration(), "Hello");
        assert_eq!(acc.narration(), "");
    }

    #[test]
    fn test_arguments_without_call_are_rejected() {
        let mut acc = StreamAccumulator::new();
        assert!(acc.push_arguments("{").is_none());
    }

    #[test]
    fn test_call_keeps_snapshot_and_arguments() {
        let mut acc = StreamAccumulator::new();
        let mut snapshot = DisplayHistory::new();
        snapshot.push(DisplayEntry::user("hi"));

        acc.begin_call("execute_code".into(), ToolKind::Structured, snapshot.clone());
        acc.push_arguments("{\"co");
        let call = acc.push_arguments("de\"").unwrap();

        assert_eq!(call.arguments, "{\"code\"");
        assert_eq!(call.snapshot, snapshot);
        let taken = acc.take_call().unwrap();
        assert_eq!(taken.name, "execute_code");
        assert!(acc.call().is_none());
    }

    #[test]
    fn test_repeated_name_keeps_arguments() {
        let mut acc = StreamAccumulator::new();
        acc.begin_call("execute_code".into(), ToolKind::Structured, DisplayHistory::new());
        acc.push_arguments("{\"code\": \"pri");

        let mut later = DisplayHistory::new();
        later.push(DisplayEntry::bot("progress"));
        acc.begin_call("execute_code".into(), ToolKind::Structured, later);
        let call = acc.push_arguments("nt(1)\"}").unwrap();
        assert_eq!(call.arguments, "{\"code\": \"print(1)\"}");
        assert!(call.snapshot.is_empty());

        acc.begin_call("python".into(), ToolKind::RawCode, DisplayHistory::new());
        assert_eq!(acc.call().unwrap().arguments, "");
    }

    #[test]
    fn test_role_defaults_to_assistant() {
        let mut acc = StreamAccumulator::new();
        assert_eq!(acc.role(), Role::Assistant);
        acc.set_role("assistant".into());
        assert_eq!(acc.role(), Role::Assistant);
        acc.set_role("bogus".into());
        assert_eq!(acc.role(), Role::Assistant);
    }

    #[test]
    fn test_reset_keeps_finish_reason() {
        let mut acc = StreamAccumulator::new();
        acc.set_role("assistant".into());
        acc.push_narration("text");
        acc.begin_call("python".into(), ToolKind::RawCode, DisplayHistory::new());
        acc.set_finish_reason(FinishReason::ToolCall);

        acc.reset();

        assert_eq!(acc.finish_reason(), FinishReason::ToolCall);
        assert_eq!(acc.narration(), "");
        assert!(acc.call().is_none());
    }
}
