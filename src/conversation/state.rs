//! Canonical conversation log.
//!
//! The log always starts with the system prompt, which is never evicted. Outbound
//! requests are built from a token-budgeted slice of the log; the log itself is never
//! mutated by slicing. Uploads are tracked on a LIFO stack with single-level undo.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, warn};

use super::history::DisplayEntry;
use super::message::{Message, Role};
use crate::tokens::{EstimatingCounter, TokenCounter};

/// Notice inserted right after the system prompt when older messages were cut.
pub const ELISION_NOTICE: &str =
    "[rest of the conversation has been omitted to fit in the context window]";

/// Default number of tokens left free for the model's reply.
pub const DEFAULT_MIN_OUTPUT_TOKENS: usize = 500;

/// A file upload that can still be undone.
#[derive(Debug, Clone)]
pub struct UploadRecord {
    /// Row appended to the visible history.
    pub display: DisplayEntry,
    /// System message appended to the log; compared by identity on undo.
    pub message: Arc<Message>,
    /// Where the uploaded copy was stored.
    pub path: PathBuf,
}

/// Ordered message log plus upload bookkeeping.
#[derive(Debug, Clone)]
pub struct ConversationState {
    messages: Vec<Arc<Message>>,
    uploads: Vec<UploadRecord>,
    min_output_tokens: usize,
}

impl ConversationState {
    /// Start a conversation with the given system prompt.
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![Arc::new(Message::system(system_prompt))],
            uploads: Vec::new(),
            min_output_tokens: DEFAULT_MIN_OUTPUT_TOKENS,
        }
    }

    /// Rebuild a conversation from stored messages.
    ///
    /// If the first stored message is not a system prompt, `system_prompt` is put in
    /// front so the log is never headless.
    pub fn from_messages(system_prompt: impl Into<String>, messages: Vec<Message>) -> Self {
        let mut state = Self::new(system_prompt);
        let mut iter = messages.into_iter().peekable();
        let has_system = matches!(iter.peek(), Some(first) if first.role == Role::System);
        if has_system {
            if let Some(system) = iter.next() {
                state.messages[0] = Arc::new(system);
            }
        }
        state.messages.extend(iter.map(Arc::new));
        state
    }

    /// Set how many tokens slicing keeps free for the reply.
    pub fn with_min_output_tokens(mut self, tokens: usize) -> Self {
        self.min_output_tokens = tokens;
        self
    }

    pub fn system_message(&self) -> &Message {
        &self.messages[0]
    }

    pub fn messages(&self) -> impl Iterator<Item = &Message> + '_ {
        self.messages.iter().map(|m| m.as_ref())
    }

    /// Owned copy of the full log.
    pub fn to_vec(&self) -> Vec<Message> {
        self.messages().cloned().collect()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last().map(|m| m.as_ref())
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Always false: the system prompt is never removed.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Append a message and return the shared handle stored in the log.
    pub fn append(&mut self, message: Message) -> Arc<Message> {
        let message = Arc::new(message);
        self.messages.push(Arc::clone(&message));
        message
    }

    /// Drop everything but the system prompt.
    pub fn reset(&mut self) {
        self.messages.truncate(1);
        self.uploads.clear();
    }

    /// Slice the log for a request to `model` with a context window of `budget` tokens.
    pub fn slice_for_request(&self, model: &str, budget: usize) -> Vec<Message> {
        self.slice_with_counter(&EstimatingCounter::for_model(model), budget)
    }

    /// Keep the system prompt plus the newest messages that fit.
    ///
    /// The walk goes from newest to oldest and stops at the first message that would
    /// push the total past `budget - (notice + min_output_tokens)`; in that case an
    /// elision notice is inserted right after the system prompt.
    pub fn slice_with_counter(&self, counter: &dyn TokenCounter, budget: usize) -> Vec<Message> {
        let headroom = counter.count(ELISION_NOTICE) + self.min_output_tokens;
        let max_tokens = budget.saturating_sub(headroom);

        let system = self.system_message();
        let mut used = counter.count_message(system);
        let mut kept: Vec<Message> = Vec::new();
        let mut elided = false;

        for message in self.messages[1..].iter().rev() {
            used += counter.count_message(message);
            if used > max_tokens {
                elided = true;
                break;
            }
            kept.push(message.as_ref().clone());
        }

        let mut sliced = Vec::with_capacity(kept.len() + 2);
        sliced.push(system.clone());
        if elided {
            debug!(
                kept = kept.len(),
                total = self.messages.len(),
                budget,
                "Conversation sliced to fit context window"
            );
            sliced.push(Message::system(ELISION_NOTICE));
        }
        sliced.extend(kept.into_iter().rev());
        sliced
    }

    /// Append an upload's system message and make it undoable.
    pub fn register_upload(
        &mut self,
        display: DisplayEntry,
        message: Message,
        path: PathBuf,
    ) -> Arc<Message> {
        let message = self.append(message);
        self.uploads.push(UploadRecord {
            display,
            message: Arc::clone(&message),
            path,
        });
        message
    }

    /// Undo the most recent upload.
    ///
    /// Only succeeds when the log still ends with that exact message. A stale record is
    /// dropped and nothing else changes.
    pub fn undo_last_upload(&mut self) -> Option<UploadRecord> {
        let record = self.uploads.pop()?;
        let still_last = self.messages.len() > 1
            && self
                .messages
                .last()
                .map(|last| Arc::ptr_eq(last, &record.message))
                .unwrap_or(false);

        if !still_last {
            warn!(
                path = %record.path.display(),
                "Upload can no longer be undone; conversation moved on"
            );
            return None;
        }

        self.messages.pop();
        Some(record)
    }

    pub fn has_pending_upload(&self) -> bool {
        !self.uploads.is_empty()
    }

    /// Forget pending uploads (they stay in the log).
    pub fn clear_uploads(&mut self) {
        self.uploads.clear();
    }
}
