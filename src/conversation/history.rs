//! Visible chat history.
//!
//! The history is what a front end renders: pairs of an optional user entry and an
//! optional bot entry. It is kept separately from the canonical [`Message`] log because
//! it carries display-only material (live code blocks, terminal output, images).
//!
//! [`Message`]: super::Message

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Bot-side content of one history row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum DisplayContent {
    Markdown(String),
    Image(PathBuf),
}

impl DisplayContent {
    pub fn as_markdown(&self) -> Option<&str> {
        match self {
            DisplayContent::Markdown(text) => Some(text),
            DisplayContent::Image(_) => None,
        }
    }
}

/// One row of the visible history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayEntry {
    pub user: Option<String>,
    pub bot: Option<DisplayContent>,
}

impl DisplayEntry {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            user: Some(text.into()),
            bot: None,
        }
    }

    pub fn bot(text: impl Into<String>) -> Self {
        Self {
            user: None,
            bot: Some(DisplayContent::Markdown(text.into())),
        }
    }

    pub fn image(path: impl Into<PathBuf>) -> Self {
        Self {
            user: None,
            bot: Some(DisplayContent::Image(path.into())),
        }
    }
}

/// Ordered list of display rows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayHistory {
    entries: Vec<DisplayEntry>,
}

impl DisplayHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[DisplayEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&DisplayEntry> {
        self.entries.last()
    }

    pub fn push(&mut self, entry: DisplayEntry) {
        self.entries.push(entry);
    }

    pub fn pop(&mut self) -> Option<DisplayEntry> {
        self.entries.pop()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Replace the bot text of the last row (streaming narration).
    pub fn set_last_bot_text(&mut self, text: impl Into<String>) {
        let text = text.into();
        match self.entries.last_mut() {
            Some(entry) => entry.bot = Some(DisplayContent::Markdown(text)),
            None => self.entries.push(DisplayEntry::bot(text)),
        }
    }

    /// Append to the bot text of the last row.
    ///
    /// An image row or an empty history gets a fresh text row instead.
    pub fn append_to_last_bot_text(&mut self, suffix: &str) {
        let accepts_text = matches!(
            self.entries.last(),
            Some(DisplayEntry {
                bot: None | Some(DisplayContent::Markdown(_)),
                ..
            })
        );
        if !accepts_text {
            self.entries.push(DisplayEntry::bot(suffix));
            return;
        }
        if let Some(entry) = self.entries.last_mut() {
            match &mut entry.bot {
                Some(DisplayContent::Markdown(text)) => text.push_str(suffix),
                bot => *bot = Some(DisplayContent::Markdown(suffix.to_string())),
            }
        }
    }

    /// Make sure the last row can receive a fresh bot reply.
    ///
    /// A row that already belongs to the bot gets a new row after it; a user row has its
    /// bot half reset to empty text.
    pub fn begin_bot_reply(&mut self) {
        match self.entries.last_mut() {
            Some(entry) if entry.user.is_some() => {
                entry.bot = Some(DisplayContent::Markdown(String::new()));
            }
            _ => self.entries.push(DisplayEntry::bot("")),
        }
    }
}
