//! Saved conversations.
//!
//! Conversations are stored as `{name}.json` under the sessions directory, each holding
//! the message log and its metadata. Only the canonical log is stored; the visible
//! history is rebuilt from it on load.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::conversation::Message;
use crate::tokens::{estimate_tokens, EstimatingCounter};

/// Saved conversations kept by default.
const DEFAULT_MAX_SAVED: usize = 50;

/// Error type for store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Conversation not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid conversation name: {0}")]
    InvalidName(String),
}

/// Metadata of a saved conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedMeta {
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub message_count: usize,
    pub token_estimate: usize,
    /// Model choice active when saved.
    pub model: String,
}

impl SavedMeta {
    pub fn new(name: &str, model: &str) -> Self {
        let now = Utc::now();
        Self {
            name: name.to_string(),
            created_at: now,
            updated_at: now,
            message_count: 0,
            token_estimate: 0,
            model: model.to_string(),
        }
    }

    fn update(&mut self, messages: &[Message]) {
        self.updated_at = Utc::now();
        self.message_count = messages.len();
        self.token_estimate = estimate_tokens(&EstimatingCounter::default(), messages);
    }
}

/// One saved conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedConversation {
    pub meta: SavedMeta,
    pub messages: Vec<Message>,
}

/// Saves and loads conversations.
#[derive(Debug, Clone)]
pub struct ConversationStore {
    dir: PathBuf,
    /// 0 = unlimited.
    max_saved: usize,
}

impl ConversationStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            max_saved: DEFAULT_MAX_SAVED,
        }
    }

    /// Set maximum number of conversations to keep.
    pub fn with_max_saved(mut self, max: usize) -> Self {
        self.max_saved = max;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", name))
    }

    fn validate_name(name: &str) -> Result<(), StoreError> {
        if name.is_empty() {
            return Err(StoreError::InvalidName("Name cannot be empty".to_string()));
        }
        if !name
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
        {
            return Err(StoreError::InvalidName(
                "Name can only contain letters, numbers, dashes, and underscores".to_string(),
            ));
        }
        Ok(())
    }

    /// Save (or overwrite) a conversation, keeping its original creation time.
    pub fn save(
        &self,
        name: &str,
        messages: &[Message],
        model: &str,
    ) -> Result<SavedMeta, StoreError> {
        Self::validate_name(name)?;
        fs::create_dir_all(&self.dir)?;

        let path = self.path_for(name);
        let mut saved = match fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str::<SavedConversation>(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => SavedConversation {
                meta: SavedMeta::new(name, model),
                messages: Vec::new(),
            },
            Err(e) => return Err(e.into()),
        };

        saved.messages = messages.to_vec();
        saved.meta.update(&saved.messages);
        saved.meta.model = model.to_string();

        fs::write(&path, serde_json::to_string_pretty(&saved)?)?;
        debug!(name, messages = saved.meta.message_count, "Saved conversation");

        self.cleanup()?;
        Ok(saved.meta)
    }

    pub fn load(&self, name: &str) -> Result<SavedConversation, StoreError> {
        Self::validate_name(name)?;
        let path = self.path_for(name);
        if !path.exists() {
            return Err(StoreError::NotFound(name.to_string()));
        }
        let content = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// All saved conversations, most recently updated first.
    ///
    /// Unreadable files are skipped.
    pub fn list(&self) -> Result<Vec<SavedMeta>, StoreError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut saved = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().map(|e| e != "json").unwrap_or(true) {
                continue;
            }
            let Ok(content) = fs::read_to_string(&path) else {
                continue;
            };
            if let Ok(conversation) = serde_json::from_str::<SavedConversation>(&content) {
                saved.push(conversation.meta);
            }
        }

        saved.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(saved)
    }

    pub fn delete(&self, name: &str) -> Result<(), StoreError> {
        Self::validate_name(name)?;
        let path = self.path_for(name);
        if !path.exists() {
            return Err(StoreError::NotFound(name.to_string()));
        }
        fs::remove_file(path)?;
        Ok(())
    }

    pub fn exists(&self, name: &str) -> bool {
        Self::validate_name(name).is_ok() && self.path_for(name).exists()
    }

    /// A timestamped name that is not taken yet.
    pub fn generate_name(&self, prefix: &str) -> String {
        let base = format!("{}-{}", prefix, Utc::now().format("%Y%m%d-%H%M%S"));
        if !self.exists(&base) {
            return base;
        }
        (1..)
            .map(|i| format!("{}-{}", base, i))
            .find(|name| !self.exists(name))
            .unwrap_or(base)
    }

    fn cleanup(&self) -> Result<(), StoreError> {
        if self.max_saved == 0 {
            return Ok(());
        }
        for meta in self.list()?.iter().skip(self.max_saved) {
            let _ = self.delete(&meta.name);
        }
        Ok(())
    }
}

/// Format a relative time string.
pub fn format_relative_time(dt: DateTime<Utc>) -> String {
    let diff = Utc::now().signed_duration_since(dt);

    if diff.num_seconds() < 60 {
        "just now".to_string()
    } else if diff.num_minutes() < 60 {
        let mins = diff.num_minutes();
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if diff.num_hours() < 24 {
        let hours = diff.num_hours();
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if diff.num_days() < 7 {
        let days = diff.num_days();
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        dt.format("%Y-%m-%d").to_string()
    }
}
