//! Conversation state: the canonical message log and the visible history.

mod history;
mod message;
mod state;

pub use history::{DisplayContent, DisplayEntry, DisplayHistory};
pub use message::{Message, Role};
pub use state::{ConversationState, UploadRecord, DEFAULT_MIN_OUTPUT_TOKENS, ELISION_NOTICE};
