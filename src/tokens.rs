//! Token estimation utilities.
//!
//! Provides rough token counting for conversation messages so outbound requests can be
//! sliced to fit a model's context window, and so users can see context usage.

use crate::conversation::Message;

/// Something that can count tokens for a specific model.
pub trait TokenCounter: Send + Sync {
    /// Token count of a piece of text.
    fn count(&self, text: &str) -> usize;

    /// Token count of a whole message (content only).
    fn count_message(&self, message: &Message) -> usize {
        self.count(&message.content)
    }
}

/// Character-ratio estimator.
///
/// Uses ~4 chars per token for most models; code-heavy chat models tokenize a little
/// denser, so older GPT-3 era models use a smaller ratio.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EstimatingCounter {
    chars_per_token: f64,
}

impl EstimatingCounter {
    pub fn new(chars_per_token: f64) -> Self {
        Self {
            chars_per_token: chars_per_token.max(1.0),
        }
    }

    /// Pick a ratio for the target model.
    pub fn for_model(model: &str) -> Self {
        if model.starts_with("gpt-3.5") || model.starts_with("text-davinci") {
            Self::new(3.5)
        } else {
            Self::new(4.0)
        }
    }
}

impl Default for EstimatingCounter {
    fn default() -> Self {
        Self::new(4.0)
    }
}

impl TokenCounter for EstimatingCounter {
    fn count(&self, text: &str) -> usize {
        let chars = text.chars().count();
        if chars == 0 {
            return 0;
        }
        (chars as f64 / self.chars_per_token).ceil() as usize
    }
}

/// Rough token estimate for a collection of messages.
pub fn estimate_tokens(counter: &dyn TokenCounter, messages: &[Message]) -> usize {
    messages.iter().map(|m| counter.count_message(m)).sum()
}

/// Calculate context usage as a percentage.
pub fn usage_percent(estimated_tokens: usize, context_length: usize) -> f64 {
    if context_length == 0 {
        return 0.0;
    }
    (estimated_tokens as f64 / context_length as f64) * 100.0
}

/// Format a token count with space as thousands separator.
///
/// Examples:
/// - 500 → "500"
/// - 1500 → "1 500"
/// - 128000 → "128 000"
pub fn format_tokens_with_separator(count: usize) -> String {
    let s = count.to_string();
    let chars: Vec<char> = s.chars().collect();
    let mut result = String::with_capacity(s.len() + s.len() / 3);

    for (i, ch) in chars.iter().enumerate() {
        if i > 0 && (chars.len() - i) % 3 == 0 {
            result.push(' ');
        }
        result.push(*ch);
    }

    result
}
