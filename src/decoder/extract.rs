//! Best-effort extraction of the `code` value from `{"code": "<value>"}` argument text.
//!
//! Models stream the argument object token by token and frequently put raw newlines
//! inside the string value, which strict JSON rejects. The scanner locates the value by
//! structural landmarks instead of parsing it: the opening quote that follows the key's
//! colon, and (once the buffer is complete) the last quote before the last closing brace.
//! Values without raw newlines are handed to a strict parser so escapes are honoured.

use serde_json::Value;

/// Key whose value is extracted.
const CODE_KEY: &str = "code";

/// Position of the scanner relative to the `{"code": "` prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scan {
    BeforeBrace,
    BeforeKey,
    InKey,
    AfterKey,
    AfterColon,
}

/// Byte index just past the value's opening quote, if it has been seen.
fn find_value_start(buffer: &str) -> Option<usize> {
    let mut state = Scan::BeforeBrace;
    for (index, ch) in buffer.char_indices() {
        state = match (state, ch) {
            (Scan::BeforeBrace, '{') => Scan::BeforeKey,
            (Scan::BeforeKey, '"') => Scan::InKey,
            (Scan::InKey, '"') | (Scan::AfterKey, '"') => Scan::AfterKey,
            (Scan::AfterKey, ':') => Scan::AfterColon,
            (Scan::AfterColon, '"') => return Some(index + 1),
            _ => state,
        };
    }
    None
}

/// Byte index of the value's closing quote: the last `"` before the last `}`.
fn find_value_end(buffer: &str) -> Option<usize> {
    let brace = buffer.rfind('}')?;
    buffer[..brace].rfind('"')
}

/// Strictly parse `text` and return its string `code` field.
fn strict_code(text: &str) -> Option<String> {
    let value: Value = serde_json::from_str(text).ok()?;
    value.get(CODE_KEY)?.as_str().map(str::to_string)
}

/// Extract the code text from a (possibly partial) argument buffer.
///
/// With `finished == false` the buffer is a prefix of the final text; `None` means the
/// value cannot be bounded yet. With `finished == true`, `None` means the arguments are
/// malformed. Never panics.
pub fn extract_code(buffer: &str, finished: bool) -> Option<String> {
    let Some(start) = find_value_start(buffer) else {
        return if finished { strict_code(buffer) } else { None };
    };

    if finished {
        extract_finished(buffer, start)
    } else {
        extract_partial(buffer, start)
    }
}

fn extract_partial(buffer: &str, start: usize) -> Option<String> {
    let rest = &buffer[start..];
    if rest.is_empty() {
        return Some(String::new());
    }
    if rest.contains('\n') {
        // No closing quote has been seen, so everything after the opening quote is value.
        return Some(rest.trim_matches('\n').to_string());
    }
    strict_code(&format!("{}\"}}", buffer))
}

fn extract_finished(buffer: &str, start: usize) -> Option<String> {
    let slice = find_value_end(buffer)
        .and_then(|end| buffer.get(start..end))
        .unwrap_or_default();
    if slice.contains('\n') {
        return Some(slice.trim_matches('\n').to_string());
    }
    strict_code(buffer)
}
