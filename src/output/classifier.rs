//! Classification of interpreter results.
//!
//! Raw engine messages are partitioned into ordered [`ResultFragment`]s. Two views are
//! derived from the fragments: the text reported back to the model (images collapsed to
//! a placeholder, ANSI sequences stripped, long output elided in the middle) and the
//! terminal text shown to the user.

use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use crate::kernel::{EngineMessage, MimeBundle};

/// Model-facing text longer than this is elided in the middle.
pub const MODEL_TEXT_LIMIT: usize = 500;

/// Characters kept from each end of elided model-facing text.
pub const MODEL_TEXT_KEEP: usize = 200;

/// Inserted where model-facing text was cut.
pub const ELISION_MARKER: &str =
    "\n[Output too much, the middle part output is omitted]\n End part of output:\n";

/// Placeholder the model sees instead of image data.
pub const IMAGE_PLACEHOLDER: &str = "[image]";

/// Image payload encodings the engine can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageEncoding {
    Png,
    Jpeg,
}

impl ImageEncoding {
    /// File extension used when the image is persisted.
    pub fn extension(self) -> &'static str {
        match self {
            ImageEncoding::Png => "png",
            ImageEncoding::Jpeg => "jpg",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            ImageEncoding::Png => "image/png",
            ImageEncoding::Jpeg => "image/jpeg",
        }
    }
}

/// One piece of interpreter output, in emission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultFragment {
    Stdout(String),
    RichText(String),
    RichHtml(String),
    /// `data` is the base64 payload exactly as the engine sent it.
    Image {
        encoding: ImageEncoding,
        data: String,
    },
    /// Traceback lines joined with newlines.
    Error(String),
}

impl ResultFragment {
    pub fn is_error(&self) -> bool {
        matches!(self, ResultFragment::Error(_))
    }
}

/// Append the fragments carried by one engine message.
///
/// Within a mime bundle the order is plain text, HTML, PNG, JPEG. Consecutive stdout
/// writes are merged into one fragment, as a terminal would show them.
pub fn push_fragments(message: &EngineMessage, out: &mut Vec<ResultFragment>) {
    match message {
        EngineMessage::Stream { name, text } => {
            if name == "stdout" {
                match out.last_mut() {
                    Some(ResultFragment::Stdout(previous)) => previous.push_str(text),
                    _ => out.push(ResultFragment::Stdout(text.clone())),
                }
            } else {
                debug!(stream = %name, len = text.len(), "Ignoring non-stdout stream text");
            }
        }
        EngineMessage::ExecuteResult { data } | EngineMessage::DisplayData { data } => {
            push_bundle(data, out);
        }
        EngineMessage::Error { traceback } => {
            out.push(ResultFragment::Error(traceback.join("\n")));
        }
        EngineMessage::Status { .. } | EngineMessage::Other => {}
    }
}

fn push_bundle(bundle: &MimeBundle, out: &mut Vec<ResultFragment>) {
    if let Some(text) = &bundle.text_plain {
        out.push(ResultFragment::RichText(text.clone()));
    }
    if let Some(html) = &bundle.text_html {
        out.push(ResultFragment::RichHtml(html.clone()));
    }
    if let Some(png) = &bundle.image_png {
        out.push(ResultFragment::Image {
            encoding: ImageEncoding::Png,
            data: png.clone(),
        });
    }
    if let Some(jpeg) = &bundle.image_jpeg {
        out.push(ResultFragment::Image {
            encoding: ImageEncoding::Jpeg,
            data: jpeg.clone(),
        });
    }
}

/// Classify a complete list of engine messages.
pub fn classify(messages: &[EngineMessage]) -> Vec<ResultFragment> {
    let mut fragments = Vec::new();
    for message in messages {
        push_fragments(message, &mut fragments);
    }
    fragments
}

/// Remove ANSI color/control sequences.
pub fn strip_ansi(text: &str) -> String {
    static ANSI: OnceLock<Option<Regex>> = OnceLock::new();
    let re = ANSI.get_or_init(|| Regex::new(r"(\x{9B}|\x1B\[)[0-?]*[ -/]*[@-~]").ok());
    match re {
        Some(re) => re.replace_all(text, "").into_owned(),
        None => text.to_string(),
    }
}

/// Elide the middle of text longer than [`MODEL_TEXT_LIMIT`] characters.
pub fn truncate_for_model(text: &str) -> String {
    let len = text.chars().count();
    if len <= MODEL_TEXT_LIMIT {
        return text.to_string();
    }

    let head: String = text.chars().take(MODEL_TEXT_KEEP).collect();
    let tail: String = text.chars().skip(len - MODEL_TEXT_KEEP).collect();
    format!("{}{}{}", head, ELISION_MARKER, tail)
}

/// Result of one `execute` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionOutput {
    pub fragments: Vec<ResultFragment>,
}

impl ExecutionOutput {
    pub fn new(fragments: Vec<ResultFragment>) -> Self {
        Self { fragments }
    }

    /// Whether any fragment is an error.
    pub fn failed(&self) -> bool {
        self.fragments.iter().any(ResultFragment::is_error)
    }

    /// Untruncated text for the model.
    pub fn full_model_text(&self) -> String {
        let parts: Vec<String> = self
            .fragments
            .iter()
            .filter_map(|fragment| match fragment {
                ResultFragment::Stdout(text) | ResultFragment::RichText(text) => {
                    Some(strip_ansi(text))
                }
                ResultFragment::Image { .. } => Some(IMAGE_PLACEHOLDER.to_string()),
                ResultFragment::Error(traceback) => Some(strip_ansi(traceback)),
                ResultFragment::RichHtml(_) => None,
            })
            .collect();
        parts.join("\n")
    }

    /// Text reported to the model, elided when long.
    pub fn model_text(&self) -> String {
        truncate_for_model(&self.full_model_text())
    }

    /// Text for the terminal block shown to the user.
    pub fn terminal_text(&self) -> String {
        let parts: Vec<String> = self
            .fragments
            .iter()
            .filter_map(|fragment| match fragment {
                ResultFragment::Stdout(text) | ResultFragment::RichText(text) => {
                    Some(text.clone())
                }
                ResultFragment::Error(traceback) => Some(strip_ansi(traceback)),
                _ => None,
            })
            .collect();
        parts.join("\n").trim_matches('\n').to_string()
    }

    /// Image fragments in emission order.
    pub fn images(&self) -> impl Iterator<Item = (ImageEncoding, &str)> + '_ {
        self.fragments.iter().filter_map(|fragment| match fragment {
            ResultFragment::Image { encoding, data } => Some((*encoding, data.as_str())),
            _ => None,
        })
    }
}
