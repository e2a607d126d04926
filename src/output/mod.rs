//! Interpreter output: classification for the model, rendering for the user.

mod classifier;
mod render;

pub use classifier::{
    classify, push_fragments, strip_ansi, truncate_for_model, ExecutionOutput, ImageEncoding,
    ResultFragment, ELISION_MARKER, IMAGE_PLACEHOLDER, MODEL_TEXT_KEEP, MODEL_TEXT_LIMIT,
};
pub use render::{
    code_done, code_in_progress, decode_image, failure_block, success_block, OutputRenderer,
    RenderError,
};
