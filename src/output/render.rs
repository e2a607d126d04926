//! Human-facing rendering of execution results.
//!
//! Produces a terminal block marked success or failure, then one history entry per image
//! fragment. Images are decoded, checked, and written under the session's image
//! directory. An image that fails any of those steps is skipped.

use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::ImageReader;
use std::io::Cursor;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use super::classifier::{ExecutionOutput, ImageEncoding};
use crate::conversation::{DisplayEntry, DisplayHistory};

/// Terminal block for an execution that raised no error.
pub fn success_block(text: &str) -> String {
    format!("✓ Terminal output:\n```shell\n{}\n```", text)
}

/// Terminal block for an execution with at least one error fragment.
pub fn failure_block(text: &str) -> String {
    format!("✗ Terminal output:\n```shell\n\n{}\n```", text)
}

/// Code block shown while the argument is still streaming.
pub fn code_in_progress(code: &str) -> String {
    format!("\n● Working:\n```python\n{}\n```", code)
}

/// Code block shown once the argument is complete.
pub fn code_done(code: &str) -> String {
    format!("\n✓ Working:\n```python\n{}\n```", code)
}

/// Why an image fragment could not be shown.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("invalid base64 image data: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("unreadable image: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Renders results into the visible history.
#[derive(Debug, Clone)]
pub struct OutputRenderer {
    image_dir: PathBuf,
}

impl OutputRenderer {
    pub fn new(image_dir: impl Into<PathBuf>) -> Self {
        Self {
            image_dir: image_dir.into(),
        }
    }

    pub fn image_dir(&self) -> &Path {
        &self.image_dir
    }

    /// Append the terminal block and image entries for `output`.
    ///
    /// Returns the paths of the images that were written.
    pub fn render(&self, output: &ExecutionOutput, history: &mut DisplayHistory) -> Vec<PathBuf> {
        let text = output.terminal_text();
        let block = if output.failed() {
            failure_block(&text)
        } else {
            success_block(&text)
        };
        history.push(DisplayEntry::bot(block));

        let mut written = Vec::new();
        for (encoding, data) in output.images() {
            match self.persist_image(encoding, data) {
                Ok(path) => {
                    history.push(DisplayEntry::image(path.clone()));
                    written.push(path);
                }
                Err(e) => debug!(error = %e, "Skipping undecodable image"),
            }
        }
        written
    }

    fn persist_image(&self, encoding: ImageEncoding, data: &str) -> Result<PathBuf, RenderError> {
        let bytes = decode_image(data)?;

        if let Err(e) = std::fs::create_dir_all(&self.image_dir) {
            warn!(dir = %self.image_dir.display(), error = %e, "Cannot create image dir");
            return Err(e.into());
        }

        let path = self
            .image_dir
            .join(format!("{}.{}", Uuid::new_v4(), encoding.extension()));
        if let Err(e) = std::fs::write(&path, &bytes) {
            warn!(path = %path.display(), error = %e, "Cannot write image");
            return Err(e.into());
        }
        Ok(path)
    }
}

/// Decode a base64 payload and confirm it is a readable image.
pub fn decode_image(data: &str) -> Result<Vec<u8>, RenderError> {
    let compact: String = data.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = BASE64.decode(compact)?;

    ImageReader::new(Cursor::new(&bytes))
        .with_guessed_format()?
        .decode()?;

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::DisplayContent;
    use crate::output::ResultFragment;
    use image::{DynamicImage, ImageFormat, RgbImage};
    use tempfile::TempDir;

    fn tiny_png_base64() -> String {
        let img = DynamicImage::ImageRgb8(RgbImage::new(2, 2));
        let mut buffer = Cursor::new(Vec::new());
        img.write_to(&mut buffer, ImageFormat::Png).unwrap();
        BASE64.encode(buffer.into_inner())
    }

    #[test]
    fn test_blocks() {
        assert_eq!(success_block("2"), "✓ Terminal output:\n```shell\n2\n```");
        assert_eq!(failure_block("boom"), "✗ Terminal output:\n```shell\n\nboom\n```");
        assert!(code_in_progress("x").contains("```python\nx\n```"));
        assert!(code_done("x").starts_with("\n✓ Working"));
    }

    #[test]
    fn test_render_success_block() {
        let tmp = TempDir::new().unwrap();
        let renderer = OutputRenderer::new(tmp.path().join("images"));
        let mut history = DisplayHistory::new();

        let output = ExecutionOutput::new(vec![ResultFragment::Stdout("2\n".into())]);
        let written = renderer.render(&output, &mut history);

        assert!(written.is_empty());
        assert_eq!(history.len(), 1);
        assert_eq!(
            history.last().unwrap().bot,
            Some(DisplayContent::Markdown(success_block("2")))
        );
    }

    #[test]
    fn test_render_failure_block() {
        let tmp = TempDir::new().unwrap();
        let renderer = OutputRenderer::new(tmp.path());
        let mut history = DisplayHistory::new();

        let output = ExecutionOutput::new(vec![ResultFragment::Error(
            "\x1b[31mNameError\x1b[0m: name 'x' is not defined".into(),
        )]);
        renderer.render(&output, &mut history);

        let bot = history.last().unwrap().bot.clone().unwrap();
        assert_eq!(
            bot,
            DisplayContent::Markdown(failure_block("NameError: name 'x' is not defined"))
        );
    }

    #[test]
    fn test_render_persists_valid_images() {
        let tmp = TempDir::new().unwrap();
        let renderer = OutputRenderer::new(tmp.path().join("images"));
        let mut history = DisplayHistory::new();

        let output = ExecutionOutput::new(vec![
            ResultFragment::RichText("<Figure>".into()),
            ResultFragment::Image {
                encoding: ImageEncoding::Png,
                data: tiny_png_base64(),
            },
        ]);
        let written = renderer.render(&output, &mut history);

        assert_eq!(written.len(), 1);
        assert!(written[0].exists());
        assert_eq!(written[0].extension().unwrap(), "png");
        assert_eq!(history.len(), 2);
        assert_eq!(
            history.last().unwrap().bot,
            Some(DisplayContent::Image(written[0].clone()))
        );
    }

    #[test]
    fn test_render_skips_corrupt_images() {
        let tmp = TempDir::new().unwrap();
        let renderer = OutputRenderer::new(tmp.path());
        let mut history = DisplayHistory::new();

        let output = ExecutionOutput::new(vec![
            ResultFragment::Image {
                encoding: ImageEncoding::Png,
                data: "not base64!!".into(),
            },
            ResultFragment::Image {
                encoding: ImageEncoding::Jpeg,
                data: BASE64.encode(b"definitely not a jpeg"),
            },
        ]);
        let written = renderer.render(&output, &mut history);

        assert!(written.is_empty());
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_decode_image_tolerates_line_breaks() {
        let encoded = tiny_png_base64();
        let (head, tail) = encoded.split_at(encoded.len() / 2);
        let wrapped = format!("{}\n{}\n", head, tail);
        assert!(decode_image(&wrapped).is_ok());
    }

    #[test]
    fn test_decode_image_errors_are_typed() {
        assert!(matches!(
            decode_image("not base64 !!"),
            Err(RenderError::Base64(_))
        ));
        // valid base64, not an image
        assert!(matches!(
            decode_image(&BASE64.encode(b"hello world")),
            Err(RenderError::Image(_))
        ));
    }

    #[test]
    fn test_unwritable_image_dir_is_io_error() {
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("images");
        std::fs::write(&blocker, "file, not a dir").unwrap();
        let renderer = OutputRenderer::new(&blocker);

        let err = renderer
            .persist_image(ImageEncoding::Png, &tiny_png_base64())
            .unwrap_err();
        assert!(matches!(err, RenderError::Io(_)));
    }
}
