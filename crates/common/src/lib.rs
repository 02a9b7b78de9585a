/// Common types and utilities for the document processing pipeline
use thiserror::Error;

/// Prefix for extracted chapter images
pub const EXTRACTED_IMAGES_PREFIX: &str = "extracted-images/";

/// Prefix for per-image OCR output
pub const OCR_TEXT_PREFIX: &str = "ocr-text/";

/// Prefix for per-step generated markdown
pub const MARKDOWN_PREFIX: &str = "markdown/";

/// Prefix for assembled chapter manuals
pub const FINAL_OUTPUT_PREFIX: &str = "final-output/";

/// Stage processing errors
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Corrupted document: {0}")]
    CorruptedDocument(String),

    #[error("Image processing error: {0}")]
    ImageError(String),

    #[error("Text detection error: {0}")]
    OcrError(String),

    #[error("Text generation error: {0}")]
    GenerationError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Event publish error: {0}")]
    PublishError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(String),
}

impl From<image::ImageError> for PipelineError {
    fn from(err: image::ImageError) -> Self {
        PipelineError::ImageError(err.to_string())
    }
}

/// Result type for stage operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Final path segment of an object key
#[must_use]
pub fn key_basename(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

/// Final path segment with the last extension removed
///
/// A leading dot is not treated as an extension separator, so
/// `.hidden` stays `.hidden`.
#[must_use]
pub fn key_stem(key: &str) -> &str {
    let base = key_basename(key);
    match base.rfind('.') {
        Some(idx) if idx > 0 => &base[..idx],
        _ => base,
    }
}

/// Object key for an extracted chapter image (1-based index)
#[must_use]
pub fn image_key(chapter: &str, index: usize) -> String {
    format!("{}{}/image_{}.png", EXTRACTED_IMAGES_PREFIX, chapter, index)
}

/// Object key for the ordered OCR text of an image
#[must_use]
pub fn ocr_text_key(chapter: &str, image_stem: &str) -> String {
    format!("{}{}/{}.txt", OCR_TEXT_PREFIX, chapter, image_stem)
}

/// Object key for the structured OCR lines of an image
#[must_use]
pub fn ocr_lines_key(chapter: &str, image_stem: &str) -> String {
    format!("{}{}/{}_lines.json", OCR_TEXT_PREFIX, chapter, image_stem)
}

/// Object key for the generated markdown of a single step
#[must_use]
pub fn markdown_key(chapter: &str, step_stem: &str) -> String {
    format!("{}{}/{}.md", MARKDOWN_PREFIX, chapter, step_stem)
}

/// Object key for the assembled chapter manual
#[must_use]
pub fn final_output_key(chapter: &str) -> String {
    format!("{}{}.md", FINAL_OUTPUT_PREFIX, chapter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_naming() {
        assert_eq!(
            key_basename("intake-raw/provisioning.docx"),
            "provisioning.docx"
        );
        assert_eq!(key_basename("provisioning.docx"), "provisioning.docx");
        assert_eq!(key_stem("intake-raw/provisioning.docx"), "provisioning");
        assert_eq!(key_stem("archive.tar.gz"), "archive.tar");
        assert_eq!(key_stem(".hidden"), ".hidden");
        assert_eq!(key_stem("noext"), "noext");
    }

    #[test]
    fn test_artifact_keys() {
        assert_eq!(image_key("chapter_1", 3), "extracted-images/chapter_1/image_3.png");
        assert_eq!(ocr_text_key("chapter_1", "image_3"), "ocr-text/chapter_1/image_3.txt");
        assert_eq!(
            ocr_lines_key("chapter_1", "image_3"),
            "ocr-text/chapter_1/image_3_lines.json"
        );
        assert_eq!(markdown_key("chapter_1", "image_3"), "markdown/chapter_1/image_3.md");
        assert_eq!(final_output_key("chapter_1"), "final-output/chapter_1.md");
    }
}
