//! Text detection stage over extracted chapter images
//!
//! Runs an OCR engine against every extracted image of a chapter and writes
//! two artifacts per image: the detected lines as ordered plain text, and
//! the structured lines with their vertical position as JSON. Lines are
//! ordered top to bottom so the text reads the way the screenshot does.
//!
//! # Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use doc_pipeline_events::MemoryPublisher;
//! use doc_pipeline_ocr::{OcrProcessor, TextractConfig, TextractOcrEngine};
//! use doc_pipeline_storage::{MemoryObjectStore, S3Config, S3ObjectStore};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = TextractOcrEngine::new(TextractConfig::default()).await?;
//! let processor = OcrProcessor::new(
//!     Arc::new(S3ObjectStore::new(S3Config::default()).await?),
//!     Arc::new(engine),
//!     Arc::new(MemoryPublisher::new()),
//! );
//! let summary = processor.process_chapter("doc-ingest", "provisioning").await?;
//! println!("Analyzed {} image(s)", summary.images_processed);
//! # Ok(())
//! # }
//! ```

pub mod textract;

pub use textract::{TextractConfig, TextractOcrEngine};

use doc_pipeline_common::{
    key_stem, ocr_lines_key, ocr_text_key, PipelineError, Result, EXTRACTED_IMAGES_PREFIX,
};
use doc_pipeline_events::{ChapterEvent, EventPublisher};
use doc_pipeline_storage::ObjectStore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// One detected text line with its vertical page position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrLine {
    /// Detected line text
    pub text: String,
    /// Top edge of the line's bounding box, normalized (0.0-1.0)
    pub top: f32,
}

/// Text detection engine
#[async_trait::async_trait]
pub trait OcrEngine: Send + Sync {
    /// Detect text lines in an image stored in the object store
    async fn detect_lines(&self, bucket: &str, key: &str) -> Result<Vec<OcrLine>>;
}

/// Outcome of one OCR run over a chapter
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OcrSummary {
    /// Chapter folder the images were read from
    pub chapter: String,
    /// Images found under the chapter's image prefix
    pub images_found: usize,
    /// Images successfully analyzed and written out
    pub images_processed: usize,
}

/// Runs the OCR engine over every extracted image of a chapter
pub struct OcrProcessor {
    store: Arc<dyn ObjectStore>,
    engine: Arc<dyn OcrEngine>,
    publisher: Arc<dyn EventPublisher>,
}

impl OcrProcessor {
    #[must_use]
    pub fn new(
        store: Arc<dyn ObjectStore>,
        engine: Arc<dyn OcrEngine>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            store,
            engine,
            publisher,
        }
    }

    /// Analyze every image of the chapter and write both OCR artifacts
    ///
    /// An engine failure on one image is logged and skipped; the run
    /// continues with the remaining images.
    pub async fn process_chapter(&self, bucket: &str, chapter: &str) -> Result<OcrSummary> {
        let prefix = format!("{}{}/", EXTRACTED_IMAGES_PREFIX, chapter);
        tracing::info!("Analyzing images in s3://{}/{}", bucket, prefix);

        let image_keys: Vec<String> = self
            .store
            .list_objects(bucket, &prefix)
            .await
            .map_err(|e| PipelineError::StorageError(e.to_string()))?
            .into_iter()
            .filter(|key| key.ends_with(".png"))
            .collect();

        if image_keys.is_empty() {
            tracing::warn!("No .png images found under s3://{}/{}", bucket, prefix);
            return Ok(OcrSummary {
                chapter: chapter.to_string(),
                images_found: 0,
                images_processed: 0,
            });
        }

        let mut processed = 0;
        for key in &image_keys {
            match self.engine.detect_lines(bucket, key).await {
                Ok(mut lines) => {
                    lines.sort_by(|a, b| a.top.total_cmp(&b.top));
                    self.write_artifacts(bucket, chapter, key, &lines).await?;
                    processed += 1;
                }
                Err(e) => tracing::warn!("Failed to analyze {}: {}", key, e),
            }
        }

        if processed > 0 {
            if let Err(e) = self
                .publisher
                .publish_chapter_processed(&ChapterEvent::new(chapter))
                .await
            {
                tracing::warn!("Failed to publish chapter event for {}: {}", chapter, e);
            }
        }

        Ok(OcrSummary {
            chapter: chapter.to_string(),
            images_found: image_keys.len(),
            images_processed: processed,
        })
    }

    async fn write_artifacts(
        &self,
        bucket: &str,
        chapter: &str,
        image_key: &str,
        lines: &[OcrLine],
    ) -> Result<()> {
        let stem = key_stem(image_key);

        let text = lines
            .iter()
            .map(|line| line.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let text_key = ocr_text_key(chapter, stem);
        self.store
            .put_object(bucket, &text_key, text.as_bytes(), "text/plain")
            .await
            .map_err(|e| PipelineError::StorageError(e.to_string()))?;
        tracing::info!("Uploaded plain text s3://{}/{}", bucket, text_key);

        let structured = serde_json::to_vec_pretty(lines)
            .map_err(|e| PipelineError::Other(e.to_string()))?;
        let lines_key = ocr_lines_key(chapter, stem);
        self.store
            .put_object(bucket, &lines_key, &structured, "application/json")
            .await
            .map_err(|e| PipelineError::StorageError(e.to_string()))?;
        tracing::info!("Uploaded line data s3://{}/{}", bucket, lines_key);

        Ok(())
    }
}

/// In-memory OCR engine for tests, serving canned lines per image key
#[derive(Default)]
pub struct MemoryOcrEngine {
    lines: Mutex<HashMap<String, Vec<OcrLine>>>,
    fail_keys: Mutex<Vec<String>>,
}

impl MemoryOcrEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve these lines for an image key
    pub async fn set_lines(&self, key: &str, lines: Vec<OcrLine>) {
        self.lines.lock().await.insert(key.to_string(), lines);
    }

    /// Make detection fail for an image key
    pub async fn fail_for(&self, key: &str) {
        self.fail_keys.lock().await.push(key.to_string());
    }
}

#[async_trait::async_trait]
impl OcrEngine for MemoryOcrEngine {
    async fn detect_lines(&self, _bucket: &str, key: &str) -> Result<Vec<OcrLine>> {
        if self.fail_keys.lock().await.iter().any(|k| k == key) {
            return Err(PipelineError::OcrError(format!(
                "injected detection failure for {}",
                key
            )));
        }

        Ok(self.lines.lock().await.get(key).cloned().unwrap_or_default())
    }
}
