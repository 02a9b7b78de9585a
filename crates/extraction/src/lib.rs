//! Embedded image extraction stage
//!
//! Reads a staged document archive, collects the embedded media entries,
//! re-encodes each as RGB PNG and uploads them under the chapter's image
//! prefix. A document that is not a readable archive is a typed error;
//! an entry that fails to decode is logged and skipped so one bad image
//! does not sink the chapter.
//!
//! # Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use doc_pipeline_extraction::ImageExtractor;
//! use doc_pipeline_events::MemoryPublisher;
//! use doc_pipeline_storage::MemoryObjectStore;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let extractor = ImageExtractor::new(
//!     Arc::new(MemoryObjectStore::new()),
//!     Arc::new(MemoryPublisher::new()),
//! );
//! let summary = extractor
//!     .extract_chapter("doc-ingest", "staged/provisioning/01/source.docx", "provisioning")
//!     .await?;
//! println!("Uploaded {} of {} images", summary.images_uploaded, summary.images_found);
//! # Ok(())
//! # }
//! ```

use doc_pipeline_common::{image_key, PipelineError, Result};
use doc_pipeline_events::{ChapterEvent, EventPublisher};
use doc_pipeline_storage::ObjectStore;
use image::ImageFormat;
use serde::Serialize;
use std::io::{Cursor, Read};
use std::sync::Arc;
use zip::ZipArchive;

/// Archive prefix holding embedded document media
pub const MEDIA_PREFIX: &str = "word/media/";

/// Outcome of one extraction run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractionSummary {
    /// Chapter folder the images were written under
    pub chapter: String,
    /// Media entries found in the archive
    pub images_found: usize,
    /// Entries successfully re-encoded and uploaded
    pub images_uploaded: usize,
}

/// Extracts embedded images from staged document archives
pub struct ImageExtractor {
    store: Arc<dyn ObjectStore>,
    publisher: Arc<dyn EventPublisher>,
}

impl ImageExtractor {
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self { store, publisher }
    }

    /// Extract all embedded images for one chapter
    ///
    /// Image keys are numbered by the entry's position in the archive, so a
    /// skipped entry leaves a gap rather than renumbering its successors.
    pub async fn extract_chapter(
        &self,
        bucket: &str,
        document_key: &str,
        chapter: &str,
    ) -> Result<ExtractionSummary> {
        let data = self
            .store
            .get_object(bucket, document_key)
            .await
            .map_err(|e| {
                PipelineError::StorageError(format!("s3://{}/{}: {}", bucket, document_key, e))
            })?;

        let mut archive = ZipArchive::new(Cursor::new(data))
            .map_err(|e| PipelineError::CorruptedDocument(e.to_string()))?;

        let media_names: Vec<String> = archive
            .file_names()
            .filter(|name| name.starts_with(MEDIA_PREFIX))
            .map(std::string::ToString::to_string)
            .collect();

        if media_names.is_empty() {
            tracing::info!("No images found in s3://{}/{}", bucket, document_key);
            return Ok(ExtractionSummary {
                chapter: chapter.to_string(),
                images_found: 0,
                images_uploaded: 0,
            });
        }

        tracing::info!(
            "Found {} image(s) in s3://{}/{}",
            media_names.len(),
            bucket,
            document_key
        );

        let mut uploaded = 0;
        for (position, name) in media_names.iter().enumerate() {
            match self
                .upload_media_entry(&mut archive, name, bucket, chapter, position + 1)
                .await
            {
                Ok(()) => uploaded += 1,
                Err(e) => tracing::warn!("Failed to process {}: {}", name, e),
            }
        }

        if uploaded > 0 {
            if let Err(e) = self
                .publisher
                .publish_chapter_processed(&ChapterEvent::new(chapter))
                .await
            {
                tracing::warn!("Failed to publish chapter event for {}: {}", chapter, e);
            }
        }

        Ok(ExtractionSummary {
            chapter: chapter.to_string(),
            images_found: media_names.len(),
            images_uploaded: uploaded,
        })
    }

    async fn upload_media_entry(
        &self,
        archive: &mut ZipArchive<Cursor<Vec<u8>>>,
        name: &str,
        bucket: &str,
        chapter: &str,
        index: usize,
    ) -> Result<()> {
        let mut raw = Vec::new();
        archive
            .by_name(name)
            .map_err(|e| PipelineError::CorruptedDocument(e.to_string()))?
            .read_to_end(&mut raw)?;

        let png = encode_rgb_png(&raw)?;
        let key = image_key(chapter, index);

        self.store
            .put_object(bucket, &key, &png, "image/png")
            .await
            .map_err(|e| PipelineError::StorageError(e.to_string()))?;

        tracing::info!("Uploaded {} ({} bytes)", key, png.len());
        Ok(())
    }
}

/// Decode arbitrary embedded image bytes and re-encode as RGB PNG
fn encode_rgb_png(raw: &[u8]) -> Result<Vec<u8>> {
    let decoded = image::load_from_memory(raw)?;
    let rgb = decoded.to_rgb8();

    let mut buf = Cursor::new(Vec::new());
    rgb.write_to(&mut buf, ImageFormat::Png)?;
    Ok(buf.into_inner())
}
