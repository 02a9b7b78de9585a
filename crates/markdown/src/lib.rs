//! Per-step markdown generation stage
//!
//! Turns each OCR text file of a chapter into a short documentation step.
//! The extracted UI text is wrapped in a technical-writing prompt and sent
//! to a text generation model; the result is uploaded as one markdown file
//! per step. Empty OCR files are skipped, and a step whose generation keeps
//! failing is skipped after a bounded number of attempts so the rest of the
//! chapter still completes.
//!
//! # Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use doc_pipeline_events::MemoryPublisher;
//! use doc_pipeline_markdown::{BedrockConfig, BedrockGenerator, MarkdownGenerator};
//! use doc_pipeline_storage::{S3Config, S3ObjectStore};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let generator = MarkdownGenerator::new(
//!     Arc::new(S3ObjectStore::new(S3Config::default()).await?),
//!     Arc::new(BedrockGenerator::new(BedrockConfig::default()).await?),
//!     Arc::new(MemoryPublisher::new()),
//! );
//! let summary = generator.generate_chapter("doc-ingest", "provisioning").await?;
//! println!("Wrote {} step(s)", summary.steps_written);
//! # Ok(())
//! # }
//! ```

pub mod bedrock;

pub use bedrock::{BedrockConfig, BedrockGenerator};

use doc_pipeline_common::{key_stem, markdown_key, PipelineError, Result, OCR_TEXT_PREFIX};
use doc_pipeline_events::{ChapterEvent, EventPublisher};
use doc_pipeline_storage::ObjectStore;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Token budget for a single documentation step
pub const STEP_MAX_TOKENS: u32 = 1024;

/// Attempts per step before the step is skipped
pub const MAX_GENERATION_ATTEMPTS: usize = 3;

/// Text generation model client
#[async_trait::async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate text for a prompt within a token budget
    async fn generate(&self, prompt: &str, max_tokens: u32) -> Result<String>;
}

/// Prompt wrapping one screenshot's OCR text into a documentation request
#[must_use]
pub fn step_prompt(extracted_text: &str, chapter_context: &str) -> String {
    format!(
        r#"You are a professional technical writer responsible for documenting complex IT setup instructions, including but not limited to:

- Provisioning VMs and configuring hypervisors (e.g., vSphere)
- Installing operating systems and configuring hardware
- Installing and configuring middleware (Java, Tomcat)
- Installing and configuring databases (SQL Server, Oracle)
- Performing enterprise software installations
- Setting up deployment tools and automation
- Network configuration, licensing, and security settings

These notes are verbose and low-level. Your job is to turn them into **clean and concise instructions** for the chapter titled: **{chapter}**.

A screenshot was processed using OCR. Your task is to:
1. Identify what the screenshot is instructing the user to do.
2. Write a precise, step-by-step instruction for that action.
3. Avoid hallucination; if unsure, provide only what is visible or implied.
4. Use clear, formal language suitable for technical documentation.
5. End with a helpful note if applicable (e.g., software dependencies, account permissions).

Here is the extracted UI text:
"""
{text}
"""

Write a documentation step for this screenshot."#,
        chapter = chapter_context,
        text = extracted_text
    )
}

/// Outcome of one markdown generation run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MarkdownSummary {
    /// Chapter folder the OCR text was read from
    pub chapter: String,
    /// OCR text files found for the chapter
    pub steps_found: usize,
    /// Steps successfully generated and uploaded
    pub steps_written: usize,
}

/// Generates one markdown step per OCR text file of a chapter
pub struct MarkdownGenerator {
    store: Arc<dyn ObjectStore>,
    generator: Arc<dyn TextGenerator>,
    publisher: Arc<dyn EventPublisher>,
}

impl MarkdownGenerator {
    #[must_use]
    pub fn new(
        store: Arc<dyn ObjectStore>,
        generator: Arc<dyn TextGenerator>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            store,
            generator,
            publisher,
        }
    }

    /// Generate markdown for every non-empty OCR text file of the chapter
    pub async fn generate_chapter(&self, bucket: &str, chapter: &str) -> Result<MarkdownSummary> {
        let prefix = format!("{}{}/", OCR_TEXT_PREFIX, chapter);
        tracing::info!("Processing OCR text from s3://{}/{}", bucket, prefix);

        let text_keys: Vec<String> = self
            .store
            .list_objects(bucket, &prefix)
            .await
            .map_err(|e| PipelineError::StorageError(e.to_string()))?
            .into_iter()
            .filter(|key| key.ends_with(".txt"))
            .collect();

        if text_keys.is_empty() {
            tracing::warn!("No .txt files found under s3://{}/{}", bucket, prefix);
            return Ok(MarkdownSummary {
                chapter: chapter.to_string(),
                steps_found: 0,
                steps_written: 0,
            });
        }

        let mut written = 0;
        for key in &text_keys {
            if self.generate_step(bucket, chapter, key).await {
                written += 1;
            }
        }

        if written > 0 {
            if let Err(e) = self
                .publisher
                .publish_chapter_processed(&ChapterEvent::new(chapter))
                .await
            {
                tracing::warn!("Failed to publish chapter event for {}: {}", chapter, e);
            }
        }

        Ok(MarkdownSummary {
            chapter: chapter.to_string(),
            steps_found: text_keys.len(),
            steps_written: written,
        })
    }

    /// One step from OCR text to uploaded markdown; false when skipped
    async fn generate_step(&self, bucket: &str, chapter: &str, text_key: &str) -> bool {
        let body = match self.store.get_object(bucket, text_key).await {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!("Failed to read {}: {}", text_key, e);
                return false;
            }
        };

        let extracted_text = match String::from_utf8(body) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("Failed to decode {}: {}", text_key, e);
                return false;
            }
        };

        if extracted_text.trim().is_empty() {
            tracing::info!("Skipping empty {}", text_key);
            return false;
        }

        let prompt = step_prompt(&extracted_text, chapter);
        let markdown = match self.generate_with_retries(&prompt).await {
            Ok(markdown) => markdown,
            Err(e) => {
                tracing::warn!("Generation failed for {}: {}", text_key, e);
                return false;
            }
        };

        let step_key = markdown_key(chapter, key_stem(text_key));
        match self
            .store
            .put_object(bucket, &step_key, markdown.as_bytes(), "text/markdown")
            .await
        {
            Ok(()) => {
                tracing::info!("Uploaded s3://{}/{}", bucket, step_key);
                true
            }
            Err(e) => {
                tracing::warn!("Upload failed for {}: {}", step_key, e);
                false
            }
        }
    }

    async fn generate_with_retries(&self, prompt: &str) -> Result<String> {
        let mut last_error = PipelineError::GenerationError("no attempts made".to_string());
        for attempt in 1..=MAX_GENERATION_ATTEMPTS {
            match self.generator.generate(prompt, STEP_MAX_TOKENS).await {
                Ok(text) => return Ok(text),
                Err(e) => {
                    tracing::warn!("Generation attempt {} failed: {}", attempt, e);
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }
}

/// In-memory generator for tests, serving queued responses
#[derive(Default)]
pub struct MemoryGenerator {
    responses: Mutex<VecDeque<String>>,
    fail_remaining: Mutex<usize>,
    requests: Mutex<Vec<(String, u32)>>,
}

impl MemoryGenerator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for a future generate call
    pub async fn push_response(&self, text: &str) {
        self.responses.lock().await.push_back(text.to_string());
    }

    /// Make the next `count` generate calls fail
    pub async fn fail_times(&self, count: usize) {
        *self.fail_remaining.lock().await = count;
    }

    /// Prompts and token budgets seen so far
    pub async fn requests(&self) -> Vec<(String, u32)> {
        self.requests.lock().await.clone()
    }
}

#[async_trait::async_trait]
impl TextGenerator for MemoryGenerator {
    async fn generate(&self, prompt: &str, max_tokens: u32) -> Result<String> {
        self.requests
            .lock()
            .await
            .push((prompt.to_string(), max_tokens));

        let mut fail_remaining = self.fail_remaining.lock().await;
        if *fail_remaining > 0 {
            *fail_remaining -= 1;
            return Err(PipelineError::GenerationError(
                "injected generation failure".to_string(),
            ));
        }
        drop(fail_remaining);

        Ok(self
            .responses
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| "## Step\n\nGenerated instructions.".to_string()))
    }
}
