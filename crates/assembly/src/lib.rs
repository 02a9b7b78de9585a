//! Final manual assembly stage
//!
//! Gathers the per-step markdown files of a chapter, orders them by step
//! number, concatenates them under a chapter heading and asks the text
//! generation model for one cleaned, consolidated instruction manual. The
//! result is uploaded as the chapter's final output.
//!
//! # Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use doc_pipeline_assembly::ManualAssembler;
//! use doc_pipeline_events::MemoryPublisher;
//! use doc_pipeline_markdown::{BedrockConfig, BedrockGenerator};
//! use doc_pipeline_storage::{S3Config, S3ObjectStore};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let assembler = ManualAssembler::new(
//!     Arc::new(S3ObjectStore::new(S3Config::default()).await?),
//!     Arc::new(BedrockGenerator::new(BedrockConfig::default()).await?),
//!     Arc::new(MemoryPublisher::new()),
//! );
//! let summary = assembler.assemble_chapter("doc-ingest", "provisioning").await?;
//! println!("Final manual: {:?}", summary.final_key);
//! # Ok(())
//! # }
//! ```

use doc_pipeline_common::{
    final_output_key, key_stem, PipelineError, Result, MARKDOWN_PREFIX,
};
use doc_pipeline_events::{ChapterEvent, EventPublisher};
use doc_pipeline_markdown::TextGenerator;
use doc_pipeline_storage::ObjectStore;
use serde::Serialize;
use std::sync::Arc;

/// Token budget for the consolidated manual
pub const MANUAL_MAX_TOKENS: u32 = 2048;

/// First run of digits in the file stem, 0 when there is none
#[must_use]
pub fn step_number(key: &str) -> u64 {
    let stem = key_stem(key);
    let digits: String = stem
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().unwrap_or(0)
}

/// Chapter folder rendered as a heading title
///
/// Hyphens become spaces and each word is capitalized, so
/// `setup-sql-server` reads `Setup Sql Server`.
#[must_use]
pub fn chapter_title(chapter: &str) -> String {
    chapter
        .replace('-', " ")
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Prompt asking for one consolidated manual from the combined raw steps
#[must_use]
pub fn manual_prompt(raw_markdown: &str, chapter_context: &str) -> String {
    format!(
        r#"You are a senior technical writer creating professional IT installation documentation for an enterprise environment.

The content below consists of **multiple detailed Markdown files** generated from screenshots. These describe steps taken inside tools like VMware vSphere or SQL Server during a provisioning or configuration workflow.

These individual files are verbose and low-level. Your job is to summarize them into a single, **clean and concise instruction manual** for the chapter titled: **{chapter}**.

## Your instructions:
1. **Do NOT copy every UI detail** - focus on the user's real goals and tasks.
2. **Group related steps** together logically. If 5 images show steps in a wizard, summarize the wizard flow into 1 section.
3. Use **headings** to structure the process (e.g., "Creating a New Virtual Machine", "Assigning Storage").
4. Remove **any repetition or redundant options**.
5. Use **professional, instructional tone**, like in official VMware or Microsoft installation guides.
6. Keep **valid Markdown formatting** with headings and numbered lists.

You are writing this for someone experienced in IT who needs **just enough instruction** to repeat the process confidently.

--- BEGIN RAW MARKDOWN (OCR GENERATED) ---
{raw}
--- END RAW MARKDOWN ---

Now return the **summarized, cleaned, and properly structured** instruction manual in valid Markdown. Do NOT include any text outside the Markdown output."#,
        chapter = chapter_context,
        raw = raw_markdown
    )
}

/// Outcome of one assembly run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssemblySummary {
    /// Chapter folder the steps were read from
    pub chapter: String,
    /// Step files found for the chapter
    pub steps_found: usize,
    /// Steps with content that made it into the combined draft
    pub steps_combined: usize,
    /// Key of the uploaded manual, absent when there was nothing to assemble
    pub final_key: Option<String>,
}

/// Combines per-step markdown into one generated chapter manual
pub struct ManualAssembler {
    store: Arc<dyn ObjectStore>,
    generator: Arc<dyn TextGenerator>,
    publisher: Arc<dyn EventPublisher>,
}

impl ManualAssembler {
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

    /// Assemble the chapter's final manual from its step files
    pub async fn assemble_chapter(&self, bucket: &str, chapter: &str) -> Result<AssemblySummary> {
        let prefix = format!("{}{}/", MARKDOWN_PREFIX, chapter);
        tracing::info!("Gathering markdown from s3://{}/{}", bucket, prefix);

        let mut step_keys: Vec<String> = self
            .store
            .list_objects(bucket, &prefix)
            .await
            .map_err(|e| PipelineError::StorageError(e.to_string()))?
            .into_iter()
            .filter(|key| key.ends_with(".md"))
            .collect();
        step_keys.sort_by_key(|key| step_number(key));

        if step_keys.is_empty() {
            tracing::warn!("No markdown files found under s3://{}/{}", bucket, prefix);
            return Ok(AssemblySummary {
                chapter: chapter.to_string(),
                steps_found: 0,
                steps_combined: 0,
                final_key: None,
            });
        }

        let mut combined = format!("# Chapter - {}\n\n", chapter_title(chapter));
        let mut steps_combined = 0;
        for key in &step_keys {
            let content = match self.store.get_object(bucket, key).await {
                Ok(body) => String::from_utf8_lossy(&body).trim().to_string(),
                Err(e) => {
                    tracing::warn!("Failed to read {}: {}", key, e);
                    continue;
                }
            };
            if content.is_empty() {
                continue;
            }
            combined.push_str(&format!(
                "### Step {}\n\n{}\n\n---\n\n",
                step_number(key),
                content
            ));
            steps_combined += 1;
        }

        let prompt = manual_prompt(&combined, &chapter_title(chapter));
        let manual = self.generator.generate(&prompt, MANUAL_MAX_TOKENS).await?;

        let output_key = final_output_key(chapter);
        self.store
            .put_object(bucket, &output_key, manual.as_bytes(), "text/markdown")
            .await
            .map_err(|e| PipelineError::StorageError(e.to_string()))?;
        tracing::info!("Uploaded final manual s3://{}/{}", bucket, output_key);

        if let Err(e) = self
            .publisher
            .publish_chapter_processed(&ChapterEvent::new(chapter))
            .await
        {
            tracing::warn!("Failed to publish chapter event for {}: {}", chapter, e);
        }

        Ok(AssemblySummary {
            chapter: chapter.to_string(),
            steps_found: step_keys.len(),
            steps_combined,
            final_key: Some(output_key),
        })
    }
}
