//! Process command - run downstream stages for a staged chapter
//!
//! Builds the stage graph for the requested stages and executes it against
//! the live storage, Textract, Bedrock, and event bus adapters.

use anyhow::{Context as _, Result};
use clap::Args;
use serde_json::{json, Value};
use std::sync::Arc;

use doc_pipeline_events::{EventBridgePublisher, EventBusConfig};
use doc_pipeline_intake::{IntakeLedger, JobState};
use doc_pipeline_markdown::{BedrockConfig, BedrockGenerator};
use doc_pipeline_ocr::{TextractConfig, TextractOcrEngine};
use doc_pipeline_orchestrator::{ChapterOrchestrator, StageState, StageType};
use doc_pipeline_storage::{DynamoLedgerStore, LedgerConfig, S3Config, S3ObjectStore};

#[derive(Args)]
pub struct ProcessCommand {
    /// Bucket holding the staged document and derived artifacts
    #[arg(short, long)]
    bucket: String,

    /// Chapter folder to process
    #[arg(short, long)]
    chapter: String,

    /// Staged document key (default: latest staged job in the ledger)
    #[arg(long)]
    document_key: Option<String>,

    /// Comma-separated subset of stages to run
    #[arg(long, value_name = "STAGES")]
    stages: Option<String>,
}

impl ProcessCommand {
    pub async fn execute(self) -> Result<()> {
        let stages = match &self.stages {
            Some(list) => parse_stages(list)?,
            None => StageType::pipeline_order(),
        };

        let store = Arc::new(
            S3ObjectStore::new(S3Config::default())
                .await
                .context("Failed to create S3 client")?,
        );
        let engine = Arc::new(
            TextractOcrEngine::new(TextractConfig::default())
                .await
                .context("Failed to create Textract client")?,
        );
        let generator = Arc::new(
            BedrockGenerator::new(BedrockConfig::default())
                .await
                .context("Failed to create Bedrock client")?,
        );
        let publisher = Arc::new(
            EventBridgePublisher::new(EventBusConfig::default())
                .await
                .context("Failed to create EventBridge client")?,
        );

        // The staged archive is only read by image extraction
        let document_key = match (
            &self.document_key,
            stages.contains(&StageType::ImageExtraction),
        ) {
            (Some(key), _) => key.clone(),
            (None, true) => self.find_staged_key().await?,
            (None, false) => String::new(),
        };

        let orchestrator = ChapterOrchestrator::new(store, engine, generator, publisher);
        let graph = orchestrator.build_stage_graph(
            self.chapter.clone(),
            self.bucket.clone(),
            document_key,
            &stages,
        );

        let finished = orchestrator.execute(graph).await?;

        let mut stage_report = serde_json::Map::new();
        for (id, stage) in finished.stages() {
            let state = match &stage.state {
                StageState::Completed => "completed".to_string(),
                StageState::Failed(e) => format!("failed: {e}"),
                other => format!("{other:?}").to_lowercase(),
            };
            let mut entry = serde_json::Map::new();
            entry.insert("state".to_string(), json!(state));
            if let Some(result) = &stage.result {
                entry.insert("result".to_string(), serde_json::to_value(result)?);
            }
            stage_report.insert(id.clone(), Value::Object(entry));
        }

        let report = json!({
            "chapter": finished.chapter,
            "ok": !finished.has_failed(),
            "stages": stage_report,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);

        if finished.has_failed() {
            anyhow::bail!(
                "Chapter {} finished with {} failed stage(s)",
                finished.chapter,
                finished.failed_stages().len()
            );
        }
        Ok(())
    }

    /// Resolve the staged document key from the chapter's newest staged job
    async fn find_staged_key(&self) -> Result<String> {
        let ledger = Arc::new(
            DynamoLedgerStore::new(LedgerConfig::default())
                .await
                .context("Failed to create DynamoDB client")?,
        );
        let jobs = IntakeLedger::new(ledger)
            .jobs_for_document(&self.chapter)
            .await?;

        // Job ids are time-ordered, so the last staged record is the newest
        jobs.iter()
            .rev()
            .find(|job| job.state == JobState::Staged)
            .map(|job| job.staged_key.clone())
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "No staged job found for chapter {}; pass --document-key",
                    self.chapter
                )
            })
    }
}

/// Parse a comma-separated stage list
fn parse_stages(list: &str) -> Result<Vec<StageType>> {
    let mut stages = Vec::new();
    for name in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let stage = match name {
            "image_extraction" => StageType::ImageExtraction,
            "ocr" => StageType::Ocr,
            "markdown_generation" => StageType::MarkdownGeneration,
            "assembly" => StageType::Assembly,
            _ => anyhow::bail!(
                "Unknown stage: {}. Use 'image_extraction', 'ocr', 'markdown_generation', or 'assembly'",
                name
            ),
        };
        if !stages.contains(&stage) {
            stages.push(stage);
        }
    }
    if stages.is_empty() {
        anyhow::bail!("No stages given");
    }
    Ok(stages)
}
