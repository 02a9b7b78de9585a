//! Jobs command - inspect admission records in the ledger

use anyhow::{Context as _, Result};
use clap::Args;
use std::sync::Arc;

use doc_pipeline_intake::IntakeLedger;
use doc_pipeline_storage::{DynamoLedgerStore, LedgerConfig};

#[derive(Args)]
pub struct JobsCommand {
    /// Document basename to look up
    #[arg(short, long)]
    basename: String,

    /// Show a single job instead of all jobs for the document
    #[arg(short, long)]
    job_id: Option<String>,
}

impl JobsCommand {
    pub async fn execute(self) -> Result<()> {
        let store = Arc::new(
            DynamoLedgerStore::new(LedgerConfig::default())
                .await
                .context("Failed to create DynamoDB client")?,
        );
        let ledger = IntakeLedger::new(store);

        if let Some(job_id) = &self.job_id {
            let job = ledger
                .get_job(&self.basename, job_id)
                .await?
                .with_context(|| {
                    format!("No job {} for document {}", job_id, self.basename)
                })?;
            println!("{}", serde_json::to_string_pretty(&job)?);
        } else {
            let jobs = ledger.jobs_for_document(&self.basename).await?;
            if jobs.is_empty() {
                println!("No jobs recorded for document {}", self.basename);
                return Ok(());
            }
            println!("{}", serde_json::to_string_pretty(&jobs)?);
        }

        Ok(())
    }
}
