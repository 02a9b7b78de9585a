//! Mark-failed command - annotate a job record as failed
//!
//! Operational bookkeeping for jobs whose downstream processing was abandoned.
//! Admission correctness never depends on this transition.

use anyhow::{Context as _, Result};
use clap::Args;
use std::sync::Arc;

use doc_pipeline_intake::IntakeLedger;
use doc_pipeline_storage::{DynamoLedgerStore, LedgerConfig};

#[derive(Args)]
pub struct MarkFailedCommand {
    /// Document basename the job belongs to
    #[arg(short, long)]
    basename: String,

    /// Job to annotate
    #[arg(short, long)]
    job_id: String,
}

impl MarkFailedCommand {
    pub async fn execute(self) -> Result<()> {
        let store = Arc::new(
            DynamoLedgerStore::new(LedgerConfig::default())
                .await
                .context("Failed to create DynamoDB client")?,
        );
        let ledger = IntakeLedger::new(store);

        ledger.mark_failed(&self.basename, &self.job_id).await?;

        println!(
            "✓ Marked job {} as FAILED for document {}",
            self.job_id, self.basename
        );
        Ok(())
    }
}
