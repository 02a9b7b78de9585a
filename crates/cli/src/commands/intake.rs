//! Intake command - admit one raw document into the staging area
//!
//! Accepts either a direct bucket/key pair or a recorded object-created
//! event file, runs the admission flow, and prints the terminal outcome.

use anyhow::{Context as _, Result};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;

use doc_pipeline_intake::{IntakeConfig, IntakeCoordinator, Trigger, TriggerEvent};
use doc_pipeline_storage::{DynamoLedgerStore, LedgerConfig, S3Config, S3ObjectStore};

#[derive(Args)]
pub struct IntakeCommand {
    /// Bucket holding the uploaded document
    #[arg(short, long)]
    bucket: Option<String>,

    /// Object key of the uploaded document
    #[arg(short, long)]
    key: Option<String>,

    /// Read the trigger from a JSON event file instead
    #[arg(long, value_name = "FILE")]
    event: Option<PathBuf>,
}

impl IntakeCommand {
    pub async fn execute(self) -> Result<()> {
        let config = IntakeConfig::from_env().context("Invalid intake configuration")?;
        let trigger = self.resolve_trigger()?;

        let objects = Arc::new(
            S3ObjectStore::new(S3Config::default())
                .await
                .context("Failed to create S3 client")?,
        );
        let ledger_config = LedgerConfig {
            table_name: config.ledger_table_name.clone(),
            ..LedgerConfig::default()
        };
        let ledger = Arc::new(
            DynamoLedgerStore::new(ledger_config)
                .await
                .context("Failed to create DynamoDB client")?,
        );

        let coordinator = IntakeCoordinator::new(config, objects, ledger);
        let outcome = coordinator.admit(&trigger).await?;

        println!("{}", serde_json::to_string_pretty(&outcome.response_json())?);
        Ok(())
    }

    /// Build the admission trigger from the command arguments
    fn resolve_trigger(&self) -> Result<Trigger> {
        if let Some(path) = &self.event {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read event file {}", path.display()))?;
            let event: TriggerEvent = serde_json::from_str(&raw)
                .with_context(|| format!("Invalid trigger event in {}", path.display()))?;
            return Ok(event.into_trigger());
        }

        match (&self.bucket, &self.key) {
            (Some(bucket), Some(key)) => Ok(Trigger {
                bucket: bucket.clone(),
                key: key.clone(),
                etag: None,
                size: None,
            }),
            _ => anyhow::bail!("Either --event or both --bucket and --key are required"),
        }
    }
}
