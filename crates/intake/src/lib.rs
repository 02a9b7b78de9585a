//! Document intake and staging
//!
//! Admits arriving documents into the pipeline exactly once. An admission
//! attempt validates the trigger, fingerprints the content, takes a
//! short-lived idempotency lock, commits a job-scoped staged copy, and
//! records the admission job in the ledger. On any failure after lock
//! acquisition the attempt unwinds its own side effects before surfacing
//! the error, so a failed attempt leaves no visible trace.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use doc_pipeline_intake::{IntakeConfig, IntakeCoordinator, TriggerEvent};
//! use doc_pipeline_storage::{MemoryLedgerStore, MemoryObjectStore};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let coordinator = IntakeCoordinator::new(
//!     IntakeConfig::default(),
//!     Arc::new(MemoryObjectStore::new()),
//!     Arc::new(MemoryLedgerStore::new()),
//! );
//!
//! let event: TriggerEvent =
//!     serde_json::from_str(r#"{"bucket":"intake","key":"intake-raw/chapter_1.docx"}"#)?;
//! let outcome = coordinator.admit(&event.into_trigger()).await?;
//! println!("{}", outcome.response_json());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod coordinator;
pub mod error;
pub mod fingerprint;
pub mod guard;
pub mod ledger;
pub mod staging;
pub mod trigger;

pub use config::{ConfigError, IntakeConfig};
pub use coordinator::{IntakeCoordinator, IntakeOutcome, SkipReason};
pub use error::{IntakeError, IntakeResult};
pub use guard::{IdempotencyGuard, LockAttempt, LockRecord};
pub use ledger::{job_key, lock_key, now_utc_iso, AdmissionJob, IntakeLedger, JobState};
pub use staging::{staged_key, StagingCommitter};
pub use trigger::{Trigger, TriggerEvent};
