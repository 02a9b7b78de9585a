//! Intake ledger
//!
//! Domain wrapper over the ledger store. Two item families share the table:
//! idempotency locks under `IDEMPOTENCY#{basename}` / `HASH#{fingerprint}`
//! and admission job records under `DOC#{basename}` / `JOB#{job_id}`.

use crate::error::{IntakeError, IntakeResult};
use doc_pipeline_storage::{LedgerError, LedgerItem, LedgerKey, LedgerResult, LedgerStore};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// State of an admission attempt
///
/// Records only ever hold `Staged` (written at creation) or `Failed`
/// (best-effort annotation). `DuplicateSuppressed` is a terminal attempt
/// outcome and is never written to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Staged,
    Failed,
    DuplicateSuppressed,
}

impl JobState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Staged => "STAGED",
            JobState::Failed => "FAILED",
            JobState::DuplicateSuppressed => "DUPLICATE_SUPPRESSED",
        }
    }
}

/// Admission job record, created once per successful staging
///
/// All fields except `state` and `updated_at` are immutable after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdmissionJob {
    pub doc_basename: String,
    pub job_id: String,
    pub state: JobState,
    pub source_bucket: String,
    pub source_key: String,
    pub staged_bucket: String,
    pub staged_key: String,
    pub source_etag: String,
    pub source_sha256: Option<String>,
    pub content_length: u64,
    pub purpose: Option<String>,
    pub labels: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Partition/sort key of an idempotency lock
#[must_use]
pub fn lock_key(basename: &str, fingerprint: &str) -> LedgerKey {
    LedgerKey::new(
        format!("IDEMPOTENCY#{}", basename),
        format!("HASH#{}", fingerprint),
    )
}

/// Partition/sort key of an admission job record
#[must_use]
pub fn job_key(basename: &str, job_id: &str) -> LedgerKey {
    LedgerKey::new(format!("DOC#{}", basename), format!("JOB#{}", job_id))
}

/// UTC timestamp at second resolution
#[must_use]
pub fn now_utc_iso() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

pub(crate) fn to_item<T: Serialize>(record: &T) -> LedgerResult<LedgerItem> {
    match serde_json::to_value(record) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(LedgerError::SerializationError(format!(
            "Record did not serialize to an object: {}",
            other
        ))),
        Err(e) => Err(LedgerError::SerializationError(e.to_string())),
    }
}

fn from_item<T: for<'de> Deserialize<'de>>(item: LedgerItem) -> LedgerResult<T> {
    serde_json::from_value(Value::Object(item))
        .map_err(|e| LedgerError::SerializationError(e.to_string()))
}

/// Ledger operations scoped to admission jobs
#[derive(Clone)]
pub struct IntakeLedger {
    store: Arc<dyn LedgerStore>,
}

impl IntakeLedger {
    #[must_use]
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Create the job record; the key must be vacant
    pub async fn create_job(&self, job: &AdmissionJob) -> IntakeResult<()> {
        let key = job_key(&job.doc_basename, &job.job_id);
        let item = to_item(job).map_err(|e| IntakeError::LedgerWrite(e.to_string()))?;

        self.store
            .put_if_absent(&key, item)
            .await
            .map_err(|e| IntakeError::LedgerWrite(e.to_string()))?;

        tracing::info!("Intake record created: {} / {}", key.pk, key.sk);
        Ok(())
    }

    /// Fetch a single admission job
    pub async fn get_job(&self, basename: &str, job_id: &str) -> IntakeResult<Option<AdmissionJob>> {
        let key = job_key(basename, job_id);
        let item = self
            .store
            .get(&key)
            .await
            .map_err(|e| IntakeError::LedgerRead(e.to_string()))?;

        match item {
            Some(item) => from_item(item)
                .map(Some)
                .map_err(|e| IntakeError::LedgerRead(e.to_string())),
            None => Ok(None),
        }
    }

    /// All admission jobs recorded for a document, in job id order
    pub async fn jobs_for_document(&self, basename: &str) -> IntakeResult<Vec<AdmissionJob>> {
        let items = self
            .store
            .query(&format!("DOC#{}", basename), "JOB#")
            .await
            .map_err(|e| IntakeError::LedgerRead(e.to_string()))?;

        items
            .into_iter()
            .map(|item| from_item(item).map_err(|e| IntakeError::LedgerRead(e.to_string())))
            .collect()
    }

    /// Annotate an existing job record as failed
    ///
    /// Operational bookkeeping only; admission correctness never depends on
    /// this transition.
    pub async fn mark_failed(&self, basename: &str, job_id: &str) -> IntakeResult<()> {
        let key = job_key(basename, job_id);
        self.store
            .set_state(&key, JobState::Failed.as_str(), &now_utc_iso())
            .await
            .map_err(|e| IntakeError::LedgerWrite(e.to_string()))
    }
}
