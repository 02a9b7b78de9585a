//! Intake coordinator
//!
//! Drives one admission attempt through validation, fingerprinting, lock
//! acquisition, staging and recording. Undo actions are pushed as each
//! step succeeds and run in reverse when a later step fails: a staging
//! failure releases the lock, a ledger failure deletes the staged copy and
//! then releases the lock. Compensation failures are logged and swallowed;
//! the original failure always propagates.

use crate::config::IntakeConfig;
use crate::error::{IntakeError, IntakeResult};
use crate::fingerprint::{content_sha256, resolve_fingerprint};
use crate::guard::{IdempotencyGuard, LockAttempt, LockRecord};
use crate::ledger::{now_utc_iso, AdmissionJob, IntakeLedger, JobState};
use crate::staging::{staged_key, StagingCommitter};
use crate::trigger::Trigger;
use doc_pipeline_common::key_stem;
use doc_pipeline_storage::{LedgerStore, ObjectStore};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Why a trigger was rejected before any store access
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    SuffixMismatch,
    PrefixMismatch,
}

impl SkipReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SkipReason::SuffixMismatch => "suffix_mismatch",
            SkipReason::PrefixMismatch => "prefix_mismatch",
        }
    }
}

/// Terminal outcome of one admission attempt
#[derive(Debug, Clone, PartialEq)]
pub enum IntakeOutcome {
    /// The document was admitted and durably staged
    Staged { job: AdmissionJob, elapsed_sec: f64 },

    /// An unexpired lock already covers this (basename, fingerprint);
    /// nothing was created
    Duplicate { basename: String },

    /// The trigger failed validation; nothing was examined or written
    Skipped { reason: SkipReason, key: String },
}

impl IntakeOutcome {
    /// Stable JSON shape reported to callers
    #[must_use]
    pub fn response_json(&self) -> Value {
        match self {
            IntakeOutcome::Staged { job, elapsed_sec } => json!({
                "ok": true,
                "state": "STAGED",
                "job_id": job.job_id,
                "doc_basename": job.doc_basename,
                "bucket": job.staged_bucket,
                "staged_key": job.staged_key,
                "source_key": job.source_key,
                "labels": job.labels,
                "purpose": job.purpose,
                "elapsed_sec": elapsed_sec,
            }),
            IntakeOutcome::Duplicate { basename } => json!({
                "skipped": true,
                "reason": "duplicate",
                "basename": basename,
            }),
            IntakeOutcome::Skipped { reason, key } => json!({
                "skipped": true,
                "reason": reason.as_str(),
                "key": key,
            }),
        }
    }
}

enum Undo {
    ReleaseLock { basename: String, fingerprint: String },
    DeleteStaged { bucket: String, staged_key: String },
}

/// Coordinates admission attempts over injected store adapters
///
/// Attempts are independent and stateless; any number may run concurrently,
/// including for identical documents. Isolation comes entirely from the
/// ledger's atomic conditional write.
#[derive(Clone)]
pub struct IntakeCoordinator {
    config: IntakeConfig,
    objects: Arc<dyn ObjectStore>,
    guard: IdempotencyGuard,
    committer: StagingCommitter,
    ledger: IntakeLedger,
}

impl IntakeCoordinator {
    #[must_use]
    pub fn new(
        config: IntakeConfig,
        objects: Arc<dyn ObjectStore>,
        ledger: Arc<dyn LedgerStore>,
    ) -> Self {
        Self {
            guard: IdempotencyGuard::new(Arc::clone(&ledger)),
            committer: StagingCommitter::new(Arc::clone(&objects)),
            ledger: IntakeLedger::new(ledger),
            objects,
            config,
        }
    }

    /// Ledger access for inspection commands
    #[must_use]
    pub fn ledger(&self) -> &IntakeLedger {
        &self.ledger
    }

    /// Run one admission attempt to a terminal outcome
    pub async fn admit(&self, trigger: &Trigger) -> IntakeResult<IntakeOutcome> {
        let start = Instant::now();

        if !trigger.key.to_lowercase().ends_with(&self.config.accept_suffix) {
            tracing::info!("Skip non-{}: {}", self.config.accept_suffix, trigger.key);
            return Ok(IntakeOutcome::Skipped {
                reason: SkipReason::SuffixMismatch,
                key: trigger.key.clone(),
            });
        }

        if !trigger.key.starts_with(&self.config.raw_prefix) {
            tracing::info!("Skip key outside {}: {}", self.config.raw_prefix, trigger.key);
            return Ok(IntakeOutcome::Skipped {
                reason: SkipReason::PrefixMismatch,
                key: trigger.key.clone(),
            });
        }

        let basename = key_stem(&trigger.key).to_string();
        let job_id = Uuid::now_v7().to_string();
        let staged_key = staged_key(
            &self.config.staged_prefix,
            &self.config.accept_suffix,
            &basename,
            &job_id,
        );

        // Provenance and user metadata first; the body only when hashing is on
        let head = self
            .objects
            .head_object(&trigger.bucket, &trigger.key)
            .await
            .map_err(|e| {
                IntakeError::HeadObject(format!("s3://{}/{}: {}", trigger.bucket, trigger.key, e))
            })?;

        let purpose = head.metadata.get("purpose").cloned();
        let labels: Vec<String> = head
            .metadata
            .get("labels")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|label| !label.is_empty())
                    .map(std::string::ToString::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let source_etag = head
            .etag
            .as_deref()
            .map(|tag| tag.trim_matches('"').to_string())
            .filter(|tag| !tag.is_empty())
            .or_else(|| trigger.etag.clone())
            .unwrap_or_default();

        let content_length = if head.content_length > 0 {
            head.content_length
        } else {
            trigger.size.unwrap_or(0)
        };

        let source_sha256 = if self.config.compute_content_hash {
            let body = self
                .objects
                .get_object(&trigger.bucket, &trigger.key)
                .await
                .map_err(|e| {
                    IntakeError::GetObject(format!(
                        "s3://{}/{}: {}",
                        trigger.bucket, trigger.key, e
                    ))
                })?;
            Some(content_sha256(&body))
        } else {
            None
        };

        let fingerprint = resolve_fingerprint(source_sha256.as_deref(), &source_etag, content_length);

        let mut undo: Vec<Undo> = Vec::new();

        let lock = LockRecord::new(
            &basename,
            &fingerprint,
            &trigger.bucket,
            &trigger.key,
            self.config.idempotency_ttl_seconds,
        );
        match self.guard.acquire(&lock).await? {
            LockAttempt::Acquired => undo.push(Undo::ReleaseLock {
                basename: basename.clone(),
                fingerprint: fingerprint.clone(),
            }),
            LockAttempt::AlreadyHeld => {
                return Ok(IntakeOutcome::Duplicate { basename });
            }
        }

        if let Err(e) = self
            .committer
            .stage(&trigger.bucket, &trigger.key, &staged_key)
            .await
        {
            self.run_undo(undo).await;
            return Err(e);
        }
        undo.push(Undo::DeleteStaged {
            bucket: trigger.bucket.clone(),
            staged_key: staged_key.clone(),
        });

        let created_at = now_utc_iso();
        let job = AdmissionJob {
            doc_basename: basename,
            job_id,
            state: JobState::Staged,
            source_bucket: trigger.bucket.clone(),
            source_key: trigger.key.clone(),
            staged_bucket: trigger.bucket.clone(),
            staged_key,
            source_etag,
            source_sha256,
            content_length,
            purpose,
            labels,
            updated_at: created_at.clone(),
            created_at,
        };

        if let Err(e) = self.ledger.create_job(&job).await {
            self.run_undo(undo).await;
            return Err(e);
        }

        let elapsed_sec = (start.elapsed().as_secs_f64() * 1000.0).round() / 1000.0;
        Ok(IntakeOutcome::Staged { job, elapsed_sec })
    }

    /// Run compensation actions in reverse acquisition order
    async fn run_undo(&self, undo: Vec<Undo>) {
        for action in undo.into_iter().rev() {
            match action {
                Undo::DeleteStaged { bucket, staged_key } => {
                    self.committer.discard(&bucket, &staged_key).await;
                }
                Undo::ReleaseLock {
                    basename,
                    fingerprint,
                } => {
                    self.guard.release(&basename, &fingerprint).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use doc_pipeline_storage::{MemoryLedgerStore, MemoryObjectStore};
    use std::collections::HashMap;

    fn coordinator() -> (
        IntakeCoordinator,
        Arc<MemoryObjectStore>,
        Arc<MemoryLedgerStore>,
    ) {
        let objects = Arc::new(MemoryObjectStore::new());
        let ledger = Arc::new(MemoryLedgerStore::new());
        let coordinator = IntakeCoordinator::new(
            IntakeConfig::default(),
            Arc::clone(&objects) as Arc<dyn ObjectStore>,
            Arc::clone(&ledger) as Arc<dyn LedgerStore>,
        );
        (coordinator, objects, ledger)
    }

    fn trigger(key: &str) -> Trigger {
        Trigger {
            bucket: "intake".to_string(),
            key: key.to_string(),
            etag: None,
            size: None,
        }
    }

    #[tokio::test]
    async fn test_admit_stages_and_records() {
        let (coordinator, objects, _) = coordinator();

        let mut metadata = HashMap::new();
        metadata.insert("purpose".to_string(), "print".to_string());
        metadata.insert("labels".to_string(), "draft, v2".to_string());
        objects
            .put_with_metadata("intake", "intake-raw/provisioning.docx", b"doc body", metadata)
            .await;

        let outcome = coordinator
            .admit(&trigger("intake-raw/provisioning.docx"))
            .await
            .unwrap();

        match outcome {
            IntakeOutcome::Staged { job, .. } => {
                assert_eq!(job.doc_basename, "provisioning");
                assert_eq!(job.state, JobState::Staged);
                assert_eq!(
                    job.staged_key,
                    format!("staged/provisioning/{}/source.docx", job.job_id)
                );
                assert_eq!(job.purpose.as_deref(), Some("print"));
                assert_eq!(job.labels, vec!["draft".to_string(), "v2".to_string()]);
                assert_eq!(job.content_length, 8);
                assert!(job.source_sha256.is_some());
                assert!(objects.contains("intake", &job.staged_key).await);
            }
            other => panic!("expected Staged, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_identical_second_admit_is_duplicate() {
        let (coordinator, objects, _) = coordinator();
        objects
            .put_with_metadata("intake", "intake-raw/provisioning.docx", b"doc body", HashMap::new())
            .await;

        let first = coordinator
            .admit(&trigger("intake-raw/provisioning.docx"))
            .await
            .unwrap();
        assert!(matches!(first, IntakeOutcome::Staged { .. }));

        let second = coordinator
            .admit(&trigger("intake-raw/provisioning.docx"))
            .await
            .unwrap();
        assert_eq!(
            second,
            IntakeOutcome::Duplicate {
                basename: "provisioning".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_suffix_mismatch_touches_nothing() {
        let (coordinator, objects, ledger) = coordinator();

        let outcome = coordinator
            .admit(&trigger("intake-raw/notes.pdf"))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            IntakeOutcome::Skipped {
                reason: SkipReason::SuffixMismatch,
                key: "intake-raw/notes.pdf".to_string()
            }
        );
        assert_eq!(objects.object_count().await, 0);
        assert_eq!(ledger.item_count().await, 0);
    }

    #[tokio::test]
    async fn test_response_json_shapes() {
        let (coordinator, objects, _) = coordinator();
        objects
            .put_with_metadata("intake", "intake-raw/provisioning.docx", b"doc body", HashMap::new())
            .await;

        let staged = coordinator
            .admit(&trigger("intake-raw/provisioning.docx"))
            .await
            .unwrap();
        let response = staged.response_json();
        assert_eq!(response["ok"], json!(true));
        assert_eq!(response["state"], json!("STAGED"));
        assert_eq!(response["doc_basename"], json!("provisioning"));
        assert_eq!(response["purpose"], json!(null));

        let duplicate = coordinator
            .admit(&trigger("intake-raw/provisioning.docx"))
            .await
            .unwrap();
        assert_eq!(
            duplicate.response_json(),
            json!({"skipped": true, "reason": "duplicate", "basename": "provisioning"})
        );

        let skipped = coordinator.admit(&trigger("other/notes.docx")).await.unwrap();
        assert_eq!(
            skipped.response_json(),
            json!({"skipped": true, "reason": "prefix_mismatch", "key": "other/notes.docx"})
        );
    }
}
