//! Idempotent admission under concurrency, lock expiry, and content change
//!
//! A (basename, fingerprint) pair admits exactly once while its lock lives;
//! expiry and changed content both mint fresh jobs.

use std::sync::Arc;

use doc_pipeline_intake::{IntakeConfig, IntakeCoordinator, IntakeOutcome, Trigger};
use doc_pipeline_storage::{LedgerStore, MemoryLedgerStore, MemoryObjectStore, ObjectStore};

const DOCX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

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

fn trigger() -> Trigger {
    Trigger {
        bucket: "doc-ingest".to_string(),
        key: "intake-raw/provisioning.docx".to_string(),
        etag: None,
        size: None,
    }
}

async fn seed(objects: &MemoryObjectStore, content: &[u8]) {
    objects
        .put_object(
            "doc-ingest",
            "intake-raw/provisioning.docx",
            content,
            DOCX_CONTENT_TYPE,
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_concurrent_identical_admissions_stage_once() {
    let (coordinator, objects, ledger) = coordinator();
    seed(&objects, b"chapter content").await;

    let mut handles = Vec::with_capacity(8);
    for _ in 0..8 {
        let coordinator = coordinator.clone();
        handles.push(tokio::spawn(async move {
            coordinator.admit(&trigger()).await
        }));
    }

    let mut staged = 0;
    let mut duplicates = 0;
    for handle in handles {
        match handle.await.unwrap().unwrap() {
            IntakeOutcome::Staged { .. } => staged += 1,
            IntakeOutcome::Duplicate { basename } => {
                assert_eq!(basename, "provisioning");
                duplicates += 1;
            }
            other => panic!("Unexpected outcome: {other:?}"),
        }
    }

    assert_eq!(staged, 1);
    assert_eq!(duplicates, 7);

    let staged_keys = objects.list_objects("doc-ingest", "staged/").await.unwrap();
    assert_eq!(staged_keys.len(), 1);

    // One lock and one job record
    assert_eq!(ledger.item_count().await, 2);
}

#[tokio::test]
async fn test_lock_expiry_allows_restaging() {
    let (coordinator, objects, ledger) = coordinator();
    seed(&objects, b"chapter content").await;

    let first = coordinator.admit(&trigger()).await.unwrap();
    let first_job = match first {
        IntakeOutcome::Staged { job, .. } => job,
        other => panic!("Expected staged outcome, got {other:?}"),
    };

    // Within the ttl the lock suppresses the retry
    let second = coordinator.admit(&trigger()).await.unwrap();
    assert!(matches!(second, IntakeOutcome::Duplicate { .. }));

    ledger.advance(601).await;

    let third = coordinator.admit(&trigger()).await.unwrap();
    let third_job = match third {
        IntakeOutcome::Staged { job, .. } => job,
        other => panic!("Expected staged outcome after expiry, got {other:?}"),
    };

    assert_ne!(first_job.job_id, third_job.job_id);
    assert_ne!(first_job.staged_key, third_job.staged_key);

    let staged_keys = objects.list_objects("doc-ingest", "staged/").await.unwrap();
    assert_eq!(staged_keys.len(), 2);

    let jobs = coordinator
        .ledger()
        .jobs_for_document("provisioning")
        .await
        .unwrap();
    assert_eq!(jobs.len(), 2);
}

#[tokio::test]
async fn test_changed_content_restages_under_new_fingerprint() {
    let (coordinator, objects, _ledger) = coordinator();
    seed(&objects, b"first revision").await;

    let first = coordinator.admit(&trigger()).await.unwrap();
    assert!(matches!(first, IntakeOutcome::Staged { .. }));

    // Same basename, new bytes: a different fingerprint, admitted while the
    // old lock is still live
    seed(&objects, b"second revision").await;

    let second = coordinator.admit(&trigger()).await.unwrap();
    let job = match second {
        IntakeOutcome::Staged { job, .. } => job,
        other => panic!("Expected staged outcome for new content, got {other:?}"),
    };

    let staged = objects
        .get_object("doc-ingest", &job.staged_key)
        .await
        .unwrap();
    assert_eq!(staged, b"second revision");

    let jobs = coordinator
        .ledger()
        .jobs_for_document("provisioning")
        .await
        .unwrap();
    assert_eq!(jobs.len(), 2);
}
