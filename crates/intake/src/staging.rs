//! Staging committer
//!
//! Durably commits an admitted document to its job-scoped staging path with
//! a server-side copy, user metadata preserved. The destination embeds the
//! job id, so no two attempts ever write the same path and a staged object
//! is never overwritten.

use crate::error::{IntakeError, IntakeResult};
use doc_pipeline_storage::ObjectStore;
use std::sync::Arc;

/// Destination path for a job's staged copy
#[must_use]
pub fn staged_key(staged_prefix: &str, accept_suffix: &str, basename: &str, job_id: &str) -> String {
    format!("{}{}/{}/source{}", staged_prefix, basename, job_id, accept_suffix)
}

/// Commits and discards staged copies
#[derive(Clone)]
pub struct StagingCommitter {
    store: Arc<dyn ObjectStore>,
}

impl StagingCommitter {
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Server-side copy into the staging area
    pub async fn stage(&self, bucket: &str, source_key: &str, staged_key: &str) -> IntakeResult<()> {
        self.store
            .copy_object(bucket, source_key, bucket, staged_key)
            .await
            .map_err(|e| IntakeError::StagingCopy(e.to_string()))?;

        tracing::info!("Staged to s3://{}/{}", bucket, staged_key);
        Ok(())
    }

    /// Best-effort removal of a staged copy; failures are logged and swallowed
    pub async fn discard(&self, bucket: &str, staged_key: &str) {
        if let Err(e) = self.store.delete_object(bucket, staged_key).await {
            tracing::warn!(
                "Failed to delete staged object s3://{}/{}: {}",
                bucket,
                staged_key,
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use doc_pipeline_storage::MemoryObjectStore;

    #[test]
    fn test_staged_key_layout() {
        assert_eq!(
            staged_key("staged/", ".docx", "provisioning", "job-1"),
            "staged/provisioning/job-1/source.docx"
        );
    }

    #[tokio::test]
    async fn test_stage_and_discard() {
        let store = Arc::new(MemoryObjectStore::new());
        store
            .put_object("intake", "intake-raw/provisioning.docx", b"doc", "application/octet-stream")
            .await
            .unwrap();

        let committer = StagingCommitter::new(Arc::clone(&store) as Arc<dyn ObjectStore>);
        committer
            .stage("intake", "intake-raw/provisioning.docx", "staged/provisioning/job-1/source.docx")
            .await
            .unwrap();
        assert!(store.contains("intake", "staged/provisioning/job-1/source.docx").await);

        committer.discard("intake", "staged/provisioning/job-1/source.docx").await;
        assert!(!store.contains("intake", "staged/provisioning/job-1/source.docx").await);
    }

    #[tokio::test]
    async fn test_stage_failure_surfaces() {
        let store = Arc::new(MemoryObjectStore::new());
        let committer = StagingCommitter::new(Arc::clone(&store) as Arc<dyn ObjectStore>);

        // No source object present
        let err = committer
            .stage("intake", "intake-raw/missing.docx", "staged/missing/job-1/source.docx")
            .await
            .unwrap_err();
        assert!(matches!(err, IntakeError::StagingCopy(_)));
    }
}
