//! Idempotency guard
//!
//! One short-lived lock item per (basename, fingerprint) pair gates
//! duplicate admission. Acquisition is a single conditional create at the
//! ledger; there is no read-then-write window. Expiry is the store's
//! concern entirely, so a leaked lock heals itself when its ttl passes.

use crate::error::{IntakeError, IntakeResult};
use crate::ledger::{lock_key, now_utc_iso, to_item};
use doc_pipeline_storage::{LedgerError, LedgerStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Outcome of a lock attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockAttempt {
    /// This attempt owns the lock and must stage the document
    Acquired,
    /// An unexpired lock already covers this (basename, fingerprint)
    AlreadyHeld,
}

/// Idempotency lock item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockRecord {
    pub basename: String,
    pub doc_hash: String,
    pub created_at: String,

    /// Absolute expiry in epoch seconds, enforced by the store
    pub ttl: i64,

    pub source_bucket: String,
    pub source_key: String,
}

impl LockRecord {
    #[must_use]
    pub fn new(
        basename: &str,
        fingerprint: &str,
        source_bucket: &str,
        source_key: &str,
        ttl_seconds: i64,
    ) -> Self {
        Self {
            basename: basename.to_string(),
            doc_hash: fingerprint.to_string(),
            created_at: now_utc_iso(),
            ttl: chrono::Utc::now().timestamp() + ttl_seconds,
            source_bucket: source_bucket.to_string(),
            source_key: source_key.to_string(),
        }
    }
}

/// Takes and releases idempotency locks against the ledger store
#[derive(Clone)]
pub struct IdempotencyGuard {
    store: Arc<dyn LedgerStore>,
}

impl IdempotencyGuard {
    #[must_use]
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Try to take the lock described by the record
    pub async fn acquire(&self, record: &LockRecord) -> IntakeResult<LockAttempt> {
        let key = lock_key(&record.basename, &record.doc_hash);
        let item = to_item(record).map_err(|e| IntakeError::LockWrite(e.to_string()))?;

        match self.store.put_if_absent(&key, item).await {
            Ok(()) => {
                tracing::info!(
                    "Idempotency lock created for {} {}",
                    record.basename,
                    record.doc_hash
                );
                Ok(LockAttempt::Acquired)
            }
            Err(LedgerError::AlreadyExists) => {
                tracing::info!(
                    "Duplicate intake suppressed for {} {}",
                    record.basename,
                    record.doc_hash
                );
                Ok(LockAttempt::AlreadyHeld)
            }
            Err(e) => Err(IntakeError::LockWrite(e.to_string())),
        }
    }

    /// Best-effort release; failures are logged and swallowed
    pub async fn release(&self, basename: &str, fingerprint: &str) {
        let key = lock_key(basename, fingerprint);
        if let Err(e) = self.store.delete(&key).await {
            tracing::warn!(
                "Failed to release idempotency lock {}/{}: {}",
                key.pk,
                key.sk,
                e
            );
        }
    }
}
