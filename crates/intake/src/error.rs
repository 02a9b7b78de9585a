//! Intake errors
//!
//! Head, get and lock failures occur before anything was created, so the
//! caller can retry freely. Staging and ledger write failures occur while
//! the lock is held; they are surfaced only after compensation has run.

use thiserror::Error;

/// Errors surfaced by an admission attempt
#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("head_object failed: {0}")]
    HeadObject(String),

    #[error("get_object failed: {0}")]
    GetObject(String),

    #[error("Lock write failed: {0}")]
    LockWrite(String),

    #[error("Staging copy failed: {0}")]
    StagingCopy(String),

    #[error("Ledger write failed: {0}")]
    LedgerWrite(String),

    #[error("Ledger read failed: {0}")]
    LedgerRead(String),
}

impl IntakeError {
    /// True when the failure occurred before anything was created, so a
    /// plain retry is always safe
    #[must_use]
    pub fn is_dependency_error(&self) -> bool {
        matches!(
            self,
            Self::HeadObject(_) | Self::GetObject(_) | Self::LockWrite(_) | Self::LedgerRead(_)
        )
    }
}

/// Result type for intake operations
pub type IntakeResult<T> = Result<T, IntakeError>;
