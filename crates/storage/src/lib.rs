//! Storage layer for the document intake pipeline
//!
//! This module provides interfaces and implementations for the two stores the
//! pipeline depends on:
//! - **Object Storage (S3/MinIO)**: Raw documents, staged copies, extracted
//!   images, OCR text, generated markdown
//! - **Ledger Storage (DynamoDB)**: Idempotency locks and admission job
//!   records keyed by a composite (PK, SK) pair
//!
//! Both stores are exposed as traits so components take `Arc<dyn ObjectStore>`
//! / `Arc<dyn LedgerStore>` and tests substitute the in-memory fakes.
//!
//! # Example
//!
//! ```rust,no_run
//! use doc_pipeline_storage::{ObjectStore, S3Config, S3ObjectStore, StorageResult};
//!
//! #[tokio::main]
//! async fn main() -> StorageResult<()> {
//!     let storage = S3ObjectStore::new(S3Config::default()).await?;
//!
//!     let head = storage.head_object("intake", "intake-raw/chapter_1.docx").await?;
//!     println!("{} bytes", head.content_length);
//!
//!     Ok(())
//! }
//! ```

use thiserror::Error;

pub mod ledger_store;
pub mod object_store;

pub use ledger_store::{
    DynamoLedgerStore, LedgerConfig, LedgerItem, LedgerKey, LedgerStore, MemoryLedgerStore,
};
pub use object_store::{MemoryObjectStore, ObjectHead, ObjectStore, S3Config, S3ObjectStore};

/// Object storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("S3 error: {0}")]
    S3Error(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(String),
}

/// Result type for object storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Ledger storage errors
#[derive(Error, Debug)]
pub enum LedgerError {
    /// The conditional write found the key already occupied
    #[error("Item already exists")]
    AlreadyExists,

    #[error("Item not found: {0}")]
    NotFound(String),

    #[error("DynamoDB error: {0}")]
    DynamoError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Other error: {0}")]
    Other(String),
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;
