//! Repository seams the workflow engine runs against.
//!
//! The engine never talks to a storage technology directly. A commit is one
//! compare-and-swap on the document's `version` plus the append of its audit
//! entries; implementations must make those two effects visible together or
//! not at all.

use async_trait::async_trait;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::audit::AuditEntry;
use crate::models::document::Document;

pub mod memory;
pub mod postgres;

/// Result of a versioned write.
#[derive(Debug)]
pub enum Commit {
    /// Stored. Carries the document with its bumped version and the audit
    /// entries with their assigned sequence numbers.
    Applied {
        document: Document,
        audit: Vec<AuditEntry>,
    },
    /// Someone else committed first; nothing was written.
    Conflict,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Store a fresh draft (version 0).
    async fn insert(&self, document: &Document) -> Result<(), AppError>;

    async fn get(&self, id: Uuid) -> Result<Option<Document>, AppError>;

    /// Replace `document` if the stored version still equals
    /// `expected_version`, appending `audit` in the same unit of work.
    async fn commit(
        &self,
        document: &Document,
        expected_version: i64,
        audit: Vec<AuditEntry>,
    ) -> Result<Commit, AppError>;

    /// In-review documents with a pending step assigned to (or snapshotted
    /// for) any of `user_ids`.
    async fn awaiting(&self, user_ids: &[Uuid]) -> Result<Vec<Document>, AppError>;
}

#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Append one entry outside any document commit. Returns it with its
    /// sequence number.
    async fn append(&self, entry: AuditEntry) -> Result<AuditEntry, AppError>;

    /// Entries for `resource_id` in sequence order.
    async fn page(
        &self,
        resource_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<AuditEntry>, AppError>;
}
