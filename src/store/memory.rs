//! In-process repository. Documents are sharded by id in a `DashMap`, so
//! commits on different documents never wait on each other; a commit holds
//! only its own document's slot while it checks the version and appends the
//! audit entries.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use super::{AuditStore, Commit, DocumentStore};
use crate::errors::AppError;
use crate::models::audit::AuditEntry;
use crate::models::document::{Document, DocumentState};

#[derive(Clone, Default)]
pub struct MemoryStore {
    documents: Arc<DashMap<Uuid, Document>>,
    audit: Arc<DashMap<Uuid, Vec<AuditEntry>>>,
    seq: Arc<AtomicI64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamp and push under the resource's entry lock so sequence order and
    /// vector order agree.
    fn push(&self, mut entry: AuditEntry) -> AuditEntry {
        let mut log = self.audit.entry(entry.resource_id).or_default();
        entry.seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        log.push(entry.clone());
        entry
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn insert(&self, document: &Document) -> Result<(), AppError> {
        if self.documents.contains_key(&document.id) {
            return Err(AppError::Validation(format!(
                "document {} already exists",
                document.id
            )));
        }
        self.documents.insert(document.id, document.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Document>, AppError> {
        Ok(self.documents.get(&id).map(|d| d.value().clone()))
    }

    async fn commit(
        &self,
        document: &Document,
        expected_version: i64,
        audit: Vec<AuditEntry>,
    ) -> Result<Commit, AppError> {
        let mut slot = self
            .documents
            .get_mut(&document.id)
            .ok_or_else(|| AppError::not_found("document", document.id))?;

        if slot.version != expected_version {
            return Ok(Commit::Conflict);
        }

        let mut stored = document.clone();
        stored.version = expected_version + 1;
        let audit: Vec<AuditEntry> = audit.into_iter().map(|e| self.push(e)).collect();
        *slot = stored.clone();

        Ok(Commit::Applied {
            document: stored,
            audit,
        })
    }

    async fn awaiting(&self, user_ids: &[Uuid]) -> Result<Vec<Document>, AppError> {
        let mut out: Vec<Document> = self
            .documents
            .iter()
            .filter(|d| d.state == DocumentState::InReview)
            .filter(|d| {
                d.line.iter().any(|s| {
                    s.is_pending()
                        && (user_ids.contains(&s.assignee_id) || user_ids.contains(&s.approver_id))
                })
            })
            .map(|d| d.value().clone())
            .collect();
        out.sort_by_key(|d| d.submitted_at);
        Ok(out)
    }
}

#[async_trait]
impl AuditStore for MemoryStore {
    async fn append(&self, entry: AuditEntry) -> Result<AuditEntry, AppError> {
        Ok(self.push(entry))
    }

    async fn page(
        &self,
        resource_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<AuditEntry>, AppError> {
        if offset < 0 || limit < 0 {
            return Err(AppError::Validation("offset and limit must be non-negative".into()));
        }
        Ok(self
            .audit
            .get(&resource_id)
            .map(|log| {
                log.iter()
                    .skip(offset as usize)
                    .take(limit as usize)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}
