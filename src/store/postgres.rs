use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{AuditStore, Commit, DocumentStore};
use crate::errors::AppError;
use crate::models::audit::{AuditAction, AuditEntry, ResourceType};
use crate::models::document::{Document, DocumentState};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run pending migrations from the migrations/ directory.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

const DOCUMENT_COLUMNS: &str = "id, title, document_type, security_level, state, author_id, branch_id, \
     is_urgent, is_final, attachment_ids, policy_id, line, version, created_at, updated_at, \
     submitted_at, completed_at";

const AUDIT_COLUMNS: &str =
    "seq, id, action, resource_type, resource_id, actor, before_state, after_state, comment, created_at";

#[async_trait]
impl DocumentStore for PgStore {
    async fn insert(&self, document: &Document) -> Result<(), AppError> {
        sqlx::query(
            r#"INSERT INTO documents (id, title, document_type, security_level, state, author_id, branch_id,
                   is_urgent, is_final, attachment_ids, policy_id, line, version, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)"#,
        )
        .bind(document.id)
        .bind(&document.title)
        .bind(&document.document_type)
        .bind(document.security_level.to_string())
        .bind(document.state)
        .bind(document.author_id)
        .bind(document.branch_id)
        .bind(document.is_urgent)
        .bind(document.is_final)
        .bind(serde_json::to_value(&document.attachment_ids).map_err(anyhow::Error::from)?)
        .bind(document.policy_id)
        .bind(serde_json::to_value(&document.line).map_err(anyhow::Error::from)?)
        .bind(document.version)
        .bind(document.created_at)
        .bind(document.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Document>, AppError> {
        let row = sqlx::query_as::<_, DocumentRow>(&format!(
            "SELECT {} FROM documents WHERE id = $1",
            DOCUMENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Document::try_from).transpose()
    }

    async fn commit(
        &self,
        document: &Document,
        expected_version: i64,
        audit: Vec<AuditEntry>,
    ) -> Result<Commit, AppError> {
        let mut tx = self.pool.begin().await?;

        // Compare-and-swap on version: zero rows means another writer won.
        let updated = sqlx::query(
            r#"UPDATE documents
               SET title = $1, state = $2, is_urgent = $3, is_final = $4, attachment_ids = $5,
                   policy_id = $6, line = $7, version = version + 1, updated_at = $8,
                   submitted_at = $9, completed_at = $10
               WHERE id = $11 AND version = $12"#,
        )
        .bind(&document.title)
        .bind(document.state)
        .bind(document.is_urgent)
        .bind(document.is_final)
        .bind(serde_json::to_value(&document.attachment_ids).map_err(anyhow::Error::from)?)
        .bind(document.policy_id)
        .bind(serde_json::to_value(&document.line).map_err(anyhow::Error::from)?)
        .bind(document.updated_at)
        .bind(document.submitted_at)
        .bind(document.completed_at)
        .bind(document.id)
        .bind(expected_version)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            let exists = sqlx::query_scalar::<_, bool>(
                "SELECT EXISTS(SELECT 1 FROM documents WHERE id = $1)",
            )
            .bind(document.id)
            .fetch_one(&self.pool)
            .await?;
            if !exists {
                return Err(AppError::not_found("document", document.id));
            }
            return Ok(Commit::Conflict);
        }

        let mut stamped = Vec::with_capacity(audit.len());
        for entry in audit {
            stamped.push(insert_audit(&mut tx, entry).await?);
        }

        tx.commit().await?;

        let mut stored = document.clone();
        stored.version = expected_version + 1;
        Ok(Commit::Applied {
            document: stored,
            audit: stamped,
        })
    }

    async fn awaiting(&self, user_ids: &[Uuid]) -> Result<Vec<Document>, AppError> {
        if user_ids.is_empty() {
            return Ok(vec![]);
        }
        let ids: Vec<String> = user_ids.iter().map(Uuid::to_string).collect();
        let rows = sqlx::query_as::<_, DocumentRow>(&format!(
            r#"SELECT {} FROM documents d
               WHERE d.state = 'in_review'
                 AND EXISTS (
                   SELECT 1 FROM jsonb_array_elements(d.line) s
                   WHERE s->>'status' = 'pending'
                     AND (s->>'assignee_id' = ANY($1) OR s->>'approver_id' = ANY($1))
                 )
               ORDER BY d.submitted_at ASC"#,
            DOCUMENT_COLUMNS
        ))
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Document::try_from).collect()
    }
}

#[async_trait]
impl AuditStore for PgStore {
    async fn append(&self, entry: AuditEntry) -> Result<AuditEntry, AppError> {
        let mut tx = self.pool.begin().await?;
        let stored = insert_audit(&mut tx, entry).await?;
        tx.commit().await?;
        Ok(stored)
    }

    async fn page(
        &self,
        resource_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<AuditEntry>, AppError> {
        let rows = sqlx::query_as::<_, AuditRow>(&format!(
            "SELECT {} FROM audit_entries WHERE resource_id = $1 ORDER BY seq ASC OFFSET $2 LIMIT $3",
            AUDIT_COLUMNS
        ))
        .bind(resource_id)
        .bind(offset)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(AuditEntry::try_from).collect()
    }
}

async fn insert_audit(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    mut entry: AuditEntry,
) -> Result<AuditEntry, AppError> {
    let actor = entry
        .actor
        .as_ref()
        .map(serde_json::to_value)
        .transpose()
        .map_err(anyhow::Error::from)?;
    let seq = sqlx::query_scalar::<_, i64>(
        r#"INSERT INTO audit_entries (id, action, resource_type, resource_id, actor, before_state, after_state, comment, created_at)
           VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
           RETURNING seq"#,
    )
    .bind(entry.id)
    .bind(entry.action.as_str())
    .bind(entry.resource_type.as_str())
    .bind(entry.resource_id)
    .bind(actor)
    .bind(&entry.before)
    .bind(&entry.after)
    .bind(&entry.comment)
    .bind(entry.created_at)
    .fetch_one(&mut **tx)
    .await?;
    entry.seq = seq;
    Ok(entry)
}

// -- Row types --

#[derive(Debug, sqlx::FromRow)]
pub struct DocumentRow {
    pub id: Uuid,
    pub title: String,
    pub document_type: String,
    pub security_level: String,
    pub state: DocumentState,
    pub author_id: Uuid,
    pub branch_id: Uuid,
    pub is_urgent: bool,
    pub is_final: bool,
    pub attachment_ids: serde_json::Value,
    pub policy_id: Option<Uuid>,
    pub line: serde_json::Value,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<DocumentRow> for Document {
    type Error = AppError;

    fn try_from(row: DocumentRow) -> Result<Self, Self::Error> {
        let corrupt = |what: &str, e: serde_json::Error| {
            AppError::InvariantViolation(format!("document {} has unreadable {}: {}", row.id, what, e))
        };
        Ok(Document {
            id: row.id,
            title: row.title.clone(),
            document_type: row.document_type.clone(),
            security_level: serde_json::from_value(serde_json::Value::String(
                row.security_level.clone(),
            ))
            .map_err(|e| corrupt("security_level", e))?,
            state: row.state,
            author_id: row.author_id,
            branch_id: row.branch_id,
            is_urgent: row.is_urgent,
            is_final: row.is_final,
            attachment_ids: serde_json::from_value(row.attachment_ids.clone())
                .map_err(|e| corrupt("attachment_ids", e))?,
            policy_id: row.policy_id,
            line: serde_json::from_value(row.line.clone()).map_err(|e| corrupt("line", e))?,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
            submitted_at: row.submitted_at,
            completed_at: row.completed_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct AuditRow {
    pub seq: i64,
    pub id: Uuid,
    pub action: String,
    pub resource_type: String,
    pub resource_id: Uuid,
    pub actor: Option<serde_json::Value>,
    pub before_state: Option<serde_json::Value>,
    pub after_state: Option<serde_json::Value>,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<AuditRow> for AuditEntry {
    type Error = AppError;

    fn try_from(row: AuditRow) -> Result<Self, Self::Error> {
        let action = AuditAction::parse(&row.action).ok_or_else(|| {
            AppError::InvariantViolation(format!("audit entry {} has unknown action '{}'", row.seq, row.action))
        })?;
        let resource_type = ResourceType::parse(&row.resource_type).ok_or_else(|| {
            AppError::InvariantViolation(format!(
                "audit entry {} has unknown resource type '{}'",
                row.seq, row.resource_type
            ))
        })?;
        let actor = row
            .actor
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| AppError::InvariantViolation(format!("audit entry {} actor: {}", row.seq, e)))?;
        Ok(AuditEntry {
            id: row.id,
            seq: row.seq,
            action,
            resource_type,
            resource_id: row.resource_id,
            actor,
            before: row.before_state,
            after: row.after_state,
            comment: row.comment,
            created_at: row.created_at,
        })
    }
}
