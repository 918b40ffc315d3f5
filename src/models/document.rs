use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::approval::{self, ApprovalStep, StepStatus};

#[derive(Debug, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
pub enum DocumentState {
    Draft,
    Submitted,
    InReview,
    Approved,
    Rejected,
    Withdrawn,
}

impl DocumentState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DocumentState::Approved | DocumentState::Rejected | DocumentState::Withdrawn
        )
    }

    /// The complete transition graph. `InReview` looping across steps is not
    /// a state change and is not listed.
    pub fn can_transition_to(self, next: DocumentState) -> bool {
        use DocumentState::*;
        matches!(
            (self, next),
            (Draft, Submitted)
                | (Draft, Withdrawn)
                | (Submitted, InReview)
                | (Submitted, Approved)
                | (Submitted, Withdrawn)
                | (InReview, Approved)
                | (InReview, Rejected)
                | (InReview, Withdrawn)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DocumentState::Draft => "draft",
            DocumentState::Submitted => "submitted",
            DocumentState::InReview => "in_review",
            DocumentState::Approved => "approved",
            DocumentState::Rejected => "rejected",
            DocumentState::Withdrawn => "withdrawn",
        }
    }
}

impl fmt::Display for DocumentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Clone, Copy, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SecurityLevel {
    Public,
    Normal,
    Confidential,
    Secret,
}

impl fmt::Display for SecurityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SecurityLevel::Public => "PUBLIC",
            SecurityLevel::Normal => "NORMAL",
            SecurityLevel::Confidential => "CONFIDENTIAL",
            SecurityLevel::Secret => "SECRET",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub id: Uuid,
    pub title: String,
    pub document_type: String,
    pub security_level: SecurityLevel,
    pub state: DocumentState,
    pub author_id: Uuid,
    pub branch_id: Uuid,
    pub is_urgent: bool,
    pub is_final: bool,
    /// Opaque references into the attachment store.
    pub attachment_ids: Vec<String>,
    pub policy_id: Option<Uuid>,
    pub line: Vec<ApprovalStep>,
    /// Optimistic concurrency marker, bumped on every commit.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Document {
    pub fn new_draft(author_id: Uuid, input: NewDocument) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: input.title,
            document_type: input.document_type,
            security_level: input.security_level,
            state: DocumentState::Draft,
            author_id,
            branch_id: input.branch_id,
            is_urgent: input.is_urgent,
            is_final: false,
            attachment_ids: input.attachment_ids,
            policy_id: None,
            line: Vec::new(),
            version: 0,
            created_at: now,
            updated_at: now,
            submitted_at: None,
            completed_at: None,
        }
    }

    /// Move to `next`, refusing any edge outside the transition graph.
    pub fn transition(&mut self, next: DocumentState, action: &'static str) -> Result<(), AppError> {
        if !self.state.can_transition_to(next) {
            return Err(AppError::InvalidState {
                action,
                state: self.state.to_string(),
            });
        }
        self.state = next;
        self.updated_at = Utc::now();
        if next.is_terminal() {
            self.completed_at = Some(self.updated_at);
            self.is_final = next == DocumentState::Approved;
        }
        Ok(())
    }

    pub fn current_position(&self) -> Option<u32> {
        approval::current_position(&self.line)
    }

    pub fn has_approved_step(&self) -> bool {
        self.line.iter().any(|s| s.status == StepStatus::Approved)
    }

    /// Mark every pending step skipped. Returns how many changed.
    pub fn skip_pending(&mut self) -> usize {
        let mut n = 0;
        for step in self.line.iter_mut().filter(|s| s.is_pending()) {
            step.status = StepStatus::Skipped;
            n += 1;
        }
        n
    }

    pub fn summary(&self) -> DocumentSummary {
        DocumentSummary {
            id: self.id,
            title: self.title.clone(),
            document_type: self.document_type.clone(),
            state: self.state,
            author_id: self.author_id,
            is_urgent: self.is_urgent,
        }
    }
}

/// Author-supplied fields of a new draft.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDocument {
    pub title: String,
    pub document_type: String,
    pub security_level: SecurityLevel,
    pub branch_id: Uuid,
    #[serde(default)]
    pub is_urgent: bool,
    #[serde(default)]
    pub attachment_ids: Vec<String>,
}

/// Partial edit of a draft. `None` leaves the field unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DraftPatch {
    pub title: Option<String>,
    pub is_urgent: Option<bool>,
    pub attachment_ids: Option<Vec<String>>,
}

/// What collaborators (notifications, audit snapshots) get to see of a document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentSummary {
    pub id: Uuid,
    pub title: String,
    pub document_type: String,
    pub state: DocumentState,
    pub author_id: Uuid,
    pub is_urgent: bool,
}
