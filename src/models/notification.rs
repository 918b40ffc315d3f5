use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::document::DocumentSummary;

/// What happened, as a plain tag. Display text lives in
/// [`crate::notification::labels`].
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// A step became actionable for the recipient.
    ApprovalRequested,
    DocumentApproved,
    DocumentRejected,
    DocumentWithdrawn,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Clone, Copy, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Normal,
    High,
}

impl Priority {
    pub fn for_document(doc: &DocumentSummary) -> Self {
        if doc.is_urgent {
            Priority::High
        } else {
            Priority::Normal
        }
    }
}

/// A single message addressed to one user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notice {
    pub user_id: Uuid,
    pub kind: NotificationKind,
    pub priority: Priority,
    pub document: DocumentSummary,
}

impl Notice {
    pub fn new(user_id: Uuid, kind: NotificationKind, document: DocumentSummary) -> Self {
        Self {
            user_id,
            kind,
            priority: Priority::for_document(&document),
            document,
        }
    }
}
