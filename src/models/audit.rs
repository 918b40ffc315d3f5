use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::org::UserSnapshot;

/// One immutable record of a committed transition.
///
/// `seq` is assigned by the store when the entry is appended and is strictly
/// increasing, so ordering by `seq` is ordering by creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditEntry {
    pub id: Uuid,
    pub seq: i64,
    pub action: AuditAction,
    pub resource_type: ResourceType,
    pub resource_id: Uuid,
    pub actor: Option<UserSnapshot>,
    pub before: Option<serde_json::Value>,
    pub after: Option<serde_json::Value>,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(
        action: AuditAction,
        resource_type: ResourceType,
        resource_id: Uuid,
        actor: Option<UserSnapshot>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            seq: 0,
            action,
            resource_type,
            resource_id,
            actor,
            before: None,
            after: None,
            comment: None,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    DocumentSubmitted,
    StepApproved,
    StepRejected,
    DocumentApproved,
    DocumentRejected,
    DocumentWithdrawn,
    DelegationRegistered,
    DelegationRevoked,
}

impl AuditAction {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditAction::DocumentSubmitted => "document_submitted",
            AuditAction::StepApproved => "step_approved",
            AuditAction::StepRejected => "step_rejected",
            AuditAction::DocumentApproved => "document_approved",
            AuditAction::DocumentRejected => "document_rejected",
            AuditAction::DocumentWithdrawn => "document_withdrawn",
            AuditAction::DelegationRegistered => "delegation_registered",
            AuditAction::DelegationRevoked => "delegation_revoked",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "document_submitted" => AuditAction::DocumentSubmitted,
            "step_approved" => AuditAction::StepApproved,
            "step_rejected" => AuditAction::StepRejected,
            "document_approved" => AuditAction::DocumentApproved,
            "document_rejected" => AuditAction::DocumentRejected,
            "document_withdrawn" => AuditAction::DocumentWithdrawn,
            "delegation_registered" => AuditAction::DelegationRegistered,
            "delegation_revoked" => AuditAction::DelegationRevoked,
            _ => return None,
        })
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Document,
    Delegation,
}

impl ResourceType {
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceType::Document => "document",
            ResourceType::Delegation => "delegation",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "document" => Some(ResourceType::Document),
            "delegation" => Some(ResourceType::Delegation),
            _ => None,
        }
    }
}
