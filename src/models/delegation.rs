use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Transfer of approval authority from `delegator_id` to `delegate_id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Delegation {
    pub id: Uuid,
    pub delegator_id: Uuid,
    pub delegate_id: Uuid,
    #[serde(default)]
    pub scope: DelegationScope,
    /// Inclusive start of the window; `None` means "since forever".
    pub valid_from: Option<DateTime<Utc>>,
    /// Exclusive end of the window; `None` means indefinite.
    pub valid_until: Option<DateTime<Utc>>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Delegation {
    /// Window check on `[valid_from, valid_until)`.
    pub fn covers(&self, at: DateTime<Utc>) -> bool {
        self.valid_from.map_or(true, |from| at >= from)
            && self.valid_until.map_or(true, |until| at < until)
    }

    pub fn applies_to(&self, at: DateTime<Utc>, document_type: &str, branch_id: Uuid) -> bool {
        self.is_active && self.covers(at) && self.scope.matches(document_type, branch_id)
    }
}

/// Optional filter narrowing a delegation. Unset fields match anything.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DelegationScope {
    pub branch_id: Option<Uuid>,
    pub document_type: Option<String>,
}

impl DelegationScope {
    pub fn matches(&self, document_type: &str, branch_id: Uuid) -> bool {
        self.branch_id.map_or(true, |b| b == branch_id)
            && self
                .document_type
                .as_deref()
                .map_or(true, |t| t.eq_ignore_ascii_case(document_type))
    }
}

/// Request body for registering a delegation. The delegator is the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDelegation {
    pub delegate_id: Uuid,
    #[serde(default)]
    pub scope: DelegationScope,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
}

fn default_active() -> bool {
    true
}
