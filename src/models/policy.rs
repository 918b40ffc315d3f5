use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::document::SecurityLevel;

// ── Policy ───────────────────────────────────────────────────

/// An approval policy maps document attributes to a line template.
///
/// Policies are registered per branch, organization-wide per (type, level),
/// or as the single organization default. The resolver picks the most
/// specific one; see [`crate::workflow::policy_resolver`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApprovalPolicy {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub name: String,
    pub scope: PolicyScope,
    /// Ordered step templates.
    #[serde(default)]
    pub steps: Vec<StepTemplate>,
    /// An empty line approves the document immediately. Must be opted into.
    #[serde(default)]
    pub auto_approve: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PolicyScope {
    Branch {
        branch_id: Uuid,
        document_type: String,
        security_level: SecurityLevel,
    },
    Organization {
        document_type: String,
        security_level: SecurityLevel,
    },
    Default,
}

// ── Step templates ───────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepTemplate {
    /// Role (or position) code a user must hold to approve this step.
    pub required_role: String,
    /// Where in the tree the role holder is looked up.
    #[serde(default)]
    pub target: StepTarget,
    /// Shares its position with the previous step; both must approve.
    #[serde(default)]
    pub parallel_with_previous: bool,
    /// Walk up the ancestors when nobody at the target branch holds the role.
    #[serde(default = "default_escalate")]
    pub escalate: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepTarget {
    /// The document's own branch.
    #[default]
    DocumentBranch,
    /// `levels` hops above the document's branch (1 = parent). Clamped at the root.
    Ancestor { levels: u32 },
    /// Root of the document branch's tree.
    Root,
    /// A fixed branch, e.g. a central finance office.
    Branch { branch_id: Uuid },
}

fn default_escalate() -> bool {
    true
}

/// The resolver's answer: the winning policy's template.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ResolvedPolicy {
    pub policy_id: Uuid,
    pub name: String,
    pub steps: Vec<StepTemplate>,
    pub auto_approve: bool,
}

impl From<&ApprovalPolicy> for ResolvedPolicy {
    fn from(p: &ApprovalPolicy) -> Self {
        Self {
            policy_id: p.id,
            name: p.name.clone(),
            steps: p.steps.clone(),
            auto_approve: p.auto_approve,
        }
    }
}
