//! YAML bootstrap for the organization: branches, users, approval policies
//! and standing delegations.
//!
//! ```yaml
//! branches:
//!   - { id: ..., name: Head Office, code: HQ }
//!   - { id: ..., name: Seoul, code: SEOUL, parent_id: ... }
//! users:
//!   - { id: ..., display_name: Kim, email: kim@example.org, branch_id: ..., roles: [MANAGER] }
//! policies:
//!   - name: expense
//!     scope: { kind: organization, document_type: EXPENSE, security_level: NORMAL }
//!     steps:
//!       - { required_role: MANAGER }
//! delegations: []
//! ```

use std::collections::{HashMap, HashSet};
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::delegation::NewDelegation;
use crate::models::org::{Branch, User};
use crate::models::policy::ApprovalPolicy;
use crate::org::hierarchy::OrgHierarchy;
use crate::workflow::delegation::DelegationRegistry;
use crate::workflow::policy_resolver::PolicyResolver;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrgSeed {
    #[serde(default)]
    pub branches: Vec<Branch>,
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub policies: Vec<ApprovalPolicy>,
    #[serde(default)]
    pub delegations: Vec<SeedDelegation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedDelegation {
    pub delegator_id: Uuid,
    #[serde(flatten)]
    pub delegation: NewDelegation,
}

/// Everything the engine reads at decision time, built from a seed.
#[derive(Debug, Default)]
pub struct OrgState {
    pub org: OrgHierarchy,
    pub policies: PolicyResolver,
    pub delegations: DelegationRegistry,
}

impl OrgSeed {
    pub fn from_yaml(text: &str) -> anyhow::Result<Self> {
        serde_yaml::from_str(text).context("failed to parse organization seed")
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read seed file {}", path.display()))?;
        Self::from_yaml(&text)
    }

    /// Build the hierarchy, policies and delegations. Branches may be listed
    /// in any order; parents are inserted before their children.
    pub fn apply(self) -> Result<OrgState, AppError> {
        let mut state = OrgState::default();

        for branch in parents_first(self.branches)? {
            state.org.insert_branch(branch)?;
        }
        for user in self.users {
            state.org.upsert_user(user)?;
        }
        for policy in self.policies {
            state.policies.register(policy, &state.org)?;
        }
        for seeded in self.delegations {
            let delegation = DelegationRegistry::build(seeded.delegator_id, seeded.delegation);
            state.delegations.register(delegation, &state.org)?;
        }

        tracing::info!(
            branches = state.org.branch_count(),
            policies = state.policies.len(),
            "organization seed applied"
        );
        Ok(state)
    }
}

/// Order branches so every parent precedes its children. A parent that is
/// neither in the list nor reachable is left for `insert_branch` to reject.
fn parents_first(branches: Vec<Branch>) -> Result<Vec<Branch>, AppError> {
    let listed: HashSet<Uuid> = branches.iter().map(|b| b.id).collect();
    let mut pending: HashMap<Uuid, Branch> = branches.into_iter().map(|b| (b.id, b)).collect();
    let mut placed: HashSet<Uuid> = HashSet::new();
    let mut out = Vec::with_capacity(pending.len());

    while !pending.is_empty() {
        let mut ready: Vec<Uuid> = pending
            .values()
            .filter(|b| match b.parent_id {
                None => true,
                Some(p) => placed.contains(&p) || !listed.contains(&p),
            })
            .map(|b| b.id)
            .collect();
        if ready.is_empty() {
            return Err(AppError::InvalidHierarchy(format!(
                "seed branches form a cycle: {:?}",
                pending.keys().collect::<Vec<_>>()
            )));
        }
        ready.sort();
        for id in ready {
            if let Some(b) = pending.remove(&id) {
                placed.insert(id);
                out.push(b);
            }
        }
    }
    Ok(out)
}
