//! Approval policy lookup.
//!
//! Precedence, first match wins:
//! 1. exact (branch, type, level)
//! 2. the same key on each ancestor, nearest first
//! 3. organization-wide (type, level)
//! 4. organization default

use std::collections::HashMap;

use uuid::Uuid;

use crate::errors::AppError;
use crate::models::document::SecurityLevel;
use crate::models::policy::{ApprovalPolicy, PolicyScope, ResolvedPolicy, StepTarget};
use crate::org::hierarchy::OrgHierarchy;

#[derive(Debug, Default, Clone)]
pub struct PolicyResolver {
    by_branch: HashMap<(Uuid, String, SecurityLevel), ApprovalPolicy>,
    org_wide: HashMap<(String, SecurityLevel), ApprovalPolicy>,
    default: Option<ApprovalPolicy>,
}

impl PolicyResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a policy for its scope.
    pub fn register(&mut self, policy: ApprovalPolicy, org: &OrgHierarchy) -> Result<(), AppError> {
        validate_policy(&policy, org)?;
        tracing::debug!(policy = %policy.name, scope = ?policy.scope, "policy registered");
        match &policy.scope {
            PolicyScope::Branch {
                branch_id,
                document_type,
                security_level,
            } => {
                let key = (*branch_id, normalize_type(document_type), *security_level);
                self.by_branch.insert(key, policy);
            }
            PolicyScope::Organization {
                document_type,
                security_level,
            } => {
                let key = (normalize_type(document_type), *security_level);
                self.org_wide.insert(key, policy);
            }
            PolicyScope::Default => self.default = Some(policy),
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.by_branch.len() + self.org_wide.len() + usize::from(self.default.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn resolve(
        &self,
        document_type: &str,
        branch_id: Uuid,
        security_level: SecurityLevel,
        org: &OrgHierarchy,
    ) -> Result<ResolvedPolicy, AppError> {
        let doc_type = normalize_type(document_type);

        // ancestors_of starts with the branch itself, so step 1 and 2 are one walk.
        for ancestor in org.ancestors_of(branch_id)? {
            let key = (ancestor, doc_type.clone(), security_level);
            if let Some(p) = self.by_branch.get(&key) {
                tracing::debug!(policy = %p.name, matched_branch = %ancestor, "policy resolved");
                return Ok(p.into());
            }
        }

        if let Some(p) = self.org_wide.get(&(doc_type.clone(), security_level)) {
            tracing::debug!(policy = %p.name, "policy resolved (organization-wide)");
            return Ok(p.into());
        }

        if let Some(p) = &self.default {
            tracing::debug!(policy = %p.name, "policy resolved (default)");
            return Ok(p.into());
        }

        Err(AppError::PolicyNotFound {
            document_type: doc_type,
            branch_id,
            security_level: security_level.to_string(),
        })
    }
}

pub fn normalize_type(document_type: &str) -> String {
    document_type.trim().to_ascii_uppercase()
}

fn validate_policy(policy: &ApprovalPolicy, org: &OrgHierarchy) -> Result<(), AppError> {
    if policy.name.trim().is_empty() {
        return Err(AppError::Validation("policy name must not be empty".into()));
    }
    if policy.steps.is_empty() && !policy.auto_approve {
        return Err(AppError::Validation(format!(
            "policy '{}' has no steps; set auto_approve to allow that",
            policy.name
        )));
    }
    if policy
        .steps
        .first()
        .is_some_and(|s| s.parallel_with_previous)
    {
        return Err(AppError::Validation(format!(
            "policy '{}': the first step cannot be parallel with a previous one",
            policy.name
        )));
    }
    for (idx, step) in policy.steps.iter().enumerate() {
        if step.required_role.trim().is_empty() {
            return Err(AppError::Validation(format!(
                "policy '{}': step {} has no required role",
                policy.name, idx
            )));
        }
        if let StepTarget::Branch { branch_id } = step.target {
            org.get_branch(branch_id)?;
        }
    }
    match &policy.scope {
        PolicyScope::Branch {
            branch_id,
            document_type,
            ..
        } => {
            org.get_branch(*branch_id)?;
            require_type(document_type)
        }
        PolicyScope::Organization { document_type, .. } => require_type(document_type),
        PolicyScope::Default => Ok(()),
    }
}

fn require_type(document_type: &str) -> Result<(), AppError> {
    if document_type.trim().is_empty() {
        return Err(AppError::Validation("document type must not be empty".into()));
    }
    Ok(())
}
