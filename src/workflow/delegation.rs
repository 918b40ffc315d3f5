//! Delegation of approval authority.
//!
//! Resolution follows exactly one hop: if A delegated to B and B delegated
//! to C, A's steps go to B, never to C. Every authority shift is therefore
//! visible as a single delegation record.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::delegation::{Delegation, NewDelegation};
use crate::org::hierarchy::OrgHierarchy;

#[derive(Debug, Default, Clone)]
pub struct DelegationRegistry {
    delegations: HashMap<Uuid, Delegation>,
}

impl DelegationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build(delegator_id: Uuid, input: NewDelegation) -> Delegation {
        Delegation {
            id: Uuid::new_v4(),
            delegator_id,
            delegate_id: input.delegate_id,
            scope: input.scope,
            valid_from: input.valid_from,
            valid_until: input.valid_until,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    /// Everything `register` would refuse, without registering.
    pub fn check(&self, delegation: &Delegation, org: &OrgHierarchy) -> Result<(), AppError> {
        if delegation.delegator_id == delegation.delegate_id {
            return Err(AppError::Validation("a user cannot delegate to themselves".into()));
        }
        if let (Some(from), Some(until)) = (delegation.valid_from, delegation.valid_until) {
            if from >= until {
                return Err(AppError::Validation(format!(
                    "delegation window is empty: {} is not before {}",
                    from, until
                )));
            }
        }
        org.get_user(delegation.delegator_id)?;
        let delegate = org.get_user(delegation.delegate_id)?;
        if !delegate.is_active {
            return Err(AppError::Validation(format!(
                "delegate {} is inactive",
                delegate.id
            )));
        }
        if let Some(branch) = delegation.scope.branch_id {
            org.get_branch(branch)?;
        }
        if self.delegations.contains_key(&delegation.id) {
            return Err(AppError::Validation(format!(
                "delegation {} already exists",
                delegation.id
            )));
        }
        Ok(())
    }

    pub fn register(&mut self, delegation: Delegation, org: &OrgHierarchy) -> Result<(), AppError> {
        self.check(&delegation, org)?;
        tracing::info!(
            delegation_id = %delegation.id,
            delegator = %delegation.delegator_id,
            delegate = %delegation.delegate_id,
            "delegation registered"
        );
        self.delegations.insert(delegation.id, delegation);
        Ok(())
    }

    /// Deactivate a delegation. The record is kept for the audit trail.
    pub fn revoke(&mut self, id: Uuid) -> Result<Delegation, AppError> {
        let d = self
            .delegations
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found("delegation", id))?;
        d.is_active = false;
        tracing::info!(delegation_id = %id, "delegation revoked");
        Ok(d.clone())
    }

    pub fn get(&self, id: Uuid) -> Result<&Delegation, AppError> {
        self.delegations
            .get(&id)
            .ok_or_else(|| AppError::not_found("delegation", id))
    }

    /// Delegations where `user_id` is either side, newest first.
    pub fn list_for(&self, user_id: Uuid) -> Vec<Delegation> {
        let mut out: Vec<Delegation> = self
            .delegations
            .values()
            .filter(|d| d.delegator_id == user_id || d.delegate_id == user_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        out
    }

    /// The delegation that currently moves `user_id`'s authority, if any.
    /// With several matches the most recently created wins.
    pub fn active_for(
        &self,
        user_id: Uuid,
        as_of: DateTime<Utc>,
        document_type: &str,
        branch_id: Uuid,
    ) -> Option<&Delegation> {
        self.delegations
            .values()
            .filter(|d| d.delegator_id == user_id && d.applies_to(as_of, document_type, branch_id))
            .max_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)))
    }

    /// Who should act in place of `user_id` at `as_of`.
    pub fn effective_approver(
        &self,
        user_id: Uuid,
        as_of: DateTime<Utc>,
        document_type: &str,
        branch_id: Uuid,
        org: &OrgHierarchy,
    ) -> Result<Uuid, AppError> {
        let target = match self.active_for(user_id, as_of, document_type, branch_id) {
            Some(d) => {
                tracing::debug!(
                    delegation_id = %d.id,
                    from = %user_id,
                    to = %d.delegate_id,
                    "approval authority delegated"
                );
                d.delegate_id
            }
            None => user_id,
        };
        let user = org.get_user(target)?;
        if !user.is_active {
            return Err(AppError::NoEligibleApprover(format!(
                "resolved approver {} (for {}) is inactive",
                target, user_id
            )));
        }
        Ok(target)
    }
}
