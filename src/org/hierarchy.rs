//! Branch tree and user directory.
//!
//! Branches and users live in flat maps addressed by id; the tree is just the
//! `parent_id` links. Every mutation that touches those links walks the
//! parent chain explicitly and refuses to close a loop.

use std::collections::{BTreeSet, HashMap};

use once_cell::sync::Lazy;
use regex::Regex;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::org::{Branch, User, UserSnapshot};

static BRANCH_CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z0-9][A-Z0-9_-]{0,31}$").unwrap());

static ROLE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z][A-Z0-9_]{0,63}$").unwrap());

#[derive(Debug, Default, Clone)]
pub struct OrgHierarchy {
    branches: HashMap<Uuid, Branch>,
    users: HashMap<Uuid, User>,
}

impl OrgHierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    // -- Branch Operations --

    pub fn get_branch(&self, id: Uuid) -> Result<&Branch, AppError> {
        self.branches
            .get(&id)
            .ok_or_else(|| AppError::not_found("branch", id))
    }

    pub fn branch_count(&self) -> usize {
        self.branches.len()
    }

    /// Add a branch. The parent (if any) must already exist.
    pub fn insert_branch(&mut self, branch: Branch) -> Result<(), AppError> {
        if !BRANCH_CODE_RE.is_match(&branch.code) {
            return Err(AppError::Validation(format!(
                "branch code '{}' must be 1-32 upper-case letters, digits, '-' or '_'",
                branch.code
            )));
        }
        if branch.name.trim().is_empty() {
            return Err(AppError::Validation("branch name must not be empty".into()));
        }
        if self.branches.contains_key(&branch.id) {
            return Err(AppError::Validation(format!(
                "branch {} already exists",
                branch.id
            )));
        }
        if let Some(parent) = branch.parent_id {
            self.ensure_acyclic(branch.id, parent)?;
        }
        tracing::debug!(branch_id = %branch.id, code = %branch.code, "branch inserted");
        self.branches.insert(branch.id, branch);
        Ok(())
    }

    /// Re-parent a branch. `None` makes it a root.
    pub fn move_branch(&mut self, id: Uuid, new_parent: Option<Uuid>) -> Result<(), AppError> {
        self.get_branch(id)?;
        if let Some(parent) = new_parent {
            self.ensure_acyclic(id, parent)?;
        }
        if let Some(b) = self.branches.get_mut(&id) {
            b.parent_id = new_parent;
        }
        tracing::info!(branch_id = %id, parent_id = ?new_parent, "branch moved");
        Ok(())
    }

    pub fn deactivate_branch(&mut self, id: Uuid) -> Result<(), AppError> {
        let branch = self
            .branches
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found("branch", id))?;
        branch.is_active = false;
        Ok(())
    }

    pub fn children_of(&self, id: Uuid) -> Result<Vec<&Branch>, AppError> {
        self.get_branch(id)?;
        let mut children: Vec<&Branch> = self
            .branches
            .values()
            .filter(|b| b.parent_id == Some(id))
            .collect();
        children.sort_by_key(|b| b.id);
        Ok(children)
    }

    /// `[branch, parent, ..., root]`.
    pub fn ancestors_of(&self, id: Uuid) -> Result<Vec<Uuid>, AppError> {
        let mut chain = vec![self.get_branch(id)?.id];
        let mut cursor = self.branches[&id].parent_id;
        while let Some(next) = cursor {
            if chain.len() > self.branches.len() {
                return Err(AppError::InvariantViolation(format!(
                    "parent chain of branch {} does not terminate",
                    id
                )));
            }
            let branch = self.branches.get(&next).ok_or_else(|| {
                AppError::InvariantViolation(format!("branch {} has dangling parent {}", id, next))
            })?;
            chain.push(branch.id);
            cursor = branch.parent_id;
        }
        Ok(chain)
    }

    /// True when `b` is a proper ancestor of `a`.
    pub fn is_descendant(&self, a: Uuid, b: Uuid) -> Result<bool, AppError> {
        self.get_branch(b)?;
        Ok(self.ancestors_of(a)?.into_iter().skip(1).any(|id| id == b))
    }

    pub fn root_of(&self, id: Uuid) -> Result<Uuid, AppError> {
        let chain = self.ancestors_of(id)?;
        Ok(*chain.last().unwrap_or(&id))
    }

    /// Refuse `parent` as the parent of `child` when `child` already sits on
    /// `parent`'s path to the root (which includes `parent == child`).
    fn ensure_acyclic(&self, child: Uuid, parent: Uuid) -> Result<(), AppError> {
        if parent == child {
            return Err(AppError::InvalidHierarchy(format!(
                "branch {} cannot be its own parent",
                child
            )));
        }
        if self.ancestors_of(parent)?.contains(&child) {
            return Err(AppError::InvalidHierarchy(format!(
                "moving branch {} under {} would make it its own ancestor",
                child, parent
            )));
        }
        Ok(())
    }

    // -- User Operations --

    pub fn get_user(&self, id: Uuid) -> Result<&User, AppError> {
        self.users
            .get(&id)
            .ok_or_else(|| AppError::not_found("user", id))
    }

    pub fn snapshot(&self, id: Uuid) -> Result<UserSnapshot, AppError> {
        Ok(self.get_user(id)?.snapshot())
    }

    /// Insert or replace a user. The primary branch must exist.
    pub fn upsert_user(&mut self, user: User) -> Result<(), AppError> {
        self.get_branch(user.branch_id)?;
        validate_roles(&user.roles)?;
        self.users.insert(user.id, user);
        Ok(())
    }

    pub fn set_user_roles(&mut self, id: Uuid, roles: BTreeSet<String>) -> Result<(), AppError> {
        validate_roles(&roles)?;
        self.user_mut(id)?.roles = roles;
        Ok(())
    }

    pub fn set_user_branch(&mut self, id: Uuid, branch_id: Uuid) -> Result<(), AppError> {
        self.get_branch(branch_id)?;
        self.user_mut(id)?.branch_id = branch_id;
        Ok(())
    }

    pub fn deactivate_user(&mut self, id: Uuid) -> Result<(), AppError> {
        self.user_mut(id)?.is_active = false;
        Ok(())
    }

    fn user_mut(&mut self, id: Uuid) -> Result<&mut User, AppError> {
        self.users
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found("user", id))
    }

    /// Active holders of `role` at `branch_id` (and below it when
    /// `include_descendants`), ordered by id so picks are deterministic.
    pub fn users_with_role(
        &self,
        role: &str,
        branch_id: Uuid,
        include_descendants: bool,
    ) -> Result<Vec<&User>, AppError> {
        self.get_branch(branch_id)?;
        let mut out = Vec::new();
        for user in self.users.values() {
            if !user.is_active || !user.has_role(role) {
                continue;
            }
            let in_scope = user.branch_id == branch_id
                || (include_descendants && self.is_descendant(user.branch_id, branch_id)?);
            if in_scope {
                out.push(user);
            }
        }
        out.sort_by_key(|u| u.id);
        Ok(out)
    }
}

fn validate_roles(roles: &BTreeSet<String>) -> Result<(), AppError> {
    match roles.iter().find(|r| !ROLE_RE.is_match(r)) {
        Some(bad) => Err(AppError::Validation(format!(
            "role '{}' must be an upper-case identifier",
            bad
        ))),
        None => Ok(()),
    }
}
