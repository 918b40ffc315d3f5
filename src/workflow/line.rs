//! Turning a resolved policy into a concrete approval line.
//!
//! Each template step is pinned to a branch, then to the smallest-id active
//! role holder there who is not the author. With `escalate` the search
//! continues up the ancestors. The chosen assignee is then passed through
//! one hop of delegation to get the approver expected to act.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::approval::{self, ApprovalStep, StepStatus};
use crate::models::document::Document;
use crate::models::policy::{ResolvedPolicy, StepTarget, StepTemplate};
use crate::org::hierarchy::OrgHierarchy;
use crate::workflow::delegation::DelegationRegistry;

pub fn build_line(
    document: &Document,
    policy: &ResolvedPolicy,
    org: &OrgHierarchy,
    delegations: &DelegationRegistry,
    as_of: DateTime<Utc>,
) -> Result<Vec<ApprovalStep>, AppError> {
    let mut line = Vec::with_capacity(policy.steps.len());
    let mut position: Option<u32> = None;

    for template in &policy.steps {
        let parallel = template.parallel_with_previous && position.is_some();
        let pos = match (position, parallel) {
            (None, _) => 0,
            (Some(p), true) => p,
            (Some(p), false) => p + 1,
        };
        position = Some(pos);

        let target = target_branch(&template.target, document.branch_id, org)?;
        let (assignee_id, branch_id) = pick_assignee(template, target, document.author_id, org)?;
        let approver_id = approver_for(document, assignee_id, org, delegations, as_of)?;

        line.push(ApprovalStep {
            position: pos,
            required_role: template.required_role.clone(),
            branch_id,
            parallel,
            assignee_id,
            approver_id,
            status: StepStatus::Pending,
            decided_by: None,
            decided_at: None,
            comment: None,
        });
    }

    approval::check_line(&line)?;
    Ok(line)
}

/// The user expected to act on a step assigned to `assignee_id`.
///
/// One hop of delegation applies, except that a delegation never hands a
/// step to the document's author: the assignee keeps it instead.
pub fn approver_for(
    document: &Document,
    assignee_id: Uuid,
    org: &OrgHierarchy,
    delegations: &DelegationRegistry,
    as_of: DateTime<Utc>,
) -> Result<Uuid, AppError> {
    let approver = delegations.effective_approver(
        assignee_id,
        as_of,
        &document.document_type,
        document.branch_id,
        org,
    )?;
    if approver != document.author_id {
        return Ok(approver);
    }
    tracing::warn!(
        document_id = %document.id,
        assignee = %assignee_id,
        "delegation points at the author; step stays with the assignee"
    );
    let assignee = org.get_user(assignee_id)?;
    if assignee_id == document.author_id || !assignee.is_active {
        return Err(AppError::NoEligibleApprover(format!(
            "step assigned to {} has no approver other than the author",
            assignee_id
        )));
    }
    Ok(assignee_id)
}

/// Branch a template step's role is looked up at.
pub fn target_branch(
    target: &StepTarget,
    document_branch: Uuid,
    org: &OrgHierarchy,
) -> Result<Uuid, AppError> {
    match target {
        StepTarget::DocumentBranch => Ok(org.get_branch(document_branch)?.id),
        StepTarget::Ancestor { levels } => {
            let chain = org.ancestors_of(document_branch)?;
            let idx = (*levels as usize).min(chain.len() - 1);
            Ok(chain[idx])
        }
        StepTarget::Root => org.root_of(document_branch),
        StepTarget::Branch { branch_id } => Ok(org.get_branch(*branch_id)?.id),
    }
}

/// Returns `(assignee, branch it was found at)`.
fn pick_assignee(
    template: &StepTemplate,
    target: Uuid,
    author_id: Uuid,
    org: &OrgHierarchy,
) -> Result<(Uuid, Uuid), AppError> {
    let search = if template.escalate {
        org.ancestors_of(target)?
    } else {
        vec![target]
    };

    for branch_id in search {
        if !org.get_branch(branch_id)?.is_active {
            continue;
        }
        let holder = org
            .users_with_role(&template.required_role, branch_id, false)?
            .into_iter()
            .find(|u| u.id != author_id);
        if let Some(user) = holder {
            return Ok((user.id, branch_id));
        }
    }

    Err(AppError::NoEligibleApprover(format!(
        "nobody other than the author holds {} at branch {}{}",
        template.required_role,
        target,
        if template.escalate { " or above" } else { "" }
    )))
}
