//! The document state machine.
//!
//! Every operation is one read-validate-mutate-commit cycle against a single
//! document. The commit is a compare-and-swap on `Document::version` that
//! also appends the audit entries, so state and audit never diverge.
//! Notifications are handed to the [`Notifier`] only after the commit.

use std::sync::Arc;

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::audit::AuditTrail;
use crate::errors::AppError;
use crate::models::approval::{self, ApprovalStep, Outcome, StepStatus};
use crate::models::audit::{AuditAction, AuditEntry, ResourceType};
use crate::models::delegation::{Delegation, NewDelegation};
use crate::models::document::{
    Document, DocumentState, DocumentSummary, DraftPatch, NewDocument,
};
use crate::models::notification::{Notice, NotificationKind};
use crate::models::org::{User, UserSnapshot};
use crate::models::policy::ApprovalPolicy;
use crate::notification::Notifier;
use crate::org::hierarchy::OrgHierarchy;
use crate::org::seed::OrgState;
use crate::store::{Commit, DocumentStore};
use crate::workflow::delegation::DelegationRegistry;
use crate::workflow::line;
use crate::workflow::policy_resolver::{normalize_type, PolicyResolver};

static DOCUMENT_TYPE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z][A-Z0-9_]{0,63}$").unwrap());

const MAX_TITLE_LEN: usize = 200;
const MAX_COMMENT_LEN: usize = 2000;
const MAX_ATTACHMENTS: usize = 50;

/// A pending step the caller may act on, as shown in their inbox.
#[derive(Debug, Clone, Serialize)]
pub struct InboxItem {
    pub document: DocumentSummary,
    pub position: u32,
    pub required_role: String,
    /// Set when the caller acts on behalf of the assignee.
    pub on_behalf_of: Option<Uuid>,
    pub submitted_at: Option<chrono::DateTime<Utc>>,
}

/// Lock order is org, then policies, then delegations.
pub struct ApprovalWorkflowEngine {
    org: Arc<RwLock<OrgHierarchy>>,
    policies: Arc<RwLock<PolicyResolver>>,
    delegations: Arc<RwLock<DelegationRegistry>>,
    documents: Arc<dyn DocumentStore>,
    audit: AuditTrail,
    notifier: Notifier,
}

impl ApprovalWorkflowEngine {
    pub fn new(
        state: OrgState,
        documents: Arc<dyn DocumentStore>,
        audit: AuditTrail,
        notifier: Notifier,
    ) -> Self {
        Self {
            org: Arc::new(RwLock::new(state.org)),
            policies: Arc::new(RwLock::new(state.policies)),
            delegations: Arc::new(RwLock::new(state.delegations)),
            documents,
            audit,
            notifier,
        }
    }

    /// Administrator access to the branch tree and user directory.
    pub fn org(&self) -> &Arc<RwLock<OrgHierarchy>> {
        &self.org
    }

    pub fn audit(&self) -> &AuditTrail {
        &self.audit
    }

    pub async fn register_policy(&self, policy: ApprovalPolicy) -> Result<(), AppError> {
        let org = self.org.read().await;
        self.policies.write().await.register(policy, &org)
    }

    // -- Drafts --

    pub async fn create_draft(&self, actor: Uuid, input: NewDocument) -> Result<Document, AppError> {
        let mut input = input;
        input.title = input.title.trim().to_string();
        input.document_type = normalize_type(&input.document_type);
        validate_title(&input.title)?;
        validate_attachments(&input.attachment_ids)?;
        if !DOCUMENT_TYPE_RE.is_match(&input.document_type) {
            return Err(AppError::Validation(format!(
                "document type '{}' must be an upper-case identifier",
                input.document_type
            )));
        }

        {
            let org = self.org.read().await;
            let user = active_user(&org, actor)?;
            let branch = org.get_branch(input.branch_id)?;
            if !branch.is_active {
                return Err(AppError::Validation(format!(
                    "branch {} is inactive",
                    branch.id
                )));
            }
            let member = user.branch_id == branch.id || org.is_descendant(branch.id, user.branch_id)?;
            if !member {
                warn!(actor = %actor, branch_id = %branch.id, "draft outside caller's branch");
                return Err(AppError::Authorization(format!(
                    "user {} cannot author documents for branch {}",
                    actor, branch.id
                )));
            }
        }

        let document = Document::new_draft(actor, input);
        self.documents.insert(&document).await?;
        info!(document_id = %document.id, actor = %actor, "draft created");
        Ok(document)
    }

    pub async fn update_draft(
        &self,
        document_id: Uuid,
        actor: Uuid,
        patch: DraftPatch,
    ) -> Result<Document, AppError> {
        let mut doc = self.load(document_id).await?;
        ensure_author(&doc, actor, "edit")?;
        if doc.state != DocumentState::Draft {
            return Err(AppError::InvalidState {
                action: "edit",
                state: doc.state.to_string(),
            });
        }

        if let Some(title) = patch.title {
            let title = title.trim().to_string();
            validate_title(&title)?;
            doc.title = title;
        }
        if let Some(urgent) = patch.is_urgent {
            doc.is_urgent = urgent;
        }
        if let Some(ids) = patch.attachment_ids {
            validate_attachments(&ids)?;
            doc.attachment_ids = ids;
        }
        doc.updated_at = Utc::now();

        let expected = doc.version;
        match self.documents.commit(&doc, expected, vec![]).await? {
            Commit::Applied { document, .. } => Ok(document),
            Commit::Conflict => Err(AppError::ConcurrentModification { document_id }),
        }
    }

    pub async fn get_document(&self, document_id: Uuid) -> Result<Document, AppError> {
        self.load(document_id).await
    }

    pub async fn approval_line(&self, document_id: Uuid) -> Result<Vec<ApprovalStep>, AppError> {
        Ok(self.load(document_id).await?.line)
    }

    // -- Workflow --

    /// Resolve the policy, build the line and put the document in review.
    pub async fn submit(&self, document_id: Uuid, actor: Uuid) -> Result<Document, AppError> {
        let mut doc = self.load(document_id).await?;
        let now = Utc::now();

        let (snapshot, auto_approve) = {
            let org = self.org.read().await;
            let user = active_user(&org, actor)?;
            ensure_author(&doc, actor, "submit")?;
            if doc.state != DocumentState::Draft {
                return Err(AppError::InvalidState {
                    action: "submit",
                    state: doc.state.to_string(),
                });
            }

            let policies = self.policies.read().await;
            let policy =
                policies.resolve(&doc.document_type, doc.branch_id, doc.security_level, &org)?;
            let delegations = self.delegations.read().await;
            let built = line::build_line(&doc, &policy, &org, &delegations, now)?;

            if built.is_empty() && !policy.auto_approve {
                return Err(AppError::EmptyApprovalLine {
                    policy: policy.name,
                });
            }
            doc.policy_id = Some(policy.policy_id);
            doc.line = built;
            (user.snapshot(), policy.auto_approve)
        };

        let before = doc.state;
        doc.transition(DocumentState::Submitted, "submit")?;
        doc.submitted_at = Some(now);
        if doc.line.is_empty() && auto_approve {
            doc.transition(DocumentState::Approved, "submit")?;
        } else {
            doc.transition(DocumentState::InReview, "submit")?;
        }

        let mut entry = AuditEntry::new(
            AuditAction::DocumentSubmitted,
            ResourceType::Document,
            doc.id,
            Some(snapshot),
        );
        entry.before = Some(json!({ "state": before }));
        entry.after = Some(json!({
            "state": doc.state,
            "policy_id": doc.policy_id,
            "steps": doc.line.len(),
        }));

        let expected = doc.version;
        let doc = match self.documents.commit(&doc, expected, vec![entry]).await? {
            Commit::Applied { document, .. } => document,
            Commit::Conflict => return Err(AppError::ConcurrentModification { document_id }),
        };

        info!(
            document_id = %doc.id,
            actor = %actor,
            state = %doc.state,
            steps = doc.line.len(),
            "document submitted"
        );

        let notices = if doc.state == DocumentState::Approved {
            vec![Notice::new(doc.author_id, NotificationKind::DocumentApproved, doc.summary())]
        } else {
            requests_for_current(&doc)
        };
        self.notifier.dispatch(notices);
        Ok(doc)
    }

    /// Record `actor`'s verdict on the step at `position`.
    pub async fn decide(
        &self,
        document_id: Uuid,
        actor: Uuid,
        position: u32,
        outcome: Outcome,
        comment: Option<String>,
    ) -> Result<Document, AppError> {
        let comment = comment.map(|c| c.trim().to_string()).filter(|c| !c.is_empty());
        if comment.as_ref().map_or(false, |c| c.chars().count() > MAX_COMMENT_LEN) {
            return Err(AppError::Validation(format!(
                "comment exceeds {} characters",
                MAX_COMMENT_LEN
            )));
        }

        let mut doc = self.load(document_id).await?;
        let now = Utc::now();

        let (snapshot, idx) = {
            let org = self.org.read().await;
            let user = active_user(&org, actor)?;

            let at_position: Vec<usize> = doc
                .line
                .iter()
                .enumerate()
                .filter(|(_, s)| s.position == position)
                .map(|(i, _)| i)
                .collect();
            if at_position.is_empty() {
                return Err(AppError::Validation(format!(
                    "document {} has no step at position {}",
                    document_id, position
                )));
            }

            let delegations = self.delegations.read().await;
            let view: &Document = &doc;
            let resolved: Vec<(usize, Result<Uuid, AppError>)> = at_position
                .iter()
                .copied()
                .filter(|&i| view.line[i].is_pending())
                .map(|i| {
                    let approver =
                        line::approver_for(view, view.line[i].assignee_id, &org, &delegations, now);
                    (i, approver)
                })
                .collect();
            let mine = resolved
                .iter()
                .find(|(_, approver)| matches!(approver, Ok(a) if *a == actor))
                .map(|(i, _)| *i);

            let decided = |s: &ApprovalStep| {
                matches!(s.status, StepStatus::Approved | StepStatus::Rejected)
            };
            let none_pending = resolved.is_empty();
            let actor_already_decided = at_position.iter().any(|&i| {
                decided(&doc.line[i])
                    && doc.line[i].decided_by.as_ref().map(|u| u.id) == Some(actor)
            });
            if (actor_already_decided && mine.is_none())
                || (none_pending && at_position.iter().any(|&i| decided(&doc.line[i])))
            {
                return Err(AppError::StaleStep {
                    document_id,
                    position,
                });
            }

            if doc.state != DocumentState::InReview {
                return Err(AppError::InvalidState {
                    action: "decide",
                    state: doc.state.to_string(),
                });
            }
            let current = doc.current_position().ok_or_else(|| {
                AppError::InvariantViolation(format!(
                    "document {} is in review with no pending step",
                    document_id
                ))
            })?;
            if position != current {
                return Err(AppError::Validation(format!(
                    "step {} is not current; position {} is awaiting a decision",
                    position, current
                )));
            }

            match mine {
                Some(i) => (user.snapshot(), i),
                None => {
                    if let Some(err) = resolved.into_iter().find_map(|(_, r)| r.err()) {
                        warn!(
                            document_id = %document_id,
                            position,
                            error = %err,
                            "no eligible approver for a pending step"
                        );
                        return Err(err);
                    }
                    warn!(
                        document_id = %document_id,
                        actor = %actor,
                        position,
                        "decision by someone other than the effective approver"
                    );
                    return Err(AppError::Authorization(format!(
                        "user {} is not the approver of step {}",
                        actor, position
                    )));
                }
            }
        };

        let mut audit = Vec::with_capacity(2);
        let mut notices = Vec::new();

        {
            let step = &mut doc.line[idx];
            let before = json!({ "status": step.status });
            step.status = match outcome {
                Outcome::Approve => StepStatus::Approved,
                Outcome::Reject => StepStatus::Rejected,
            };
            step.approver_id = actor;
            step.decided_by = Some(snapshot.clone());
            step.decided_at = Some(now);
            step.comment = comment.clone();

            let action = match outcome {
                Outcome::Approve => AuditAction::StepApproved,
                Outcome::Reject => AuditAction::StepRejected,
            };
            let mut entry =
                AuditEntry::new(action, ResourceType::Document, doc.id, Some(snapshot.clone()));
            entry.before = Some(before);
            entry.after = Some(json!({
                "position": step.position,
                "required_role": step.required_role,
                "status": step.status,
            }));
            entry.comment = comment.clone();
            audit.push(entry);
        }

        match outcome {
            Outcome::Reject => {
                let skipped = doc.skip_pending();
                doc.transition(DocumentState::Rejected, "reject")?;
                let mut entry = AuditEntry::new(
                    AuditAction::DocumentRejected,
                    ResourceType::Document,
                    doc.id,
                    Some(snapshot),
                );
                entry.before = Some(json!({ "state": DocumentState::InReview }));
                entry.after = Some(json!({ "state": doc.state, "skipped": skipped }));
                entry.comment = comment;
                audit.push(entry);
                notices.push(Notice::new(
                    doc.author_id,
                    NotificationKind::DocumentRejected,
                    doc.summary(),
                ));
            }
            Outcome::Approve => match doc.current_position() {
                Some(next) if next == position => {}
                Some(next) => {
                    self.refresh_approvers(&mut doc, next).await;
                }
                None => {
                    doc.transition(DocumentState::Approved, "approve")?;
                    let mut entry = AuditEntry::new(
                        AuditAction::DocumentApproved,
                        ResourceType::Document,
                        doc.id,
                        Some(snapshot),
                    );
                    entry.before = Some(json!({ "state": DocumentState::InReview }));
                    entry.after = Some(json!({ "state": doc.state }));
                    audit.push(entry);
                    notices.push(Notice::new(
                        doc.author_id,
                        NotificationKind::DocumentApproved,
                        doc.summary(),
                    ));
                }
            },
        }

        if doc.state == DocumentState::InReview {
            doc.updated_at = now;
        }
        approval::check_line(&doc.line)?;

        let expected = doc.version;
        let doc = match self.documents.commit(&doc, expected, audit).await? {
            Commit::Applied { document, .. } => document,
            Commit::Conflict => {
                return Err(AppError::StaleStep {
                    document_id,
                    position,
                })
            }
        };

        info!(
            document_id = %doc.id,
            actor = %actor,
            position,
            outcome = ?outcome,
            state = %doc.state,
            "step decided"
        );

        if doc.state == DocumentState::InReview && doc.current_position() != Some(position) {
            notices.extend(requests_for_current(&doc));
        }
        self.notifier.dispatch(notices);
        Ok(doc)
    }

    /// Author pulls the document back before anyone approved it.
    pub async fn withdraw(&self, document_id: Uuid, actor: Uuid) -> Result<Document, AppError> {
        let mut doc = self.load(document_id).await?;

        let snapshot = {
            let org = self.org.read().await;
            active_user(&org, actor)?.snapshot()
        };
        ensure_author(&doc, actor, "withdraw")?;
        if !doc.state.can_transition_to(DocumentState::Withdrawn) {
            return Err(AppError::InvalidState {
                action: "withdraw",
                state: doc.state.to_string(),
            });
        }
        if doc.has_approved_step() {
            return Err(AppError::Validation(format!(
                "document {} already has an approved step and cannot be withdrawn",
                document_id
            )));
        }

        let before = doc.state;
        let waiting: Vec<Uuid> = match doc.current_position() {
            Some(pos) => doc
                .line
                .iter()
                .filter(|s| s.position == pos && s.is_pending())
                .map(|s| s.approver_id)
                .collect(),
            None => vec![],
        };
        doc.transition(DocumentState::Withdrawn, "withdraw")?;
        let skipped = doc.skip_pending();

        let mut entry = AuditEntry::new(
            AuditAction::DocumentWithdrawn,
            ResourceType::Document,
            doc.id,
            Some(snapshot),
        );
        entry.before = Some(json!({ "state": before }));
        entry.after = Some(json!({ "state": doc.state, "skipped": skipped }));

        let expected = doc.version;
        let doc = match self.documents.commit(&doc, expected, vec![entry]).await? {
            Commit::Applied { document, .. } => document,
            Commit::Conflict => return Err(AppError::ConcurrentModification { document_id }),
        };

        info!(document_id = %doc.id, actor = %actor, from = %before, "document withdrawn");

        let notices = waiting
            .into_iter()
            .map(|user| Notice::new(user, NotificationKind::DocumentWithdrawn, doc.summary()))
            .collect();
        self.notifier.dispatch(notices);
        Ok(doc)
    }

    /// Documents waiting on `user`, directly or through a delegation to them.
    pub async fn pending_for(&self, user: Uuid) -> Result<Vec<InboxItem>, AppError> {
        let now = Utc::now();
        let mut principals = vec![user];
        {
            let delegations = self.delegations.read().await;
            principals.extend(
                delegations
                    .list_for(user)
                    .into_iter()
                    .filter(|d| d.delegate_id == user && d.is_active && d.covers(now))
                    .map(|d| d.delegator_id),
            );
        }
        principals.sort();
        principals.dedup();

        let candidates = self.documents.awaiting(&principals).await?;

        let org = self.org.read().await;
        let delegations = self.delegations.read().await;
        let mut items = Vec::new();
        for doc in candidates {
            let Some(current) = doc.current_position() else {
                continue;
            };
            for step in doc.line.iter().filter(|s| s.position == current && s.is_pending()) {
                let approver = line::approver_for(&doc, step.assignee_id, &org, &delegations, now);
                if approver.map_or(false, |a| a == user) {
                    items.push(InboxItem {
                        document: doc.summary(),
                        position: step.position,
                        required_role: step.required_role.clone(),
                        on_behalf_of: (step.assignee_id != user).then_some(step.assignee_id),
                        submitted_at: doc.submitted_at,
                    });
                }
            }
        }
        Ok(items)
    }

    // -- Delegations --

    /// The audit entry is written before the delegation takes effect; a
    /// failed append leaves the registry untouched.
    pub async fn register_delegation(
        &self,
        actor: Uuid,
        input: NewDelegation,
    ) -> Result<Delegation, AppError> {
        let org = self.org.read().await;
        let snapshot = active_user(&org, actor)?.snapshot();
        let delegation = DelegationRegistry::build(actor, input);

        let mut delegations = self.delegations.write().await;
        delegations.check(&delegation, &org)?;
        self.audit
            .record(delegation_entry(
                AuditAction::DelegationRegistered,
                Some(snapshot),
                &delegation,
            ))
            .await?;
        delegations.register(delegation.clone(), &org)?;
        Ok(delegation)
    }

    pub async fn revoke_delegation(&self, actor: Uuid, id: Uuid) -> Result<Delegation, AppError> {
        let org = self.org.read().await;
        let mut delegations = self.delegations.write().await;
        let existing = delegations.get(id)?;
        if existing.delegator_id != actor {
            warn!(delegation_id = %id, actor = %actor, "revoke by non-delegator");
            return Err(AppError::Authorization(format!(
                "only the delegator can revoke delegation {}",
                id
            )));
        }
        let mut revoked = existing.clone();
        revoked.is_active = false;

        self.audit
            .record(delegation_entry(
                AuditAction::DelegationRevoked,
                org.snapshot(actor).ok(),
                &revoked,
            ))
            .await?;
        delegations.revoke(id)
    }

    pub async fn list_delegations(&self, user: Uuid) -> Vec<Delegation> {
        self.delegations.read().await.list_for(user)
    }

    // -- Internals --

    async fn load(&self, document_id: Uuid) -> Result<Document, AppError> {
        self.documents
            .get(document_id)
            .await?
            .ok_or_else(|| AppError::not_found("document", document_id))
    }

    /// Re-resolve who is expected to act on the steps at `position`. A
    /// failed lookup keeps the previous approver; the decision itself
    /// re-resolves again.
    async fn refresh_approvers(&self, doc: &mut Document, position: u32) {
        let now = Utc::now();
        let org = self.org.read().await;
        let delegations = self.delegations.read().await;
        let view: &Document = &*doc;
        let resolved: Vec<(usize, Result<Uuid, AppError>)> = view
            .line
            .iter()
            .enumerate()
            .filter(|(_, s)| s.position == position && s.is_pending())
            .map(|(i, s)| (i, line::approver_for(view, s.assignee_id, &org, &delegations, now)))
            .collect();
        for (i, approver) in resolved {
            match approver {
                Ok(approver) => doc.line[i].approver_id = approver,
                Err(e) => warn!(
                    document_id = %doc.id,
                    position,
                    assignee = %doc.line[i].assignee_id,
                    error = %e,
                    "could not re-resolve approver"
                ),
            }
        }
    }
}

fn delegation_entry(
    action: AuditAction,
    actor: Option<UserSnapshot>,
    delegation: &Delegation,
) -> AuditEntry {
    let mut entry = AuditEntry::new(action, ResourceType::Delegation, delegation.id, actor);
    entry.after = serde_json::to_value(delegation).ok();
    entry
}

fn active_user(org: &OrgHierarchy, id: Uuid) -> Result<&User, AppError> {
    let user = org
        .get_user(id)
        .map_err(|_| AppError::Authorization(format!("unknown user {}", id)))?;
    if !user.is_active {
        warn!(actor = %id, "inactive user attempted an action");
        return Err(AppError::Authorization(format!("user {} is inactive", id)));
    }
    Ok(user)
}

fn ensure_author(doc: &Document, actor: Uuid, action: &str) -> Result<(), AppError> {
    if doc.author_id != actor {
        warn!(document_id = %doc.id, actor = %actor, action, "non-author attempted author action");
        return Err(AppError::Authorization(format!(
            "only the author can {} document {}",
            action, doc.id
        )));
    }
    Ok(())
}

fn validate_title(title: &str) -> Result<(), AppError> {
    if title.is_empty() {
        return Err(AppError::Validation("title must not be empty".into()));
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(AppError::Validation(format!(
            "title exceeds {} characters",
            MAX_TITLE_LEN
        )));
    }
    Ok(())
}

fn validate_attachments(ids: &[String]) -> Result<(), AppError> {
    if ids.len() > MAX_ATTACHMENTS {
        return Err(AppError::Validation(format!(
            "at most {} attachments are allowed",
            MAX_ATTACHMENTS
        )));
    }
    if ids.iter().any(|id| id.trim().is_empty()) {
        return Err(AppError::Validation("attachment ids must not be blank".into()));
    }
    Ok(())
}

/// Approval requests for every pending step at the current position.
fn requests_for_current(doc: &Document) -> Vec<Notice> {
    let Some(current) = doc.current_position() else {
        return vec![];
    };
    doc.line
        .iter()
        .filter(|s| s.position == current && s.is_pending())
        .map(|s| Notice::new(s.approver_id, NotificationKind::ApprovalRequested, doc.summary()))
        .collect()
}
