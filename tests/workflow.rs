//! End-to-end workflow behaviour against the in-memory store.
//!
//! The fixture organization is described in `tests/common/mod.rs`:
//! EXPENSE = [MANAGER @ B1, DIRECTOR @ parent], CONTRACT = [MANAGER ‖ LEGAL,
//! DIRECTOR @ root], MEMO = auto-approve.

mod common;

use common::*;
use docflow::errors::AppError;
use docflow::models::approval::{check_line, Outcome, StepStatus};
use docflow::models::audit::AuditAction;
use docflow::models::document::DocumentState;
use docflow::models::notification::NotificationKind;

mod expense_scenarios {
    use super::*;
    use futures::TryStreamExt;

    #[tokio::test]
    async fn test_two_step_approval_happy_path() {
        let w = world();
        let doc = w.submitted("EXPENSE").await;

        assert_eq!(doc.state, DocumentState::InReview);
        assert_eq!(doc.line.len(), 2);
        assert_eq!(doc.line[0].assignee_id, id(MANAGER));
        assert_eq!(doc.line[1].assignee_id, id(DIRECTOR));
        assert_eq!(doc.line[1].branch_id, id(HQ));
        assert_eq!(doc.current_position(), Some(0));

        let doc = w
            .engine
            .decide(doc.id, id(MANAGER), 0, Outcome::Approve, Some("ok".into()))
            .await
            .unwrap();
        assert_eq!(doc.state, DocumentState::InReview);
        assert_eq!(doc.line[0].status, StepStatus::Approved);
        assert_eq!(doc.line[1].status, StepStatus::Pending);
        assert_eq!(doc.current_position(), Some(1));

        let doc = w
            .engine
            .decide(doc.id, id(DIRECTOR), 1, Outcome::Approve, None)
            .await
            .unwrap();
        assert_eq!(doc.state, DocumentState::Approved);
        assert!(doc.is_final);
        assert!(doc.completed_at.is_some());

        let history: Vec<_> = w
            .engine
            .audit()
            .history(doc.id, 0)
            .try_collect()
            .await
            .unwrap();
        let actions: Vec<AuditAction> = history.iter().map(|e| e.action).collect();
        assert_eq!(
            actions,
            vec![
                AuditAction::DocumentSubmitted,
                AuditAction::StepApproved,
                AuditAction::StepApproved,
                AuditAction::DocumentApproved,
            ]
        );
        assert!(history.windows(2).all(|p| p[0].seq < p[1].seq));
        assert_eq!(history[1].comment.as_deref(), Some("ok"));
        assert_eq!(
            history[1].actor.as_ref().map(|a| a.display_name.as_str()),
            Some("manager")
        );

        w.recorder.wait_for(3).await;
        assert_eq!(w.recorder.count(id(MANAGER), NotificationKind::ApprovalRequested), 1);
        assert_eq!(w.recorder.count(id(DIRECTOR), NotificationKind::ApprovalRequested), 1);
        assert_eq!(w.recorder.count(id(AUTHOR), NotificationKind::DocumentApproved), 1);
    }

    #[tokio::test]
    async fn test_reject_before_and_after_step_is_current() {
        let w = world();
        let doc = w.submitted("EXPENSE").await;

        let early = w
            .engine
            .decide(doc.id, id(DIRECTOR), 1, Outcome::Reject, None)
            .await
            .unwrap_err();
        assert!(matches!(early, AppError::Validation(_)));
        assert_eq!(early.kind(), "validation_error");

        w.engine
            .decide(doc.id, id(MANAGER), 0, Outcome::Approve, None)
            .await
            .unwrap();
        let doc = w
            .engine
            .decide(doc.id, id(DIRECTOR), 1, Outcome::Reject, Some("over budget".into()))
            .await
            .unwrap();

        assert_eq!(doc.state, DocumentState::Rejected);
        assert!(!doc.is_final);
        assert_eq!(doc.line[1].status, StepStatus::Rejected);
        assert_eq!(doc.line[1].comment.as_deref(), Some("over budget"));
        // submit, approve, reject step, reject document
        assert_eq!(w.history_len(doc.id).await, 4);

        w.recorder.wait_for(3).await;
        assert_eq!(w.recorder.count(id(AUTHOR), NotificationKind::DocumentRejected), 1);
    }

    #[tokio::test]
    async fn test_reject_skips_remaining_steps() {
        let w = world();
        let doc = w.submitted("CONTRACT").await;

        let doc = w
            .engine
            .decide(doc.id, id(LEGAL), 0, Outcome::Reject, None)
            .await
            .unwrap();
        assert_eq!(doc.state, DocumentState::Rejected);
        let statuses: Vec<StepStatus> = doc.line.iter().map(|s| s.status).collect();
        assert_eq!(
            statuses,
            vec![StepStatus::Skipped, StepStatus::Rejected, StepStatus::Skipped]
        );
    }
}

mod parallel_steps {
    use super::*;

    #[tokio::test]
    async fn test_parallel_siblings_must_both_approve() {
        let w = world();
        let doc = w.submitted("CONTRACT").await;
        let positions: Vec<u32> = doc.line.iter().map(|s| s.position).collect();
        assert_eq!(positions, vec![0, 0, 1]);

        let doc = w
            .engine
            .decide(doc.id, id(MANAGER), 0, Outcome::Approve, None)
            .await
            .unwrap();
        assert_eq!(doc.state, DocumentState::InReview);
        assert_eq!(doc.current_position(), Some(0));

        let err = w
            .engine
            .decide(doc.id, id(DIRECTOR), 1, Outcome::Approve, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "validation_error");

        let doc = w
            .engine
            .decide(doc.id, id(LEGAL), 0, Outcome::Approve, None)
            .await
            .unwrap();
        assert_eq!(doc.current_position(), Some(1));

        let doc = w
            .engine
            .decide(doc.id, id(DIRECTOR), 1, Outcome::Approve, None)
            .await
            .unwrap();
        assert_eq!(doc.state, DocumentState::Approved);
        assert_eq!(w.history_len(doc.id).await, 5);
    }

    #[tokio::test]
    async fn test_one_user_holding_both_parallel_steps_decides_each() {
        let mut s = seed();
        let manager = s.users.iter_mut().find(|u| u.id == id(MANAGER)).unwrap();
        manager.roles.insert("LEGAL".into());
        let w = world_with(s);

        let doc = w.submitted("CONTRACT").await;
        assert_eq!(doc.line[0].approver_id, id(MANAGER));
        assert_eq!(doc.line[1].approver_id, id(MANAGER));
        assert_eq!(doc.line[1].position, 0);

        let doc = w
            .engine
            .decide(doc.id, id(MANAGER), 0, Outcome::Approve, None)
            .await
            .unwrap();
        assert_eq!(doc.current_position(), Some(0));

        let doc = w
            .engine
            .decide(doc.id, id(MANAGER), 0, Outcome::Approve, None)
            .await
            .unwrap();
        assert_eq!(doc.current_position(), Some(1));

        let err = w
            .engine
            .decide(doc.id, id(MANAGER), 0, Outcome::Approve, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::StaleStep { position: 0, .. }), "{:?}", err);

        let doc = w
            .engine
            .decide(doc.id, id(DIRECTOR), 1, Outcome::Approve, None)
            .await
            .unwrap();
        assert_eq!(doc.state, DocumentState::Approved);
    }

    #[tokio::test]
    async fn test_both_parallel_approvers_are_notified() {
        let w = world();
        w.submitted("CONTRACT").await;
        w.recorder.wait_for(2).await;
        assert_eq!(w.recorder.count(id(MANAGER), NotificationKind::ApprovalRequested), 1);
        assert_eq!(w.recorder.count(id(LEGAL), NotificationKind::ApprovalRequested), 1);
        assert_eq!(w.recorder.count(id(DIRECTOR), NotificationKind::ApprovalRequested), 0);
    }
}

mod authorization {
    use super::*;

    #[tokio::test]
    async fn test_only_the_effective_approver_decides() {
        let w = world();
        let doc = w.submitted("EXPENSE").await;

        for intruder in [BACKUP, AUTHOR, DIRECTOR] {
            let err = w
                .engine
                .decide(doc.id, id(intruder), 0, Outcome::Approve, None)
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::Authorization(_)), "{:?}", err);
        }
        assert_eq!(w.history_len(doc.id).await, 1);
    }

    #[tokio::test]
    async fn test_only_the_author_submits() {
        let w = world();
        let doc = w.draft("EXPENSE").await;
        let err = w.engine.submit(doc.id, id(MANAGER)).await.unwrap_err();
        assert_eq!(err.kind(), "authorization_error");
    }

    #[tokio::test]
    async fn test_inactive_user_cannot_act() {
        let w = world();
        let doc = w.submitted("EXPENSE").await;
        w.engine
            .org()
            .write()
            .await
            .deactivate_user(id(MANAGER))
            .unwrap();
        let err = w
            .engine
            .decide(doc.id, id(MANAGER), 0, Outcome::Approve, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "authorization_error");
    }

    #[tokio::test]
    async fn test_delegation_after_submission_moves_authority() {
        let w = world();
        let doc = w.submitted("EXPENSE").await;
        let delegation = w.delegate(MANAGER, DEPUTY).await;

        let err = w
            .engine
            .decide(doc.id, id(MANAGER), 0, Outcome::Approve, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "authorization_error");
        let inbox = w.engine.pending_for(id(DEPUTY)).await.unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].on_behalf_of, Some(id(MANAGER)));

        w.engine
            .revoke_delegation(id(MANAGER), delegation.id)
            .await
            .unwrap();
        let err = w
            .engine
            .decide(doc.id, id(DEPUTY), 0, Outcome::Approve, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "authorization_error");

        let doc = w
            .engine
            .decide(doc.id, id(MANAGER), 0, Outcome::Approve, None)
            .await
            .unwrap();
        assert_eq!(doc.line[0].decided_by.as_ref().unwrap().id, id(MANAGER));
    }

    #[tokio::test]
    async fn test_delegation_never_routes_to_the_author() {
        let w = world();
        w.delegate(MANAGER, AUTHOR).await;
        let doc = w.submitted("EXPENSE").await;
        assert_eq!(doc.line[0].approver_id, id(MANAGER));

        let err = w
            .engine
            .decide(doc.id, id(AUTHOR), 0, Outcome::Approve, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "authorization_error");
        assert!(w.engine.pending_for(id(AUTHOR)).await.unwrap().is_empty());

        let doc = w
            .engine
            .decide(doc.id, id(MANAGER), 0, Outcome::Approve, None)
            .await
            .unwrap();
        assert_eq!(doc.current_position(), Some(1));
    }

    #[tokio::test]
    async fn test_inactive_delegate_means_no_eligible_approver() {
        let w = world();
        let doc = w.submitted("EXPENSE").await;
        w.delegate(MANAGER, DEPUTY).await;
        w.engine
            .org()
            .write()
            .await
            .deactivate_user(id(DEPUTY))
            .unwrap();

        let err = w
            .engine
            .decide(doc.id, id(MANAGER), 0, Outcome::Approve, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NoEligibleApprover(_)), "{:?}", err);
    }

    #[tokio::test]
    async fn test_unknown_document_is_not_found() {
        let w = world();
        let err = w
            .engine
            .decide(uuid::Uuid::new_v4(), id(MANAGER), 0, Outcome::Approve, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound { kind: "document", .. }));
    }
}

mod terminal_states {
    use super::*;

    #[tokio::test]
    async fn test_approved_document_is_immutable() {
        let w = world();
        let doc = w.submitted("EXPENSE").await;
        w.engine
            .decide(doc.id, id(MANAGER), 0, Outcome::Approve, None)
            .await
            .unwrap();
        w.engine
            .decide(doc.id, id(DIRECTOR), 1, Outcome::Approve, None)
            .await
            .unwrap();

        let again = w
            .engine
            .decide(doc.id, id(DIRECTOR), 1, Outcome::Reject, None)
            .await
            .unwrap_err();
        assert!(matches!(again, AppError::StaleStep { position: 1, .. }));

        assert_eq!(
            w.engine.withdraw(doc.id, id(AUTHOR)).await.unwrap_err().kind(),
            "validation_error"
        );
        assert!(matches!(
            w.engine.submit(doc.id, id(AUTHOR)).await.unwrap_err(),
            AppError::InvalidState { action: "submit", .. }
        ));
        let stored = w.engine.get_document(doc.id).await.unwrap();
        assert_eq!(stored.state, DocumentState::Approved);
        assert_eq!(w.history_len(doc.id).await, 4);
    }

    #[tokio::test]
    async fn test_rejected_document_cannot_be_withdrawn() {
        let w = world();
        let doc = w.submitted("EXPENSE").await;
        w.engine
            .decide(doc.id, id(MANAGER), 0, Outcome::Reject, None)
            .await
            .unwrap();
        let err = w.engine.withdraw(doc.id, id(AUTHOR)).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidState { action: "withdraw", .. }));
    }

    #[tokio::test]
    async fn test_repeat_decision_is_stale() {
        let w = world();
        let doc = w.submitted("EXPENSE").await;
        w.engine
            .decide(doc.id, id(MANAGER), 0, Outcome::Approve, None)
            .await
            .unwrap();
        let err = w
            .engine
            .decide(doc.id, id(MANAGER), 0, Outcome::Approve, None)
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(err.code(), "stale_step");
    }
}

mod withdrawal {
    use super::*;

    #[tokio::test]
    async fn test_withdraw_draft() {
        let w = world();
        let doc = w.draft("EXPENSE").await;
        let doc = tokio_test::assert_ok!(w.engine.withdraw(doc.id, id(AUTHOR)).await);
        assert_eq!(doc.state, DocumentState::Withdrawn);
        assert_eq!(w.history_len(doc.id).await, 1);
        tokio_test::assert_err!(w.engine.withdraw(doc.id, id(AUTHOR)).await);
    }

    #[tokio::test]
    async fn test_withdraw_in_review_skips_and_notifies() {
        let w = world();
        let doc = w.submitted("EXPENSE").await;
        let doc = w.engine.withdraw(doc.id, id(AUTHOR)).await.unwrap();

        assert_eq!(doc.state, DocumentState::Withdrawn);
        assert!(doc.line.iter().all(|s| s.status == StepStatus::Skipped));
        assert_eq!(w.history_len(doc.id).await, 2);

        w.recorder.wait_for(2).await;
        assert_eq!(w.recorder.count(id(MANAGER), NotificationKind::DocumentWithdrawn), 1);
        assert_eq!(w.recorder.count(id(DIRECTOR), NotificationKind::DocumentWithdrawn), 0);

        let err = w
            .engine
            .decide(doc.id, id(MANAGER), 0, Outcome::Approve, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidState { action: "decide", .. }));
    }

    #[tokio::test]
    async fn test_no_withdraw_after_an_approval() {
        let w = world();
        let doc = w.submitted("EXPENSE").await;
        w.engine
            .decide(doc.id, id(MANAGER), 0, Outcome::Approve, None)
            .await
            .unwrap();
        let err = w.engine.withdraw(doc.id, id(AUTHOR)).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        let stored = w.engine.get_document(doc.id).await.unwrap();
        assert_eq!(stored.line[0].status, StepStatus::Approved);
        assert_eq!(stored.state, DocumentState::InReview);
    }

    #[tokio::test]
    async fn test_only_author_withdraws() {
        let w = world();
        let doc = w.submitted("EXPENSE").await;
        let err = w.engine.withdraw(doc.id, id(MANAGER)).await.unwrap_err();
        assert!(matches!(err, AppError::Authorization(_)));
    }
}

mod submission {
    use super::*;
    use docflow::models::document::{DraftPatch, NewDocument, SecurityLevel};
    use docflow::models::policy::{ApprovalPolicy, PolicyScope};

    #[tokio::test]
    async fn test_auto_approve_policy_approves_on_submit() {
        let w = world();
        let doc = w.submitted("MEMO").await;
        assert_eq!(doc.state, DocumentState::Approved);
        assert!(doc.line.is_empty());
        assert!(doc.submitted_at.is_some());
        assert_eq!(w.history_len(doc.id).await, 1);

        w.recorder.wait_for(1).await;
        assert_eq!(w.recorder.count(id(AUTHOR), NotificationKind::DocumentApproved), 1);
    }

    #[tokio::test]
    async fn test_empty_policy_without_auto_approve_is_refused() {
        let w = world();
        let err = w
            .engine
            .register_policy(ApprovalPolicy {
                id: uuid::Uuid::new_v4(),
                name: "hollow".into(),
                scope: PolicyScope::Default,
                steps: vec![],
                auto_approve: false,
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "validation_error");
    }

    #[tokio::test]
    async fn test_missing_policy_leaves_draft_untouched() {
        let w = world();
        let doc = w.draft("INVOICE").await;
        let err = w.engine.submit(doc.id, id(AUTHOR)).await.unwrap_err();
        assert!(matches!(err, AppError::PolicyNotFound { .. }));
        let stored = w.engine.get_document(doc.id).await.unwrap();
        assert_eq!(stored.state, DocumentState::Draft);
        assert_eq!(w.history_len(doc.id).await, 0);
    }

    #[tokio::test]
    async fn test_no_eligible_approver_fails_submission() {
        let w = world();
        w.engine
            .org()
            .write()
            .await
            .deactivate_user(id(DIRECTOR))
            .unwrap();
        let doc = w.draft("EXPENSE").await;
        let err = w.engine.submit(doc.id, id(AUTHOR)).await.unwrap_err();
        assert!(matches!(err, AppError::NoEligibleApprover(_)));
    }

    #[tokio::test]
    async fn test_sub_branch_escalates_to_role_holders_above() {
        let w = world();
        let doc = w.draft_at("EXPENSE", B1A).await;
        let doc = w.engine.submit(doc.id, id(AUTHOR)).await.unwrap();
        assert_eq!(doc.line[0].assignee_id, id(MANAGER));
        assert_eq!(doc.line[0].branch_id, id(B1));
        assert_eq!(doc.line[1].assignee_id, id(DIRECTOR));
    }

    #[tokio::test]
    async fn test_author_is_never_their_own_approver() {
        let w = world();
        let doc = w
            .engine
            .create_draft(
                id(MANAGER),
                NewDocument {
                    title: "Team offsite".into(),
                    document_type: "expense".into(),
                    security_level: SecurityLevel::Normal,
                    branch_id: id(B1),
                    is_urgent: true,
                    attachment_ids: vec![],
                },
            )
            .await
            .unwrap();
        assert_eq!(doc.document_type, "EXPENSE");
        let doc = w.engine.submit(doc.id, id(MANAGER)).await.unwrap();
        assert_eq!(doc.line[0].assignee_id, id(BACKUP));
    }

    #[tokio::test]
    async fn test_lines_are_well_formed() {
        let w = world();
        for doc_type in ["EXPENSE", "CONTRACT"] {
            let doc = w.submitted(doc_type).await;
            check_line(&doc.line).unwrap();
            assert_eq!(doc.line[0].position, 0);
            assert!(doc.line.windows(2).all(|p| {
                if p[1].parallel {
                    p[1].position == p[0].position
                } else {
                    p[1].position == p[0].position + 1
                }
            }));
        }
    }

    #[tokio::test]
    async fn test_draft_validation() {
        let w = world();
        let base = NewDocument {
            title: "Laptop".into(),
            document_type: "EXPENSE".into(),
            security_level: SecurityLevel::Normal,
            branch_id: id(B1),
            is_urgent: false,
            attachment_ids: vec![],
        };

        let mut blank = base.clone();
        blank.title = "   ".into();
        assert_eq!(
            w.engine.create_draft(id(AUTHOR), blank).await.unwrap_err().kind(),
            "validation_error"
        );

        let mut bad_type = base.clone();
        bad_type.document_type = "expense report".into();
        assert_eq!(
            w.engine.create_draft(id(AUTHOR), bad_type).await.unwrap_err().kind(),
            "validation_error"
        );

        let mut elsewhere = base.clone();
        elsewhere.branch_id = id(HQ);
        assert_eq!(
            w.engine.create_draft(id(AUTHOR), elsewhere).await.unwrap_err().kind(),
            "authorization_error"
        );

        assert_eq!(
            w.engine
                .create_draft(uuid::Uuid::new_v4(), base)
                .await
                .unwrap_err()
                .kind(),
            "authorization_error"
        );
    }

    #[tokio::test]
    async fn test_update_only_while_draft() {
        let w = world();
        let doc = w.draft("EXPENSE").await;
        let doc = w
            .engine
            .update_draft(
                doc.id,
                id(AUTHOR),
                DraftPatch {
                    title: Some("Laptop (revised)".into()),
                    is_urgent: Some(true),
                    attachment_ids: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(doc.title, "Laptop (revised)");
        assert!(doc.is_urgent);
        assert_eq!(doc.version, 1);

        w.engine.submit(doc.id, id(AUTHOR)).await.unwrap();
        let err = w
            .engine
            .update_draft(doc.id, id(AUTHOR), DraftPatch::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidState { action: "edit", .. }));
    }
}

mod notifications {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_failed_delivery_never_fails_the_workflow() {
        let w = world_with_dispatcher(Arc::new(Broken));
        let doc = w.submitted("EXPENSE").await;
        let doc = w
            .engine
            .decide(doc.id, id(MANAGER), 0, Outcome::Approve, None)
            .await
            .unwrap();
        assert_eq!(doc.current_position(), Some(1));
        assert_eq!(w.history_len(doc.id).await, 2);
    }
}

mod delegation_audit {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use docflow::audit::AuditTrail;
    use docflow::models::audit::AuditEntry;
    use docflow::models::delegation::NewDelegation;
    use docflow::notification::{LogDispatcher, Notifier};
    use docflow::org::seed::SeedDelegation;
    use docflow::store::memory::MemoryStore;
    use docflow::store::AuditStore;
    use docflow::workflow::ApprovalWorkflowEngine;
    use uuid::Uuid;

    /// Audit backend that refuses every append.
    struct Unwritable;

    #[async_trait]
    impl AuditStore for Unwritable {
        async fn append(&self, _entry: AuditEntry) -> Result<AuditEntry, AppError> {
            Err(AppError::CollaboratorUnavailable("audit store offline".into()))
        }

        async fn page(&self, _: Uuid, _: i64, _: i64) -> Result<Vec<AuditEntry>, AppError> {
            Ok(vec![])
        }
    }

    fn open_ended(to: u128) -> NewDelegation {
        NewDelegation {
            delegate_id: id(to),
            scope: Default::default(),
            valid_from: None,
            valid_until: None,
        }
    }

    fn engine() -> ApprovalWorkflowEngine {
        let mut s = seed();
        s.delegations.push(SeedDelegation {
            delegator_id: id(BACKUP),
            delegation: open_ended(DEPUTY),
        });
        ApprovalWorkflowEngine::new(
            s.apply().unwrap(),
            Arc::new(MemoryStore::new()),
            AuditTrail::new(Arc::new(Unwritable)),
            Notifier::new(Arc::new(LogDispatcher), fast_delivery()),
        )
    }

    #[tokio::test]
    async fn test_unaudited_registration_does_not_take_effect() {
        let engine = engine();
        let err = engine
            .register_delegation(id(MANAGER), open_ended(DEPUTY))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "collaborator_unavailable");
        assert!(engine.list_delegations(id(MANAGER)).await.is_empty());
    }

    #[tokio::test]
    async fn test_unaudited_revocation_does_not_take_effect() {
        let engine = engine();
        let existing = engine.list_delegations(id(BACKUP)).await;
        assert_eq!(existing.len(), 1);

        engine
            .revoke_delegation(id(BACKUP), existing[0].id)
            .await
            .unwrap_err();
        let after = engine.list_delegations(id(BACKUP)).await;
        assert!(after[0].is_active);
    }
}
