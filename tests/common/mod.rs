//! Shared fixture: a small organization, the standard policies and an
//! engine on the in-memory store with a recording dispatcher.
//!
//! ```text
//! HQ (DIRECTOR: director)
//! └── B1 (MANAGER: manager, backup; LEGAL: legal; author, deputy)
//!     └── B1A (nobody with a role)
//! ```

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use docflow::audit::AuditTrail;
use docflow::models::delegation::{Delegation, NewDelegation};
use docflow::models::document::{Document, NewDocument, SecurityLevel};
use docflow::models::notification::{Notice, NotificationKind};
use docflow::models::org::{Branch, User};
use docflow::models::policy::{ApprovalPolicy, PolicyScope, StepTarget, StepTemplate};
use docflow::notification::{DeliveryPolicy, NotificationDispatcher, Notifier};
use docflow::org::seed::OrgSeed;
use docflow::store::memory::MemoryStore;
use docflow::workflow::ApprovalWorkflowEngine;

pub const HQ: u128 = 0x100;
pub const B1: u128 = 0x101;
pub const B1A: u128 = 0x102;

pub const MANAGER: u128 = 0xa1;
pub const BACKUP: u128 = 0xa2;
pub const DIRECTOR: u128 = 0xa3;
pub const LEGAL: u128 = 0xa4;
pub const AUTHOR: u128 = 0xa5;
pub const DEPUTY: u128 = 0xa6;

pub fn id(n: u128) -> Uuid {
    Uuid::from_u128(n)
}

#[derive(Default)]
pub struct Recorder {
    notices: Mutex<Vec<Notice>>,
}

impl Recorder {
    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().unwrap().clone()
    }

    /// Wait until at least `n` notices arrived (delivery is spawned).
    pub async fn wait_for(&self, n: usize) -> Vec<Notice> {
        for _ in 0..100 {
            let got = self.notices();
            if got.len() >= n {
                return got;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.notices()
    }

    pub fn count(&self, user: Uuid, kind: NotificationKind) -> usize {
        self.notices()
            .iter()
            .filter(|n| n.user_id == user && n.kind == kind)
            .count()
    }
}

#[async_trait]
impl NotificationDispatcher for Recorder {
    async fn notify(&self, notice: &Notice) -> anyhow::Result<()> {
        self.notices.lock().unwrap().push(notice.clone());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recorder"
    }
}

/// Always fails; used to show notification failure never reaches the caller.
pub struct Broken;

#[async_trait]
impl NotificationDispatcher for Broken {
    async fn notify(&self, _notice: &Notice) -> anyhow::Result<()> {
        anyhow::bail!("notification service down")
    }

    fn name(&self) -> &'static str {
        "broken"
    }
}

pub struct World {
    pub engine: Arc<ApprovalWorkflowEngine>,
    pub store: MemoryStore,
    pub recorder: Arc<Recorder>,
}

fn branch(n: u128, code: &str, parent: Option<u128>) -> Branch {
    Branch {
        id: id(n),
        name: format!("Branch {}", code),
        code: code.into(),
        parent_id: parent.map(id),
        is_active: true,
    }
}

fn user(n: u128, name: &str, branch: u128, roles: &[&str]) -> User {
    User {
        id: id(n),
        display_name: name.into(),
        email: format!("{}@example.org", name),
        branch_id: id(branch),
        roles: roles.iter().map(|r| r.to_string()).collect(),
        is_active: true,
    }
}

fn step(role: &str, target: StepTarget, parallel: bool) -> StepTemplate {
    StepTemplate {
        required_role: role.into(),
        target,
        parallel_with_previous: parallel,
        escalate: true,
    }
}

fn org_policy(name: &str, doc_type: &str, steps: Vec<StepTemplate>, auto: bool) -> ApprovalPolicy {
    ApprovalPolicy {
        id: Uuid::new_v4(),
        name: name.into(),
        scope: PolicyScope::Organization {
            document_type: doc_type.into(),
            security_level: SecurityLevel::Normal,
        },
        steps,
        auto_approve: auto,
    }
}

pub fn seed() -> OrgSeed {
    OrgSeed {
        branches: vec![
            branch(HQ, "HQ", None),
            branch(B1, "B1", Some(HQ)),
            branch(B1A, "B1A", Some(B1)),
        ],
        users: vec![
            user(MANAGER, "manager", B1, &["MANAGER"]),
            user(BACKUP, "backup", B1, &["MANAGER"]),
            user(DIRECTOR, "director", HQ, &["DIRECTOR"]),
            user(LEGAL, "legal", B1, &["LEGAL"]),
            user(AUTHOR, "author", B1, &[]),
            user(DEPUTY, "deputy", B1, &[]),
        ],
        policies: vec![
            org_policy(
                "expense",
                "EXPENSE",
                vec![
                    step("MANAGER", StepTarget::DocumentBranch, false),
                    step("DIRECTOR", StepTarget::Ancestor { levels: 1 }, false),
                ],
                false,
            ),
            org_policy(
                "contract",
                "CONTRACT",
                vec![
                    step("MANAGER", StepTarget::DocumentBranch, false),
                    step("LEGAL", StepTarget::DocumentBranch, true),
                    step("DIRECTOR", StepTarget::Root, false),
                ],
                false,
            ),
            org_policy("memo", "MEMO", vec![], true),
        ],
        delegations: vec![],
    }
}

pub fn world() -> World {
    world_with(seed())
}

pub fn world_with(seed: OrgSeed) -> World {
    let recorder = Arc::new(Recorder::default());
    let notifier = Notifier::new(recorder.clone(), fast_delivery());
    build(seed, notifier, recorder)
}

pub fn world_with_dispatcher(dispatcher: Arc<dyn NotificationDispatcher>) -> World {
    let notifier = Notifier::new(dispatcher, fast_delivery());
    build(seed(), notifier, Arc::new(Recorder::default()))
}

fn build(seed: OrgSeed, notifier: Notifier, recorder: Arc<Recorder>) -> World {
    let store = MemoryStore::new();
    let state = seed.apply().expect("fixture seed must apply");
    let engine = ApprovalWorkflowEngine::new(
        state,
        Arc::new(store.clone()),
        AuditTrail::new(Arc::new(store.clone())),
        notifier,
    );
    World {
        engine: Arc::new(engine),
        store,
        recorder,
    }
}

pub fn fast_delivery() -> DeliveryPolicy {
    DeliveryPolicy {
        timeout: Duration::from_millis(200),
        max_attempts: 2,
        base_backoff: Duration::from_millis(1),
    }
}

impl World {
    pub async fn draft(&self, document_type: &str) -> Document {
        self.draft_at(document_type, B1).await
    }

    pub async fn draft_at(&self, document_type: &str, branch: u128) -> Document {
        self.engine
            .create_draft(
                id(AUTHOR),
                NewDocument {
                    title: format!("{} request", document_type),
                    document_type: document_type.into(),
                    security_level: SecurityLevel::Normal,
                    branch_id: id(branch),
                    is_urgent: false,
                    attachment_ids: vec!["att-1".into()],
                },
            )
            .await
            .expect("draft")
    }

    pub async fn submitted(&self, document_type: &str) -> Document {
        let doc = self.draft(document_type).await;
        self.engine.submit(doc.id, id(AUTHOR)).await.expect("submit")
    }

    /// Unscoped, open-ended delegation from `from` to `to`.
    pub async fn delegate(&self, from: u128, to: u128) -> Delegation {
        self.engine
            .register_delegation(
                id(from),
                NewDelegation {
                    delegate_id: id(to),
                    scope: Default::default(),
                    valid_from: None,
                    valid_until: None,
                },
            )
            .await
            .expect("delegation")
    }

    pub async fn history_len(&self, document: Uuid) -> usize {
        use futures::TryStreamExt;
        let entries: Vec<_> = self
            .engine
            .audit()
            .history(document, 0)
            .try_collect()
            .await
            .unwrap();
        entries.len()
    }
}
