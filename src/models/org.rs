use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A node in the organization tree. Branches are deactivated, never deleted,
/// so documents keep a valid reference forever.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Branch {
    pub id: Uuid,
    pub name: String,
    pub code: String,
    pub parent_id: Option<Uuid>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: Uuid,
    pub display_name: String,
    pub email: String,
    /// Primary branch membership.
    pub branch_id: Uuid,
    #[serde(default)]
    pub roles: BTreeSet<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

impl User {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    pub fn snapshot(&self) -> UserSnapshot {
        UserSnapshot {
            id: self.id,
            display_name: self.display_name.clone(),
            branch_id: self.branch_id,
        }
    }
}

/// Display identity frozen at decision time. Later renames or transfers of
/// the user do not rewrite history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserSnapshot {
    pub id: Uuid,
    pub display_name: String,
    pub branch_id: Uuid,
}

fn default_active() -> bool {
    true
}
