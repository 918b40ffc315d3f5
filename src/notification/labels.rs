//! Display text for notification tags. Kept apart from the domain enums so
//! wording can change without touching workflow code.

use crate::models::notification::{NotificationKind, Priority};

const KIND_LABELS: &[(NotificationKind, &str)] = &[
    (NotificationKind::ApprovalRequested, "Approval requested"),
    (NotificationKind::DocumentApproved, "Document approved"),
    (NotificationKind::DocumentRejected, "Document rejected"),
    (NotificationKind::DocumentWithdrawn, "Document withdrawn"),
];

const PRIORITY_LABELS: &[(Priority, &str)] = &[
    (Priority::Normal, "Normal"),
    (Priority::High, "Urgent"),
];

pub fn kind_label(kind: NotificationKind) -> &'static str {
    KIND_LABELS
        .iter()
        .find(|(k, _)| *k == kind)
        .map(|(_, label)| *label)
        .unwrap_or("Notification")
}

pub fn priority_label(priority: Priority) -> &'static str {
    PRIORITY_LABELS
        .iter()
        .find(|(p, _)| *p == priority)
        .map(|(_, label)| *label)
        .unwrap_or("Normal")
}
