use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::org::UserSnapshot;

/// One position in a document's approval line.
///
/// `assignee_id` is the role holder picked when the line was built;
/// `approver_id` is who was expected to act after one hop of delegation at
/// that moment. Pending steps are re-resolved from `assignee_id` when the
/// decision is made.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApprovalStep {
    pub position: u32,
    pub required_role: String,
    /// Branch the role was resolved against.
    pub branch_id: Uuid,
    /// True when this step shares its position with the step before it.
    #[serde(default)]
    pub parallel: bool,
    pub assignee_id: Uuid,
    pub approver_id: Uuid,
    pub status: StepStatus,
    pub decided_by: Option<UserSnapshot>,
    pub decided_at: Option<DateTime<Utc>>,
    pub comment: Option<String>,
}

impl ApprovalStep {
    pub fn is_pending(&self) -> bool {
        self.status == StepStatus::Pending
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Approved,
    Rejected,
    Skipped,
}

/// An approver's verdict on a step.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    #[serde(alias = "approved")]
    Approve,
    #[serde(alias = "rejected")]
    Reject,
}

/// Lowest position that still has a pending step. All pending steps at this
/// position are concurrently actionable.
pub fn current_position(line: &[ApprovalStep]) -> Option<u32> {
    line.iter()
        .filter(|s| s.is_pending())
        .map(|s| s.position)
        .min()
}

/// Check the structural invariant of a line: sorted, starting at 0, each
/// non-parallel step exactly one past its predecessor and each parallel step
/// sharing its predecessor's position.
///
/// A violation is a bug in line construction or a corrupted row, never a
/// caller error.
pub fn check_line(line: &[ApprovalStep]) -> Result<(), AppError> {
    let mut prev: Option<u32> = None;
    for (idx, step) in line.iter().enumerate() {
        let expected = match (prev, step.parallel) {
            (None, false) => 0,
            (None, true) => {
                return Err(AppError::InvariantViolation(format!(
                    "step {} is parallel but has no predecessor",
                    idx
                )))
            }
            (Some(p), true) => p,
            (Some(p), false) => p + 1,
        };
        if step.position != expected {
            return Err(AppError::InvariantViolation(format!(
                "step {} has position {} but {} was expected",
                idx, step.position, expected
            )));
        }
        prev = Some(step.position);
    }
    Ok(())
}
