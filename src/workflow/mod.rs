pub mod delegation;
pub mod engine;
pub mod line;
pub mod policy_resolver;

pub use engine::{ApprovalWorkflowEngine, InboxItem};
