//! docflow: document approval workflow engine and its HTTP service.
//!
//! The binary in `main.rs` wires these modules together; integration tests
//! in `tests/` use them directly.

use std::sync::Arc;

pub mod api;
pub mod audit;
pub mod config;
pub mod errors;
pub mod models;
pub mod notification;
pub mod org;
pub mod store;
pub mod workflow;

use store::postgres::PgStore;
use workflow::ApprovalWorkflowEngine;

/// Shared application state passed to handlers and middleware.
pub struct AppState {
    pub engine: ApprovalWorkflowEngine,
    /// Present when running against PostgreSQL; used by readiness checks.
    pub db: Option<PgStore>,
}

impl AppState {
    pub fn new(engine: ApprovalWorkflowEngine, db: Option<PgStore>) -> Arc<Self> {
        Arc::new(Self { engine, db })
    }
}
