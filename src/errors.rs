use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("cannot {action} a document in state {state}")]
    InvalidState { action: &'static str, state: String },

    #[error("not authorized: {0}")]
    Authorization(String),

    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    #[error("no approval policy for type '{document_type}' at branch {branch_id} ({security_level})")]
    PolicyNotFound {
        document_type: String,
        branch_id: Uuid,
        security_level: String,
    },

    #[error("no eligible approver: {0}")]
    NoEligibleApprover(String),

    #[error("policy '{policy}' resolved to an empty approval line")]
    EmptyApprovalLine { policy: String },

    #[error("step {position} of document {document_id} was already decided or changed concurrently")]
    StaleStep { document_id: Uuid, position: u32 },

    #[error("document {document_id} was modified concurrently")]
    ConcurrentModification { document_id: Uuid },

    #[error("invalid hierarchy: {0}")]
    InvalidHierarchy(String),

    #[error("collaborator unavailable: {0}")]
    CollaboratorUnavailable(String),

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        AppError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Error class from the workflow taxonomy. Callers decide retry behaviour
    /// from this value only.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Validation(_)
            | AppError::InvalidState { .. }
            | AppError::EmptyApprovalLine { .. } => "validation_error",
            AppError::Authorization(_) => "authorization_error",
            AppError::NotFound { .. }
            | AppError::PolicyNotFound { .. }
            | AppError::NoEligibleApprover(_) => "not_found",
            AppError::StaleStep { .. } | AppError::ConcurrentModification { .. } => "stale_step",
            AppError::InvalidHierarchy(_) => "invalid_hierarchy",
            AppError::CollaboratorUnavailable(_) => "collaborator_unavailable",
            AppError::InvariantViolation(_) | AppError::Database(_) | AppError::Internal(_) => {
                "internal_error"
            }
        }
    }

    /// Machine-readable code, finer grained than [`AppError::kind`].
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "invalid_input",
            AppError::InvalidState { .. } => "invalid_state",
            AppError::Authorization(_) => "wrong_actor",
            AppError::NotFound { .. } => "not_found",
            AppError::PolicyNotFound { .. } => "policy_not_found",
            AppError::NoEligibleApprover(_) => "no_eligible_approver",
            AppError::EmptyApprovalLine { .. } => "empty_approval_line",
            AppError::StaleStep { .. } => "stale_step",
            AppError::ConcurrentModification { .. } => "concurrent_modification",
            AppError::InvalidHierarchy(_) => "hierarchy_cycle",
            AppError::CollaboratorUnavailable(_) => "collaborator_timeout",
            AppError::InvariantViolation(_) => "invariant_violation",
            AppError::Database(_) | AppError::Internal(_) => "internal_server_error",
        }
    }

    /// A lost race is the only error worth re-running the read-validate-write
    /// cycle for.
    pub fn is_retryable(&self) -> bool {
        self.kind() == "stale_step"
    }

    fn status(&self) -> StatusCode {
        match self.kind() {
            "validation_error" => StatusCode::UNPROCESSABLE_ENTITY,
            "authorization_error" => StatusCode::FORBIDDEN,
            "not_found" => StatusCode::NOT_FOUND,
            "stale_step" => StatusCode::CONFLICT,
            "invalid_hierarchy" => StatusCode::BAD_REQUEST,
            "collaborator_unavailable" => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let msg = match &self {
            AppError::InvariantViolation(detail) => {
                tracing::error!("Invariant violation: {}", detail);
                "internal server error".to_string()
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                "internal server error".to_string()
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {:#}", e);
                "internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(json!({
            "error": {
                "kind": self.kind(),
                "code": self.code(),
                "message": msg,
            }
        }));

        let mut response = (status, body).into_response();

        if self.is_retryable() {
            response.headers_mut().insert(
                "retry-after",
                axum::http::HeaderValue::from_static("0"),
            );
        }

        response
    }
}
