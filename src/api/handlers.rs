use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    Extension, Json,
};
use futures::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use super::Actor;
use crate::errors::AppError;
use crate::models::approval::{ApprovalStep, Outcome};
use crate::models::audit::AuditEntry;
use crate::models::delegation::{Delegation, NewDelegation};
use crate::models::document::{Document, DraftPatch, NewDocument};
use crate::workflow::InboxItem;
use crate::AppState;

// ── Request / Response DTOs ──────────────────────────────────

#[derive(Deserialize)]
pub struct DecisionRequest {
    pub outcome: Outcome,
    pub comment: Option<String>,
}

#[derive(Deserialize)]
pub struct PaginationParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Serialize)]
pub struct HistoryResponse {
    pub document_id: Uuid,
    pub offset: i64,
    pub entries: Vec<AuditEntry>,
    /// Offset to resume from; absent once the end was reached.
    pub next_offset: Option<i64>,
}

fn parse_id(kind: &str, raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| {
        tracing::warn!("invalid {} id: {}", kind, raw);
        AppError::Validation(format!("'{}' is not a valid {} id", raw, kind))
    })
}

// ── Documents ────────────────────────────────────────────────

/// POST /api/v1/documents: create a draft owned by the caller
pub async fn create_document(
    State(state): State<Arc<AppState>>,
    Extension(Actor(actor)): Extension<Actor>,
    Json(payload): Json<NewDocument>,
) -> Result<impl IntoResponse, AppError> {
    let doc = state.engine.create_draft(actor, payload).await?;
    Ok((StatusCode::CREATED, Json(doc)))
}

/// GET /api/v1/documents/:id
pub async fn get_document(
    State(state): State<Arc<AppState>>,
    Path(id_str): Path<String>,
) -> Result<Json<Document>, AppError> {
    let id = parse_id("document", &id_str)?;
    Ok(Json(state.engine.get_document(id).await?))
}

/// PATCH /api/v1/documents/:id: edit a draft
pub async fn update_document(
    State(state): State<Arc<AppState>>,
    Extension(Actor(actor)): Extension<Actor>,
    Path(id_str): Path<String>,
    Json(patch): Json<DraftPatch>,
) -> Result<Json<Document>, AppError> {
    let id = parse_id("document", &id_str)?;
    Ok(Json(state.engine.update_draft(id, actor, patch).await?))
}

/// POST /api/v1/documents/:id/submit
pub async fn submit_document(
    State(state): State<Arc<AppState>>,
    Extension(Actor(actor)): Extension<Actor>,
    Path(id_str): Path<String>,
) -> Result<Json<Document>, AppError> {
    let id = parse_id("document", &id_str)?;
    Ok(Json(state.engine.submit(id, actor).await?))
}

/// POST /api/v1/documents/:id/steps/:position/decision
pub async fn decide_step(
    State(state): State<Arc<AppState>>,
    Extension(Actor(actor)): Extension<Actor>,
    Path((id_str, position)): Path<(String, u32)>,
    Json(payload): Json<DecisionRequest>,
) -> Result<Json<Document>, AppError> {
    let id = parse_id("document", &id_str)?;
    let doc = state
        .engine
        .decide(id, actor, position, payload.outcome, payload.comment)
        .await?;
    Ok(Json(doc))
}

/// POST /api/v1/documents/:id/withdraw
pub async fn withdraw_document(
    State(state): State<Arc<AppState>>,
    Extension(Actor(actor)): Extension<Actor>,
    Path(id_str): Path<String>,
) -> Result<Json<Document>, AppError> {
    let id = parse_id("document", &id_str)?;
    Ok(Json(state.engine.withdraw(id, actor).await?))
}

/// GET /api/v1/documents/:id/line
pub async fn get_approval_line(
    State(state): State<Arc<AppState>>,
    Path(id_str): Path<String>,
) -> Result<Json<Vec<ApprovalStep>>, AppError> {
    let id = parse_id("document", &id_str)?;
    Ok(Json(state.engine.approval_line(id).await?))
}

// ── Audit ────────────────────────────────────────────────────

/// GET /api/v1/documents/:id/history: one page of the audit trail
pub async fn get_history(
    State(state): State<Arc<AppState>>,
    Path(id_str): Path<String>,
    Query(params): Query<PaginationParams>,
) -> Result<Json<HistoryResponse>, AppError> {
    let id = parse_id("document", &id_str)?;
    let limit = params.limit.unwrap_or(50).clamp(1, 500);
    let offset = params.offset.unwrap_or(0).max(0);

    state.engine.get_document(id).await?;
    let entries = state.engine.audit().page(id, offset, limit).await?;
    let next_offset = (entries.len() as i64 == limit).then_some(offset + limit);

    Ok(Json(HistoryResponse {
        document_id: id,
        offset,
        entries,
        next_offset,
    }))
}

/// GET /api/v1/documents/:id/history/stream: the whole trail as SSE
///
/// Each event carries one entry; `id` is its offset so a client can resume
/// with `?offset=<last id + 1>`.
pub async fn stream_history(
    State(state): State<Arc<AppState>>,
    Path(id_str): Path<String>,
    Query(params): Query<PaginationParams>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let id = parse_id("document", &id_str)?;
    let offset = params.offset.unwrap_or(0).max(0);
    state.engine.get_document(id).await?;

    let stream = state
        .engine
        .audit()
        .history(id, offset)
        .enumerate()
        .map(move |(i, entry)| {
            let event = match entry {
                Ok(entry) => Event::default()
                    .event("audit")
                    .id((offset + i as i64).to_string())
                    .data(serde_json::to_string(&entry).unwrap_or_default()),
                Err(e) => {
                    tracing::error!(document_id = %id, error = %e, "history stream failed");
                    Event::default()
                        .event("error")
                        .data(json!({ "kind": e.kind(), "code": e.code() }).to_string())
                }
            };
            Ok(event)
        });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

// ── Inbox ────────────────────────────────────────────────────

/// GET /api/v1/inbox: steps waiting on the caller
pub async fn inbox(
    State(state): State<Arc<AppState>>,
    Extension(Actor(actor)): Extension<Actor>,
) -> Result<Json<Vec<InboxItem>>, AppError> {
    Ok(Json(state.engine.pending_for(actor).await?))
}

// ── Delegations ──────────────────────────────────────────────

/// POST /api/v1/delegations: the caller delegates their authority
pub async fn create_delegation(
    State(state): State<Arc<AppState>>,
    Extension(Actor(actor)): Extension<Actor>,
    Json(payload): Json<NewDelegation>,
) -> Result<impl IntoResponse, AppError> {
    let delegation = state.engine.register_delegation(actor, payload).await?;
    Ok((StatusCode::CREATED, Json(delegation)))
}

/// GET /api/v1/delegations: delegations given or received by the caller
pub async fn list_delegations(
    State(state): State<Arc<AppState>>,
    Extension(Actor(actor)): Extension<Actor>,
) -> Json<Vec<Delegation>> {
    Json(state.engine.list_delegations(actor).await)
}

/// DELETE /api/v1/delegations/:id
pub async fn revoke_delegation(
    State(state): State<Arc<AppState>>,
    Extension(Actor(actor)): Extension<Actor>,
    Path(id_str): Path<String>,
) -> Result<Json<Delegation>, AppError> {
    let id = parse_id("delegation", &id_str)?;
    Ok(Json(state.engine.revoke_delegation(actor, id).await?))
}
