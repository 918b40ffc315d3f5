use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Request, State},
    http::{HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::errors::AppError;
use crate::AppState;

pub mod handlers;

/// The authenticated caller, taken from `X-User-Id`. The identity provider
/// in front of this service is trusted; the engine still checks the user
/// exists and is active.
#[derive(Debug, Clone, Copy)]
pub struct Actor(pub Uuid);

/// Build the workflow API router.
/// All routes are relative; the caller mounts this under `/api/v1`.
pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/documents", post(handlers::create_document))
        .route(
            "/documents/:id",
            get(handlers::get_document).patch(handlers::update_document),
        )
        .route("/documents/:id/submit", post(handlers::submit_document))
        .route(
            "/documents/:id/steps/:position/decision",
            post(handlers::decide_step),
        )
        .route("/documents/:id/withdraw", post(handlers::withdraw_document))
        .route("/documents/:id/line", get(handlers::get_approval_line))
        .route("/documents/:id/history", get(handlers::get_history))
        .route(
            "/documents/:id/history/stream",
            get(handlers::stream_history),
        )
        .route("/inbox", get(handlers::inbox))
        .route(
            "/delegations",
            get(handlers::list_delegations).post(handlers::create_delegation),
        )
        .route("/delegations/:id", delete(handlers::revoke_delegation))
        .layer(middleware::from_fn(identify))
        .layer(TraceLayer::new_for_http())
        .fallback(fallback_404)
}

/// Full application: health probes, the API under `/api/v1`, and the
/// response-wide layers.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/readyz", get(readiness_check))
        .nest("/api/v1", api_router())
        .with_state(state)
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(TraceLayer::new_for_http())
        .layer(cors())
        .layer(middleware::from_fn(request_id_middleware))
        .layer(middleware::from_fn(security_headers_middleware))
}

async fn fallback_404() -> StatusCode {
    StatusCode::NOT_FOUND
}

/// Middleware: parses `X-User-Id` into an [`Actor`] request extension.
async fn identify(mut req: Request, next: Next) -> Result<Response, AppError> {
    let raw = req
        .headers()
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .ok_or_else(|| {
            tracing::warn!("workflow API: missing X-User-Id header");
            AppError::Authorization("missing X-User-Id header".into())
        })?;
    let id = Uuid::parse_str(raw).map_err(|_| {
        tracing::warn!("workflow API: malformed X-User-Id header");
        AppError::Authorization("X-User-Id must be a UUID".into())
    })?;
    req.extensions_mut().insert(Actor(id));
    Ok(next.run(req).await)
}

async fn readiness_check(State(state): State<Arc<AppState>>) -> Response {
    let Some(db) = state.db.as_ref() else {
        return "ok".into_response();
    };
    match sqlx::query("SELECT 1").execute(db.pool()).await {
        Ok(_) => "ok".into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "readiness check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "database unavailable").into_response()
        }
    }
}

fn cors() -> CorsLayer {
    use axum::http::{HeaderName, Method};
    use tower_http::cors::AllowOrigin;

    let frontend_origin =
        std::env::var("FRONTEND_ORIGIN").unwrap_or_else(|_| "http://localhost:3000".to_string());
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(move |origin, _| {
            let origin_str = origin.to_str().unwrap_or("");
            origin_str == frontend_origin
                || origin_str.starts_with("http://localhost:")
                || origin_str.starts_with("http://127.0.0.1:")
        }))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            HeaderName::from_static("content-type"),
            HeaderName::from_static("x-user-id"),
            HeaderName::from_static("x-request-id"),
        ])
}

/// Middleware: injects a unique X-Request-Id into every response.
async fn request_id_middleware(req: Request, next: Next) -> Response {
    let req_id = Uuid::new_v4().to_string();
    let mut resp = next.run(req).await;
    if let Ok(val) = HeaderValue::from_str(&req_id) {
        resp.headers_mut().insert("x-request-id", val);
    }
    resp
}

/// Middleware: injects security headers into every response.
async fn security_headers_middleware(req: Request, next: Next) -> Response {
    let mut resp = next.run(req).await;
    let headers = resp.headers_mut();

    headers.insert("X-Content-Type-Options", HeaderValue::from_static("nosniff"));
    headers.insert("X-Frame-Options", HeaderValue::from_static("DENY"));
    // Approval state must never be served from a cache.
    headers.insert("Cache-Control", HeaderValue::from_static("no-store"));
    headers.insert("Referrer-Policy", HeaderValue::from_static("no-referrer"));
    headers.remove("Server");

    resp
}
