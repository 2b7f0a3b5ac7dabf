mod services;
mod session;

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, put},
    Json, Router,
};
use grill_sdk::SessionHandle;
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::GatewayError;
use crate::metrics;
use crate::state::AppState;

pub use services::*;
pub use session::*;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .route("/metrics", get(metrics_handler))
        .route(
            "/session",
            get(session_status).post(open_session).delete(close_session),
        )
        .route("/session/resources/add", put(add_resource))
        .route("/session/resources/delete", put(delete_resource))
        .route("/session/params", get(get_params).put(set_param))
        .route("/sessions", get(list_sessions))
        .route("/services", get(list_services).post(register_service))
        .route("/services/:name", delete(deregister_service))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn metrics_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::gather(),
    )
}

pub type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Debug)]
pub enum ApiError {
    InvalidSession(String),
    Unauthorized(String),
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Dispatch(String),
    Internal(String),
}

#[derive(Debug, Serialize)]
struct ApiErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, message) = match self {
            ApiError::InvalidSession(msg) => (StatusCode::NOT_FOUND, "invalid_session", msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg),
            ApiError::Dispatch(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "dispatch_failure", msg)
            }
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal", msg),
        };
        (status, Json(ApiErrorBody { error, message })).into_response()
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        let message = err.to_string();
        match err {
            GatewayError::InvalidSession(_) => ApiError::InvalidSession(message),
            GatewayError::Authentication(_) => ApiError::Unauthorized(message),
            GatewayError::InvalidScope(_) => ApiError::BadRequest(message),
            GatewayError::BackendUnavailable(_) => ApiError::Dispatch(message),
            GatewayError::Configuration(_) => ApiError::Internal(message),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

/// A handle that does not parse can never name a live session.
fn parse_handle(raw: &str) -> Result<SessionHandle, ApiError> {
    raw.trim()
        .parse()
        .map_err(|_| ApiError::InvalidSession(format!("invalid session: {raw}")))
}
