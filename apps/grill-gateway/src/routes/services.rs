use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use grill_sdk::RegistryError;
use serde::Deserialize;

use crate::state::AppState;

use super::{ApiError, ApiResult};

#[derive(Debug, Deserialize)]
pub struct RegisterServiceBody {
    pub name: String,
    pub base_url: String,
}

pub async fn list_services(State(state): State<AppState>) -> ApiResult<Vec<String>> {
    Ok(Json(state.service_names()))
}

/// Registered services join the end of the fan-out order and are seen by
/// operations that start after this call returns.
pub async fn register_service(
    State(state): State<AppState>,
    body: Result<Json<RegisterServiceBody>, JsonRejection>,
) -> Result<(StatusCode, Json<Vec<String>>), ApiError> {
    let Json(body) = body?;
    let name = body.name.trim();
    let base_url = body.base_url.trim();
    if name.is_empty() || base_url.is_empty() {
        return Err(ApiError::BadRequest(
            "service name and base_url are required".into(),
        ));
    }
    state
        .register_remote_service(name, base_url)
        .map_err(|err| match err {
            RegistryError::Duplicate(_) => ApiError::Conflict(err.to_string()),
        })?;
    Ok((StatusCode::CREATED, Json(state.service_names())))
}

pub async fn deregister_service(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Vec<String>> {
    if !state.deregister_service(&name) {
        return Err(ApiError::NotFound(format!("no service named {name:?}")));
    }
    Ok(Json(state.service_names()))
}
