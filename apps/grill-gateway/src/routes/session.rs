use std::collections::HashMap;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    Json,
};
use grill_sdk::resource::UnknownResourceKind;
use grill_sdk::{
    OperationResult, ResourceDescriptor, ResourceKind, ResourceOp, SessionHandle, StringList,
};
use serde::Deserialize;
use tracing::{info, warn};

use crate::sessions::SessionSummary;
use crate::state::AppState;

use super::{parse_handle, ApiError, ApiResult};

#[derive(Debug, Deserialize)]
pub struct OpenSessionBody {
    pub username: String,
    pub password: Option<String>,
    #[serde(default)]
    pub sessionconf: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct SessionQuery {
    pub sessionid: String,
}

#[derive(Debug, Deserialize)]
pub struct ResourceBody {
    pub sessionid: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub path: String,
}

#[derive(Debug, Deserialize)]
pub struct ParamsQuery {
    pub sessionid: String,
    #[serde(default)]
    pub verbose: bool,
    pub key: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SetParamBody {
    pub sessionid: String,
    pub key: String,
    pub value: String,
}

pub async fn session_status() -> &'static str {
    "session is up!"
}

pub async fn open_session(
    State(state): State<AppState>,
    body: Result<Json<OpenSessionBody>, JsonRejection>,
) -> ApiResult<SessionHandle> {
    let Json(body) = body?;
    let handle = state
        .open_session(&body.username, body.password.as_deref(), &body.sessionconf)
        .await?;
    Ok(Json(handle))
}

pub async fn close_session(
    State(state): State<AppState>,
    query: Result<Query<SessionQuery>, QueryRejection>,
) -> ApiResult<OperationResult> {
    let Query(query) = query?;
    let handle = parse_handle(&query.sessionid)?;
    state.close_session(&handle).await?;
    Ok(Json(OperationResult::succeeded(format!(
        "Close session with id {handle} succeeded"
    ))))
}

pub async fn add_resource(
    State(state): State<AppState>,
    body: Result<Json<ResourceBody>, JsonRejection>,
) -> ApiResult<OperationResult> {
    resource_op(state, ResourceOp::Add, body).await
}

pub async fn delete_resource(
    State(state): State<AppState>,
    body: Result<Json<ResourceBody>, JsonRejection>,
) -> ApiResult<OperationResult> {
    resource_op(state, ResourceOp::Delete, body).await
}

async fn resource_op(
    state: AppState,
    op: ResourceOp,
    body: Result<Json<ResourceBody>, JsonRejection>,
) -> ApiResult<OperationResult> {
    let Json(body) = body?;
    let handle = parse_handle(&body.sessionid)?;
    let kind: ResourceKind = body
        .kind
        .parse()
        .map_err(|err: UnknownResourceKind| ApiError::BadRequest(err.to_string()))?;
    let location = body.path.trim();
    if location.is_empty() {
        return Err(ApiError::BadRequest("resource path must not be empty".into()));
    }

    let descriptor = ResourceDescriptor::new(kind, location);
    let result = state.apply_resource(op, &handle, &descriptor).await?;
    if result.is_success() {
        info!(session = %handle, %op, %kind, location, "resource operation finished");
    } else {
        warn!(
            session = %handle,
            %op,
            %kind,
            location,
            status = result.status.as_str(),
            "resource operation incomplete"
        );
    }
    Ok(Json(result))
}

pub async fn get_params(
    State(state): State<AppState>,
    query: Result<Query<ParamsQuery>, QueryRejection>,
) -> ApiResult<StringList> {
    let Query(query) = query?;
    let handle = parse_handle(&query.sessionid)?;
    let rows = state
        .get_params(&handle, query.verbose, query.key.as_deref())
        .await?;
    Ok(Json(StringList::from(rows)))
}

pub async fn set_param(
    State(state): State<AppState>,
    body: Result<Json<SetParamBody>, JsonRejection>,
) -> ApiResult<OperationResult> {
    let Json(body) = body?;
    let handle = parse_handle(&body.sessionid)?;
    state.set_param(&handle, &body.key, &body.value).await?;
    Ok(Json(OperationResult::succeeded("Set param succeeded")))
}

pub async fn list_sessions(State(state): State<AppState>) -> ApiResult<Vec<SessionSummary>> {
    Ok(Json(state.list_sessions()))
}
