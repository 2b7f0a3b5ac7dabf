//! Shared types and clients for the Grill session gateway.
//!
//! Consumed by the gateway itself, by backend services that want to speak the
//! gateway's resource protocol, and by CLI tools/tests driving the gateway
//! over HTTP.

pub mod handle;
pub mod registry;
pub mod remote;
pub mod resource;
pub mod result;
pub mod service;

use std::collections::HashMap;

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

pub use handle::{InvalidHandle, OperationHandle, SessionHandle};
pub use registry::{RegistryError, RegistrySnapshot, ServiceRegistry};
pub use remote::RemoteResourceService;
pub use resource::{ResourceDescriptor, ResourceKind, ResourceOp, ResourceRequest};
pub use result::{OperationResult, OperationStatus, ServiceFailure, StringList};
pub use service::{ResourceService, ServiceError};

#[derive(Debug, Serialize)]
pub struct OpenSessionRequest {
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub sessionconf: HashMap<String, String>,
}

#[derive(Debug, Serialize)]
pub struct SetParamRequest {
    pub sessionid: SessionHandle,
    pub key: String,
    pub value: String,
}

/// Asynchronous client for the gateway's session API.
#[derive(Clone)]
pub struct GatewayClient {
    http: Client,
    base_url: String,
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status: {status} body={body}")]
    UnexpectedStatus {
        status: reqwest::StatusCode,
        body: String,
    },
}

impl GatewayClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            http: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn health(&self) -> Result<String, ClientError> {
        let res = self
            .http
            .get(format!("{}/session", self.base_url))
            .send()
            .await?;
        if res.status().is_success() {
            Ok(res.text().await?)
        } else {
            Err(unexpected(res).await)
        }
    }

    pub async fn open_session(
        &self,
        request: &OpenSessionRequest,
    ) -> Result<SessionHandle, ClientError> {
        let req = self
            .http
            .post(format!("{}/session", self.base_url))
            .json(request);
        decode(req).await
    }

    pub async fn close_session(
        &self,
        session: SessionHandle,
    ) -> Result<OperationResult, ClientError> {
        let req = self
            .http
            .delete(format!("{}/session", self.base_url))
            .query(&[("sessionid", session.to_string())]);
        decode(req).await
    }

    pub async fn add_resource(
        &self,
        session: SessionHandle,
        resource: &ResourceDescriptor,
    ) -> Result<OperationResult, ClientError> {
        self.resource_op(ResourceOp::Add, session, resource).await
    }

    pub async fn delete_resource(
        &self,
        session: SessionHandle,
        resource: &ResourceDescriptor,
    ) -> Result<OperationResult, ClientError> {
        self.resource_op(ResourceOp::Delete, session, resource).await
    }

    async fn resource_op(
        &self,
        op: ResourceOp,
        session: SessionHandle,
        resource: &ResourceDescriptor,
    ) -> Result<OperationResult, ClientError> {
        let req = self
            .http
            .put(format!("{}/session/resources/{}", self.base_url, op.as_str()))
            .json(&ResourceRequest::new(session, resource));
        decode(req).await
    }

    pub async fn get_params(
        &self,
        session: SessionHandle,
        verbose: bool,
        key: Option<&str>,
    ) -> Result<Vec<String>, ClientError> {
        let mut query = vec![
            ("sessionid", session.to_string()),
            ("verbose", verbose.to_string()),
        ];
        if let Some(key) = key {
            query.push(("key", key.to_string()));
        }
        let req = self
            .http
            .get(format!("{}/session/params", self.base_url))
            .query(&query);
        let list: StringList = decode(req).await?;
        Ok(list.elements)
    }

    pub async fn set_param(
        &self,
        session: SessionHandle,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<OperationResult, ClientError> {
        let req = self
            .http
            .put(format!("{}/session/params", self.base_url))
            .json(&SetParamRequest {
                sessionid: session,
                key: key.into(),
                value: value.into(),
            });
        decode(req).await
    }

    pub async fn list_services(&self) -> Result<Vec<String>, ClientError> {
        let req = self.http.get(format!("{}/services", self.base_url));
        decode(req).await
    }
}

async fn decode<T>(req: reqwest::RequestBuilder) -> Result<T, ClientError>
where
    T: DeserializeOwned,
{
    let res = req.send().await?;
    if res.status().is_success() {
        Ok(res.json::<T>().await?)
    } else {
        Err(unexpected(res).await)
    }
}

async fn unexpected(res: reqwest::Response) -> ClientError {
    let status = res.status();
    let body = res.text().await.unwrap_or_default();
    ClientError::UnexpectedStatus { status, body }
}
