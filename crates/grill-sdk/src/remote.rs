use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::{
    OperationResult, ResourceDescriptor, ResourceOp, ResourceRequest, ResourceService,
    ServiceError, SessionHandle,
};

/// Backend service reached over HTTP.
///
/// Speaks the same `PUT {base}/resources/{add,delete}` protocol the gateway
/// exposes. Any non-2xx status, a 2xx body carrying a non-succeeded
/// [`OperationResult`], or a 2xx body that is not an [`OperationResult`]
/// counts as a failure. An empty 2xx body is a success.
#[derive(Clone)]
pub struct RemoteResourceService {
    name: String,
    base_url: String,
    http: Client,
}

impl RemoteResourceService {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self::with_client(name, base_url, Client::new())
    }

    pub fn with_client(name: impl Into<String>, base_url: impl Into<String>, http: Client) -> Self {
        let base_url: String = base_url.into();
        Self {
            name: name.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn send(
        &self,
        op: ResourceOp,
        session: &SessionHandle,
        resource: &ResourceDescriptor,
    ) -> Result<(), ServiceError> {
        let url = format!("{}/resources/{}", self.base_url, op.as_str());
        debug!(service = %self.name, %url, "forwarding resource operation");
        let res = self
            .http
            .put(url)
            .json(&ResourceRequest::new(*session, resource))
            .send()
            .await
            .map_err(|err| {
                if err.is_connect() || err.is_timeout() {
                    ServiceError::Unreachable(err.to_string())
                } else {
                    ServiceError::Http(err)
                }
            })?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(ServiceError::UnexpectedStatus { status, body });
        }
        let body = res.text().await?;
        if body.trim().is_empty() {
            return Ok(());
        }
        match serde_json::from_str::<OperationResult>(&body) {
            Ok(result) if result.is_success() => Ok(()),
            Ok(result) => Err(ServiceError::Rejected(result.message)),
            Err(err) => Err(ServiceError::Rejected(format!(
                "unreadable result from {}: {err}",
                self.name
            ))),
        }
    }
}

#[async_trait]
impl ResourceService for RemoteResourceService {
    fn name(&self) -> &str {
        &self.name
    }

    async fn add_resource(
        &self,
        session: &SessionHandle,
        resource: &ResourceDescriptor,
    ) -> Result<(), ServiceError> {
        self.send(ResourceOp::Add, session, resource).await
    }

    async fn delete_resource(
        &self,
        session: &SessionHandle,
        resource: &ResourceDescriptor,
    ) -> Result<(), ServiceError> {
        self.send(ResourceOp::Delete, session, resource).await
    }
}
