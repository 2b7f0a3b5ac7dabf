use std::time::Duration;

use async_trait::async_trait;

use crate::{ResourceDescriptor, ResourceOp, SessionHandle};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("service unreachable: {0}")]
    Unreachable(String),
    #[error("rejected: {0}")]
    Rejected(String),
    #[error("session unknown to backend")]
    UnknownSession,
    #[error("authentication failed: {0}")]
    Authentication(String),
    #[error("timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status: {status} body={body}")]
    UnexpectedStatus {
        status: reqwest::StatusCode,
        body: String,
    },
}

/// A backend capable of accepting or rejecting resource operations for a
/// session.
///
/// Implementations must leave their resource set untouched when they return
/// an error; the gateway never compensates a failed call.
#[async_trait]
pub trait ResourceService: Send + Sync {
    /// Unique name within a registry.
    fn name(&self) -> &str;

    async fn add_resource(
        &self,
        session: &SessionHandle,
        resource: &ResourceDescriptor,
    ) -> Result<(), ServiceError>;

    async fn delete_resource(
        &self,
        session: &SessionHandle,
        resource: &ResourceDescriptor,
    ) -> Result<(), ServiceError>;

    async fn apply(
        &self,
        op: ResourceOp,
        session: &SessionHandle,
        resource: &ResourceDescriptor,
    ) -> Result<(), ServiceError> {
        match op {
            ResourceOp::Add => self.add_resource(session, resource).await,
            ResourceOp::Delete => self.delete_resource(session, resource).await,
        }
    }
}
