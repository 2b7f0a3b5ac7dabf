//! Contracts the gateway expects from its primary backend, plus the
//! in-process implementation used when no external compute backend is wired.

pub mod local;

use async_trait::async_trait;
use grill_sdk::{OperationHandle, ServiceError, SessionHandle};

use crate::params::{ParamScope, SessionParameter};

pub use local::{LocalResourceService, LocalSessionService};

/// Opens and closes sessions on the primary backend.
#[async_trait]
pub trait SessionBackend: Send + Sync {
    /// Creates backend state for `session`, applying `initial` parameters.
    /// The handle is issued by the gateway.
    async fn open_session(
        &self,
        session: &SessionHandle,
        username: &str,
        password: Option<&str>,
        initial: &[SessionParameter],
    ) -> Result<(), ServiceError>;

    async fn close_session(&self, session: &SessionHandle) -> Result<(), ServiceError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterQuery {
    pub verbose: bool,
    pub filter: Option<(ParamScope, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchState {
    Pending,
    Ready(Vec<String>),
}

/// Session-parameter store with a submit-then-fetch read protocol.
#[async_trait]
pub trait ParameterStore: Send + Sync {
    async fn submit_parameter_query(
        &self,
        session: &SessionHandle,
        query: ParameterQuery,
    ) -> Result<OperationHandle, ServiceError>;

    async fn fetch_results(&self, operation: &OperationHandle) -> Result<FetchState, ServiceError>;

    async fn close_operation(&self, operation: &OperationHandle) -> Result<(), ServiceError>;

    /// Process-wide sink; visible to every session.
    async fn set_system_property(&self, key: &str, value: &str) -> Result<(), ServiceError>;

    /// Session-bound sink for variable and configuration scopes.
    async fn set_session_parameter(
        &self,
        session: &SessionHandle,
        scope: ParamScope,
        key: &str,
        value: &str,
    ) -> Result<(), ServiceError>;
}
