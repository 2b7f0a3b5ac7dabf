use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use grill_sdk::{
    OperationResult, RegistryError, RemoteResourceService, ResourceDescriptor, ResourceOp,
    ServiceRegistry, SessionHandle,
};
use tokio::task::JoinHandle;
use tracing::info;

use crate::backend::local::PRIMARY_SERVICE_NAME;
use crate::backend::{LocalResourceService, LocalSessionService};
use crate::config::AppConfig;
use crate::coordinator::ResourceCoordinator;
use crate::error::GatewayError;
use crate::params::{ParamScope, ParameterBridge};
use crate::sessions::{SessionManager, SessionSummary};

#[derive(Clone)]
pub struct AppState {
    start: Instant,
    sessions: SessionManager,
    params: ParameterBridge,
    registry: ServiceRegistry,
    coordinator: ResourceCoordinator,
}

impl AppState {
    pub fn new(
        sessions: SessionManager,
        params: ParameterBridge,
        registry: ServiceRegistry,
        coordinator: ResourceCoordinator,
    ) -> Self {
        Self {
            start: Instant::now(),
            sessions,
            params,
            registry,
            coordinator,
        }
    }

    pub fn from_config(cfg: &AppConfig) -> Result<Self, GatewayError> {
        let primary = Arc::new(LocalSessionService::new(cfg.user_table(), cfg.auth_bypass));
        Self::with_primary(cfg, primary)
    }

    /// Builds the gateway around an in-process primary backend. The primary
    /// is always the first service in the registry, followed by configured
    /// local services and then remote ones.
    pub fn with_primary(
        cfg: &AppConfig,
        primary: Arc<LocalSessionService>,
    ) -> Result<Self, GatewayError> {
        let registry = ServiceRegistry::new();
        registry
            .register(primary.clone())
            .map_err(|err| GatewayError::Configuration(err.to_string()))?;
        for name in cfg.local_service_names() {
            registry
                .register(Arc::new(LocalResourceService::new(name)))
                .map_err(|err| GatewayError::Configuration(err.to_string()))?;
        }
        for (name, url) in cfg.remote_service_urls() {
            registry
                .register(Arc::new(RemoteResourceService::new(name, url)))
                .map_err(|err| GatewayError::Configuration(err.to_string()))?;
        }
        info!(services = ?registry.names(), "backend services registered");

        let sessions = SessionManager::new(primary.clone(), cfg.session_idle_timeout());
        let params = ParameterBridge::new(
            primary,
            cfg.param_fetch_timeout(),
            cfg.param_poll_interval(),
        );
        Ok(Self::new(
            sessions,
            params,
            registry,
            ResourceCoordinator::new(cfg.backend_timeout()),
        ))
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start.elapsed().as_secs()
    }

    pub fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        self.sessions.spawn_sweeper(interval)
    }

    pub async fn open_session(
        &self,
        username: &str,
        password: Option<&str>,
        initial_config: &HashMap<String, String>,
    ) -> Result<SessionHandle, GatewayError> {
        self.sessions.open(username, password, initial_config).await
    }

    pub async fn close_session(&self, handle: &SessionHandle) -> Result<(), GatewayError> {
        self.sessions.close(handle).await
    }

    /// Validates the handle, then fans the operation out over the services
    /// registered at this moment. A primary that no longer knows the session
    /// retires the handle.
    pub async fn apply_resource(
        &self,
        op: ResourceOp,
        handle: &SessionHandle,
        resource: &ResourceDescriptor,
    ) -> Result<OperationResult, GatewayError> {
        self.sessions.validate(handle).await?;
        let snapshot = self.registry.snapshot();
        let result = self
            .coordinator
            .apply(op, handle, resource, &snapshot)
            .await;
        if let Some(failure) = &result.first_failure {
            if failure.unknown_session && failure.service_name == PRIMARY_SERVICE_NAME {
                self.sessions.forget(handle);
            }
        }
        Ok(result)
    }

    pub async fn get_params(
        &self,
        handle: &SessionHandle,
        verbose: bool,
        key: Option<&str>,
    ) -> Result<Vec<String>, GatewayError> {
        self.sessions.validate(handle).await?;
        let rows = self.params.get(handle, verbose, key).await;
        self.forget_if_unknown(rows)
    }

    pub async fn set_param(
        &self,
        handle: &SessionHandle,
        key: &str,
        value: &str,
    ) -> Result<ParamScope, GatewayError> {
        self.sessions.validate(handle).await?;
        let scope = self.params.set(handle, key, value).await;
        self.forget_if_unknown(scope)
    }

    pub fn register_remote_service(
        &self,
        name: &str,
        base_url: &str,
    ) -> Result<(), RegistryError> {
        self.registry
            .register(Arc::new(RemoteResourceService::new(name, base_url)))?;
        info!(service = name, base_url, "remote service registered");
        Ok(())
    }

    pub fn deregister_service(&self, name: &str) -> bool {
        let removed = self.registry.deregister(name);
        if removed {
            info!(service = name, "service deregistered");
        }
        removed
    }

    pub fn service_names(&self) -> Vec<String> {
        self.registry.names()
    }

    pub fn list_sessions(&self) -> Vec<SessionSummary> {
        self.sessions.list()
    }

    fn forget_if_unknown<T>(&self, outcome: Result<T, GatewayError>) -> Result<T, GatewayError> {
        if let Err(GatewayError::InvalidSession(handle)) = &outcome {
            self.sessions.forget(handle);
        }
        outcome
    }
}
