use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use grill_sdk::{
    OperationHandle, ResourceDescriptor, ResourceService, ServiceError, SessionHandle,
};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use super::{FetchState, ParameterQuery, ParameterStore, SessionBackend};
use crate::params::{ParamScope, SessionParameter};

pub const PRIMARY_SERVICE_NAME: &str = "session";

/// Per-session resource lists held by an in-process backend.
#[derive(Default)]
struct ResourceSet {
    entries: Mutex<HashMap<SessionHandle, Vec<ResourceDescriptor>>>,
}

impl ResourceSet {
    async fn add(
        &self,
        session: &SessionHandle,
        resource: &ResourceDescriptor,
    ) -> Result<(), ServiceError> {
        if resource.is_local_path() {
            let exists = tokio::fs::try_exists(&resource.location)
                .await
                .unwrap_or(false);
            if !exists {
                return Err(ServiceError::Rejected(format!(
                    "{} resource {} does not exist",
                    resource.kind, resource.location
                )));
            }
        }
        let mut guard = self.entries.lock();
        let list = guard.entry(*session).or_default();
        if !list.contains(resource) {
            list.push(resource.clone());
        }
        Ok(())
    }

    fn delete(
        &self,
        session: &SessionHandle,
        resource: &ResourceDescriptor,
    ) -> Result<(), ServiceError> {
        let mut guard = self.entries.lock();
        let Some(list) = guard.get_mut(session) else {
            return Err(not_added(resource));
        };
        let Some(idx) = list.iter().position(|r| r == resource) else {
            return Err(not_added(resource));
        };
        list.remove(idx);
        if list.is_empty() {
            guard.remove(session);
        }
        Ok(())
    }

    fn list(&self, session: &SessionHandle) -> Vec<ResourceDescriptor> {
        self.entries
            .lock()
            .get(session)
            .cloned()
            .unwrap_or_default()
    }

    fn drop_session(&self, session: &SessionHandle) {
        self.entries.lock().remove(session);
    }
}

fn not_added(resource: &ResourceDescriptor) -> ServiceError {
    ServiceError::Rejected(format!(
        "{} resource {} was not added to this session",
        resource.kind, resource.location
    ))
}

/// Named in-process resource service with no session bookkeeping of its own.
pub struct LocalResourceService {
    name: String,
    resources: ResourceSet,
}

impl LocalResourceService {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resources: ResourceSet::default(),
        }
    }

    pub fn resources(&self, session: &SessionHandle) -> Vec<ResourceDescriptor> {
        self.resources.list(session)
    }
}

#[async_trait]
impl ResourceService for LocalResourceService {
    fn name(&self) -> &str {
        &self.name
    }

    async fn add_resource(
        &self,
        session: &SessionHandle,
        resource: &ResourceDescriptor,
    ) -> Result<(), ServiceError> {
        self.resources.add(session, resource).await
    }

    async fn delete_resource(
        &self,
        session: &SessionHandle,
        resource: &ResourceDescriptor,
    ) -> Result<(), ServiceError> {
        self.resources.delete(session, resource)
    }
}

#[derive(Debug, Default)]
struct LocalSession {
    username: String,
    variables: BTreeMap<String, String>,
    config: BTreeMap<String, String>,
}

impl LocalSession {
    /// System properties are process-wide and have no per-session map.
    fn scope_mut(&mut self, scope: ParamScope) -> Option<&mut BTreeMap<String, String>> {
        match scope {
            ParamScope::SessionVariable => Some(&mut self.variables),
            ParamScope::SessionConfig => Some(&mut self.config),
            ParamScope::System => None,
        }
    }
}

/// In-process primary backend: authenticates users, owns session parameter
/// state, answers parameter queries and keeps the `session` service's
/// resource set.
pub struct LocalSessionService {
    users: HashMap<String, String>,
    auth_bypass: bool,
    system: RwLock<BTreeMap<String, String>>,
    sessions: RwLock<HashMap<SessionHandle, LocalSession>>,
    operations: Mutex<HashMap<OperationHandle, Vec<String>>>,
    resources: ResourceSet,
}

impl LocalSessionService {
    pub fn new(users: HashMap<String, String>, auth_bypass: bool) -> Self {
        Self {
            users,
            auth_bypass,
            system: RwLock::new(BTreeMap::new()),
            sessions: RwLock::new(HashMap::new()),
            operations: Mutex::new(HashMap::new()),
            resources: ResourceSet::default(),
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn session_user(&self, session: &SessionHandle) -> Option<String> {
        self.sessions
            .read()
            .get(session)
            .map(|s| s.username.clone())
    }

    pub fn resources(&self, session: &SessionHandle) -> Vec<ResourceDescriptor> {
        self.resources.list(session)
    }

    fn authenticate(&self, username: &str, password: Option<&str>) -> Result<(), ServiceError> {
        if self.auth_bypass {
            return Ok(());
        }
        match (self.users.get(username), password) {
            (Some(expected), Some(given)) if expected == given => Ok(()),
            _ => Err(ServiceError::Authentication(username.to_string())),
        }
    }

    fn ensure_session(&self, session: &SessionHandle) -> Result<(), ServiceError> {
        if self.sessions.read().contains_key(session) {
            Ok(())
        } else {
            Err(ServiceError::UnknownSession)
        }
    }

    fn render_rows(&self, session: &SessionHandle, query: &ParameterQuery) -> Result<Vec<String>, ServiceError> {
        let sessions = self.sessions.read();
        let state = sessions.get(session).ok_or(ServiceError::UnknownSession)?;
        let system = self.system.read();

        if let Some((scope, key)) = &query.filter {
            let value = match scope {
                ParamScope::System => system.get(key),
                ParamScope::SessionVariable => state.variables.get(key),
                ParamScope::SessionConfig => state.config.get(key),
            };
            let label = match scope {
                ParamScope::SessionConfig => key.clone(),
                other => format!("{}{}", other.prefix(), key),
            };
            return Ok(value
                .map(|v| vec![format!("{label}={v}")])
                .unwrap_or_default());
        }

        let mut rows: Vec<String> = state
            .config
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        if query.verbose {
            rows.extend(state.variables.iter().map(|(k, v)| {
                format!("{}{k}={v}", ParamScope::SessionVariable.prefix())
            }));
            rows.extend(
                system
                    .iter()
                    .map(|(k, v)| format!("{}{k}={v}", ParamScope::System.prefix())),
            );
        }
        Ok(rows)
    }
}

#[async_trait]
impl SessionBackend for LocalSessionService {
    async fn open_session(
        &self,
        session: &SessionHandle,
        username: &str,
        password: Option<&str>,
        initial: &[SessionParameter],
    ) -> Result<(), ServiceError> {
        self.authenticate(username, password)?;
        let mut state = LocalSession {
            username: username.to_string(),
            ..LocalSession::default()
        };
        let mut system = Vec::new();
        for param in initial {
            match state.scope_mut(param.scope) {
                Some(map) => {
                    map.insert(param.key.clone(), param.value.clone());
                }
                None => system.push(param),
            }
        }
        if !system.is_empty() {
            let mut guard = self.system.write();
            for param in system {
                guard.insert(param.key.clone(), param.value.clone());
            }
        }
        self.sessions.write().insert(*session, state);
        info!(%session, user = username, "local session opened");
        Ok(())
    }

    async fn close_session(&self, session: &SessionHandle) -> Result<(), ServiceError> {
        if self.sessions.write().remove(session).is_none() {
            return Err(ServiceError::UnknownSession);
        }
        self.resources.drop_session(session);
        debug!(%session, "local session closed");
        Ok(())
    }
}

#[async_trait]
impl ParameterStore for LocalSessionService {
    async fn submit_parameter_query(
        &self,
        session: &SessionHandle,
        query: ParameterQuery,
    ) -> Result<OperationHandle, ServiceError> {
        let rows = self.render_rows(session, &query)?;
        let operation = OperationHandle::generate();
        self.operations.lock().insert(operation, rows);
        Ok(operation)
    }

    async fn fetch_results(&self, operation: &OperationHandle) -> Result<FetchState, ServiceError> {
        self.operations
            .lock()
            .get(operation)
            .cloned()
            .map(FetchState::Ready)
            .ok_or_else(|| ServiceError::Rejected(format!("unknown operation {operation}")))
    }

    async fn close_operation(&self, operation: &OperationHandle) -> Result<(), ServiceError> {
        self.operations.lock().remove(operation);
        Ok(())
    }

    async fn set_system_property(&self, key: &str, value: &str) -> Result<(), ServiceError> {
        self.system
            .write()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn set_session_parameter(
        &self,
        session: &SessionHandle,
        scope: ParamScope,
        key: &str,
        value: &str,
    ) -> Result<(), ServiceError> {
        let mut sessions = self.sessions.write();
        let state = sessions
            .get_mut(session)
            .ok_or(ServiceError::UnknownSession)?;
        let map = state.scope_mut(scope).ok_or_else(|| {
            ServiceError::Rejected(format!("{scope} parameters are not session scoped"))
        })?;
        map.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[async_trait]
impl ResourceService for LocalSessionService {
    fn name(&self) -> &str {
        PRIMARY_SERVICE_NAME
    }

    async fn add_resource(
        &self,
        session: &SessionHandle,
        resource: &ResourceDescriptor,
    ) -> Result<(), ServiceError> {
        self.ensure_session(session)?;
        self.resources.add(session, resource).await
    }

    async fn delete_resource(
        &self,
        session: &SessionHandle,
        resource: &ResourceDescriptor,
    ) -> Result<(), ServiceError> {
        self.ensure_session(session)?;
        self.resources.delete(session, resource)
    }
}
