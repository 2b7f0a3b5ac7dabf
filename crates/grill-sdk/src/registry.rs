use std::ops::Deref;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::ResourceService;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("service {0:?} is already registered")]
    Duplicate(String),
}

/// Ordered set of backend services currently active in the gateway.
///
/// Writers replace the whole list; readers take a [`RegistrySnapshot`] that
/// stays fixed for the lifetime of one operation regardless of later
/// registrations or deregistrations.
#[derive(Clone, Default)]
pub struct ServiceRegistry {
    services: Arc<RwLock<Arc<Vec<Arc<dyn ResourceService>>>>>,
}

/// Immutable view of the registry taken at the start of an operation.
#[derive(Clone, Default)]
pub struct RegistrySnapshot {
    services: Arc<Vec<Arc<dyn ResourceService>>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, service: Arc<dyn ResourceService>) -> Result<(), RegistryError> {
        let mut guard = self.services.write();
        if guard.iter().any(|s| s.name() == service.name()) {
            return Err(RegistryError::Duplicate(service.name().to_string()));
        }
        let mut next = Vec::with_capacity(guard.len() + 1);
        next.extend(guard.iter().cloned());
        next.push(service);
        *guard = Arc::new(next);
        Ok(())
    }

    /// Returns `false` when no service with that name was registered.
    pub fn deregister(&self, name: &str) -> bool {
        let mut guard = self.services.write();
        if !guard.iter().any(|s| s.name() == name) {
            return false;
        }
        let next: Vec<_> = guard.iter().filter(|s| s.name() != name).cloned().collect();
        *guard = Arc::new(next);
        true
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            services: Arc::clone(&self.services.read()),
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.snapshot().names()
    }
}

impl RegistrySnapshot {
    pub fn from_services(services: Vec<Arc<dyn ResourceService>>) -> Self {
        Self {
            services: Arc::new(services),
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.services.iter().map(|s| s.name().to_string()).collect()
    }
}

impl Deref for RegistrySnapshot {
    type Target = [Arc<dyn ResourceService>];

    fn deref(&self) -> &Self::Target {
        &self.services
    }
}
