use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use grill_sdk::{ServiceError, SessionHandle};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::backend::SessionBackend;
use crate::error::GatewayError;
use crate::metrics;
use crate::params::SessionParameter;

#[derive(Debug, Clone)]
struct SessionRecord {
    username: String,
    opened_at: DateTime<Utc>,
    last_access: Instant,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SessionSummary {
    pub sessionid: SessionHandle,
    pub username: String,
    pub opened_at: DateTime<Utc>,
}

/// Issues and retires session handles against the primary backend.
#[derive(Clone)]
pub struct SessionManager {
    backend: Arc<dyn SessionBackend>,
    sessions: Arc<RwLock<HashMap<SessionHandle, SessionRecord>>>,
    idle_timeout: Duration,
}

impl SessionManager {
    pub fn new(backend: Arc<dyn SessionBackend>, idle_timeout: Duration) -> Self {
        Self {
            backend,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            idle_timeout,
        }
    }

    pub async fn open(
        &self,
        username: &str,
        password: Option<&str>,
        initial_config: &HashMap<String, String>,
    ) -> Result<SessionHandle, GatewayError> {
        let mut initial = initial_config
            .iter()
            .map(|(k, v)| SessionParameter::parse(k, v.clone()))
            .collect::<Result<Vec<_>, _>>()?;
        initial.sort_by(|a, b| (a.scope, &a.key).cmp(&(b.scope, &b.key)));

        let handle = SessionHandle::generate();
        if let Err(err) = self
            .backend
            .open_session(&handle, username, password, &initial)
            .await
        {
            let label = match err {
                ServiceError::Authentication(_) => "unauthorized",
                _ => "error",
            };
            metrics::SESSIONS_OPENED.with_label_values(&[label]).inc();
            warn!(user = username, error = %err, "session open rejected by backend");
            return Err(match err {
                ServiceError::Authentication(user) => GatewayError::Authentication(user),
                other => GatewayError::BackendUnavailable(other.to_string()),
            });
        }

        self.sessions.write().insert(
            handle,
            SessionRecord {
                username: username.to_string(),
                opened_at: Utc::now(),
                last_access: Instant::now(),
            },
        );
        metrics::SESSIONS_OPENED.with_label_values(&["ok"]).inc();
        metrics::ACTIVE_SESSIONS.inc();
        info!(session = %handle, user = username, "session opened");
        Ok(handle)
    }

    /// Closing an unknown or already-closed handle is an error.
    pub async fn close(&self, handle: &SessionHandle) -> Result<(), GatewayError> {
        let Some(record) = self.sessions.write().remove(handle) else {
            return Err(GatewayError::InvalidSession(*handle));
        };
        match self.backend.close_session(handle).await {
            Ok(()) | Err(ServiceError::UnknownSession) => {
                self.retired("closed");
                info!(session = %handle, user = %record.username, "session closed");
                Ok(())
            }
            Err(err) => {
                self.sessions.write().insert(*handle, record);
                warn!(session = %handle, error = %err, "backend failed to close session");
                Err(GatewayError::BackendUnavailable(err.to_string()))
            }
        }
    }

    /// Confirms `handle` is live and refreshes its idle clock. A handle idle
    /// past the timeout is expired here and rejected.
    pub async fn validate(&self, handle: &SessionHandle) -> Result<(), GatewayError> {
        let now = Instant::now();
        let expired = {
            let mut guard = self.sessions.write();
            let Some(record) = guard.get_mut(handle) else {
                return Err(GatewayError::InvalidSession(*handle));
            };
            if now.duration_since(record.last_access) > self.idle_timeout {
                guard.remove(handle);
                true
            } else {
                record.last_access = now;
                false
            }
        };
        if expired {
            self.retire_on_backend(handle, "expired").await;
            return Err(GatewayError::InvalidSession(*handle));
        }
        Ok(())
    }

    /// Drops a handle the backend no longer recognises.
    pub fn forget(&self, handle: &SessionHandle) {
        if self.sessions.write().remove(handle).is_some() {
            self.retired("backend_expired");
            warn!(session = %handle, "backend no longer knows session; handle invalidated");
        }
    }

    /// Retires every session idle longer than the timeout. Returns how many
    /// were expired.
    pub async fn expire_idle(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<SessionHandle> = {
            let mut guard = self.sessions.write();
            let stale: Vec<SessionHandle> = guard
                .iter()
                .filter(|(_, r)| now.duration_since(r.last_access) > self.idle_timeout)
                .map(|(h, _)| *h)
                .collect();
            for handle in &stale {
                guard.remove(handle);
            }
            stale
        };
        for handle in &expired {
            self.retire_on_backend(handle, "expired").await;
        }
        expired.len()
    }

    pub fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let expired = manager.expire_idle().await;
                if expired > 0 {
                    info!(expired, "expired idle sessions");
                }
            }
        })
    }

    pub fn list(&self) -> Vec<SessionSummary> {
        let mut out: Vec<SessionSummary> = self
            .sessions
            .read()
            .iter()
            .map(|(handle, record)| SessionSummary {
                sessionid: *handle,
                username: record.username.clone(),
                opened_at: record.opened_at,
            })
            .collect();
        out.sort_by_key(|s| s.opened_at);
        out
    }

    pub fn active_count(&self) -> usize {
        self.sessions.read().len()
    }

    async fn retire_on_backend(&self, handle: &SessionHandle, reason: &'static str) {
        self.retired(reason);
        match self.backend.close_session(handle).await {
            Ok(()) | Err(ServiceError::UnknownSession) => {
                info!(session = %handle, reason, "session retired");
            }
            Err(err) => {
                warn!(session = %handle, reason, error = %err, "backend failed to release session");
            }
        }
    }

    fn retired(&self, reason: &'static str) {
        metrics::SESSIONS_CLOSED.with_label_values(&[reason]).inc();
        metrics::ACTIVE_SESSIONS.dec();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::*;
    use crate::params::ParamScope;

    #[derive(Default)]
    struct FakeBackend {
        opened: Mutex<Vec<(SessionHandle, Vec<SessionParameter>)>>,
        closes: AtomicUsize,
        unavailable: AtomicBool,
    }

    #[async_trait]
    impl SessionBackend for FakeBackend {
        async fn open_session(
            &self,
            session: &SessionHandle,
            username: &str,
            password: Option<&str>,
            initial: &[SessionParameter],
        ) -> Result<(), ServiceError> {
            if self.unavailable.load(Ordering::SeqCst) {
                return Err(ServiceError::Unreachable("down".into()));
            }
            if password != Some("pw") {
                return Err(ServiceError::Authentication(username.to_string()));
            }
            self.opened.lock().push((*session, initial.to_vec()));
            Ok(())
        }

        async fn close_session(&self, _session: &SessionHandle) -> Result<(), ServiceError> {
            if self.unavailable.load(Ordering::SeqCst) {
                return Err(ServiceError::Unreachable("down".into()));
            }
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn manager(backend: Arc<FakeBackend>, idle: Duration) -> SessionManager {
        SessionManager::new(backend, idle)
    }

    #[tokio::test]
    async fn open_issues_fresh_handles_and_parses_config() {
        let backend = Arc::new(FakeBackend::default());
        let sessions = manager(backend.clone(), Duration::from_secs(60));
        let conf = HashMap::from([
            ("hivevar:db".to_string(), "lens".to_string()),
            ("mapred.queue".to_string(), "adhoc".to_string()),
        ]);

        let a = sessions.open("alice", Some("pw"), &conf).await.unwrap();
        let b = sessions.open("alice", Some("pw"), &HashMap::new()).await.unwrap();
        assert_ne!(a, b);
        assert_eq!(sessions.active_count(), 2);

        let opened = backend.opened.lock();
        assert_eq!(opened[0].0, a);
        assert_eq!(
            opened[0].1,
            vec![
                SessionParameter {
                    scope: ParamScope::SessionVariable,
                    key: "db".into(),
                    value: "lens".into(),
                },
                SessionParameter {
                    scope: ParamScope::SessionConfig,
                    key: "mapred.queue".into(),
                    value: "adhoc".into(),
                },
            ]
        );
    }

    #[tokio::test]
    async fn open_maps_backend_failures() {
        let backend = Arc::new(FakeBackend::default());
        let sessions = manager(backend.clone(), Duration::from_secs(60));

        let err = sessions.open("bob", Some("nope"), &HashMap::new()).await.unwrap_err();
        assert!(matches!(err, GatewayError::Authentication(user) if user == "bob"));

        let bad_conf = HashMap::from([("env:PATH".to_string(), "/bin".to_string())]);
        let err = sessions.open("bob", Some("pw"), &bad_conf).await.unwrap_err();
        assert!(matches!(err, GatewayError::InvalidScope(_)));

        backend.unavailable.store(true, Ordering::SeqCst);
        let err = sessions.open("bob", Some("pw"), &HashMap::new()).await.unwrap_err();
        assert!(matches!(err, GatewayError::BackendUnavailable(_)));
        assert_eq!(sessions.active_count(), 0);
    }

    #[tokio::test]
    async fn close_is_not_idempotent() {
        let backend = Arc::new(FakeBackend::default());
        let sessions = manager(backend.clone(), Duration::from_secs(60));
        let handle = sessions.open("alice", Some("pw"), &HashMap::new()).await.unwrap();

        sessions.close(&handle).await.unwrap();
        let err = sessions.close(&handle).await.unwrap_err();
        assert!(matches!(err, GatewayError::InvalidSession(h) if h == handle));
        assert_eq!(backend.closes.load(Ordering::SeqCst), 1);
        assert!(sessions.validate(&handle).await.is_err());
    }

    #[tokio::test]
    async fn failed_close_keeps_session_alive() {
        let backend = Arc::new(FakeBackend::default());
        let sessions = manager(backend.clone(), Duration::from_secs(60));
        let handle = sessions.open("alice", Some("pw"), &HashMap::new()).await.unwrap();

        backend.unavailable.store(true, Ordering::SeqCst);
        let err = sessions.close(&handle).await.unwrap_err();
        assert!(matches!(err, GatewayError::BackendUnavailable(_)));
        sessions.validate(&handle).await.unwrap();
    }

    #[tokio::test]
    async fn idle_sessions_expire() {
        let backend = Arc::new(FakeBackend::default());
        let sessions = manager(backend.clone(), Duration::from_millis(10));
        let swept = sessions.open("alice", Some("pw"), &HashMap::new()).await.unwrap();
        let touched = sessions.open("alice", Some("pw"), &HashMap::new()).await.unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(matches!(
            sessions.validate(&touched).await,
            Err(GatewayError::InvalidSession(_))
        ));
        assert_eq!(sessions.expire_idle().await, 1);
        assert!(sessions.validate(&swept).await.is_err());
        assert_eq!(sessions.active_count(), 0);
        assert_eq!(backend.closes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn sweeper_retires_idle_sessions() {
        let backend = Arc::new(FakeBackend::default());
        let sessions = manager(backend.clone(), Duration::from_millis(20));
        let first = sessions.open("alice", Some("pw"), &HashMap::new()).await.unwrap();
        let second = sessions.open("alice", Some("pw"), &HashMap::new()).await.unwrap();

        let sweeper = sessions.spawn_sweeper(Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(120)).await;
        sweeper.abort();

        assert_eq!(sessions.active_count(), 0);
        assert_eq!(backend.closes.load(Ordering::SeqCst), 2);
        for handle in [first, second] {
            assert!(matches!(
                sessions.validate(&handle).await,
                Err(GatewayError::InvalidSession(h)) if h == handle
            ));
        }
        assert_eq!(backend.closes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn forget_invalidates_without_backend_call() {
        let backend = Arc::new(FakeBackend::default());
        let sessions = manager(backend.clone(), Duration::from_secs(60));
        let handle = sessions.open("alice", Some("pw"), &HashMap::new()).await.unwrap();

        sessions.forget(&handle);
        assert!(sessions.validate(&handle).await.is_err());
        assert!(sessions.list().is_empty());
        assert_eq!(backend.closes.load(Ordering::SeqCst), 0);
    }
}
