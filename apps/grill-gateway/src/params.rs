use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use grill_sdk::{OperationHandle, SessionHandle};
use serde::Serialize;
use tracing::{debug, warn};

use crate::backend::{FetchState, ParameterQuery, ParameterStore};
use crate::error::GatewayError;
use crate::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamScope {
    System,
    SessionVariable,
    SessionConfig,
}

impl ParamScope {
    pub fn prefix(self) -> &'static str {
        match self {
            ParamScope::System => "system:",
            ParamScope::SessionVariable => "hivevar:",
            ParamScope::SessionConfig => "hiveconf:",
        }
    }

    fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "system" => Some(ParamScope::System),
            "hivevar" => Some(ParamScope::SessionVariable),
            "hiveconf" => Some(ParamScope::SessionConfig),
            _ => None,
        }
    }
}

impl fmt::Display for ParamScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ParamScope::System => "system",
            ParamScope::SessionVariable => "session_variable",
            ParamScope::SessionConfig => "session_config",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionParameter {
    pub scope: ParamScope,
    pub key: String,
    pub value: String,
}

impl SessionParameter {
    pub fn parse(raw_key: &str, value: impl Into<String>) -> Result<Self, GatewayError> {
        let (scope, key) = parse_key(raw_key)?;
        Ok(Self {
            scope,
            key: key.to_string(),
            value: value.into(),
        })
    }
}

/// Splits a raw parameter key into its scope and bare name.
///
/// Unprefixed keys are configuration. A prefix other than `system:`,
/// `hivevar:` or `hiveconf:`, or a prefix with nothing after it, is rejected.
pub fn parse_key(raw: &str) -> Result<(ParamScope, &str), GatewayError> {
    let malformed = || GatewayError::InvalidScope(raw.to_string());
    match raw.split_once(':') {
        None if raw.is_empty() => Err(malformed()),
        None => Ok((ParamScope::SessionConfig, raw)),
        Some((prefix, name)) => {
            let scope = ParamScope::from_prefix(prefix).ok_or_else(malformed)?;
            if name.is_empty() {
                return Err(malformed());
            }
            Ok((scope, name))
        }
    }
}

/// Translates parameter get/set requests into calls on the parameter store.
#[derive(Clone)]
pub struct ParameterBridge {
    store: Arc<dyn ParameterStore>,
    fetch_timeout: Duration,
    poll_interval: Duration,
}

impl ParameterBridge {
    pub fn new(store: Arc<dyn ParameterStore>, fetch_timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            store,
            fetch_timeout,
            poll_interval,
        }
    }

    /// Returns `key=value` rows. Blocks until the store has produced them or
    /// the fetch timeout elapses.
    pub async fn get(
        &self,
        session: &SessionHandle,
        verbose: bool,
        key_filter: Option<&str>,
    ) -> Result<Vec<String>, GatewayError> {
        let filter = match key_filter.filter(|k| !k.is_empty()) {
            Some(raw) => {
                let (scope, key) = parse_key(raw)?;
                Some((scope, key.to_string()))
            }
            None => None,
        };
        metrics::PARAM_OPS.with_label_values(&["get"]).inc();

        let operation = self
            .store
            .submit_parameter_query(session, ParameterQuery { verbose, filter })
            .await
            .map_err(|err| GatewayError::from_backend(*session, err))?;

        let outcome = match tokio::time::timeout(
            self.fetch_timeout,
            self.wait_for_rows(session, &operation),
        )
        .await
        {
            Ok(rows) => rows,
            Err(_) => Err(GatewayError::BackendUnavailable(format!(
                "parameter fetch timed out after {}ms",
                self.fetch_timeout.as_millis()
            ))),
        };

        if let Err(err) = self.store.close_operation(&operation).await {
            warn!(%operation, error = %err, "failed to close parameter operation");
        }
        outcome
    }

    async fn wait_for_rows(
        &self,
        session: &SessionHandle,
        operation: &OperationHandle,
    ) -> Result<Vec<String>, GatewayError> {
        loop {
            let state = self
                .store
                .fetch_results(operation)
                .await
                .map_err(|err| GatewayError::from_backend(*session, err))?;
            match state {
                FetchState::Ready(rows) => return Ok(rows),
                FetchState::Pending => {
                    debug!(%operation, "parameter rows not ready yet");
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
    }

    /// Routes the write to the system-wide or session-scoped sink by prefix.
    pub async fn set(
        &self,
        session: &SessionHandle,
        key: &str,
        value: &str,
    ) -> Result<ParamScope, GatewayError> {
        let (scope, name) = parse_key(key)?;
        metrics::PARAM_OPS.with_label_values(&["set"]).inc();
        let result = match scope {
            ParamScope::System => self.store.set_system_property(name, value).await,
            ParamScope::SessionVariable | ParamScope::SessionConfig => {
                self.store
                    .set_session_parameter(session, scope, name, value)
                    .await
            }
        };
        result.map_err(|err| GatewayError::from_backend(*session, err))?;
        debug!(%session, %scope, key = name, "session parameter set");
        Ok(scope)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use grill_sdk::ServiceError;
    use parking_lot::Mutex;

    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        System(String, String),
        Session(ParamScope, String, String),
    }

    #[derive(Default)]
    struct RecordingStore {
        calls: Mutex<Vec<Call>>,
        pending_polls: AtomicUsize,
        closed: AtomicUsize,
        queries: Mutex<Vec<ParameterQuery>>,
    }

    #[async_trait]
    impl ParameterStore for RecordingStore {
        async fn submit_parameter_query(
            &self,
            _session: &SessionHandle,
            query: ParameterQuery,
        ) -> Result<OperationHandle, ServiceError> {
            self.queries.lock().push(query);
            Ok(OperationHandle::generate())
        }

        async fn fetch_results(
            &self,
            _operation: &OperationHandle,
        ) -> Result<FetchState, ServiceError> {
            let remaining = self.pending_polls.load(Ordering::SeqCst);
            if remaining > 0 {
                self.pending_polls.store(remaining - 1, Ordering::SeqCst);
                return Ok(FetchState::Pending);
            }
            Ok(FetchState::Ready(vec!["a=1".into()]))
        }

        async fn close_operation(&self, _operation: &OperationHandle) -> Result<(), ServiceError> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn set_system_property(&self, key: &str, value: &str) -> Result<(), ServiceError> {
            self.calls
                .lock()
                .push(Call::System(key.to_string(), value.to_string()));
            Ok(())
        }

        async fn set_session_parameter(
            &self,
            _session: &SessionHandle,
            scope: ParamScope,
            key: &str,
            value: &str,
        ) -> Result<(), ServiceError> {
            self.calls
                .lock()
                .push(Call::Session(scope, key.to_string(), value.to_string()));
            Ok(())
        }
    }

    fn bridge(store: Arc<RecordingStore>) -> ParameterBridge {
        ParameterBridge::new(store, Duration::from_millis(500), Duration::from_millis(1))
    }

    #[test]
    fn derives_scope_from_prefix() {
        assert_eq!(parse_key("system:foo").unwrap(), (ParamScope::System, "foo"));
        assert_eq!(
            parse_key("hivevar:db").unwrap(),
            (ParamScope::SessionVariable, "db")
        );
        assert_eq!(
            parse_key("hiveconf:mapred.job.name").unwrap(),
            (ParamScope::SessionConfig, "mapred.job.name")
        );
        assert_eq!(parse_key("bar").unwrap(), (ParamScope::SessionConfig, "bar"));
    }

    #[test]
    fn rejects_malformed_keys() {
        for raw in ["env:HOME", "system:", ":x", ""] {
            assert!(
                matches!(parse_key(raw), Err(GatewayError::InvalidScope(k)) if k == raw),
                "{raw:?} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn routes_writes_by_scope() {
        let store = Arc::new(RecordingStore::default());
        let bridge = bridge(store.clone());
        let session = SessionHandle::generate();

        assert_eq!(
            bridge.set(&session, "system:foo", "1").await.unwrap(),
            ParamScope::System
        );
        assert_eq!(
            bridge.set(&session, "bar", "2").await.unwrap(),
            ParamScope::SessionConfig
        );
        bridge.set(&session, "hivevar:db", "lens").await.unwrap();
        let err = bridge.set(&session, "bogus:k", "v").await.unwrap_err();
        assert!(matches!(err, GatewayError::InvalidScope(_)));

        assert_eq!(
            *store.calls.lock(),
            vec![
                Call::System("foo".into(), "1".into()),
                Call::Session(ParamScope::SessionConfig, "bar".into(), "2".into()),
                Call::Session(ParamScope::SessionVariable, "db".into(), "lens".into()),
            ]
        );
    }

    #[tokio::test]
    async fn waits_for_pending_rows_then_closes_operation() {
        let store = Arc::new(RecordingStore::default());
        store.pending_polls.store(3, Ordering::SeqCst);
        let bridge = bridge(store.clone());

        let rows = bridge
            .get(&SessionHandle::generate(), true, Some("hivevar:db"))
            .await
            .unwrap();
        assert_eq!(rows, vec!["a=1"]);
        assert_eq!(store.closed.load(Ordering::SeqCst), 1);
        assert_eq!(
            store.queries.lock()[0],
            ParameterQuery {
                verbose: true,
                filter: Some((ParamScope::SessionVariable, "db".into())),
            }
        );
    }

    #[tokio::test]
    async fn fetch_timeout_is_backend_unavailable() {
        let store = Arc::new(RecordingStore::default());
        store.pending_polls.store(usize::MAX, Ordering::SeqCst);
        let bridge = ParameterBridge::new(
            store.clone(),
            Duration::from_millis(20),
            Duration::from_millis(5),
        );

        let err = bridge
            .get(&SessionHandle::generate(), false, None)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::BackendUnavailable(_)));
        assert_eq!(store.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_filter_means_no_filter() {
        let store = Arc::new(RecordingStore::default());
        let bridge = bridge(store.clone());
        bridge
            .get(&SessionHandle::generate(), false, Some(""))
            .await
            .unwrap();
        assert_eq!(store.queries.lock()[0].filter, None);
    }
}
