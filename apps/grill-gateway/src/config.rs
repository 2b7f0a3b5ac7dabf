use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    #[serde(default)]
    pub auth_bypass: bool,
    /// `name:password` pairs separated by commas.
    #[serde(default)]
    pub users: Option<String>,
    /// Names of additional in-process resource services.
    #[serde(default)]
    pub local_services: Option<String>,
    /// `name=url` pairs separated by commas.
    #[serde(default)]
    pub remote_services: Option<String>,
    #[serde(default = "default_backend_timeout_ms")]
    pub backend_timeout_ms: u64,
    #[serde(default = "default_param_fetch_timeout_ms")]
    pub param_fetch_timeout_ms: u64,
    #[serde(default = "default_param_poll_interval_ms")]
    pub param_poll_interval_ms: u64,
    #[serde(default = "default_session_idle_timeout_secs")]
    pub session_idle_timeout_secs: u64,
    #[serde(default = "default_session_sweep_interval_secs")]
    pub session_sweep_interval_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            log_filter: default_log_filter(),
            auth_bypass: false,
            users: None,
            local_services: None,
            remote_services: None,
            backend_timeout_ms: default_backend_timeout_ms(),
            param_fetch_timeout_ms: default_param_fetch_timeout_ms(),
            param_poll_interval_ms: default_param_poll_interval_ms(),
            session_idle_timeout_secs: default_session_idle_timeout_secs(),
            session_sweep_interval_secs: default_session_sweep_interval_secs(),
        }
    }
}

impl AppConfig {
    /// Loads `GRILL_*` environment variables, falling back to defaults when
    /// they cannot be deserialized.
    pub fn from_env() -> Self {
        config::Config::builder()
            .add_source(
                config::Environment::with_prefix("GRILL")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|c| c.try_deserialize())
            .map(AppConfig::normalize)
            .unwrap_or_else(|_| AppConfig::default().normalize())
    }

    fn normalize(mut self) -> Self {
        self.users = Self::normalize_opt(self.users.take());
        self.local_services = Self::normalize_opt(self.local_services.take());
        self.remote_services = Self::normalize_opt(self.remote_services.take());
        if self.log_filter.trim().is_empty() {
            self.log_filter = default_log_filter();
        }
        self
    }

    fn normalize_opt(value: Option<String>) -> Option<String> {
        value.and_then(|s| {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        })
    }

    pub fn user_table(&self) -> HashMap<String, String> {
        split_list(self.users.as_deref())
            .filter_map(|entry| {
                let (name, password) = entry.split_once(':')?;
                let name = name.trim();
                (!name.is_empty()).then(|| (name.to_string(), password.to_string()))
            })
            .collect()
    }

    pub fn local_service_names(&self) -> Vec<String> {
        split_list(self.local_services.as_deref())
            .map(str::to_string)
            .collect()
    }

    /// Remote services in declaration order.
    pub fn remote_service_urls(&self) -> Vec<(String, String)> {
        split_list(self.remote_services.as_deref())
            .filter_map(|entry| {
                let (name, url) = entry.split_once('=')?;
                let (name, url) = (name.trim(), url.trim());
                (!name.is_empty() && !url.is_empty()).then(|| (name.to_string(), url.to_string()))
            })
            .collect()
    }

    pub fn backend_timeout(&self) -> Duration {
        Duration::from_millis(self.backend_timeout_ms)
    }

    pub fn param_fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.param_fetch_timeout_ms)
    }

    pub fn param_poll_interval(&self) -> Duration {
        Duration::from_millis(self.param_poll_interval_ms.max(1))
    }

    pub fn session_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.session_idle_timeout_secs)
    }

    pub fn session_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.session_sweep_interval_secs.max(1))
    }
}

fn split_list(value: Option<&str>) -> impl Iterator<Item = &str> {
    value
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn default_bind_addr() -> String {
    "0.0.0.0:9999".to_string()
}

fn default_log_filter() -> String {
    "info,grill_gateway=debug".to_string()
}

fn default_backend_timeout_ms() -> u64 {
    30_000
}

fn default_param_fetch_timeout_ms() -> u64 {
    10_000
}

fn default_param_poll_interval_ms() -> u64 {
    50
}

fn default_session_idle_timeout_secs() -> u64 {
    86_400
}

fn default_session_sweep_interval_secs() -> u64 {
    60
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_service_and_user_lists() {
        let cfg = AppConfig {
            users: Some("alice:secret, bob:pw:with:colons,broken".into()),
            local_services: Some("query, ,metastore".into()),
            remote_services: Some("lens=http://lens:9000, bad, =http://x".into()),
            ..AppConfig::default()
        }
        .normalize();

        let users = cfg.user_table();
        assert_eq!(users.len(), 2);
        assert_eq!(users["alice"], "secret");
        assert_eq!(users["bob"], "pw:with:colons");
        assert_eq!(cfg.local_service_names(), vec!["query", "metastore"]);
        assert_eq!(
            cfg.remote_service_urls(),
            vec![("lens".to_string(), "http://lens:9000".to_string())]
        );
    }

    #[test]
    fn blank_values_normalize_to_none() {
        let cfg = AppConfig {
            users: Some("   ".into()),
            log_filter: " ".into(),
            ..AppConfig::default()
        }
        .normalize();
        assert!(cfg.users.is_none());
        assert_eq!(cfg.log_filter, default_log_filter());
        assert!(cfg.user_table().is_empty());
    }
}
