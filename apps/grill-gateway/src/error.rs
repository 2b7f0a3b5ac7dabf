use grill_sdk::{ServiceError, SessionHandle};

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("invalid session: {0}")]
    InvalidSession(SessionHandle),
    #[error("authentication failed for user {0:?}")]
    Authentication(String),
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),
    #[error("invalid parameter scope in key {0:?}")]
    InvalidScope(String),
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl GatewayError {
    /// Maps a failure of the primary backend during a single-backend
    /// operation on `session`.
    pub fn from_backend(session: SessionHandle, err: ServiceError) -> Self {
        match err {
            ServiceError::UnknownSession => GatewayError::InvalidSession(session),
            ServiceError::Authentication(user) => GatewayError::Authentication(user),
            other => GatewayError::BackendUnavailable(other.to_string()),
        }
    }
}
