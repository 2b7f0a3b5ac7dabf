use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque token correlating every operation of one gateway session.
///
/// Serialized as a plain string. Callers must treat the contents as opaque.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionHandle(Uuid);

impl SessionHandle {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("malformed session handle")]
pub struct InvalidHandle;

impl FromStr for SessionHandle {
    type Err = InvalidHandle;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self).map_err(|_| InvalidHandle)
    }
}

/// Handle of an asynchronous result-producing operation on a parameter store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationHandle(Uuid);

impl OperationHandle {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for OperationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_are_unique_and_parse_back() {
        let a = SessionHandle::generate();
        let b = SessionHandle::generate();
        assert_ne!(a, b);
        let parsed: SessionHandle = a.to_string().parse().unwrap();
        assert_eq!(parsed, a);
    }

    #[test]
    fn serializes_as_opaque_string() {
        let handle = SessionHandle::generate();
        let json = serde_json::to_value(handle).unwrap();
        assert_eq!(json, serde_json::Value::String(handle.to_string()));
    }

    #[test]
    fn rejects_garbage() {
        assert!("not-a-handle".parse::<SessionHandle>().is_err());
    }
}
