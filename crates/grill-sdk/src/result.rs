use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationStatus {
    Succeeded,
    Partial,
    Failed,
}

impl OperationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OperationStatus::Succeeded => "succeeded",
            OperationStatus::Partial => "partial",
            OperationStatus::Failed => "failed",
        }
    }
}

/// The first backend failure seen while fanning out an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceFailure {
    pub service_name: String,
    pub error_detail: String,
    /// The backend did not recognise the session handle.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub unknown_session: bool,
}

/// Outcome reported to the caller of a gateway operation.
///
/// Resource operations fill `succeeded_services` in attempt order and carry
/// the first failure, if any. Other operations use the bare status/message
/// envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationResult {
    pub status: OperationStatus,
    pub message: String,
    #[serde(default)]
    pub succeeded_services: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_failure: Option<ServiceFailure>,
}

impl OperationResult {
    pub fn succeeded(message: impl Into<String>) -> Self {
        Self {
            status: OperationStatus::Succeeded,
            message: message.into(),
            succeeded_services: Vec::new(),
            first_failure: None,
        }
    }

    pub fn partial(message: impl Into<String>) -> Self {
        Self {
            status: OperationStatus::Partial,
            message: message.into(),
            succeeded_services: Vec::new(),
            first_failure: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: OperationStatus::Failed,
            message: message.into(),
            succeeded_services: Vec::new(),
            first_failure: None,
        }
    }

    pub fn with_services(mut self, services: Vec<String>) -> Self {
        self.succeeded_services = services;
        self
    }

    pub fn with_failure(mut self, failure: ServiceFailure) -> Self {
        self.first_failure = Some(failure);
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == OperationStatus::Succeeded
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StringList {
    pub elements: Vec<String>,
}

impl From<Vec<String>> for StringList {
    fn from(elements: Vec<String>) -> Self {
        Self { elements }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_uses_upper_case_wire_names() {
        let result = OperationResult::failed("Add resource has failed");
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "FAILED");
        assert!(json.get("first_failure").is_none());
        assert_eq!(json["succeeded_services"], serde_json::json!([]));
    }

    #[test]
    fn partial_result_keeps_failure_detail() {
        let body = serde_json::json!({
            "status": "PARTIAL",
            "message": "Add resource is partial, failed for service:query",
            "succeeded_services": ["session"],
            "first_failure": { "service_name": "query", "error_detail": "boom" }
        });
        let parsed: OperationResult = serde_json::from_value(body).unwrap();
        assert_eq!(parsed.status, OperationStatus::Partial);
        assert_eq!(parsed.first_failure.unwrap().service_name, "query");
    }
}
