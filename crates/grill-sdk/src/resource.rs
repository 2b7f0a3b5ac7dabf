use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::SessionHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Jar,
    File,
    Archive,
}

impl ResourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Jar => "jar",
            ResourceKind::File => "file",
            ResourceKind::Archive => "archive",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown resource type {0:?}; expected jar, file or archive")]
pub struct UnknownResourceKind(pub String);

impl FromStr for ResourceKind {
    type Err = UnknownResourceKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "jar" => Ok(ResourceKind::Jar),
            "file" => Ok(ResourceKind::File),
            "archive" => Ok(ResourceKind::Archive),
            _ => Err(UnknownResourceKind(s.to_string())),
        }
    }
}

/// A resource a session wants distributed to backend services.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    pub kind: ResourceKind,
    pub location: String,
}

impl ResourceDescriptor {
    pub fn new(kind: ResourceKind, location: impl Into<String>) -> Self {
        Self {
            kind,
            location: location.into(),
        }
    }

    /// Locations without a URI scheme are treated as local filesystem paths.
    pub fn is_local_path(&self) -> bool {
        !self.location.contains("://")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceOp {
    Add,
    Delete,
}

impl ResourceOp {
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceOp::Add => "add",
            ResourceOp::Delete => "delete",
        }
    }

    /// Capitalised verb used in result messages.
    pub fn verb(self) -> &'static str {
        match self {
            ResourceOp::Add => "Add",
            ResourceOp::Delete => "Delete",
        }
    }
}

impl fmt::Display for ResourceOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wire body of `PUT .../resources/{add,delete}`, shared by the gateway routes
/// and the remote backend protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceRequest {
    pub sessionid: SessionHandle,
    #[serde(rename = "type")]
    pub kind: String,
    pub path: String,
}

impl ResourceRequest {
    pub fn new(session: SessionHandle, resource: &ResourceDescriptor) -> Self {
        Self {
            sessionid: session,
            kind: resource.kind.as_str().to_string(),
            path: resource.location.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_kinds_case_insensitively() {
        assert_eq!("JAR".parse::<ResourceKind>().unwrap(), ResourceKind::Jar);
        assert_eq!(" file ".parse::<ResourceKind>().unwrap(), ResourceKind::File);
        assert_eq!(
            "archive".parse::<ResourceKind>().unwrap(),
            ResourceKind::Archive
        );
        assert!("zip".parse::<ResourceKind>().is_err());
    }

    #[test]
    fn uri_locations_are_not_local() {
        assert!(ResourceDescriptor::new(ResourceKind::Jar, "/tmp/udf.jar").is_local_path());
        assert!(!ResourceDescriptor::new(ResourceKind::Jar, "hdfs://nn/udf.jar").is_local_path());
    }

    #[test]
    fn request_uses_type_field_on_the_wire() {
        let handle = SessionHandle::generate();
        let req = ResourceRequest::new(
            handle,
            &ResourceDescriptor::new(ResourceKind::Archive, "/data/a.tgz"),
        );
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["type"], "archive");
        assert_eq!(json["path"], "/data/a.tgz");
        assert_eq!(json["sessionid"], handle.to_string());
    }
}
