use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// Failure reported by the control plane, or by the transport on its way there.
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize, PartialEq)]
#[error("{message}")]
pub struct RemoteError {
    /// HTTP status when the API server answered.
    pub status: Option<u16>,
    /// Structured `Status` body returned by the API server, if any.
    pub body: Option<Json>,
    pub message: String,
}

impl RemoteError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { status: None, body: None, message: message.into() }
    }

    /// Body as compact JSON when present, otherwise the message.
    pub fn summary(&self) -> String {
        match &self.body {
            Some(b) => serde_json::to_string(b).unwrap_or_else(|_| self.message.clone()),
            None => self.message.clone(),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum PatchError {
    /// Raised before any I/O.
    #[error("validation: {0}")]
    Validation(String),
    #[error("config: {0}")]
    Config(String),
    #[error("remote: {0}")]
    Remote(#[from] RemoteError),
}

impl PatchError {
    pub fn body(&self) -> Option<&Json> {
        match self {
            PatchError::Remote(r) => r.body.as_ref(),
            _ => None,
        }
    }

    /// What gets logged on failure: the structured body if any, else the message.
    pub fn summary(&self) -> String {
        match self {
            PatchError::Remote(r) => r.summary(),
            other => other.to_string(),
        }
    }

    /// Short label for metrics.
    pub fn class(&self) -> &'static str {
        match self {
            PatchError::Validation(_) => "validation",
            PatchError::Config(_) => "config",
            PatchError::Remote(_) => "remote",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn summary_prefers_structured_body() {
        let body = json!({ "kind": "Status", "code": 404, "reason": "NotFound" });
        let e = PatchError::from(RemoteError { status: Some(404), body: Some(body.clone()), message: "not found".into() });
        assert_eq!(e.summary(), serde_json::to_string(&body).unwrap());
        assert_eq!(e.body(), Some(&body));
        assert_eq!(e.class(), "remote");
    }

    #[test]
    fn summary_falls_back_to_message() {
        let e = PatchError::Remote(RemoteError::new("connection refused"));
        assert_eq!(e.summary(), "connection refused");
        assert!(e.body().is_none());

        let v = PatchError::Validation("missing kind".into());
        assert_eq!(v.summary(), "validation: missing kind");
    }
}
