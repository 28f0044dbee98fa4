//! kubepatch core types: resource descriptor, patch body and addressing.

#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

mod error;
mod logger;

pub use error::{PatchError, RemoteError};
pub use logger::{Level, NoopLogger, PatchLogger, RecordingLogger, TracingLogger};

pub const MERGE_PATCH_CONTENT_TYPE: &str = "application/merge-patch+json";
pub const JSON_PATCH_CONTENT_TYPE: &str = "application/json-patch+json";

/// Which RFC the payload follows. Chosen from the input shape only.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PatchMode {
    /// JSON Merge Patch (RFC 7396)
    Merge,
    /// JSON Patch (RFC 6902)
    Json,
}

impl PatchMode {
    pub fn content_type(&self) -> &'static str {
        match self {
            PatchMode::Merge => MERGE_PATCH_CONTENT_TYPE,
            PatchMode::Json => JSON_PATCH_CONTENT_TYPE,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PatchMode::Merge => "merge",
            PatchMode::Json => "JSON",
        }
    }
}

/// Payload sent to the API server, verbatim.
#[derive(Debug, Clone, PartialEq)]
pub enum PatchBody {
    Merge(Json),
    JsonPatch(Vec<Json>),
}

impl PatchBody {
    /// An array under `patch` selects JSON patch; anything else is a merge of the whole input.
    pub fn from_input(input: &Json) -> Self {
        match input.get("patch") {
            Some(Json::Array(ops)) => PatchBody::JsonPatch(ops.clone()),
            _ => PatchBody::Merge(input.clone()),
        }
    }

    pub fn mode(&self) -> PatchMode {
        match self {
            PatchBody::Merge(_) => PatchMode::Merge,
            PatchBody::JsonPatch(_) => PatchMode::Json,
        }
    }

    pub fn to_vec(&self) -> Result<Vec<u8>, PatchError> {
        let bytes = match self {
            PatchBody::Merge(v) => serde_json::to_vec(v),
            PatchBody::JsonPatch(ops) => serde_json::to_vec(ops),
        };
        bytes.map_err(|e| PatchError::Validation(format!("serializing patch body: {}", e)))
    }
}

/// Identifying fields of the target object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceDescriptor {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    pub namespace: String,
}

impl ResourceDescriptor {
    /// Read `apiVersion`, `kind`, `metadata.name` and `metadata.namespace`.
    /// Absent, empty and non-string values are all rejected.
    pub fn from_value(v: &Json) -> Result<Self, PatchError> {
        let field = |value: Option<&Json>| {
            value
                .and_then(|x| x.as_str())
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string())
        };
        let meta = v.get("metadata");
        let api_version = field(v.get("apiVersion"));
        let kind = field(v.get("kind"));
        let name = field(meta.and_then(|m| m.get("name")));
        let namespace = field(meta.and_then(|m| m.get("namespace")));

        match (api_version, kind, name, namespace) {
            (Some(api_version), Some(kind), Some(name), Some(namespace)) => Ok(Self { api_version, kind, name, namespace }),
            (a, k, n, ns) => {
                let missing: Vec<&str> = [
                    ("apiVersion", a.is_none()),
                    ("kind", k.is_none()),
                    ("metadata.name", n.is_none()),
                    ("metadata.namespace", ns.is_none()),
                ]
                .iter()
                .filter(|(_, absent)| *absent)
                .map(|(f, _)| *f)
                .collect();
                Err(PatchError::Validation(format!(
                    "patchData must include apiVersion, kind, metadata.name, and metadata.namespace (missing: {})",
                    missing.join(", ")
                )))
            }
        }
    }

    /// Split on the first `/`; a bare version addresses the core group.
    pub fn group_version(&self) -> (&str, &str) {
        match self.api_version.split_once('/') {
            Some((g, v)) => (g, v),
            None => ("", self.api_version.as_str()),
        }
    }

    /// Lowercased kind plus `s`. Wrong for irregular plurals (`Ingress` -> `ingresss`).
    pub fn plural(&self) -> String {
        format!("{}s", self.kind.to_lowercase())
    }

    pub fn coordinates(&self) -> Coordinates {
        let (group, version) = self.group_version();
        Coordinates {
            group: group.to_string(),
            version: version.to_string(),
            kind: self.kind.clone(),
            plural: self.plural(),
            namespace: self.namespace.clone(),
            name: self.name.clone(),
        }
    }

    /// `kind/namespace/name`, used in log lines.
    pub fn key(&self) -> String {
        format!("{}/{}/{}", self.kind, self.namespace, self.name)
    }
}

/// REST addressing for one namespaced object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Coordinates {
    pub group: String,
    pub version: String,
    pub kind: String,
    pub plural: String,
    pub namespace: String,
    pub name: String,
}

/// Validated input: who to patch and with what.
#[derive(Debug, Clone, PartialEq)]
pub struct PatchRequest {
    pub descriptor: ResourceDescriptor,
    pub body: PatchBody,
}

impl PatchRequest {
    pub fn from_value(input: &Json) -> Result<Self, PatchError> {
        let descriptor = ResourceDescriptor::from_value(input)?;
        let body = PatchBody::from_input(input);
        Ok(Self { descriptor, body })
    }

    pub fn mode(&self) -> PatchMode {
        self.body.mode()
    }
}

pub mod prelude {
    pub use super::{
        Coordinates, PatchBody, PatchError, PatchLogger, PatchMode, PatchRequest, RemoteError, ResourceDescriptor,
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn full() -> Json {
        json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": { "name": "web", "namespace": "ns1" },
            "spec": { "replicas": 3 }
        })
    }

    #[test]
    fn descriptor_reads_identifying_fields() {
        let d = ResourceDescriptor::from_value(&full()).expect("valid");
        assert_eq!(d.api_version, "apps/v1");
        assert_eq!(d.kind, "Deployment");
        assert_eq!(d.name, "web");
        assert_eq!(d.namespace, "ns1");
        assert_eq!(d.key(), "Deployment/ns1/web");
    }

    #[test]
    fn descriptor_rejects_each_missing_field() {
        let paths: [&[&str]; 4] = [&["apiVersion"], &["kind"], &["metadata", "name"], &["metadata", "namespace"]];
        for path in paths {
            let mut v = full();
            match path {
                [top] => { v.as_object_mut().unwrap().remove(*top); }
                [outer, inner] => { v[*outer].as_object_mut().unwrap().remove(*inner); }
                _ => unreachable!(),
            }
            let err = ResourceDescriptor::from_value(&v).unwrap_err();
            assert!(matches!(err, PatchError::Validation(_)), "path={:?}", path);
            assert!(err.to_string().contains(&format!("missing: {}", path.join("."))), "err={}", err);
        }
    }

    #[test]
    fn descriptor_rejects_empty_and_non_string_values() {
        let mut v = full();
        v["kind"] = json!("");
        assert!(matches!(ResourceDescriptor::from_value(&v), Err(PatchError::Validation(_))));

        let mut v = full();
        v["metadata"]["namespace"] = json!(7);
        assert!(matches!(ResourceDescriptor::from_value(&v), Err(PatchError::Validation(_))));

        assert!(ResourceDescriptor::from_value(&Json::Null).is_err());
        assert!(ResourceDescriptor::from_value(&json!({ "metadata": null })).is_err());
    }

    #[test]
    fn group_version_splits_on_first_slash() {
        let mut d = ResourceDescriptor::from_value(&full()).unwrap();
        assert_eq!(d.group_version(), ("apps", "v1"));

        d.api_version = "v1".into();
        assert_eq!(d.group_version(), ("", "v1"));

        d.api_version = "example.com/v1/extra".into();
        assert_eq!(d.group_version(), ("example.com", "v1/extra"));
    }

    #[test]
    fn plural_is_lowercase_kind_plus_s() {
        let mut d = ResourceDescriptor::from_value(&full()).unwrap();
        assert_eq!(d.plural(), "deployments");
        d.kind = "Pod".into();
        assert_eq!(d.plural(), "pods");
        // irregular plurals are passed through as-is
        d.kind = "Ingress".into();
        assert_eq!(d.plural(), "ingresss");
    }

    #[test]
    fn array_patch_selects_json_mode() {
        let input = json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": { "name": "p1", "namespace": "ns2" },
            "patch": [ { "op": "replace", "path": "/metadata/labels/env", "value": "prod" } ]
        });
        let req = PatchRequest::from_value(&input).unwrap();
        assert_eq!(req.mode(), PatchMode::Json);
        assert_eq!(req.mode().content_type(), JSON_PATCH_CONTENT_TYPE);
        assert_eq!(req.body, PatchBody::JsonPatch(vec![json!({ "op": "replace", "path": "/metadata/labels/env", "value": "prod" })]));
    }

    #[test]
    fn non_array_patch_falls_back_to_merge_of_whole_input() {
        let mut input = full();
        input["patch"] = json!({ "op": "replace" });
        let req = PatchRequest::from_value(&input).unwrap();
        assert_eq!(req.mode(), PatchMode::Merge);
        assert_eq!(req.mode().content_type(), MERGE_PATCH_CONTENT_TYPE);
        assert_eq!(req.body, PatchBody::Merge(input));
    }

    #[test]
    fn coordinates_follow_descriptor() {
        let c = ResourceDescriptor::from_value(&full()).unwrap().coordinates();
        assert_eq!(c.group, "apps");
        assert_eq!(c.version, "v1");
        assert_eq!(c.plural, "deployments");
        assert_eq!(c.namespace, "ns1");
        assert_eq!(c.name, "web");
    }
}
