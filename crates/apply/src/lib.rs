//! kubepatch apply: the patch executor.
//!
//! Validates the identifying fields, picks merge or JSON patch from the input
//! shape and issues exactly one PATCH against the generic object endpoint.

#![forbid(unsafe_code)]

use std::sync::Arc;

use kube::{
    core::{ApiResource, DynamicObject, GroupVersionKind},
    Resource,
};
use kubepatch_core::{Coordinates, PatchBody, PatchError, PatchLogger, PatchRequest};
use kubepatch_kubehub::{ConfigProvider, InferConfig, KubeTransport, PatchTransport};
use metrics::{counter, histogram};
use serde_json::Value as Json;
use tracing::debug;
use urlencoding::encode;

pub struct PatchExecutor {
    config: Arc<dyn ConfigProvider>,
    transport: Arc<dyn PatchTransport>,
}

impl PatchExecutor {
    pub fn new(config: Arc<dyn ConfigProvider>, transport: Arc<dyn PatchTransport>) -> Self {
        Self { config, transport }
    }

    /// Default kube discovery chain and a real client.
    pub fn with_defaults() -> Self {
        Self::new(Arc::new(InferConfig), Arc::new(KubeTransport))
    }

    /// Validate `patch_data` and apply it. Validation failures never reach the network.
    pub async fn apply(&self, patch_data: &Json, logger: &dyn PatchLogger) -> Result<Json, PatchError> {
        let req = match PatchRequest::from_value(patch_data) {
            Ok(r) => r,
            Err(e) => {
                counter!("kube_patch_err", 1u64, "class" => e.class());
                logger.error(&format!("kube patch failed: {}", e.summary()));
                return Err(e);
            }
        };
        self.apply_request(&req, logger).await
    }

    pub async fn apply_request(&self, req: &PatchRequest, logger: &dyn PatchLogger) -> Result<Json, PatchError> {
        let t0 = std::time::Instant::now();
        counter!("kube_patch_attempts", 1u64);
        match self.run(req, logger).await {
            Ok(v) => {
                histogram!("kube_patch_latency_ms", t0.elapsed().as_secs_f64() * 1000.0);
                counter!("kube_patch_ok", 1u64);
                Ok(v)
            }
            Err(e) => {
                counter!("kube_patch_err", 1u64, "class" => e.class());
                logger.error(&format!("kube patch failed: {}", e.summary()));
                Err(e)
            }
        }
    }

    async fn run(&self, req: &PatchRequest, logger: &dyn PatchLogger) -> Result<Json, PatchError> {
        let key = req.descriptor.key();
        let coords = req.descriptor.coordinates();
        let request = build_request(&coords, &req.body)?;
        let config = self.config.load().await?;

        logger.info(&format!("Applying {} patch to {}", req.mode().label(), key));
        debug!(group = %coords.group, version = %coords.version, plural = %coords.plural, ns = %coords.namespace, name = %coords.name, content_type = req.mode().content_type(), "patch request prepared");

        let out = self.transport.send(config, request).await?;
        logger.info(&format!("Patch applied successfully to {}", key));
        Ok(out)
    }
}

/// `/apis/{group}/{version}/namespaces/{ns}/{plural}/{name}`, or `/api/{version}/...` for the core group.
/// Every segment is percent-encoded.
pub fn object_path(coords: &Coordinates) -> String {
    let gvk = GroupVersionKind::gvk(&encode(&coords.group), &encode(&coords.version), &coords.kind);
    let ar = ApiResource::from_gvk_with_plural(&gvk, &encode(&coords.plural));
    let ns = encode(&coords.namespace);
    format!("{}/{}", DynamicObject::url_path(&ar, Some(&*ns)), encode(&coords.name))
}

/// PATCH with the mode's content type and no query parameters (no dryRun, pretty or fieldManager).
pub fn build_request(coords: &Coordinates, body: &PatchBody) -> Result<http::Request<Vec<u8>>, PatchError> {
    let path = object_path(coords);
    http::Request::patch(path.as_str())
        .header(http::header::CONTENT_TYPE, body.mode().content_type())
        .header(http::header::ACCEPT, "application/json")
        .body(body.to_vec()?)
        .map_err(|e| PatchError::Validation(format!("invalid request for {}: {}", path, e)))
}
