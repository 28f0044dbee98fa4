//! kubepatch kubehub: cluster configuration and the single HTTP leg to the API server.

#![forbid(unsafe_code)]

use std::path::PathBuf;

use http::StatusCode;
use kube::{
    client::Body,
    config::{KubeConfigOptions, Kubeconfig},
    Client, Config,
};
use kubepatch_core::{PatchError, RemoteError};
use serde_json::Value as Json;
use tracing::debug;

/// Source of cluster credentials. Resolved on every call; nothing is cached.
#[async_trait::async_trait]
pub trait ConfigProvider: Send + Sync {
    async fn load(&self) -> Result<Config, PatchError>;
}

/// Default discovery chain: `KUBECONFIG` / `~/.kube/config`, then in-cluster service account.
#[derive(Debug, Clone, Copy, Default)]
pub struct InferConfig;

#[async_trait::async_trait]
impl ConfigProvider for InferConfig {
    async fn load(&self) -> Result<Config, PatchError> {
        let cfg = Config::infer().await.map_err(|e| PatchError::Config(format!("no usable cluster configuration: {}", e)))?;
        debug!(cluster = %cfg.cluster_url, ns = %cfg.default_namespace, "inferred kube config");
        Ok(cfg)
    }
}

/// Explicit kubeconfig file and/or context. Without a path, the default kubeconfig lookup is used.
#[derive(Debug, Clone, Default)]
pub struct KubeconfigFile {
    pub path: Option<PathBuf>,
    pub context: Option<String>,
}

#[async_trait::async_trait]
impl ConfigProvider for KubeconfigFile {
    async fn load(&self) -> Result<Config, PatchError> {
        let options = KubeConfigOptions { context: self.context.clone(), ..Default::default() };
        let cfg = match &self.path {
            Some(path) => {
                let kc = Kubeconfig::read_from(path)
                    .map_err(|e| PatchError::Config(format!("reading kubeconfig {}: {}", path.display(), e)))?;
                Config::from_custom_kubeconfig(kc, &options).await
            }
            None => Config::from_kubeconfig(&options).await,
        };
        let cfg = cfg.map_err(|e| PatchError::Config(format!("loading kubeconfig: {}", e)))?;
        debug!(cluster = %cfg.cluster_url, context = ?self.context, "loaded kubeconfig");
        Ok(cfg)
    }
}

/// Fixed configuration, e.g. built by the embedding application.
#[derive(Debug, Clone)]
pub struct StaticConfig(pub Config);

#[async_trait::async_trait]
impl ConfigProvider for StaticConfig {
    async fn load(&self) -> Result<Config, PatchError> {
        Ok(self.0.clone())
    }
}

/// Sends one prepared request and returns the decoded response body.
#[async_trait::async_trait]
pub trait PatchTransport: Send + Sync {
    async fn send(&self, config: Config, request: http::Request<Vec<u8>>) -> Result<Json, PatchError>;
}

/// Builds a fresh `kube::Client` per call.
#[derive(Debug, Clone, Copy, Default)]
pub struct KubeTransport;

#[async_trait::async_trait]
impl PatchTransport for KubeTransport {
    async fn send(&self, config: Config, request: http::Request<Vec<u8>>) -> Result<Json, PatchError> {
        let client = Client::try_from(config).map_err(|e| PatchError::Config(format!("building kube client: {}", e)))?;
        debug!(method = %request.method(), uri = %request.uri(), "sending request");
        let response = client.send(request.map(Body::from)).await.map_err(|e| PatchError::Remote(remote_error(e)))?;
        let status = response.status();
        let bytes = response.into_body().collect_bytes().await.map_err(|e| PatchError::Remote(remote_error(e)))?;
        debug!(status = %status, len = bytes.len(), "response received");
        decode_response(status, &bytes)
    }
}

/// Successful bodies are returned as sent. Error bodies are kept verbatim when they are JSON
/// (normally a `Status`); otherwise the text becomes the message.
pub fn decode_response(status: StatusCode, bytes: &[u8]) -> Result<Json, PatchError> {
    if status.is_success() {
        if bytes.is_empty() {
            return Ok(Json::Null);
        }
        return serde_json::from_slice(bytes).map_err(|e| {
            PatchError::Remote(RemoteError { status: Some(status.as_u16()), body: None, message: format!("decoding response: {}", e) })
        });
    }
    let body = serde_json::from_slice::<Json>(bytes).ok();
    let message = match body.as_ref().and_then(|b| b.get("message")).and_then(Json::as_str) {
        Some(m) => m.to_string(),
        None => {
            let text = String::from_utf8_lossy(bytes).trim().to_string();
            if text.is_empty() { status.to_string() } else { text }
        }
    };
    Err(PatchError::Remote(RemoteError { status: Some(status.as_u16()), body, message }))
}

/// Failures below HTTP (connect, TLS, auth plugins) carry only a message.
pub fn remote_error(err: kube::Error) -> RemoteError {
    RemoteError::new(err.to_string())
}
