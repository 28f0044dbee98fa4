use std::sync::Arc;

use kubepatch_apply::PatchExecutor;
use serde_json::{json, Value as Json};

use crate::{ActionContext, ActionError, TemplateAction};

pub const PATCH_ACTION_ID: &str = "kube:patch";

/// `kube:patch`: JSON or merge patch of an existing namespaced resource.
pub struct PatchAction {
    executor: Arc<PatchExecutor>,
}

impl PatchAction {
    pub fn new(executor: Arc<PatchExecutor>) -> Self {
        Self { executor }
    }
}

/// `kind/namespace/name` for log lines only; placeholders never reach the executor.
fn log_target(patch_data: &Json) -> String {
    let kind = patch_data.get("kind").and_then(Json::as_str).unwrap_or("UnknownKind");
    let meta = patch_data.get("metadata");
    let ns = meta.and_then(|m| m.get("namespace")).and_then(Json::as_str).unwrap_or("default");
    let name = meta.and_then(|m| m.get("name")).and_then(Json::as_str).unwrap_or("unknown");
    format!("{}/{}/{}", kind, ns, name)
}

#[async_trait::async_trait]
impl TemplateAction for PatchAction {
    fn id(&self) -> &str {
        PATCH_ACTION_ID
    }

    fn description(&self) -> &str {
        "Applies a JSON or merge patch to an existing Kubernetes resource. Equivalent to 'kubectl patch --type json|merge -f patch.json'."
    }

    fn input_schema(&self) -> Json {
        json!({
            "type": "object",
            "required": ["patchData"],
            "properties": {
                "patchData": {
                    "description": "Kubernetes manifest containing apiVersion, kind, metadata (name, namespace), and either a full spec (merge patch) or a `patch` array of operations (JSON patch)."
                }
            }
        })
    }

    fn output_schema(&self) -> Json {
        json!({
            "type": "object",
            "properties": {
                "result": { "description": "Kubernetes API response after applying the patch." }
            }
        })
    }

    async fn handler(&self, ctx: &mut ActionContext) -> Result<(), ActionError> {
        let patch_data = ctx.input.get("patchData").cloned().unwrap_or(Json::Null);
        let target = log_target(&patch_data);
        ctx.logger().info(&format!("{}: applying patch to {}", PATCH_ACTION_ID, target));

        match self.executor.apply(&patch_data, ctx.logger()).await {
            Ok(result) => {
                ctx.logger().info(&format!("{}: patch applied successfully to {}", PATCH_ACTION_ID, target));
                ctx.output("result", result);
                Ok(())
            }
            Err(e) => {
                ctx.logger().error(&format!("{}: failed to patch {}: {}", PATCH_ACTION_ID, target, e.summary()));
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_target_uses_placeholders() {
        assert_eq!(log_target(&Json::Null), "UnknownKind/default/unknown");
        assert_eq!(log_target(&json!({ "kind": "Pod", "metadata": { "name": "p1" } })), "Pod/default/p1");
        assert_eq!(
            log_target(&json!({ "kind": "Deployment", "metadata": { "name": "web", "namespace": "ns1" } })),
            "Deployment/ns1/web"
        );
    }

    #[test]
    fn schemas_describe_patch_data_and_result() {
        let action = PatchAction::new(Arc::new(PatchExecutor::with_defaults()));
        assert_eq!(action.id(), "kube:patch");
        assert_eq!(action.input_schema()["required"], json!(["patchData"]));
        assert!(action.output_schema()["properties"].get("result").is_some());
        assert!(action.description().contains("kubectl patch"));
    }
}
