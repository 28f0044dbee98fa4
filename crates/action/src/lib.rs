//! kubepatch actions: named, schema-validated units of work for a workflow engine.
//!
//! An engine looks an action up by id in an [`ActionRegistry`], which checks the
//! input against the action's JSON Schema and then runs its handler with an
//! [`ActionContext`] carrying the input, a logger and the output map.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use kubepatch_core::{PatchError, PatchLogger};
use serde_json::{Map, Value as Json};
use tracing::debug;

mod patch;
mod schema;

pub use patch::{PatchAction, PATCH_ACTION_ID};
pub use schema::validate_input;

#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("unknown action: {0}")]
    UnknownAction(String),
    #[error("duplicate action: {0}")]
    DuplicateAction(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("schema: {0}")]
    Schema(String),
    #[error(transparent)]
    Patch(#[from] PatchError),
}

impl ActionError {
    /// The executor failure, when that is what went wrong.
    pub fn as_patch(&self) -> Option<&PatchError> {
        match self {
            ActionError::Patch(e) => Some(e),
            _ => None,
        }
    }
}

/// Per-invocation state handed to a handler.
pub struct ActionContext {
    pub input: Json,
    logger: Arc<dyn PatchLogger>,
    outputs: Map<String, Json>,
}

impl ActionContext {
    pub fn new(input: Json, logger: Arc<dyn PatchLogger>) -> Self {
        Self { input, logger, outputs: Map::new() }
    }

    pub fn logger(&self) -> &dyn PatchLogger {
        self.logger.as_ref()
    }

    pub fn output(&mut self, key: impl Into<String>, value: Json) {
        self.outputs.insert(key.into(), value);
    }

    pub fn outputs(&self) -> &Map<String, Json> {
        &self.outputs
    }

    pub fn into_outputs(self) -> Map<String, Json> {
        self.outputs
    }
}

#[async_trait::async_trait]
pub trait TemplateAction: Send + Sync {
    fn id(&self) -> &str;
    fn description(&self) -> &str;
    fn input_schema(&self) -> Json;
    fn output_schema(&self) -> Json;
    async fn handler(&self, ctx: &mut ActionContext) -> Result<(), ActionError>;
}

#[derive(Default, Clone)]
pub struct ActionRegistry {
    actions: BTreeMap<String, Arc<dyn TemplateAction>>,
}

impl ActionRegistry {
    pub fn new() -> Self { Self::default() }

    /// Registry with `kube:patch` bound to the given executor.
    pub fn with_patch_action(executor: Arc<kubepatch_apply::PatchExecutor>) -> Self {
        let mut reg = Self::new();
        reg.actions.insert(PATCH_ACTION_ID.to_string(), Arc::new(PatchAction::new(executor)));
        reg
    }

    pub fn register(&mut self, action: Arc<dyn TemplateAction>) -> Result<(), ActionError> {
        let id = action.id().to_string();
        if self.actions.contains_key(&id) {
            return Err(ActionError::DuplicateAction(id));
        }
        self.actions.insert(id, action);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn TemplateAction>> {
        self.actions.get(id).cloned()
    }

    pub fn actions(&self) -> impl Iterator<Item = &Arc<dyn TemplateAction>> {
        self.actions.values()
    }

    /// Validate `input` against the action's schema, run it, and hand back its outputs.
    pub async fn run(&self, id: &str, input: Json, logger: Arc<dyn PatchLogger>) -> Result<Map<String, Json>, ActionError> {
        let action = self.get(id).ok_or_else(|| ActionError::UnknownAction(id.to_string()))?;
        validate_input(&action.input_schema(), &input)?;
        debug!(action = %id, "input validated");
        let mut ctx = ActionContext::new(input, logger);
        action.handler(&mut ctx).await?;
        Ok(ctx.into_outputs())
    }
}
