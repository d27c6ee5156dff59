use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use flowline_core::error::{FlowlineError, Result};
use flowline_core::traits::FlowLogger;

use super::Step;
use crate::context::Context;
use crate::routing::Routes;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionOperation {
    SetContext,
    UpdateContext,
    RemoveContext,
}

impl ActionOperation {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "setContext" => Some(Self::SetContext),
            "updateContext" => Some(Self::UpdateContext),
            "removeContext" => Some(Self::RemoveContext),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SetContext => "setContext",
            Self::UpdateContext => "updateContext",
            Self::RemoveContext => "removeContext",
        }
    }

    /// Whether the operation needs a `value`.
    pub fn requires_value(&self) -> bool {
        !matches!(self, Self::RemoveContext)
    }
}

/// Declared fields of an `action` step.
#[derive(Debug, Clone, Deserialize)]
pub struct ActionFields {
    pub operation: ActionOperation,
    pub key: String,
    #[serde(default)]
    pub value: Option<Value>,
}

/// Mutates one context key, then follows the shared routing rules.
pub struct ActionStep {
    id: String,
    routes: Routes,
    operation: ActionOperation,
    key: String,
    value: Option<Value>,
    logger: Arc<dyn FlowLogger>,
}

impl ActionStep {
    pub fn new(
        id: impl Into<String>,
        routes: Routes,
        operation: ActionOperation,
        key: impl Into<String>,
        value: Option<Value>,
        logger: Arc<dyn FlowLogger>,
    ) -> Self {
        Self {
            id: id.into(),
            routes,
            operation,
            key: key.into(),
            value,
            logger,
        }
    }

    pub fn from_fields(
        id: impl Into<String>,
        routes: Routes,
        fields: ActionFields,
        logger: Arc<dyn FlowLogger>,
    ) -> Self {
        Self::new(id, routes, fields.operation, fields.key, fields.value, logger)
    }

    pub fn operation(&self) -> ActionOperation {
        self.operation
    }

    fn required_value(&self) -> Result<Value> {
        self.value.clone().ok_or_else(|| {
            FlowlineError::step(
                &self.id,
                format!(
                    "value required for {} on key '{}'",
                    self.operation.as_str(),
                    self.key
                ),
            )
        })
    }

    fn apply(&self, ctx: &mut Context) -> Result<()> {
        match self.operation {
            ActionOperation::SetContext => {
                let value = self.required_value()?;
                ctx.set(self.key.clone(), value);
            }
            ActionOperation::UpdateContext => {
                if !ctx.has(&self.key) {
                    return Err(FlowlineError::step(
                        &self.id,
                        format!("cannot update non-existent key '{}'", self.key),
                    ));
                }
                let value = self.required_value()?;
                ctx.set(self.key.clone(), value);
            }
            ActionOperation::RemoveContext => {
                if !ctx.delete(&self.key) {
                    self.logger.warn(&format!(
                        "Step '{}': key '{}' not in context, nothing to remove",
                        self.id, self.key
                    ));
                }
            }
        }
        Ok(())
    }
}

impl Step for ActionStep {
    fn id(&self) -> &str {
        &self.id
    }

    fn routes(&self) -> &Routes {
        &self.routes
    }

    fn execute<'a>(
        &'a self,
        ctx: &'a mut Context,
        _cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<Option<String>>> {
        let result = match self.apply(ctx) {
            Ok(()) => {
                debug!(step_id = %self.id, operation = self.operation.as_str(), key = %self.key, "Action applied");
                Ok(self.routes.resolve(ctx))
            }
            Err(e) => {
                self.logger.error(&e.to_string());
                Err(e)
            }
        };
        Box::pin(async move { result })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowline_core::types::LogLevel;
    use flowline_test_utils::RecordingLogger;

    fn step(
        operation: ActionOperation,
        value: Option<&str>,
        logger: &Arc<RecordingLogger>,
    ) -> ActionStep {
        ActionStep::new(
            "act",
            Routes::single("next"),
            operation,
            "k",
            value.map(Value::from),
            logger.clone(),
        )
    }

    async fn run(step: &ActionStep, ctx: &mut Context) -> Result<Option<String>> {
        step.execute(ctx, &CancellationToken::new()).await
    }

    #[tokio::test]
    async fn test_set_without_value_fails() {
        let logger = Arc::new(RecordingLogger::new());
        let mut ctx = Context::new();
        let err = run(&step(ActionOperation::SetContext, None, &logger), &mut ctx)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("value required"));
        assert!(!ctx.has("k"));
        assert!(logger.contains(LogLevel::Error, "value required"));
    }

    #[tokio::test]
    async fn test_set_follows_default_route() {
        let logger = Arc::new(RecordingLogger::new());
        let mut ctx = Context::new();
        let next = run(&step(ActionOperation::SetContext, Some("v"), &logger), &mut ctx)
            .await
            .unwrap();
        assert_eq!(ctx.get_text("k").as_deref(), Some("v"));
        assert_eq!(next.as_deref(), Some("next"));
    }

    #[tokio::test]
    async fn test_update_missing_key_fails() {
        let logger = Arc::new(RecordingLogger::new());
        let mut ctx = Context::new();
        let err = run(&step(ActionOperation::UpdateContext, Some("v"), &logger), &mut ctx)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("cannot update non-existent key 'k'"));
    }

    #[tokio::test]
    async fn test_update_existing_key_without_value_fails() {
        let logger = Arc::new(RecordingLogger::new());
        let mut ctx = Context::new();
        ctx.set("k", "old");
        let err = run(&step(ActionOperation::UpdateContext, None, &logger), &mut ctx)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("value required"));
        assert_eq!(ctx.get_text("k").as_deref(), Some("old"));
    }

    #[tokio::test]
    async fn test_update_existing_key() {
        let logger = Arc::new(RecordingLogger::new());
        let mut ctx = Context::new();
        ctx.set("k", "old");
        run(&step(ActionOperation::UpdateContext, Some("new"), &logger), &mut ctx)
            .await
            .unwrap();
        assert_eq!(ctx.get_text("k").as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn test_remove_absent_key_warns_only() {
        let logger = Arc::new(RecordingLogger::new());
        let mut ctx = Context::new();
        let next = run(&step(ActionOperation::RemoveContext, None, &logger), &mut ctx)
            .await
            .unwrap();
        assert_eq!(next.as_deref(), Some("next"));
        assert!(logger.contains(LogLevel::Warn, "nothing to remove"));
    }

    #[tokio::test]
    async fn test_remove_existing_key() {
        let logger = Arc::new(RecordingLogger::new());
        let mut ctx = Context::new();
        ctx.set("k", "v");
        run(&step(ActionOperation::RemoveContext, None, &logger), &mut ctx)
            .await
            .unwrap();
        assert!(!ctx.has("k"));
        assert!(logger.entries().is_empty());
    }

    #[tokio::test]
    async fn test_selector_set_by_action_routes_itself() {
        let logger = Arc::new(RecordingLogger::new());
        let step = ActionStep::new(
            "choose",
            Routes::new().with("default", "a").with("b", "b-step"),
            ActionOperation::SetContext,
            crate::routing::NEXT_STEP_KEY,
            Some(Value::from("b")),
            logger.clone(),
        );
        let mut ctx = Context::new();
        let next = run(&step, &mut ctx).await.unwrap();
        assert_eq!(next.as_deref(), Some("b-step"));
    }
}
