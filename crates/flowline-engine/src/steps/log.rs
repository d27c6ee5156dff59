use std::sync::Arc;

use futures::future::BoxFuture;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use flowline_core::error::Result;
use flowline_core::traits::FlowLogger;
use flowline_core::types::LogLevel;

use super::Step;
use crate::context::Context;
use crate::routing::Routes;
use crate::template::render_context_placeholders;

/// Declared fields of a `log` step.
#[derive(Debug, Clone, Deserialize)]
pub struct LogFields {
    pub message: String,
    #[serde(default)]
    pub level: LogLevel,
}

/// Emits a templated message to the logger.
pub struct LogStep {
    id: String,
    routes: Routes,
    message: String,
    level: LogLevel,
    logger: Arc<dyn FlowLogger>,
}

impl LogStep {
    pub fn new(
        id: impl Into<String>,
        routes: Routes,
        message: impl Into<String>,
        level: LogLevel,
        logger: Arc<dyn FlowLogger>,
    ) -> Self {
        Self {
            id: id.into(),
            routes,
            message: message.into(),
            level,
            logger,
        }
    }

    pub fn from_fields(
        id: impl Into<String>,
        routes: Routes,
        fields: LogFields,
        logger: Arc<dyn FlowLogger>,
    ) -> Self {
        Self::new(id, routes, fields.message, fields.level, logger)
    }

    pub fn level(&self) -> LogLevel {
        self.level
    }
}

impl Step for LogStep {
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
        let message = render_context_placeholders(&self.message, ctx);
        self.logger.log(self.level, &message, None);
        let next = self.routes.resolve(ctx);
        Box::pin(async move { Ok(next) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowline_test_utils::RecordingLogger;

    #[tokio::test]
    async fn test_substitutes_context_value() {
        let logger = Arc::new(RecordingLogger::new());
        let step = LogStep::new(
            "greet",
            Routes::new(),
            "Hi {{context.name}}",
            LogLevel::Info,
            logger.clone(),
        );
        let mut ctx = Context::new();
        ctx.set("name", "Bob");

        let next = step.execute(&mut ctx, &CancellationToken::new()).await.unwrap();
        assert_eq!(next, None);
        assert_eq!(logger.messages_at(LogLevel::Info), vec!["Hi Bob"]);
    }

    #[tokio::test]
    async fn test_marks_undefined_keys() {
        let logger = Arc::new(RecordingLogger::new());
        let step = LogStep::new(
            "greet",
            Routes::single("after"),
            "Hi {{context.name}}",
            LogLevel::Warn,
            logger.clone(),
        );
        let mut ctx = Context::new();

        let next = step.execute(&mut ctx, &CancellationToken::new()).await.unwrap();
        assert_eq!(next.as_deref(), Some("after"));
        assert_eq!(logger.messages_at(LogLevel::Warn), vec!["Hi {{UNDEFINED:name}}"]);
    }

    #[test]
    fn test_level_defaults_to_info() {
        let fields: LogFields =
            serde_json::from_value(serde_json::json!({ "message": "m" })).unwrap();
        assert_eq!(fields.level, LogLevel::Info);
    }
}
