use std::sync::Arc;

use futures::future::BoxFuture;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use flowline_core::error::{FlowlineError, Result};
use flowline_core::traits::{FlowLogger, LlmProvider};
use flowline_core::types::{GenerationRequest, LogLevel};

use super::Step;
use crate::context::Context;
use crate::routing::Routes;
use crate::template::render_prompt;

/// Providers a `plan-generation` step may name.
pub const KNOWN_PROVIDERS: &[&str] = &["openai", "claude", "gemini"];

/// Context key the generated plan is stored under unless overridden.
pub const DEFAULT_OUTPUT_KEY: &str = "plan.output";

pub const DEFAULT_PROMPT_TEMPLATE: &str = "\
You are a senior software engineer. Write an implementation plan for the GitHub issue below.

## Issue
Title: {{github.issue.title}}

{{github.issue.body}}

## Plan format
1. Summary of the problem
2. Affected components
3. Step-by-step implementation tasks
4. Testing strategy
5. Risks and open questions
";

/// Declared fields of a `plan-generation` step.
#[derive(Debug, Clone, Deserialize)]
pub struct PlanFields {
    pub llm_provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub prompt_template: Option<String>,
    #[serde(default, alias = "outputKey")]
    pub output_key: Option<String>,
}

/// Asks a language model for a plan built from issue data in the context.
pub struct PlanGenerationStep {
    id: String,
    routes: Routes,
    provider: Arc<dyn LlmProvider>,
    model: String,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    prompt_template: Option<String>,
    output_key: String,
    logger: Arc<dyn FlowLogger>,
}

impl PlanGenerationStep {
    pub fn new(
        id: impl Into<String>,
        routes: Routes,
        provider: Arc<dyn LlmProvider>,
        model: impl Into<String>,
        logger: Arc<dyn FlowLogger>,
    ) -> Self {
        Self {
            id: id.into(),
            routes,
            provider,
            model: model.into(),
            temperature: None,
            max_tokens: None,
            prompt_template: None,
            output_key: DEFAULT_OUTPUT_KEY.to_string(),
            logger,
        }
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_prompt_template(mut self, template: Option<String>) -> Self {
        self.prompt_template = template;
        self
    }

    pub fn with_output_key(mut self, key: impl Into<String>) -> Self {
        self.output_key = key.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Render the prompt from the declared (or default) template.
    pub fn build_prompt(&self, ctx: &Context) -> String {
        let template = self
            .prompt_template
            .as_deref()
            .unwrap_or(DEFAULT_PROMPT_TEMPLATE);
        render_prompt(template, ctx)
    }
}

impl Step for PlanGenerationStep {
    fn id(&self) -> &str {
        &self.id
    }

    fn routes(&self) -> &Routes {
        &self.routes
    }

    fn execute<'a>(
        &'a self,
        ctx: &'a mut Context,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<Option<String>>> {
        Box::pin(async move {
            let request = GenerationRequest::new(self.build_prompt(ctx), &self.model)
                .with_temperature(self.temperature)
                .with_max_tokens(self.max_tokens)
                .with_cancellation(cancel.clone());

            debug!(
                step_id = %self.id,
                provider = self.provider.name(),
                model = %self.model,
                prompt_len = request.prompt.len(),
                "Requesting plan"
            );

            let text = match self.provider.generate(request).await {
                Ok(text) => text,
                Err(FlowlineError::Cancelled) => return Err(FlowlineError::Cancelled),
                Err(e) => {
                    self.logger.error(&format!(
                        "Plan generation failed in step '{}': {}",
                        self.id, e
                    ));
                    return Err(e.in_step(&self.id));
                }
            };

            info!(step_id = %self.id, chars = text.len(), "Plan generated");
            let metadata = serde_json::json!({
                "step": self.id,
                "provider": self.provider.name(),
                "model": self.model,
            });
            self.logger.log(LogLevel::Info, &text, Some(&metadata));
            ctx.set(self.output_key.clone(), text);

            Ok(self.routes.resolve(ctx))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowline_core::error::ErrorKind;
    use flowline_test_utils::{MockLlmProvider, RecordingLogger};

    fn issue_ctx() -> Context {
        let mut ctx = Context::new();
        ctx.set("github.issue.title", "Crash on start");
        ctx.set("github.issue.body", "Segfault in init");
        ctx
    }

    #[test]
    fn test_default_prompt_uses_issue() {
        let step = PlanGenerationStep::new(
            "plan",
            Routes::new(),
            Arc::new(MockLlmProvider::new("openai")),
            "gpt-4o",
            Arc::new(RecordingLogger::new()),
        );
        let prompt = step.build_prompt(&issue_ctx());
        assert!(prompt.contains("Title: Crash on start"));
        assert!(prompt.contains("Segfault in init"));
        assert!(prompt.contains("Testing strategy"));
    }

    #[test]
    fn test_custom_template() {
        let step = PlanGenerationStep::new(
            "plan",
            Routes::new(),
            Arc::new(MockLlmProvider::new("openai")),
            "gpt-4o",
            Arc::new(RecordingLogger::new()),
        )
        .with_prompt_template(Some("Fix: {{github.issue.title}}".into()));
        assert_eq!(step.build_prompt(&issue_ctx()), "Fix: Crash on start");
    }

    #[tokio::test]
    async fn test_generates_logs_and_stores_plan() {
        let llm = Arc::new(MockLlmProvider::new("claude").with_response("1. Do the thing"));
        let logger = Arc::new(RecordingLogger::new());
        let step = PlanGenerationStep::new(
            "plan",
            Routes::single("done"),
            llm.clone(),
            "claude-sonnet",
            logger.clone(),
        )
        .with_temperature(Some(0.2))
        .with_max_tokens(Some(512));
        let mut ctx = issue_ctx();

        let next = step.execute(&mut ctx, &CancellationToken::new()).await.unwrap();
        assert_eq!(next.as_deref(), Some("done"));
        assert_eq!(ctx.get_text(DEFAULT_OUTPUT_KEY).as_deref(), Some("1. Do the thing"));
        assert_eq!(logger.messages_at(LogLevel::Info), vec!["1. Do the thing"]);

        let requests = llm.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].model, "claude-sonnet");
        assert_eq!(requests[0].temperature, Some(0.2));
        assert_eq!(requests[0].max_tokens, Some(512));
        assert!(requests[0].prompt.contains("Crash on start"));
    }

    #[tokio::test]
    async fn test_provider_failure_is_logged_and_wrapped() {
        let llm = Arc::new(MockLlmProvider::new("gemini").failing("HTTP 503"));
        let logger = Arc::new(RecordingLogger::new());
        let step = PlanGenerationStep::new("plan", Routes::new(), llm, "gemini-pro", logger.clone());
        let mut ctx = issue_ctx();

        let err = step.execute(&mut ctx, &CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Collaborator);
        assert!(err.to_string().contains("Step 'plan' failed"));
        assert!(logger.contains(LogLevel::Error, "HTTP 503"));
        assert!(!ctx.has(DEFAULT_OUTPUT_KEY));
    }

    #[tokio::test]
    async fn test_cancelled_before_generation() {
        let llm = Arc::new(MockLlmProvider::new("openai").with_response("never"));
        let step = PlanGenerationStep::new(
            "plan",
            Routes::new(),
            llm,
            "gpt-4o",
            Arc::new(RecordingLogger::new()),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut ctx = issue_ctx();

        let err = step.execute(&mut ctx, &cancel).await.unwrap_err();
        assert!(matches!(err, FlowlineError::Cancelled));
    }
}
