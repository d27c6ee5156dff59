use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use flowline_core::error::{FlowlineError, Result};
use flowline_core::traits::{FlowLogger, IssueTracker, LlmProvider};

use crate::definition::{StepDeclaration, StepKind};
use crate::steps::action::{ActionFields, ActionStep};
use crate::steps::decision::{DecisionFields, DecisionStep};
use crate::steps::log::{LogFields, LogStep};
use crate::steps::plan::{PlanFields, PlanGenerationStep};
use crate::steps::read_issue::{ReadIssueFields, ReadIssueStep};
use crate::steps::Step;

/// A provider plus the model its steps use when they do not name one.
#[derive(Clone)]
struct ProviderSlot {
    provider: Arc<dyn LlmProvider>,
    default_model: Option<String>,
}

/// Builds concrete steps from validated declarations.
///
/// Collaborators are handed to the factory up front and passed on to the
/// steps that need them.
#[derive(Clone)]
pub struct StepFactory {
    logger: Arc<dyn FlowLogger>,
    issue_tracker: Option<Arc<dyn IssueTracker>>,
    providers: HashMap<String, ProviderSlot>,
}

impl StepFactory {
    pub fn new(logger: Arc<dyn FlowLogger>) -> Self {
        Self {
            logger,
            issue_tracker: None,
            providers: HashMap::new(),
        }
    }

    pub fn with_issue_tracker(mut self, tracker: Arc<dyn IssueTracker>) -> Self {
        self.issue_tracker = Some(tracker);
        self
    }

    /// Register an LLM provider under the name flows use in `llm_provider`.
    pub fn with_provider(
        mut self,
        name: impl Into<String>,
        provider: Arc<dyn LlmProvider>,
        default_model: Option<String>,
    ) -> Self {
        self.providers.insert(
            name.into(),
            ProviderSlot {
                provider,
                default_model,
            },
        );
        self
    }

    /// Names of the registered LLM providers, sorted.
    pub fn provider_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Build the concrete step for one declaration.
    pub fn create(&self, decl: &StepDeclaration) -> Result<Arc<dyn Step>> {
        let kind = StepKind::parse(&decl.step_type).ok_or_else(|| {
            FlowlineError::UnknownStepType {
                step_type: decl.step_type.clone(),
                payload: decl.payload(),
            }
        })?;
        debug!(step_id = %decl.id, kind = %kind, "Building step");

        let id = decl.id.clone();
        let routes = decl.next_step_id.clone();

        let step: Arc<dyn Step> = match kind {
            StepKind::Action => {
                let fields: ActionFields = decl.fields()?;
                Arc::new(ActionStep::from_fields(id, routes, fields, self.logger.clone()))
            }
            StepKind::Decision => {
                let fields: DecisionFields = decl.fields()?;
                Arc::new(DecisionStep::from_fields(id, routes, fields, self.logger.clone()))
            }
            StepKind::Log => {
                let fields: LogFields = decl.fields()?;
                Arc::new(LogStep::from_fields(id, routes, fields, self.logger.clone()))
            }
            StepKind::ReadGithubIssue => {
                let fields: ReadIssueFields = decl.fields()?;
                let tracker = self.issue_tracker.clone().ok_or_else(|| {
                    FlowlineError::InvalidStep {
                        step: decl.id.clone(),
                        message: "no issue tracker configured".into(),
                    }
                })?;
                Arc::new(ReadIssueStep::from_fields(id, routes, fields, tracker))
            }
            StepKind::PlanGeneration => Arc::new(self.plan_step(decl)?),
        };
        Ok(step)
    }

    fn plan_step(&self, decl: &StepDeclaration) -> Result<PlanGenerationStep> {
        let fields: PlanFields = decl.fields()?;
        let name = fields.llm_provider.to_ascii_lowercase();
        let slot = self
            .providers
            .get(&name)
            .ok_or_else(|| FlowlineError::UnsupportedProvider(fields.llm_provider.clone()))?;

        let model = fields
            .model
            .or_else(|| slot.default_model.clone())
            .ok_or_else(|| FlowlineError::InvalidStep {
                step: decl.id.clone(),
                message: format!("no model given and provider '{}' has no default", name),
            })?;

        let mut step = PlanGenerationStep::new(
            decl.id.clone(),
            decl.next_step_id.clone(),
            slot.provider.clone(),
            model,
            self.logger.clone(),
        )
        .with_temperature(fields.temperature)
        .with_max_tokens(fields.max_tokens)
        .with_prompt_template(fields.prompt_template);
        if let Some(key) = fields.output_key {
            step = step.with_output_key(key);
        }
        Ok(step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowline_core::error::ErrorKind;
    use flowline_test_utils::{MockIssueTracker, MockLlmProvider, RecordingLogger};
    use serde_json::json;

    // `Result::unwrap_err` requires the Ok type to be `Debug`.
    impl std::fmt::Debug for dyn crate::steps::Step {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("Step").field("id", &self.id()).finish()
        }
    }

    fn decl(value: serde_json::Value) -> StepDeclaration {
        serde_json::from_value(value).unwrap()
    }

    fn factory() -> StepFactory {
        StepFactory::new(Arc::new(RecordingLogger::new()))
            .with_issue_tracker(Arc::new(MockIssueTracker::new()))
            .with_provider(
                "openai",
                Arc::new(MockLlmProvider::new("openai")),
                Some("gpt-4o".into()),
            )
            .with_provider("claude", Arc::new(MockLlmProvider::new("claude")), None)
    }

    #[test]
    fn test_builds_every_kind() {
        let f = factory();
        let decls = [
            json!({"id": "a", "type": "action", "operation": "setContext", "key": "k", "value": "v"}),
            json!({"id": "d", "type": "Decision", "condition": "equals", "contextKey": "k", "trueValue": "v",
                   "nextStepId": {"true": "a", "false": "l"}}),
            json!({"id": "l", "type": "LOG", "message": "hi", "level": "debug"}),
            json!({"id": "r", "type": "read-github-issue", "issueUrl": "acme/app#1"}),
            json!({"id": "p", "type": "plan-generation", "llm_provider": "openai"}),
        ];
        for d in decls {
            let d = decl(d);
            let step = f.create(&d).unwrap();
            assert_eq!(step.id(), d.id);
        }
    }

    #[test]
    fn test_unknown_type_reports_payload() {
        let err = factory()
            .create(&decl(json!({"id": "w", "type": "webhook", "url": "http://x"})))
            .unwrap_err();
        match err {
            FlowlineError::UnknownStepType { step_type, payload } => {
                assert_eq!(step_type, "webhook");
                assert!(payload.contains("\"url\":\"http://x\""));
                assert!(payload.contains("\"id\":\"w\""));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unregistered_provider() {
        let err = factory()
            .create(&decl(json!({"id": "p", "type": "plan-generation", "llm_provider": "gemini"})))
            .unwrap_err();
        assert!(matches!(err, FlowlineError::UnsupportedProvider(ref p) if p == "gemini"));
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_plan_needs_some_model() {
        let err = factory()
            .create(&decl(json!({"id": "p", "type": "plan-generation", "llm_provider": "claude"})))
            .unwrap_err();
        assert!(err.to_string().contains("no model given"));

        let ok = factory().create(&decl(json!({
            "id": "p", "type": "plan-generation", "llm_provider": "Claude", "model": "claude-sonnet"
        })));
        assert!(ok.is_ok());
    }

    #[test]
    fn test_read_issue_without_tracker() {
        let f = StepFactory::new(Arc::new(RecordingLogger::new()));
        let err = f
            .create(&decl(json!({"id": "r", "type": "read-github-issue", "issueUrl": "a/b#1"})))
            .unwrap_err();
        assert!(err.to_string().contains("no issue tracker configured"));
    }

    #[test]
    fn test_bad_fields_are_invalid_step() {
        let err = factory()
            .create(&decl(json!({"id": "a", "type": "action", "operation": "explode", "key": "k"})))
            .unwrap_err();
        assert!(matches!(err, FlowlineError::InvalidStep { ref step, .. } if step == "a"));
    }

    #[test]
    fn test_provider_names_sorted() {
        assert_eq!(factory().provider_names(), vec!["claude", "openai"]);
    }
}
