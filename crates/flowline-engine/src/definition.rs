use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use flowline_core::error::{FlowlineError, Result};

use crate::routing::Routes;

/// Persisted form of a flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowDefinition {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_step_id: Option<String>,
    pub steps: Vec<StepDeclaration>,
}

/// One declared step: the common envelope plus variant-specific fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDeclaration {
    pub id: String,
    #[serde(rename = "type")]
    pub step_type: String,
    #[serde(rename = "nextStepId", default)]
    pub next_step_id: Routes,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl StepDeclaration {
    /// Deserialize the variant-specific fields.
    pub fn fields<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(Value::Object(self.fields.clone())).map_err(|e| {
            FlowlineError::InvalidStep {
                step: self.id.clone(),
                message: e.to_string(),
            }
        })
    }

    /// The full declaration as JSON, for diagnostics.
    pub fn payload(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{:?}", self))
    }
}

/// The closed set of step variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepKind {
    Action,
    Decision,
    Log,
    ReadGithubIssue,
    PlanGeneration,
}

impl StepKind {
    /// Parse a declared `type`, ignoring case and `-`/`_` spelling.
    pub fn parse(step_type: &str) -> Option<Self> {
        let normalized = step_type.trim().to_ascii_lowercase().replace('_', "-");
        match normalized.as_str() {
            "action" => Some(Self::Action),
            "decision" => Some(Self::Decision),
            "log" => Some(Self::Log),
            "read-github-issue" => Some(Self::ReadGithubIssue),
            "plan-generation" => Some(Self::PlanGeneration),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Action => "action",
            Self::Decision => "decision",
            Self::Log => "log",
            Self::ReadGithubIssue => "read-github-issue",
            Self::PlanGeneration => "plan-generation",
        }
    }
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
