use thiserror::Error;

/// Coarse classification of a [`FlowlineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or incomplete declaration. Fatal at load time.
    Configuration,
    /// Runtime precondition violated inside a step. Fatal to one session.
    Execution,
    /// Failure of an external system (network, provider, storage).
    Collaborator,
}

#[derive(Debug, Error)]
pub enum FlowlineError {
    // Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    #[error("Invalid flow '{flow}': {}", .problems.join("; "))]
    InvalidFlow { flow: String, problems: Vec<String> },

    #[error("Invalid step '{step}': {message}")]
    InvalidStep { step: String, message: String },

    #[error("Unknown step type '{step_type}' in declaration: {payload}")]
    UnknownStepType { step_type: String, payload: String },

    #[error("Flow '{0}' has no steps")]
    EmptyFlow(String),

    #[error("Flow '{name}' not found, available: [{}]", .available.join(", "))]
    FlowNotFound {
        name: String,
        available: Vec<String>,
    },

    #[error("LLM provider not configured: {0}")]
    UnsupportedProvider(String),

    // Execution errors
    #[error("Step '{step}' failed: {message}")]
    StepExecution { step: String, message: String },

    #[error("Step not found: {0}")]
    StepNotFound(String),

    #[error("Session already started")]
    AlreadyStarted,

    #[error("Session not running")]
    NotRunning,

    #[error("Session exceeded max steps ({0})")]
    MaxStepsExceeded(usize),

    #[error("Execution cancelled")]
    Cancelled,

    // Collaborator errors
    #[error("LLM request failed: {0}")]
    LlmRequest(String),

    #[error("LLM streaming error: {0}")]
    LlmStream(String),

    #[error("LLM response parse error: {0}")]
    LlmParse(String),

    #[error("Issue tracker error{}: {message}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    IssueTracker { status: Option<u16>, message: String },

    #[error("Invalid issue URL: {0}")]
    InvalidIssueUrl(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Step '{step}' failed: {source}")]
    StepCollaborator {
        step: String,
        #[source]
        source: Box<FlowlineError>,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl FlowlineError {
    /// Shorthand for a step-level execution failure.
    pub fn step(step: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StepExecution {
            step: step.into(),
            message: message.into(),
        }
    }

    /// Attach the failing step's id to a collaborator error.
    pub fn in_step(self, step: impl Into<String>) -> Self {
        match self {
            // Execution errors already carry their step.
            e @ (Self::StepExecution { .. } | Self::StepCollaborator { .. } | Self::Cancelled) => e,
            other => Self::StepCollaborator {
                step: step.into(),
                source: Box::new(other),
            },
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_)
            | Self::ConfigNotFound(_)
            | Self::InvalidFlow { .. }
            | Self::InvalidStep { .. }
            | Self::UnknownStepType { .. }
            | Self::EmptyFlow(_)
            | Self::FlowNotFound { .. }
            | Self::UnsupportedProvider(_) => ErrorKind::Configuration,

            Self::StepExecution { .. }
            | Self::StepNotFound(_)
            | Self::AlreadyStarted
            | Self::NotRunning
            | Self::MaxStepsExceeded(_)
            | Self::Cancelled => ErrorKind::Execution,

            Self::StepCollaborator { source, .. } => source.kind(),

            Self::LlmRequest(_)
            | Self::LlmStream(_)
            | Self::LlmParse(_)
            | Self::IssueTracker { .. }
            | Self::InvalidIssueUrl(_)
            | Self::Storage(_)
            | Self::Io(_)
            | Self::Json(_) => ErrorKind::Collaborator,
        }
    }

    /// 401/403 from the issue tracker.
    pub fn is_auth_error(&self) -> bool {
        matches!(
            self,
            Self::IssueTracker {
                status: Some(401 | 403),
                ..
            }
        )
    }
}

pub type Result<T> = std::result::Result<T, FlowlineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flow_not_found_lists_available() {
        let err = FlowlineError::FlowNotFound {
            name: "deploy".into(),
            available: vec!["triage".into(), "plan".into()],
        };
        assert_eq!(
            err.to_string(),
            "Flow 'deploy' not found, available: [triage, plan]"
        );
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_in_step_keeps_collaborator_kind() {
        let err = FlowlineError::LlmRequest("HTTP 500".into()).in_step("plan");
        assert_eq!(err.kind(), ErrorKind::Collaborator);
        assert!(err.to_string().contains("Step 'plan' failed"));
        assert!(err.to_string().contains("HTTP 500"));
    }

    #[test]
    fn test_in_step_leaves_execution_errors_alone() {
        let err = FlowlineError::step("a", "boom").in_step("b");
        assert!(matches!(err, FlowlineError::StepExecution { ref step, .. } if step == "a"));
        assert_eq!(err.kind(), ErrorKind::Execution);
    }

    #[test]
    fn test_issue_tracker_status_formatting() {
        let err = FlowlineError::IssueTracker {
            status: Some(404),
            message: "Not Found".into(),
        };
        assert_eq!(err.to_string(), "Issue tracker error (HTTP 404): Not Found");
        assert!(!err.is_auth_error());

        let err = FlowlineError::IssueTracker {
            status: Some(401),
            message: "Bad credentials".into(),
        };
        assert!(err.is_auth_error());

        let err = FlowlineError::IssueTracker {
            status: None,
            message: "connection reset".into(),
        };
        assert_eq!(err.to_string(), "Issue tracker error: connection reset");
    }
}
