use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use flowline_core::error::{FlowlineError, Result};

use crate::context::Context;
use crate::flow::Flow;

/// Lifecycle of a session. `Completed` and `Error` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Initialized,
    Running,
    Completed,
    Error,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Initialized => "initialized",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// One execution of a flow.
///
/// A session owns its context and executes exactly one step at a time,
/// following each step's chosen successor until a step returns no successor
/// (completed) or fails (error). Context changes made by earlier steps are
/// kept when a later step fails.
pub struct Session {
    id: String,
    flow: Arc<Flow>,
    context: Context,
    status: SessionStatus,
    current_step_id: Option<String>,
    max_steps: Option<usize>,
    history: Vec<String>,
    cancel: CancellationToken,
}

impl Session {
    pub fn new(flow: Arc<Flow>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            flow,
            context: Context::new(),
            status: SessionStatus::Initialized,
            current_step_id: None,
            max_steps: None,
            history: Vec::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Seed the session with an initial context.
    pub fn with_context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }

    /// Cap the number of steps this session may execute (`None` = no cap).
    pub fn with_max_steps(mut self, max_steps: Option<usize>) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Use a caller-owned cancellation token.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn flow(&self) -> &Arc<Flow> {
        &self.flow
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn is_running(&self) -> bool {
        self.status == SessionStatus::Running
    }

    pub fn is_complete(&self) -> bool {
        self.status == SessionStatus::Completed
    }

    pub fn current_step_id(&self) -> Option<&str> {
        self.current_step_id.as_deref()
    }

    /// Read-only view of the session's context.
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Hand the context back to the caller, ending the session.
    pub fn into_context(self) -> Context {
        self.context
    }

    /// Ids of the steps executed so far, in order.
    pub fn history(&self) -> &[String] {
        &self.history
    }

    pub fn steps_executed(&self) -> usize {
        self.history.len()
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Move to `Running` at the flow's first step.
    pub fn start(&mut self) -> Result<()> {
        if self.status != SessionStatus::Initialized {
            return Err(FlowlineError::AlreadyStarted);
        }
        let first = self
            .flow
            .first_step_id()
            .ok_or_else(|| FlowlineError::EmptyFlow(self.flow.id().to_string()))?
            .to_string();

        info!(session_id = %self.id, flow_id = %self.flow.id(), first_step = %first, "Session started");
        self.current_step_id = Some(first);
        self.status = SessionStatus::Running;
        Ok(())
    }

    /// Execute the current step and advance to its successor.
    pub async fn execute_current_step(&mut self) -> Result<()> {
        let step_id = match (&self.status, &self.current_step_id) {
            (SessionStatus::Running, Some(id)) => id.clone(),
            _ => return Err(FlowlineError::NotRunning),
        };

        if let Some(max) = self.max_steps {
            if self.history.len() >= max {
                warn!(session_id = %self.id, max_steps = max, step_id = %step_id, "Step limit reached");
                self.status = SessionStatus::Error;
                return Err(FlowlineError::MaxStepsExceeded(max));
            }
        }

        debug!(session_id = %self.id, step_id = %step_id, "Executing step");
        let outcome = self
            .flow
            .execute(&step_id, &mut self.context, &self.cancel)
            .await;
        self.history.push(step_id.clone());

        match outcome {
            Ok(Some(next)) => {
                debug!(session_id = %self.id, from = %step_id, to = %next, "Advancing");
                self.current_step_id = Some(next);
                Ok(())
            }
            Ok(None) => {
                info!(
                    session_id = %self.id,
                    flow_id = %self.flow.id(),
                    steps = self.history.len(),
                    "Session completed"
                );
                self.current_step_id = None;
                self.status = SessionStatus::Completed;
                Ok(())
            }
            Err(e) => {
                error!(session_id = %self.id, step_id = %step_id, error = %e, "Step failed");
                self.status = SessionStatus::Error;
                Err(e)
            }
        }
    }

    /// Start (if needed) and execute steps until the session ends.
    pub async fn run(&mut self) -> Result<()> {
        if self.status == SessionStatus::Initialized {
            self.start()?;
        }
        while self.is_running() {
            self.execute_current_step().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::Routes;
    use crate::steps::{LogStep, Step};
    use flowline_core::types::LogLevel;
    use flowline_test_utils::RecordingLogger;

    fn two_logs(logger: &Arc<RecordingLogger>) -> Arc<Flow> {
        let steps: Vec<Arc<dyn Step>> = vec![
            Arc::new(LogStep::new("step1", Routes::single("step2"), "one", LogLevel::Info, logger.clone())),
            Arc::new(LogStep::new("step2", Routes::new(), "two", LogLevel::Info, logger.clone())),
        ];
        Arc::new(Flow::new("two", steps, None).unwrap())
    }

    #[test]
    fn test_start_empty_flow_fails() {
        let mut session = Session::new(Arc::new(Flow::new("empty", vec![], None).unwrap()));
        let err = session.start().unwrap_err();
        assert!(matches!(err, FlowlineError::EmptyFlow(_)));
        assert!(err.to_string().contains("no steps"));
        assert_eq!(session.status(), SessionStatus::Initialized);
    }

    #[test]
    fn test_start_twice_fails() {
        let logger = Arc::new(RecordingLogger::new());
        let mut session = Session::new(two_logs(&logger));
        session.start().unwrap();
        assert_eq!(session.current_step_id(), Some("step1"));
        assert!(matches!(session.start(), Err(FlowlineError::AlreadyStarted)));
    }

    #[tokio::test]
    async fn test_execute_before_start_fails() {
        let logger = Arc::new(RecordingLogger::new());
        let mut session = Session::new(two_logs(&logger));
        let err = session.execute_current_step().await.unwrap_err();
        assert!(matches!(err, FlowlineError::NotRunning));
        assert!(logger.entries().is_empty());
    }

    #[tokio::test]
    async fn test_execute_after_completion_fails() {
        let logger = Arc::new(RecordingLogger::new());
        let mut session = Session::new(two_logs(&logger));
        session.run().await.unwrap();
        assert!(session.is_complete());
        assert!(matches!(
            session.execute_current_step().await,
            Err(FlowlineError::NotRunning)
        ));
    }

    #[tokio::test]
    async fn test_step_limit() {
        let logger = Arc::new(RecordingLogger::new());
        let steps: Vec<Arc<dyn Step>> = vec![
            Arc::new(LogStep::new("a", Routes::single("b"), "a", LogLevel::Debug, logger.clone())),
            Arc::new(LogStep::new("b", Routes::single("a"), "b", LogLevel::Debug, logger.clone())),
        ];
        let flow = Arc::new(Flow::new("loop", steps, None).unwrap());
        let mut session = Session::new(flow).with_max_steps(Some(5));

        let err = session.run().await.unwrap_err();
        assert!(matches!(err, FlowlineError::MaxStepsExceeded(5)));
        assert_eq!(session.status(), SessionStatus::Error);
        assert_eq!(session.history(), ["a", "b", "a", "b", "a"]);
    }

    #[test]
    fn test_sessions_have_distinct_ids() {
        let logger = Arc::new(RecordingLogger::new());
        let flow = two_logs(&logger);
        let a = Session::new(flow.clone());
        let b = Session::new(flow);
        assert_ne!(a.id(), b.id());
    }
}
