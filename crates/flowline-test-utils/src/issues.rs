use std::sync::Mutex;

use futures::future::BoxFuture;

use flowline_core::error::{FlowlineError, Result};
use flowline_core::traits::IssueTracker;
use flowline_core::types::{IssueRef, IssueWithComments};

/// Issue tracker serving one canned issue for every reference.
#[derive(Default)]
pub struct MockIssueTracker {
    issue: Option<IssueWithComments>,
    failure: Option<(u16, String)>,
    calls: Mutex<Vec<(IssueRef, Option<String>)>>,
}

impl MockIssueTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_issue(mut self, issue: IssueWithComments) -> Self {
        self.issue = Some(issue);
        self
    }

    /// Fail every fetch with the given HTTP status.
    pub fn failing(mut self, status: u16, message: impl Into<String>) -> Self {
        self.failure = Some((status, message.into()));
        self
    }

    /// Every `(issue, token)` pair fetched so far.
    pub fn calls(&self) -> Vec<(IssueRef, Option<String>)> {
        self.calls.lock().unwrap().clone()
    }
}

impl IssueTracker for MockIssueTracker {
    fn get_issue_with_comments(
        &self,
        issue: IssueRef,
        token: Option<String>,
    ) -> BoxFuture<'_, Result<IssueWithComments>> {
        self.calls.lock().unwrap().push((issue, token));
        Box::pin(async move {
            if let Some((status, message)) = &self.failure {
                return Err(FlowlineError::IssueTracker {
                    status: Some(*status),
                    message: message.clone(),
                });
            }
            self.issue.clone().ok_or_else(|| FlowlineError::IssueTracker {
                status: Some(404),
                message: "Not Found".into(),
            })
        })
    }
}
