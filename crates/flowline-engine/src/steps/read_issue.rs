use std::sync::{Arc, OnceLock};

use futures::future::BoxFuture;
use regex::Regex;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use flowline_core::error::{FlowlineError, Result};
use flowline_core::traits::IssueTracker;
use flowline_core::types::{IssueRef, IssueWithComments};

use super::Step;
use crate::context::Context;
use crate::routing::Routes;

/// Context key that, when set, overrides the declared issue URL.
pub const ISSUE_URL_KEY: &str = "github.issueUrl";

pub const ISSUE_NUMBER_KEY: &str = "github.issue.number";
pub const ISSUE_TITLE_KEY: &str = "github.issue.title";
pub const ISSUE_AUTHOR_KEY: &str = "github.issue.author";
pub const ISSUE_BODY_KEY: &str = "github.issue.body";
pub const ISSUE_STATE_KEY: &str = "github.issue.state";
pub const ISSUE_CREATED_AT_KEY: &str = "github.issue.createdAt";
pub const ISSUE_UPDATED_AT_KEY: &str = "github.issue.updatedAt";
pub const ISSUE_URL_OUT_KEY: &str = "github.issue.url";
pub const ISSUE_COMMENT_COUNT_KEY: &str = "github.issue.commentCount";
pub const ISSUE_COMMENTS_KEY: &str = "github.issue.comments";

fn default_include_comments() -> bool {
    true
}

/// Declared fields of a `read-github-issue` step.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadIssueFields {
    pub issue_url: String,
    #[serde(default = "default_include_comments")]
    pub include_comments: bool,
    #[serde(default, alias = "githubToken")]
    pub auth_token: Option<String>,
}

/// Parse `https://github.com/<owner>/<repo>/issues/<n>` or `<owner>/<repo>#<n>`.
pub fn parse_issue_url(url: &str) -> Result<IssueRef> {
    static FULL: OnceLock<Regex> = OnceLock::new();
    static SHORT: OnceLock<Regex> = OnceLock::new();
    let full = FULL.get_or_init(|| {
        Regex::new(r"^(?:https?://)?(?:www\.)?github\.com/([^/\s]+)/([^/\s]+)/issues/(\d+)(?:[/?#].*)?$")
            .expect("valid issue url regex")
    });
    let short = SHORT.get_or_init(|| {
        Regex::new(r"^([\w.-]+)/([\w.-]+)#(\d+)$").expect("valid issue ref regex")
    });

    let url = url.trim();
    let caps = full
        .captures(url)
        .or_else(|| short.captures(url))
        .ok_or_else(|| FlowlineError::InvalidIssueUrl(url.to_string()))?;

    let number = caps[3]
        .parse::<u64>()
        .map_err(|_| FlowlineError::InvalidIssueUrl(url.to_string()))?;

    Ok(IssueRef {
        owner: caps[1].to_string(),
        repo: caps[2].to_string(),
        number,
    })
}

/// Fetches an issue (and optionally its comments) into the context.
///
/// Failures propagate exactly as the tracker reports them: this step neither
/// logs nor wraps errors, and leaves the context untouched on failure.
pub struct ReadIssueStep {
    id: String,
    routes: Routes,
    issue_url: String,
    include_comments: bool,
    auth_token: Option<String>,
    tracker: Arc<dyn IssueTracker>,
}

impl ReadIssueStep {
    pub fn new(
        id: impl Into<String>,
        routes: Routes,
        issue_url: impl Into<String>,
        tracker: Arc<dyn IssueTracker>,
    ) -> Self {
        Self {
            id: id.into(),
            routes,
            issue_url: issue_url.into(),
            include_comments: true,
            auth_token: None,
            tracker,
        }
    }

    pub fn from_fields(
        id: impl Into<String>,
        routes: Routes,
        fields: ReadIssueFields,
        tracker: Arc<dyn IssueTracker>,
    ) -> Self {
        Self::new(id, routes, fields.issue_url, tracker)
            .with_comments(fields.include_comments)
            .with_auth_token(fields.auth_token)
    }

    pub fn with_comments(mut self, include: bool) -> Self {
        self.include_comments = include;
        self
    }

    pub fn with_auth_token(mut self, token: Option<String>) -> Self {
        self.auth_token = token;
        self
    }

    fn write_context(&self, ctx: &mut Context, fetched: IssueWithComments) -> Result<()> {
        let IssueWithComments { issue, comments } = fetched;

        // Serialize before touching the context so a failure leaves it as-is.
        let comments_json = if self.include_comments {
            Some(serde_json::to_string(&comments)?)
        } else {
            None
        };

        ctx.set(ISSUE_NUMBER_KEY, issue.number.to_string());
        ctx.set(ISSUE_TITLE_KEY, issue.title);
        ctx.set(ISSUE_AUTHOR_KEY, issue.author);
        ctx.set(ISSUE_BODY_KEY, issue.body);
        ctx.set(ISSUE_STATE_KEY, issue.state);
        ctx.set(ISSUE_CREATED_AT_KEY, issue.created_at.to_rfc3339());
        ctx.set(ISSUE_UPDATED_AT_KEY, issue.updated_at.to_rfc3339());
        ctx.set(ISSUE_URL_OUT_KEY, issue.url);
        ctx.set(ISSUE_COMMENT_COUNT_KEY, comments.len().to_string());
        if let Some(json) = comments_json {
            ctx.set(ISSUE_COMMENTS_KEY, json);
        }
        Ok(())
    }
}

impl Step for ReadIssueStep {
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
        Box::pin(async move {
            let url = ctx
                .get_text(ISSUE_URL_KEY)
                .unwrap_or_else(|| self.issue_url.clone());
            let issue_ref = parse_issue_url(&url)?;

            debug!(step_id = %self.id, issue = %issue_ref, "Fetching issue");
            let fetched = self
                .tracker
                .get_issue_with_comments(issue_ref, self.auth_token.clone())
                .await?;

            self.write_context(ctx, fetched)?;
            Ok(self.routes.resolve(ctx))
        })
    }
}
