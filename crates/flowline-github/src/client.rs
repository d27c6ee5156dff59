use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

use flowline_core::config::GitHubConfig;
use flowline_core::error::{FlowlineError, Result};
use flowline_core::traits::IssueTracker;
use flowline_core::types::{Issue, IssueComment, IssueRef, IssueWithComments};

const GITHUB_API_VERSION: &str = "2022-11-28";
const COMMENTS_PER_PAGE: usize = 100;
const MAX_COMMENT_PAGES: u32 = 10;
const GHOST_USER: &str = "ghost";

/// GitHub REST API client
pub struct GitHubClient {
    http: reqwest::Client,
    api_base: String,
    token: Option<String>,
}

// Response types for API deserialization
#[derive(Debug, Deserialize)]
struct IssueResponse {
    number: u64,
    title: String,
    #[serde(default)]
    user: Option<UserResponse>,
    #[serde(default)]
    body: Option<String>,
    state: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    html_url: String,
    #[serde(default)]
    comments: u64,
}

#[derive(Debug, Deserialize)]
struct CommentResponse {
    #[serde(default)]
    user: Option<UserResponse>,
    #[serde(default)]
    body: Option<String>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    login: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    message: String,
}

fn login(user: Option<UserResponse>) -> String {
    user.map(|u| u.login)
        .unwrap_or_else(|| GHOST_USER.to_string())
}

impl From<IssueResponse> for Issue {
    fn from(r: IssueResponse) -> Self {
        Issue {
            number: r.number,
            title: r.title,
            author: login(r.user),
            body: r.body.unwrap_or_default(),
            state: r.state,
            created_at: r.created_at,
            updated_at: r.updated_at,
            url: r.html_url,
        }
    }
}

impl From<CommentResponse> for IssueComment {
    fn from(r: CommentResponse) -> Self {
        IssueComment {
            author: login(r.user),
            body: r.body.unwrap_or_default(),
            created_at: r.created_at,
        }
    }
}

/// Prefer GitHub's own `message` field over the raw body.
fn error_message(status: StatusCode, body: &str) -> String {
    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(e) => e.message,
        Err(_) if body.trim().is_empty() => status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string(),
        Err(_) => body.trim().to_string(),
    }
}

impl GitHubClient {
    pub fn new(config: &GitHubConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("flowline/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FlowlineError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            token: config.token.clone().filter(|t| !t.is_empty()),
        })
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Whether a default token is configured.
    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, token: Option<&str>) -> Result<T> {
        let mut req = self
            .http
            .get(url)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", GITHUB_API_VERSION);
        if let Some(token) = token {
            req = req.header("Authorization", format!("Bearer {}", token));
        }

        let response = req.send().await.map_err(|e| FlowlineError::IssueTracker {
            status: None,
            message: format!("Failed to send request to GitHub API: {}", e),
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FlowlineError::IssueTracker {
                status: Some(status.as_u16()),
                message: error_message(status, &body),
            });
        }

        response
            .json()
            .await
            .map_err(|e| FlowlineError::IssueTracker {
                status: None,
                message: format!("Failed to parse GitHub response: {}", e),
            })
    }

    /// Fetch every comment on an issue, oldest first.
    pub async fn get_comments(
        &self,
        issue: &IssueRef,
        token: Option<&str>,
    ) -> Result<Vec<IssueComment>> {
        let mut comments = Vec::new();
        for page in 1..=MAX_COMMENT_PAGES {
            let url = format!(
                "{}/repos/{}/{}/issues/{}/comments?per_page={}&page={}",
                self.api_base, issue.owner, issue.repo, issue.number, COMMENTS_PER_PAGE, page
            );
            let batch: Vec<CommentResponse> = self.get_json(&url, token).await?;
            let last = batch.len() < COMMENTS_PER_PAGE;
            comments.extend(batch.into_iter().map(IssueComment::from));
            if last {
                return Ok(comments);
            }
        }
        warn!(issue = %issue, fetched = comments.len(), "Comment thread truncated");
        Ok(comments)
    }

    async fn fetch(&self, issue: &IssueRef, token: Option<&str>) -> Result<IssueWithComments> {
        let url = format!(
            "{}/repos/{}/{}/issues/{}",
            self.api_base, issue.owner, issue.repo, issue.number
        );
        let response: IssueResponse = self.get_json(&url, token).await?;
        let comments = if response.comments > 0 {
            self.get_comments(issue, token).await?
        } else {
            Vec::new()
        };
        Ok(IssueWithComments {
            issue: response.into(),
            comments,
        })
    }
}

impl IssueTracker for GitHubClient {
    fn get_issue_with_comments(
        &self,
        issue: IssueRef,
        token: Option<String>,
    ) -> BoxFuture<'_, Result<IssueWithComments>> {
        Box::pin(async move {
            let token = token
                .filter(|t| !t.is_empty())
                .or_else(|| self.token.clone());
            debug!(issue = %issue, authenticated = token.is_some(), "Fetching GitHub issue");

            match self.fetch(&issue, token.as_deref()).await {
                // Public issues are still readable when the token is bad or under-scoped.
                Err(e) if token.is_some() && e.is_auth_error() => {
                    warn!(issue = %issue, error = %e, "GitHub rejected the token, retrying without it");
                    self.fetch(&issue, None).await
                }
                other => other,
            }
        })
    }
}
