//! GitHub REST client backing the `read-github-issue` step.

mod client;

pub use client::GitHubClient;
