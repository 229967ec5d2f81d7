//! Typed access to the GitHub search and repository endpoints.
//!
//! Every call returns the [`RateLimitSnapshot`] parsed from its own response
//! headers; the client keeps no rate-limit state of its own. Quota exhaustion
//! surfaces as [`GitHubError::RateLimited`], which callers must not retry.

pub mod client;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::models::RateLimitSnapshot;

pub use client::GitHubClient;

/// Page size used for every search request.
pub const PER_PAGE: u32 = 100;

#[derive(Debug, thiserror::Error)]
pub enum GitHubError {
    /// Quota exhausted; nothing useful can happen before `reset_at`.
    #[error("Rate limit exceeded. Reset at {}", reset_at.to_rfc3339())]
    RateLimited { reset_at: DateTime<Utc> },
    /// Network failure or 5xx, still failing after every retry.
    #[error("GitHub API unavailable: {0}")]
    Transient(String),
    /// Any other non-2xx response. Not retried.
    #[error("GitHub API error: {status} {body}")]
    Api { status: u16, body: String },
    #[error("Failed to decode GitHub response: {0}")]
    Decode(String),
}

/// A decoded response together with the rate-limit headers it carried.
#[derive(Debug, Clone)]
pub struct ApiResponse<T> {
    pub data: T,
    pub rate_limit: RateLimitSnapshot,
}

impl<T> ApiResponse<T> {
    pub fn new(data: T, rate_limit: RateLimitSnapshot) -> Self {
        Self { data, rate_limit }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RepoSearchPage {
    pub total_count: u64,
    #[serde(default)]
    pub incomplete_results: bool,
    pub items: Vec<RepoItem>,
}

/// Repository as returned by repository search.
#[derive(Debug, Clone, Deserialize)]
pub struct RepoItem {
    pub full_name: String,
    pub html_url: String,
    #[serde(default)]
    pub stargazers_count: u64,
    #[serde(default)]
    pub forks_count: u64,
    pub pushed_at: Option<DateTime<Utc>>,
    pub language: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CodeSearchPage {
    #[serde(default)]
    pub total_count: u64,
    pub items: Vec<CodeItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CodeItem {
    pub name: String,
    pub path: String,
    pub repository: CodeRepository,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CodeRepository {
    pub full_name: String,
}

impl CodeItem {
    /// Candidate key of the repository this hit belongs to.
    pub fn repo_url(&self) -> String {
        format!("https://github.com/{}", self.repository.full_name)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RepoDetails {
    pub full_name: String,
    pub html_url: String,
    #[serde(default)]
    pub stargazers_count: u64,
    #[serde(default)]
    pub forks_count: u64,
    #[serde(default)]
    pub open_issues_count: u64,
    pub pushed_at: Option<DateTime<Utc>>,
    pub language: Option<String>,
    pub description: Option<String>,
    pub default_branch: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemState {
    Open,
    All,
}

impl ItemState {
    pub fn as_str(self) -> &'static str {
        match self {
            ItemState::Open => "open",
            ItemState::All => "all",
        }
    }
}

/// The remote operations the scanner needs. Implemented by [`GitHubClient`];
/// tests substitute scripted fakes.
#[async_trait]
pub trait SearchApi: Send + Sync {
    async fn search_repositories(
        &self,
        query: &str,
        page: u32,
        per_page: u32,
    ) -> Result<ApiResponse<RepoSearchPage>, GitHubError>;

    async fn search_code(
        &self,
        query: &str,
        page: u32,
        per_page: u32,
    ) -> Result<ApiResponse<CodeSearchPage>, GitHubError>;

    async fn get_repo_details(
        &self,
        owner: &str,
        name: &str,
    ) -> Result<ApiResponse<RepoDetails>, GitHubError>;

    async fn count_issues(
        &self,
        owner: &str,
        name: &str,
        state: ItemState,
    ) -> Result<ApiResponse<u64>, GitHubError>;

    async fn count_pull_requests(
        &self,
        owner: &str,
        name: &str,
        state: ItemState,
    ) -> Result<ApiResponse<u64>, GitHubError>;

    async fn count_contributors(
        &self,
        owner: &str,
        name: &str,
    ) -> Result<ApiResponse<u64>, GitHubError>;
}
