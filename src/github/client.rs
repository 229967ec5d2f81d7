use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, ACCEPT, AUTHORIZATION, LINK, USER_AGENT};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;

use super::{
    ApiResponse, CodeSearchPage, GitHubError, ItemState, RepoDetails, RepoSearchPage, SearchApi,
};
use crate::config::GitHubConfig;
use crate::models::RateLimitSnapshot;

const ACCEPT_V3: &str = "application/vnd.github.v3+json";
const CLIENT_USER_AGENT: &str = "vibe-radar";

/// HTTP client for the GitHub REST API with retry and rate-limit detection.
#[derive(Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    config: GitHubConfig,
}

/// Body and headers of a successful response, before decoding.
struct RawResponse {
    headers: HeaderMap,
    body: String,
    rate_limit: RateLimitSnapshot,
}

impl GitHubClient {
    pub fn new(config: GitHubConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
            .build()?;
        if config.token.is_none() {
            tracing::warn!("GITHUB_TOKEN not set - rate limits will be strict (60 requests/hour)");
        }
        Ok(Self { http, config })
    }

    pub fn has_token(&self) -> bool {
        self.config.token.is_some()
    }

    /// GET `path` with retries. Transient failures (network, 5xx) are retried
    /// up to `max_retries` attempts with linear backoff; everything else is
    /// returned on first sight.
    async fn get_raw(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<RawResponse, GitHubError> {
        let url = format!("{}{}", self.config.api_base, path);
        let attempts = self.config.max_retries.max(1);
        let mut attempt = 1;

        loop {
            match self.try_get(&url, query).await {
                Err(GitHubError::Transient(msg)) if attempt < attempts => {
                    let delay = self.config.retry_delay() * attempt;
                    tracing::warn!(
                        "GitHub request {path} failed (attempt {attempt}/{attempts}): {msg}; retrying in {}ms",
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    async fn try_get(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<RawResponse, GitHubError> {
        let mut req = self
            .http
            .get(url)
            .query(query)
            .header(ACCEPT, ACCEPT_V3)
            .header(USER_AGENT, CLIENT_USER_AGENT);
        if let Some(token) = &self.config.token {
            req = req.header(AUTHORIZATION, format!("token {token}"));
        }

        let resp = req
            .send()
            .await
            .map_err(|e| GitHubError::Transient(format!("{e:#}")))?;

        let status = resp.status();
        let headers = resp.headers().clone();
        let rate_limit = parse_rate_limit(&headers);

        if status == StatusCode::FORBIDDEN || status == StatusCode::TOO_MANY_REQUESTS {
            if let Some(reset_at) = rate_limit.reset_at {
                if reset_at > Utc::now() {
                    return Err(GitHubError::RateLimited { reset_at });
                }
            }
        }

        let body = resp
            .text()
            .await
            .map_err(|e| GitHubError::Transient(format!("{e:#}")))?;

        if status.is_server_error() {
            return Err(GitHubError::Transient(format!("{} {body}", status.as_u16())));
        }
        if !status.is_success() {
            return Err(GitHubError::Api {
                status: status.as_u16(),
                body,
            });
        }

        Ok(RawResponse {
            headers,
            body,
            rate_limit,
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<ApiResponse<T>, GitHubError> {
        let raw = self.get_raw(path, query).await?;
        let data = serde_json::from_str(&raw.body)
            .map_err(|e| GitHubError::Decode(format!("{path}: {e}")))?;
        Ok(ApiResponse::new(data, raw.rate_limit))
    }

    /// Count the items of a list endpoint by requesting one item per page and
    /// reading the last page number from the `Link` header.
    async fn count_items(
        &self,
        path: &str,
        mut query: Vec<(&str, String)>,
    ) -> Result<ApiResponse<u64>, GitHubError> {
        query.push(("per_page", "1".to_string()));
        query.push(("page", "1".to_string()));
        let raw = self.get_raw(path, &query).await?;

        if let Some(last) = raw
            .headers
            .get(LINK)
            .and_then(|v| v.to_str().ok())
            .and_then(last_page_from_link)
        {
            return Ok(ApiResponse::new(last, raw.rate_limit));
        }

        // Single page (or empty repo, which answers 204 with no body)
        if raw.body.trim().is_empty() {
            return Ok(ApiResponse::new(0, raw.rate_limit));
        }
        let items: serde_json::Value = serde_json::from_str(&raw.body)
            .map_err(|e| GitHubError::Decode(format!("{path}: {e}")))?;
        let count = items.as_array().map(|a| a.len() as u64).unwrap_or(0);
        Ok(ApiResponse::new(count, raw.rate_limit))
    }
}

#[async_trait]
impl SearchApi for GitHubClient {
    async fn search_repositories(
        &self,
        query: &str,
        page: u32,
        per_page: u32,
    ) -> Result<ApiResponse<RepoSearchPage>, GitHubError> {
        let params = [
            ("q", query.to_string()),
            ("page", page.to_string()),
            ("per_page", per_page.to_string()),
            ("sort", "updated".to_string()),
            ("order", "desc".to_string()),
        ];
        self.get_json("/search/repositories", &params).await
    }

    async fn search_code(
        &self,
        query: &str,
        page: u32,
        per_page: u32,
    ) -> Result<ApiResponse<CodeSearchPage>, GitHubError> {
        let params = [
            ("q", query.to_string()),
            ("page", page.to_string()),
            ("per_page", per_page.to_string()),
        ];
        self.get_json("/search/code", &params).await
    }

    async fn get_repo_details(
        &self,
        owner: &str,
        name: &str,
    ) -> Result<ApiResponse<RepoDetails>, GitHubError> {
        self.get_json(&format!("/repos/{owner}/{name}"), &[]).await
    }

    async fn count_issues(
        &self,
        owner: &str,
        name: &str,
        state: ItemState,
    ) -> Result<ApiResponse<u64>, GitHubError> {
        self.count_items(
            &format!("/repos/{owner}/{name}/issues"),
            vec![("state", state.as_str().to_string())],
        )
        .await
    }

    async fn count_pull_requests(
        &self,
        owner: &str,
        name: &str,
        state: ItemState,
    ) -> Result<ApiResponse<u64>, GitHubError> {
        self.count_items(
            &format!("/repos/{owner}/{name}/pulls"),
            vec![("state", state.as_str().to_string())],
        )
        .await
    }

    async fn count_contributors(
        &self,
        owner: &str,
        name: &str,
    ) -> Result<ApiResponse<u64>, GitHubError> {
        self.count_items(
            &format!("/repos/{owner}/{name}/contributors"),
            vec![("anon", "false".to_string())],
        )
        .await
    }
}

/// Read `X-RateLimit-Remaining` and `X-RateLimit-Reset` (epoch seconds).
pub fn parse_rate_limit(headers: &HeaderMap) -> RateLimitSnapshot {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.trim().to_string())
    };

    RateLimitSnapshot {
        remaining: header("x-ratelimit-remaining").and_then(|v| v.parse().ok()),
        reset_at: header("x-ratelimit-reset")
            .and_then(|v| v.parse::<i64>().ok())
            .and_then(|secs| DateTime::from_timestamp(secs, 0)),
    }
}

/// Extract the `page` query parameter of the `rel="last"` link.
pub fn last_page_from_link(link: &str) -> Option<u64> {
    link.split(',').find_map(|part| {
        let (target, rels) = part.split_once(';')?;
        if !rels.contains("rel=\"last\"") {
            return None;
        }
        let url = target.trim().trim_start_matches('<').trim_end_matches('>');
        let url = reqwest::Url::parse(url).ok()?;
        url.query_pairs()
            .find(|(k, _)| k == "page")
            .and_then(|(_, v)| v.parse().ok())
    })
}
