use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default score threshold for persisting a candidate.
pub const DEFAULT_MIN_SCORE: u32 = 4;
/// Lower threshold used by interactive callers (one tool mention is enough).
pub const LOW_MIN_SCORE: u32 = 2;
pub const DEFAULT_MAX_REPOS: usize = 80;
pub const DEFAULT_REPO_PAGES: u32 = 2;
pub const DEFAULT_CODE_PAGES: u32 = 1;

/// One record per scan invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanJob {
    pub id: Uuid,
    pub status: JobStatus,
    /// 0-100
    pub progress: u8,
    pub message: Option<String>,
    pub params: ResolvedScanParams,
    pub cancel_requested: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub rate_limit_reset_at: Option<DateTime<Utc>>,
    /// Last rate-limit headers observed by the scan, for observability only.
    pub rate_limit: Option<RateLimitSnapshot>,
    pub updated_at: DateTime<Utc>,
}

impl ScanJob {
    pub fn new(params: ResolvedScanParams) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            status: JobStatus::Running,
            progress: 0,
            message: None,
            params,
            cancel_requested: false,
            started_at: now,
            finished_at: None,
            rate_limit_reset_at: None,
            rate_limit: None,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Running,
    Completed,
    Failed,
    RateLimited,
    Canceled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, JobStatus::Running)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::RateLimited => "rate_limited",
            JobStatus::Canceled => "canceled",
        }
    }
}

/// Partial update applied to a [`ScanJob`]. `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub progress: Option<u8>,
    pub message: Option<String>,
    pub cancel_requested: Option<bool>,
    pub finished_at: Option<DateTime<Utc>>,
    pub rate_limit_reset_at: Option<DateTime<Utc>>,
    pub rate_limit: Option<RateLimitSnapshot>,
}

impl JobUpdate {
    pub fn progress(progress: u8, message: impl Into<String>) -> Self {
        Self {
            progress: Some(progress.min(100)),
            message: Some(message.into()),
            ..Self::default()
        }
    }

    /// Terminal transition stamped with the finish time.
    pub fn finish(status: JobStatus, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: Some(message.into()),
            finished_at: Some(Utc::now()),
            ..Self::default()
        }
    }

    pub fn with_rate_limit(mut self, snapshot: Option<RateLimitSnapshot>) -> Self {
        self.rate_limit = snapshot;
        self
    }

    pub fn apply(self, job: &mut ScanJob) {
        if let Some(status) = self.status {
            job.status = status;
        }
        if let Some(progress) = self.progress {
            job.progress = progress;
        }
        if let Some(message) = self.message {
            job.message = Some(message);
        }
        if let Some(flag) = self.cancel_requested {
            job.cancel_requested = flag;
        }
        if let Some(at) = self.finished_at {
            job.finished_at = Some(at);
        }
        if let Some(at) = self.rate_limit_reset_at {
            job.rate_limit_reset_at = Some(at);
        }
        if let Some(snapshot) = self.rate_limit {
            job.rate_limit = Some(snapshot);
        }
        job.updated_at = Utc::now();
    }
}

/// Rate-limit headers as seen on a single API response.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitSnapshot {
    pub remaining: Option<u32>,
    pub reset_at: Option<DateTime<Utc>>,
}

/// Scan configuration as accepted from callers. Every field is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanParams {
    pub min_score: Option<u32>,
    pub max_repos: Option<usize>,
    pub repo_pages: Option<u32>,
    pub code_pages: Option<u32>,
    pub language: Option<String>,
    pub pushed_after: Option<String>,
    pub stars_min: Option<u32>,
    pub custom_repo_queries: Option<Vec<String>>,
    pub custom_code_queries: Option<Vec<String>>,
    pub fetch_metadata: Option<bool>,
    pub clone_repos: Option<bool>,
}

impl ScanParams {
    pub fn resolve(self) -> ResolvedScanParams {
        ResolvedScanParams {
            min_score: self.min_score.unwrap_or(DEFAULT_MIN_SCORE),
            max_repos: self.max_repos.unwrap_or(DEFAULT_MAX_REPOS),
            repo_pages: self.repo_pages.unwrap_or(DEFAULT_REPO_PAGES),
            code_pages: self.code_pages.unwrap_or(DEFAULT_CODE_PAGES),
            language: non_blank(self.language),
            pushed_after: non_blank(self.pushed_after),
            stars_min: self.stars_min.filter(|s| *s > 0),
            custom_repo_queries: clean_queries(self.custom_repo_queries),
            custom_code_queries: clean_queries(self.custom_code_queries),
            fetch_metadata: self.fetch_metadata.unwrap_or(false),
            clone_repos: self.clone_repos.unwrap_or(false),
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn clean_queries(queries: Option<Vec<String>>) -> Vec<String> {
    queries
        .unwrap_or_default()
        .into_iter()
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty())
        .collect()
}

/// Scan configuration with every default filled in; stored on the job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedScanParams {
    pub min_score: u32,
    pub max_repos: usize,
    pub repo_pages: u32,
    pub code_pages: u32,
    pub language: Option<String>,
    pub pushed_after: Option<String>,
    pub stars_min: Option<u32>,
    pub custom_repo_queries: Vec<String>,
    pub custom_code_queries: Vec<String>,
    pub fetch_metadata: bool,
    pub clone_repos: bool,
}

impl Default for ResolvedScanParams {
    fn default() -> Self {
        ScanParams::default().resolve()
    }
}

/// Issue/PR/contributor counts fetched during enrichment. `None` means unknown.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RepoMetadata {
    pub open_issues: Option<u64>,
    pub total_issues: Option<u64>,
    pub open_pull_requests: Option<u64>,
    pub total_pull_requests: Option<u64>,
    pub contributors: Option<u64>,
}

impl RepoMetadata {
    pub fn is_empty(&self) -> bool {
        self == &RepoMetadata::default()
    }
}

/// A repository that met the score threshold, upserted by `repo_url`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoCandidate {
    pub id: Uuid,
    pub repo_url: String,
    pub full_name: String,
    pub score: u32,
    pub stars: u64,
    pub forks: Option<u64>,
    pub language: Option<String>,
    pub description: Option<String>,
    pub pushed_at: Option<DateTime<Utc>>,
    pub evidence_summary: Vec<String>,
    #[serde(flatten)]
    pub metadata: RepoMetadata,
    pub cloned_at: Option<DateTime<Utc>>,
    pub clone_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RepoCandidate {
    /// Split `owner/name` into its parts.
    pub fn owner_and_name(&self) -> Option<(&str, &str)> {
        split_full_name(&self.full_name)
    }

    pub fn missing_metadata(&self) -> bool {
        self.forks.is_none()
            || self.metadata.open_issues.is_none()
            || self.metadata.contributors.is_none()
            || self.language.is_none()
    }
}

pub fn split_full_name(full_name: &str) -> Option<(&str, &str)> {
    let (owner, name) = full_name.split_once('/')?;
    if owner.is_empty() || name.is_empty() || name.contains('/') {
        return None;
    }
    Some((owner, name))
}

/// Start-scan response
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartScanResponse {
    pub job_id: Uuid,
    pub params: ResolvedScanParams,
}

/// Stop-scan request. Without a job id the running job is stopped.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopScanRequest {
    pub job_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StopScanResponse {
    pub success: bool,
    pub job_id: Uuid,
}

/// Latest job plus store-wide counters.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanStatusResponse {
    /// Job status, or `idle` when no scan has ever run
    pub status: String,
    pub progress: u8,
    pub message: Option<String>,
    pub job_id: Option<Uuid>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub rate_limit_reset_at: Option<DateTime<Utc>>,
    pub rate_limit: Option<RateLimitSnapshot>,
    pub total_count: usize,
    pub has_token: bool,
}

/// Query string for listing and exporting results
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultsQuery {
    pub page: Option<usize>,
    pub limit: Option<usize>,
    pub min_score: Option<u32>,
    pub stars_min: Option<u64>,
    pub pushed_after: Option<String>,
    pub language: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoCandidateView {
    #[serde(flatten)]
    pub candidate: RepoCandidate,
    pub evidence_count: usize,
}

impl From<RepoCandidate> for RepoCandidateView {
    fn from(candidate: RepoCandidate) -> Self {
        let evidence_count = candidate.evidence_summary.len();
        Self {
            candidate,
            evidence_count,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: usize,
    pub limit: usize,
    pub total: usize,
    pub total_pages: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResultsResponse {
    pub results: Vec<RepoCandidateView>,
    pub pagination: Pagination,
}

/// Clone a single repository
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloneRequest {
    pub repo_url: String,
    pub full_name: String,
}

/// Clone several persisted candidates, identified by repository URL
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloneBatchRequest {
    pub repo_urls: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CloneOutcome {
    pub repo: String,
    pub success: bool,
    pub path: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackfillReport {
    pub message: String,
    pub processed: usize,
    pub errors: usize,
    pub total: usize,
    pub remaining: usize,
}

/// Body of the 409 returned while another scan runs
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanConflict {
    pub error: String,
    pub job_id: Uuid,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CronScanResponse {
    pub message: String,
    pub job_id: Uuid,
}

#[derive(Debug, Clone, Serialize)]
pub struct CloneResponse {
    pub success: bool,
    pub message: String,
    pub path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CloneBatchResponse {
    pub success: bool,
    pub message: String,
    pub results: Vec<CloneOutcome>,
}
