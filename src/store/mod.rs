//! Durable state: scan jobs and the candidates that met a scan's threshold.

pub mod json;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{JobUpdate, RepoCandidate, ResolvedScanParams, ScanJob};

pub use json::JsonStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("A scan is already running ({job_id})")]
    AlreadyRunning { job_id: Uuid },
    #[error("Scan job {0} not found")]
    JobNotFound(Uuid),
    #[error("Scan job {0} has already finished")]
    JobFinished(Uuid),
    #[error("Candidate {0} not found")]
    CandidateNotFound(String),
    #[error("Store I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("Store serialization failed: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Filter for listing persisted candidates. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct CandidateFilter {
    pub min_score: Option<u32>,
    pub stars_min: Option<u64>,
    pub pushed_after: Option<DateTime<Utc>>,
    /// Case-insensitive substring of the primary language
    pub language: Option<String>,
}

impl CandidateFilter {
    pub fn matches(&self, candidate: &RepoCandidate) -> bool {
        if let Some(min) = self.min_score {
            if candidate.score < min {
                return false;
            }
        }
        if let Some(min) = self.stars_min {
            if candidate.stars < min {
                return false;
            }
        }
        if let Some(after) = self.pushed_after {
            match candidate.pushed_at {
                Some(pushed) if pushed >= after => {}
                _ => return false,
            }
        }
        if let Some(language) = &self.language {
            let needle = language.to_lowercase();
            match &candidate.language {
                Some(lang) if lang.to_lowercase().contains(&needle) => {}
                _ => return false,
            }
        }
        true
    }
}

/// 1-based page of a listing.
#[derive(Debug, Clone, Copy)]
pub struct PageRequest {
    pub page: usize,
    pub limit: usize,
}

/// The contract the scanner and handlers depend on.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Create a running job, atomically refusing while another job runs.
    async fn create_job(&self, params: ResolvedScanParams) -> Result<ScanJob, StoreError>;

    async fn get_job(&self, id: Uuid) -> Result<Option<ScanJob>, StoreError>;

    /// Apply a partial update. Status changes on a finished job are refused.
    async fn update_job(&self, id: Uuid, update: JobUpdate) -> Result<ScanJob, StoreError>;

    async fn find_running_job(&self) -> Result<Option<ScanJob>, StoreError>;

    /// Most recently started job.
    async fn latest_job(&self) -> Result<Option<ScanJob>, StoreError>;

    /// Insert or update by `repo_url`.
    async fn upsert_candidate(&self, candidate: RepoCandidate)
        -> Result<RepoCandidate, StoreError>;

    async fn get_candidate(&self, repo_url: &str) -> Result<Option<RepoCandidate>, StoreError>;

    /// Matching candidates sorted by score then stars (both descending), and
    /// the total number of matches before paging.
    async fn list_candidates(
        &self,
        filter: &CandidateFilter,
        page: Option<PageRequest>,
    ) -> Result<(Vec<RepoCandidate>, usize), StoreError>;

    /// Oldest-updated candidates lacking enrichment data.
    async fn candidates_missing_metadata(
        &self,
        limit: usize,
    ) -> Result<Vec<RepoCandidate>, StoreError>;

    async fn count_candidates(&self) -> Result<usize, StoreError>;

    async fn record_clone(&self, repo_url: &str, clone_path: &str) -> Result<(), StoreError>;
}
