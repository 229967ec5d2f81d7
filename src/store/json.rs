use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use super::{CandidateFilter, JobStore, PageRequest, StoreError};
use crate::models::{JobStatus, JobUpdate, RepoCandidate, ResolvedScanParams, ScanJob};

const RESTART_MESSAGE: &str = "Interrupted by process restart";

/// Jobs and candidates held in memory and written through to JSON files.
///
/// Writes go to disk first. Memory only changes once the file write
/// succeeded, so a failed write leaves both sides as they were.
pub struct JsonStore {
    jobs: RwLock<Vec<ScanJob>>,
    candidates: RwLock<BTreeMap<String, RepoCandidate>>,
    jobs_path: Option<PathBuf>,
    candidates_path: Option<PathBuf>,
}

impl JsonStore {
    /// Load from disk (or start empty). Jobs left `running` by a previous
    /// process have no worker anymore and are marked failed.
    pub fn open(jobs_path: &Path, candidates_path: &Path) -> anyhow::Result<Self> {
        let mut jobs: Vec<ScanJob> = load(jobs_path)?;
        let candidates: Vec<RepoCandidate> = load(candidates_path)?;

        let mut orphaned = 0;
        for job in jobs.iter_mut().filter(|j| j.status == JobStatus::Running) {
            JobUpdate::finish(JobStatus::Failed, RESTART_MESSAGE).apply(job);
            orphaned += 1;
        }
        if orphaned > 0 {
            tracing::warn!("Marked {orphaned} orphaned scan job(s) as failed");
            write_atomic(jobs_path, &jobs)?;
        }

        Ok(Self {
            jobs: RwLock::new(jobs),
            candidates: RwLock::new(
                candidates
                    .into_iter()
                    .map(|c| (c.repo_url.clone(), c))
                    .collect(),
            ),
            jobs_path: Some(jobs_path.to_path_buf()),
            candidates_path: Some(candidates_path.to_path_buf()),
        })
    }

    /// A store that never touches disk.
    pub fn in_memory() -> Self {
        Self {
            jobs: RwLock::new(Vec::new()),
            candidates: RwLock::new(BTreeMap::new()),
            jobs_path: None,
            candidates_path: None,
        }
    }

    fn persist_jobs(&self, jobs: &[ScanJob]) -> Result<(), StoreError> {
        match &self.jobs_path {
            Some(path) => write_atomic(path, &jobs),
            None => Ok(()),
        }
    }

    fn persist_candidates(
        &self,
        candidates: &BTreeMap<String, RepoCandidate>,
    ) -> Result<(), StoreError> {
        match &self.candidates_path {
            Some(path) => {
                let list: Vec<&RepoCandidate> = candidates.values().collect();
                write_atomic(path, &list)
            }
            None => Ok(()),
        }
    }
}

fn load<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let data = std::fs::read_to_string(path)?;
    match serde_json::from_str(&data) {
        Ok(items) => Ok(items),
        Err(e) => {
            tracing::warn!("Ignoring unreadable store file {}: {e}", path.display());
            Ok(Vec::new())
        }
    }
}

/// Atomic write via temp file + rename.
fn write_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StoreError> {
    let data = serde_json::to_string_pretty(value)?;
    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, data)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

fn sort_ranked(candidates: &mut [RepoCandidate]) {
    candidates.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then(b.stars.cmp(&a.stars))
            .then_with(|| a.repo_url.cmp(&b.repo_url))
    });
}

#[async_trait]
impl JobStore for JsonStore {
    async fn create_job(&self, params: ResolvedScanParams) -> Result<ScanJob, StoreError> {
        let mut jobs = self.jobs.write();
        if let Some(running) = jobs.iter().find(|j| j.status == JobStatus::Running) {
            return Err(StoreError::AlreadyRunning { job_id: running.id });
        }
        let job = ScanJob::new(params);
        let mut next = jobs.clone();
        next.push(job.clone());
        self.persist_jobs(&next)?;
        *jobs = next;
        Ok(job)
    }

    async fn get_job(&self, id: Uuid) -> Result<Option<ScanJob>, StoreError> {
        Ok(self.jobs.read().iter().find(|j| j.id == id).cloned())
    }

    async fn update_job(&self, id: Uuid, update: JobUpdate) -> Result<ScanJob, StoreError> {
        let mut jobs = self.jobs.write();
        let index = jobs
            .iter()
            .position(|j| j.id == id)
            .ok_or(StoreError::JobNotFound(id))?;
        if jobs[index].status.is_terminal() && update.status.is_some() {
            return Err(StoreError::JobFinished(id));
        }
        let mut next = jobs.clone();
        update.apply(&mut next[index]);
        let updated = next[index].clone();
        self.persist_jobs(&next)?;
        *jobs = next;
        Ok(updated)
    }

    async fn find_running_job(&self) -> Result<Option<ScanJob>, StoreError> {
        Ok(self
            .jobs
            .read()
            .iter()
            .find(|j| j.status == JobStatus::Running)
            .cloned())
    }

    async fn latest_job(&self) -> Result<Option<ScanJob>, StoreError> {
        Ok(self
            .jobs
            .read()
            .iter()
            .max_by_key(|j| j.started_at)
            .cloned())
    }

    async fn upsert_candidate(
        &self,
        mut candidate: RepoCandidate,
    ) -> Result<RepoCandidate, StoreError> {
        let mut candidates = self.candidates.write();
        if let Some(existing) = candidates.get(&candidate.repo_url) {
            candidate.id = existing.id;
            candidate.created_at = existing.created_at;
            candidate.cloned_at = candidate.cloned_at.or(existing.cloned_at);
            candidate.clone_path = candidate.clone_path.or_else(|| existing.clone_path.clone());

            // Counts this scan didn't fetch keep their previous values
            let old = &existing.metadata;
            let new = &mut candidate.metadata;
            new.open_issues = new.open_issues.or(old.open_issues);
            new.total_issues = new.total_issues.or(old.total_issues);
            new.open_pull_requests = new.open_pull_requests.or(old.open_pull_requests);
            new.total_pull_requests = new.total_pull_requests.or(old.total_pull_requests);
            new.contributors = new.contributors.or(old.contributors);
        }
        candidate.updated_at = Utc::now();
        let mut next = candidates.clone();
        next.insert(candidate.repo_url.clone(), candidate.clone());
        self.persist_candidates(&next)?;
        *candidates = next;
        Ok(candidate)
    }

    async fn get_candidate(&self, repo_url: &str) -> Result<Option<RepoCandidate>, StoreError> {
        Ok(self.candidates.read().get(repo_url).cloned())
    }

    async fn list_candidates(
        &self,
        filter: &CandidateFilter,
        page: Option<PageRequest>,
    ) -> Result<(Vec<RepoCandidate>, usize), StoreError> {
        let mut matching: Vec<RepoCandidate> = self
            .candidates
            .read()
            .values()
            .filter(|c| filter.matches(c))
            .cloned()
            .collect();
        sort_ranked(&mut matching);
        let total = matching.len();

        let results = match page {
            Some(PageRequest { page, limit }) => matching
                .into_iter()
                .skip(page.saturating_sub(1) * limit)
                .take(limit)
                .collect(),
            None => matching,
        };
        Ok((results, total))
    }

    async fn candidates_missing_metadata(
        &self,
        limit: usize,
    ) -> Result<Vec<RepoCandidate>, StoreError> {
        let mut missing: Vec<RepoCandidate> = self
            .candidates
            .read()
            .values()
            .filter(|c| c.missing_metadata())
            .cloned()
            .collect();
        missing.sort_by_key(|c| c.updated_at);
        missing.truncate(limit);
        Ok(missing)
    }

    async fn count_candidates(&self) -> Result<usize, StoreError> {
        Ok(self.candidates.read().len())
    }

    async fn record_clone(&self, repo_url: &str, clone_path: &str) -> Result<(), StoreError> {
        let mut candidates = self.candidates.write();
        let mut next = candidates.clone();
        let candidate = next
            .get_mut(repo_url)
            .ok_or_else(|| StoreError::CandidateNotFound(repo_url.to_string()))?;
        let now = Utc::now();
        candidate.cloned_at = Some(now);
        candidate.clone_path = Some(clone_path.to_string());
        candidate.updated_at = now;
        self.persist_candidates(&next)?;
        *candidates = next;
        Ok(())
    }
}
