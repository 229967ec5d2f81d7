//! The scan state machine.
//!
//! A job starts `running` and ends in exactly one of `completed`, `failed`,
//! `rate_limited` or `canceled`. Phases run strictly in sequence:
//!
//! 1. repository search (progress 0-50), which originates candidates
//! 2. code search (50-90), which only adds evidence to known candidates
//! 3. optional metadata enrichment
//! 4. persistence of candidates meeting `min_score`, best first
//! 5. optional shallow clone of what was saved
//!
//! The cancel flag on the job record is polled before every remote call and
//! every store write. Nothing is persisted before phase 4, so a rate limit or
//! failure in the search phases leaves the store untouched.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use super::enrich::fetch_metadata;
use super::evidence::{code_evidence, rank, tool_mention, CandidateRepo};
use super::queries::{code_queries, repo_queries};
use super::registry::TaskRegistry;
use crate::config::PacingConfig;
use crate::git::Cloner;
use crate::github::{GitHubError, RepoItem, SearchApi, PER_PAGE};
use crate::models::{
    split_full_name, JobStatus, JobUpdate, RateLimitSnapshot, ResolvedScanParams, ScanJob,
};
use crate::store::{JobStore, StoreError};

/// Why a scan stopped before completing.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("Rate limit exceeded. Resets at {}", .0.to_rfc3339())]
    RateLimited(DateTime<Utc>),
    #[error("Scan canceled")]
    Canceled,
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

impl From<StoreError> for ScanError {
    fn from(e: StoreError) -> Self {
        ScanError::Failed(e.into())
    }
}

/// Per-run state: the candidate map in discovery order and what the scan has
/// observed so far.
pub struct ScanContext {
    candidates: Vec<CandidateRepo>,
    index: HashMap<String, usize>,
    max_repos: usize,
    progress: u8,
    pub rate_limit: Option<RateLimitSnapshot>,
    pub code_evidence_added: usize,
}

impl ScanContext {
    pub fn new(max_repos: usize) -> Self {
        Self {
            candidates: Vec::new(),
            index: HashMap::new(),
            max_repos,
            progress: 0,
            rate_limit: None,
            code_evidence_added: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn get(&self, repo_url: &str) -> Option<&CandidateRepo> {
        self.index.get(repo_url).map(|&i| &self.candidates[i])
    }

    fn get_mut(&mut self, repo_url: &str) -> Option<&mut CandidateRepo> {
        let i = *self.index.get(repo_url)?;
        self.candidates.get_mut(i)
    }

    fn observe(&mut self, snapshot: RateLimitSnapshot) {
        self.rate_limit = Some(snapshot);
    }

    /// Merge a repository-search hit. New repositories beyond `max_repos`
    /// are dropped; known ones always receive the evidence.
    pub fn merge_repo_hit(&mut self, item: &RepoItem, query: &str) {
        let evidence = tool_mention(query);
        if let Some(existing) = self.get_mut(&item.html_url) {
            existing.add_evidence(&evidence);
            return;
        }
        if self.candidates.len() >= self.max_repos {
            return;
        }
        let mut candidate = CandidateRepo::from_repo_item(item);
        candidate.add_evidence(&evidence);
        self.index
            .insert(candidate.repo_url.clone(), self.candidates.len());
        self.candidates.push(candidate);
    }

    /// Candidates at or above `min_score`, best first.
    pub fn qualifying(&self, min_score: u32) -> Vec<CandidateRepo> {
        let mut valid: Vec<CandidateRepo> = self
            .candidates
            .iter()
            .filter(|c| c.score() >= min_score)
            .cloned()
            .collect();
        rank(&mut valid);
        valid
    }

    /// Progress never moves backwards within a run.
    fn advance(&mut self, progress: u8) -> u8 {
        self.progress = self.progress.max(progress.min(100));
        self.progress
    }
}

/// Runs scans against a search API and a job store.
pub struct Scanner {
    api: Arc<dyn SearchApi>,
    store: Arc<dyn JobStore>,
    pacing: PacingConfig,
    cloner: Cloner,
}

impl Scanner {
    pub fn new(
        api: Arc<dyn SearchApi>,
        store: Arc<dyn JobStore>,
        pacing: PacingConfig,
        cloner: Cloner,
    ) -> Self {
        Self {
            api,
            store,
            pacing,
            cloner,
        }
    }

    /// Create a job and run it in the background. Fails with
    /// [`StoreError::AlreadyRunning`] while another scan is running; the
    /// returned job is in its initial `running` state.
    pub async fn start(
        self: &Arc<Self>,
        registry: &TaskRegistry,
        params: ResolvedScanParams,
    ) -> Result<ScanJob, StoreError> {
        let job = self.store.create_job(params.clone()).await?;
        let job_id = job.id;
        let scanner = Arc::clone(self);
        registry.spawn(job_id, async move {
            scanner.run(job_id, params).await;
        });
        tracing::info!("Started scan {job_id}");
        Ok(job)
    }

    /// Ask a running job to stop at its next check point. Finished jobs are
    /// returned unchanged.
    pub async fn stop(&self, job_id: Uuid) -> Result<ScanJob, StoreError> {
        let job = self
            .store
            .get_job(job_id)
            .await?
            .ok_or(StoreError::JobNotFound(job_id))?;
        if job.status != JobStatus::Running {
            return Ok(job);
        }
        tracing::info!("Cancel requested for scan {job_id}");
        self.store
            .update_job(
                job_id,
                JobUpdate {
                    cancel_requested: Some(true),
                    ..JobUpdate::default()
                },
            )
            .await
    }

    /// Drive one job to its terminal state.
    pub async fn run(&self, job_id: Uuid, params: ResolvedScanParams) {
        let mut ctx = ScanContext::new(params.max_repos);
        let outcome = self.execute(job_id, &params, &mut ctx).await;

        let update = match outcome {
            Ok(summary) => {
                tracing::info!("Scan {job_id} completed: {summary}");
                JobUpdate {
                    progress: Some(100),
                    ..JobUpdate::finish(JobStatus::Completed, summary)
                }
            }
            Err(ScanError::RateLimited(reset_at)) => {
                tracing::warn!("Scan {job_id} hit the rate limit; resets at {reset_at}");
                JobUpdate {
                    rate_limit_reset_at: Some(reset_at),
                    ..JobUpdate::finish(
                        JobStatus::RateLimited,
                        ScanError::RateLimited(reset_at).to_string(),
                    )
                }
            }
            Err(ScanError::Canceled) => {
                tracing::info!("Scan {job_id} canceled");
                JobUpdate::finish(JobStatus::Canceled, "Scan canceled")
            }
            Err(ScanError::Failed(e)) => {
                tracing::error!("Scan {job_id} failed: {e:#}");
                JobUpdate::finish(JobStatus::Failed, format!("{e:#}"))
            }
        };

        if let Err(e) = self
            .store
            .update_job(job_id, update.with_rate_limit(ctx.rate_limit))
            .await
        {
            tracing::error!("Failed to record final state of scan {job_id}: {e}");
        }
    }

    async fn execute(
        &self,
        job_id: Uuid,
        params: &ResolvedScanParams,
        ctx: &mut ScanContext,
    ) -> Result<String, ScanError> {
        self.search_repositories(job_id, params, ctx).await?;
        self.report(
            job_id,
            ctx,
            50,
            format!("Found {} candidate repositories", ctx.len()),
        )
        .await?;

        if params.code_pages > 0 {
            self.search_code(job_id, params, ctx).await?;
        }

        if params.fetch_metadata {
            self.enrich(job_id, ctx).await?;
        }

        let saved = self.persist(job_id, params, ctx).await?;
        let mut summary = format!("Completed: {} repositories saved", saved.len());

        if params.clone_repos && !saved.is_empty() {
            let cloned = self.clone_saved(job_id, ctx, &saved).await?;
            summary.push_str(&format!(", {cloned} cloned"));
        }

        Ok(summary)
    }

    /// Phase 1: repository search; the only phase that creates candidates.
    async fn search_repositories(
        &self,
        job_id: Uuid,
        params: &ResolvedScanParams,
        ctx: &mut ScanContext,
    ) -> Result<(), ScanError> {
        let queries = repo_queries(params);
        let total = queries.len();

        for (index, query) in queries.iter().enumerate() {
            self.checkpoint(job_id).await?;
            self.report(
                job_id,
                ctx,
                scaled(index, total, 0, 50),
                format!("Searching repositories ({}/{total})...", index + 1),
            )
            .await?;

            for page in 1..=params.repo_pages {
                self.checkpoint(job_id).await?;
                match self.api.search_repositories(query, page, PER_PAGE).await {
                    Ok(resp) => {
                        ctx.observe(resp.rate_limit);
                        let items = resp.data.items;
                        for item in &items {
                            ctx.merge_repo_hit(item, query);
                        }
                        if items.len() < PER_PAGE as usize {
                            break;
                        }
                    }
                    Err(GitHubError::RateLimited { reset_at }) => {
                        return Err(ScanError::RateLimited(reset_at));
                    }
                    Err(e) => {
                        tracing::error!("Error searching repos with query \"{query}\": {e}");
                    }
                }
            }

            tokio::time::sleep(self.pacing.query_delay()).await;
        }

        Ok(())
    }

    /// Phase 2: code search. Hits for repositories not already in the
    /// candidate map are ignored.
    async fn search_code(
        &self,
        job_id: Uuid,
        params: &ResolvedScanParams,
        ctx: &mut ScanContext,
    ) -> Result<(), ScanError> {
        let queries = code_queries(params);
        let total = queries.len();

        for (index, query) in queries.iter().enumerate() {
            self.checkpoint(job_id).await?;
            self.report(
                job_id,
                ctx,
                scaled(index, total, 50, 40),
                format!("Searching code evidence ({}/{total})...", index + 1),
            )
            .await?;

            for page in 1..=params.code_pages {
                self.checkpoint(job_id).await?;
                match self.api.search_code(query, page, PER_PAGE).await {
                    Ok(resp) => {
                        ctx.observe(resp.rate_limit);
                        let items = resp.data.items;
                        for item in &items {
                            let Some(evidence) = code_evidence(item, query) else {
                                continue;
                            };
                            let added = ctx
                                .get_mut(&item.repo_url())
                                .is_some_and(|candidate| candidate.add_evidence(&evidence));
                            if added {
                                ctx.code_evidence_added += 1;
                            }
                        }
                        if items.len() < PER_PAGE as usize {
                            break;
                        }
                    }
                    Err(GitHubError::RateLimited { reset_at }) => {
                        return Err(ScanError::RateLimited(reset_at));
                    }
                    Err(e) => {
                        tracing::error!("Error searching code with query \"{query}\": {e}");
                    }
                }
            }

            tokio::time::sleep(self.pacing.query_delay()).await;
        }

        tracing::debug!(
            "Code search added {} pieces of evidence",
            ctx.code_evidence_added
        );
        Ok(())
    }

    /// Phase 3: counts for every candidate, one repository at a time. A rate
    /// limit ends the phase early; the scan still persists what it has.
    async fn enrich(&self, job_id: Uuid, ctx: &mut ScanContext) -> Result<(), ScanError> {
        self.report(job_id, ctx, 85, "Fetching repository metadata...")
            .await?;

        let total = ctx.len();
        let mut fetched = 0;

        for i in 0..total {
            self.checkpoint(job_id).await?;

            let full_name = ctx.candidates[i].full_name.clone();
            let Some((owner, name)) = split_full_name(&full_name) else {
                continue;
            };

            match fetch_metadata(self.api.as_ref(), owner, name).await {
                Ok(enrichment) => {
                    ctx.candidates[i].metadata = enrichment.metadata;
                    if let Some(snapshot) = enrichment.rate_limit {
                        ctx.observe(snapshot);
                    }
                }
                Err(reset_at) => {
                    tracing::warn!(
                        "Rate limited while fetching metadata (resets at {reset_at}); \
                         skipping metadata for the remaining repositories"
                    );
                    break;
                }
            }

            fetched += 1;
            if fetched % 5 == 0 {
                self.report(
                    job_id,
                    ctx,
                    scaled(fetched, total, 85, 5),
                    format!("Fetched metadata for {fetched} repositories..."),
                )
                .await?;
            }

            tokio::time::sleep(self.pacing.metadata_delay()).await;
        }

        Ok(())
    }

    /// Phase 4: upsert qualifying candidates. A failed upsert is logged and
    /// skipped. Returns the URLs saved, in ranked order.
    async fn persist(
        &self,
        job_id: Uuid,
        params: &ResolvedScanParams,
        ctx: &mut ScanContext,
    ) -> Result<Vec<String>, ScanError> {
        self.report(job_id, ctx, 90, "Saving results...").await?;

        let valid = ctx.qualifying(params.min_score);
        let mut saved = Vec::with_capacity(valid.len());

        for candidate in &valid {
            self.checkpoint(job_id).await?;
            match self
                .store
                .upsert_candidate(candidate.to_persisted(Utc::now()))
                .await
            {
                Ok(_) => saved.push(candidate.repo_url.clone()),
                Err(e) => {
                    tracing::error!("Error saving candidate {}: {e}", candidate.repo_url);
                }
            }
        }

        Ok(saved)
    }

    /// Phase 5: shallow clone of saved candidates. Returns how many succeeded.
    async fn clone_saved(
        &self,
        job_id: Uuid,
        ctx: &mut ScanContext,
        saved: &[String],
    ) -> Result<usize, ScanError> {
        self.report(job_id, ctx, 95, "Cloning repositories...").await?;

        let mut cloned = 0;
        for (i, repo_url) in saved.iter().enumerate() {
            self.checkpoint(job_id).await?;
            let Some(full_name) = ctx.get(repo_url).map(|c| c.full_name.clone()) else {
                continue;
            };

            match self.cloner.clone_repo(repo_url, &full_name).await {
                Ok(repo) => {
                    let path = repo.path.to_string_lossy().to_string();
                    if let Err(e) = self.store.record_clone(repo_url, &path).await {
                        tracing::warn!("Cloned {full_name} but could not record it: {e}");
                    }
                    cloned += 1;
                }
                Err(e) => tracing::warn!("Failed to clone {full_name}: {e:#}"),
            }

            if i + 1 < saved.len() {
                tokio::time::sleep(self.pacing.clone_delay()).await;
            }
        }

        Ok(cloned)
    }

    async fn checkpoint(&self, job_id: Uuid) -> Result<(), ScanError> {
        match self.store.get_job(job_id).await? {
            Some(job) if job.cancel_requested => Err(ScanError::Canceled),
            Some(_) => Ok(()),
            None => Err(ScanError::Failed(anyhow::anyhow!(
                "Scan job {job_id} no longer exists"
            ))),
        }
    }

    async fn report(
        &self,
        job_id: Uuid,
        ctx: &mut ScanContext,
        progress: u8,
        message: impl Into<String>,
    ) -> Result<(), ScanError> {
        let progress = ctx.advance(progress);
        self.store
            .update_job(
                job_id,
                JobUpdate::progress(progress, message).with_rate_limit(ctx.rate_limit),
            )
            .await?;
        Ok(())
    }
}

/// `start + span * done / total`, floored.
fn scaled(done: usize, total: usize, start: u8, span: u8) -> u8 {
    if total == 0 {
        return start;
    }
    let offset = (done.min(total) * span as usize) / total;
    start + offset as u8
}
