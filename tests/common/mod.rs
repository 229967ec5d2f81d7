//! Scripted stand-in for the GitHub API shared by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Notify;

use vibe_radar::config::{Config, PacingConfig};
use vibe_radar::git::Cloner;
use vibe_radar::github::{
    ApiResponse, CodeItem, CodeRepository, CodeSearchPage, GitHubError, ItemState, RepoDetails,
    RepoItem, RepoSearchPage, SearchApi,
};
use vibe_radar::models::{
    JobStatus, JobUpdate, RateLimitSnapshot, RepoCandidate, ResolvedScanParams, ScanJob,
};
use vibe_radar::scan::{Scanner, TaskRegistry};
use vibe_radar::store::{CandidateFilter, JobStore, JsonStore, PageRequest, StoreError};

pub fn repo(full_name: &str, stars: u64) -> RepoItem {
    RepoItem {
        full_name: full_name.to_string(),
        html_url: url(full_name),
        stargazers_count: stars,
        forks_count: 0,
        pushed_at: Some(Utc::now()),
        language: Some("TypeScript".to_string()),
        description: Some(format!("{full_name} description")),
    }
}

pub fn code_hit(full_name: &str, path: &str) -> CodeItem {
    CodeItem {
        name: path.rsplit('/').next().unwrap_or(path).to_string(),
        path: path.to_string(),
        repository: CodeRepository {
            full_name: full_name.to_string(),
        },
    }
}

pub fn url(full_name: &str) -> String {
    format!("https://github.com/{full_name}")
}

/// A git repository at `path` with one commit, as a finished clone leaves it.
pub fn git_checkout(path: &std::path::Path) {
    std::fs::create_dir_all(path).unwrap();
    let repo = git2::Repository::init(path).unwrap();
    let tree_id = repo.index().unwrap().write_tree().unwrap();
    let tree = repo.find_tree(tree_id).unwrap();
    let sig = git2::Signature::now("vibe-radar", "vibe-radar@example.com").unwrap();
    repo.commit(Some("HEAD"), &sig, &sig, "init", &tree, &[]).unwrap();
}

/// A pause the fake takes inside one search call, so tests can act while a
/// scan is mid-flight.
#[derive(Default)]
pub struct Gate {
    pub entered: Notify,
    pub release: Notify,
}

#[derive(Default)]
pub struct FakeApi {
    repo_pages: Mutex<HashMap<(String, u32), Vec<RepoItem>>>,
    code_pages: Mutex<HashMap<(String, u32), Vec<CodeItem>>>,
    rate_limited_queries: Mutex<HashSet<String>>,
    failing_queries: Mutex<HashSet<String>>,
    counts_rate_limited: Mutex<bool>,
    details: Mutex<HashMap<String, RepoDetails>>,
    gate: Mutex<Option<(String, Arc<Gate>)>>,
    pub calls: Mutex<Vec<String>>,
    pub reset_at: DateTime<Utc>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self {
            reset_at: Utc::now() + Duration::minutes(30),
            ..Self::default()
        }
    }

    pub fn repo_page(self, query: &str, page: u32, items: Vec<RepoItem>) -> Self {
        self.repo_pages
            .lock()
            .insert((query.to_string(), page), items);
        self
    }

    pub fn code_page(self, query: &str, page: u32, items: Vec<CodeItem>) -> Self {
        self.code_pages
            .lock()
            .insert((query.to_string(), page), items);
        self
    }

    pub fn rate_limit_on(self, query: &str) -> Self {
        self.rate_limited_queries.lock().insert(query.to_string());
        self
    }

    pub fn fail_on(self, query: &str) -> Self {
        self.failing_queries.lock().insert(query.to_string());
        self
    }

    pub fn rate_limit_counts(self) -> Self {
        *self.counts_rate_limited.lock() = true;
        self
    }

    pub fn details(self, full_name: &str, forks: u64, language: &str) -> Self {
        self.details.lock().insert(
            full_name.to_string(),
            RepoDetails {
                full_name: full_name.to_string(),
                html_url: url(full_name),
                stargazers_count: 1,
                forks_count: forks,
                open_issues_count: 0,
                pushed_at: None,
                language: Some(language.to_string()),
                description: None,
                default_branch: Some("main".to_string()),
            },
        );
        self
    }

    /// Block the first search for `query` until the gate is released.
    pub fn gate_on(self, query: &str) -> (Self, Arc<Gate>) {
        let gate = Arc::new(Gate::default());
        *self.gate.lock() = Some((query.to_string(), Arc::clone(&gate)));
        (self, gate)
    }

    pub fn call_count(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    fn snapshot(&self) -> RateLimitSnapshot {
        RateLimitSnapshot {
            remaining: Some(29),
            reset_at: Some(self.reset_at),
        }
    }

    fn check(&self, query: &str) -> Result<(), GitHubError> {
        if self.rate_limited_queries.lock().contains(query) {
            return Err(GitHubError::RateLimited {
                reset_at: self.reset_at,
            });
        }
        if self.failing_queries.lock().contains(query) {
            return Err(GitHubError::Api {
                status: 422,
                body: "Validation Failed".to_string(),
            });
        }
        Ok(())
    }

    async fn pass_gate(&self, query: &str) {
        let gate = {
            let mut slot = self.gate.lock();
            match slot.as_ref() {
                Some((q, _)) if q == query => slot.take().map(|(_, g)| g),
                _ => None,
            }
        };
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
    }

    fn count(&self, what: &str, value: u64) -> Result<ApiResponse<u64>, GitHubError> {
        self.calls.lock().push(format!("count:{what}"));
        if *self.counts_rate_limited.lock() {
            return Err(GitHubError::RateLimited {
                reset_at: self.reset_at,
            });
        }
        Ok(ApiResponse::new(value, self.snapshot()))
    }
}

#[async_trait]
impl SearchApi for FakeApi {
    async fn search_repositories(
        &self,
        query: &str,
        page: u32,
        _per_page: u32,
    ) -> Result<ApiResponse<RepoSearchPage>, GitHubError> {
        self.calls.lock().push(format!("repos:{query}:{page}"));
        self.pass_gate(query).await;
        self.check(query)?;
        let items = self
            .repo_pages
            .lock()
            .get(&(query.to_string(), page))
            .cloned()
            .unwrap_or_default();
        Ok(ApiResponse::new(
            RepoSearchPage {
                total_count: items.len() as u64,
                incomplete_results: false,
                items,
            },
            self.snapshot(),
        ))
    }

    async fn search_code(
        &self,
        query: &str,
        page: u32,
        _per_page: u32,
    ) -> Result<ApiResponse<CodeSearchPage>, GitHubError> {
        self.calls.lock().push(format!("code:{query}:{page}"));
        self.pass_gate(query).await;
        self.check(query)?;
        let items = self
            .code_pages
            .lock()
            .get(&(query.to_string(), page))
            .cloned()
            .unwrap_or_default();
        Ok(ApiResponse::new(
            CodeSearchPage {
                total_count: items.len() as u64,
                items,
            },
            self.snapshot(),
        ))
    }

    async fn get_repo_details(
        &self,
        owner: &str,
        name: &str,
    ) -> Result<ApiResponse<RepoDetails>, GitHubError> {
        let full_name = format!("{owner}/{name}");
        self.calls.lock().push(format!("details:{full_name}"));
        match self.details.lock().get(&full_name) {
            Some(details) => Ok(ApiResponse::new(details.clone(), self.snapshot())),
            None => Err(GitHubError::Api {
                status: 404,
                body: "Not Found".to_string(),
            }),
        }
    }

    async fn count_issues(
        &self,
        _owner: &str,
        _name: &str,
        state: ItemState,
    ) -> Result<ApiResponse<u64>, GitHubError> {
        let value = if state == ItemState::Open { 3 } else { 10 };
        self.count(&format!("issues:{}", state.as_str()), value)
    }

    async fn count_pull_requests(
        &self,
        _owner: &str,
        _name: &str,
        state: ItemState,
    ) -> Result<ApiResponse<u64>, GitHubError> {
        let value = if state == ItemState::Open { 1 } else { 4 };
        self.count(&format!("pulls:{}", state.as_str()), value)
    }

    async fn count_contributors(
        &self,
        _owner: &str,
        _name: &str,
    ) -> Result<ApiResponse<u64>, GitHubError> {
        self.count("contributors", 2)
    }
}

/// A `JobStore` that delegates to a `JsonStore` and can be told to misbehave
/// at the writes a scan makes.
pub struct HookedStore {
    pub inner: Arc<JsonStore>,
    fail_progress_after: Option<usize>,
    progress_writes: Mutex<usize>,
    cancel_on_upsert: bool,
    /// `full_name` of every candidate upserted, in call order
    pub upserts: Mutex<Vec<String>>,
}

impl HookedStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(JsonStore::in_memory()),
            fail_progress_after: None,
            progress_writes: Mutex::new(0),
            cancel_on_upsert: false,
            upserts: Mutex::new(Vec::new()),
        }
    }

    /// Progress updates beyond the first `n` fail with an I/O error.
    /// Terminal updates still go through.
    pub fn fail_progress_after(mut self, n: usize) -> Self {
        self.fail_progress_after = Some(n);
        self
    }

    /// Request a stop of the running job right before the first upsert.
    pub fn cancel_on_first_upsert(mut self) -> Self {
        self.cancel_on_upsert = true;
        self
    }
}

#[async_trait]
impl JobStore for HookedStore {
    async fn create_job(&self, params: ResolvedScanParams) -> Result<ScanJob, StoreError> {
        self.inner.create_job(params).await
    }

    async fn get_job(&self, id: uuid::Uuid) -> Result<Option<ScanJob>, StoreError> {
        self.inner.get_job(id).await
    }

    async fn update_job(&self, id: uuid::Uuid, update: JobUpdate) -> Result<ScanJob, StoreError> {
        if update.status.is_none() && update.progress.is_some() {
            let mut writes = self.progress_writes.lock();
            *writes += 1;
            if self.fail_progress_after.is_some_and(|n| *writes > n) {
                return Err(StoreError::Io(std::io::Error::other("disk full")));
            }
        }
        self.inner.update_job(id, update).await
    }

    async fn find_running_job(&self) -> Result<Option<ScanJob>, StoreError> {
        self.inner.find_running_job().await
    }

    async fn latest_job(&self) -> Result<Option<ScanJob>, StoreError> {
        self.inner.latest_job().await
    }

    async fn upsert_candidate(
        &self,
        candidate: RepoCandidate,
    ) -> Result<RepoCandidate, StoreError> {
        let first = {
            let mut upserts = self.upserts.lock();
            upserts.push(candidate.full_name.clone());
            upserts.len() == 1
        };
        if self.cancel_on_upsert && first {
            if let Some(job) = self.inner.find_running_job().await? {
                let cancel = JobUpdate {
                    cancel_requested: Some(true),
                    ..JobUpdate::default()
                };
                self.inner.update_job(job.id, cancel).await?;
            }
        }
        self.inner.upsert_candidate(candidate).await
    }

    async fn get_candidate(&self, repo_url: &str) -> Result<Option<RepoCandidate>, StoreError> {
        self.inner.get_candidate(repo_url).await
    }

    async fn list_candidates(
        &self,
        filter: &CandidateFilter,
        page: Option<PageRequest>,
    ) -> Result<(Vec<RepoCandidate>, usize), StoreError> {
        self.inner.list_candidates(filter, page).await
    }

    async fn candidates_missing_metadata(
        &self,
        limit: usize,
    ) -> Result<Vec<RepoCandidate>, StoreError> {
        self.inner.candidates_missing_metadata(limit).await
    }

    async fn count_candidates(&self) -> Result<usize, StoreError> {
        self.inner.count_candidates().await
    }

    async fn record_clone(&self, repo_url: &str, clone_path: &str) -> Result<(), StoreError> {
        self.inner.record_clone(repo_url, clone_path).await
    }
}

/// Scanner over a fake API and an in-memory store, with no pacing delays.
pub struct Harness {
    pub api: Arc<FakeApi>,
    /// The store behind the scanner, for assertions
    pub store: Arc<JsonStore>,
    pub scanner: Arc<Scanner>,
    pub registry: TaskRegistry,
    pub repos_dir: tempfile::TempDir,
}

impl Harness {
    pub fn new(api: FakeApi) -> Self {
        let store = Arc::new(JsonStore::in_memory());
        Self::build(api, store.clone(), store)
    }

    /// The scanner writes through `hooked`; `store` is its inner store.
    pub fn with_store(api: FakeApi, hooked: Arc<HookedStore>) -> Self {
        let inner = hooked.inner.clone();
        Self::build(api, inner, hooked)
    }

    fn build(api: FakeApi, store: Arc<JsonStore>, scanner_store: Arc<dyn JobStore>) -> Self {
        let api = Arc::new(api);
        let repos_dir = tempfile::tempdir().unwrap();
        let cloner = Cloner::new(
            repos_dir.path().to_path_buf(),
            std::time::Duration::from_secs(5),
        );
        let scanner = Arc::new(Scanner::new(
            api.clone(),
            scanner_store,
            PacingConfig::none(),
            cloner,
        ));
        Self {
            api,
            store,
            scanner,
            registry: TaskRegistry::new(),
            repos_dir,
        }
    }

    /// Config whose pacing matches the harness, for building `AppState`.
    pub fn config(&self) -> Config {
        Config {
            data_dir: self.repos_dir.path().to_path_buf(),
            pacing: PacingConfig::none(),
            ..Config::default()
        }
    }

    pub async fn job(&self, id: uuid::Uuid) -> ScanJob {
        self.store.get_job(id).await.unwrap().unwrap()
    }

    /// Start a scan and wait for its task to end.
    pub async fn run_to_end(&self, params: ResolvedScanParams) -> ScanJob {
        let job = self.scanner.start(&self.registry, params).await.unwrap();
        assert!(self.registry.wait(job.id).await);
        let finished = self.job(job.id).await;
        assert!(
            finished.status != JobStatus::Running,
            "job still running: {finished:?}"
        );
        finished
    }
}
