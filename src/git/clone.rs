use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Where a clone ended up.
#[derive(Debug, Clone)]
pub struct ClonedRepo {
    pub path: PathBuf,
    /// The directory already existed, nothing was fetched
    pub already_present: bool,
}

/// Shallow-clones discovered repositories under one directory.
#[derive(Debug, Clone)]
pub struct Cloner {
    repos_dir: PathBuf,
    timeout: Duration,
}

impl Cloner {
    pub fn new(repos_dir: PathBuf, timeout: Duration) -> Self {
        Self { repos_dir, timeout }
    }

    /// Directory a repository clones into: `owner/name` becomes `owner_name`.
    pub fn clone_path(&self, full_name: &str) -> PathBuf {
        self.repos_dir.join(full_name.replace('/', "_"))
    }

    /// Clone `url` at depth 1, bounded by the configured timeout. A partial
    /// checkout is removed on failure. An existing directory is reused only
    /// if it holds a checked-out commit; anything else there is replaced.
    pub async fn clone_repo(&self, url: &str, full_name: &str) -> Result<ClonedRepo> {
        validate_clone_url(url)?;
        let target = self.clone_path(full_name);
        if target.exists() {
            if has_checkout(&target) {
                return Ok(ClonedRepo {
                    path: target,
                    already_present: true,
                });
            }
            tracing::warn!("Removing incomplete checkout at {}", target.display());
            std::fs::remove_dir_all(&target)
                .with_context(|| format!("Failed to remove {}", target.display()))?;
        }
        std::fs::create_dir_all(&self.repos_dir)
            .with_context(|| format!("Failed to create {}", self.repos_dir.display()))?;

        let url_owned = url.to_string();
        let target_clone = target.clone();
        let result = tokio::time::timeout(
            self.timeout,
            tokio::task::spawn_blocking(move || shallow_clone(&url_owned, &target_clone)),
        )
        .await;

        match result {
            Ok(Ok(Ok(()))) => Ok(ClonedRepo {
                path: target,
                already_present: false,
            }),
            Ok(Ok(Err(e))) => {
                cleanup(&target);
                Err(e)
            }
            Ok(Err(e)) => {
                cleanup(&target);
                anyhow::bail!("Clone task failed: {e}");
            }
            Err(_) => {
                cleanup(&target);
                anyhow::bail!("Clone of {url} timed out after {}s", self.timeout.as_secs());
            }
        }
    }
}

/// Only https:// repository URLs are cloned.
pub fn validate_clone_url(url: &str) -> Result<()> {
    if !url.starts_with("https://") {
        anyhow::bail!("Only https:// repository URLs can be cloned: {url}");
    }
    if url.contains(char::is_whitespace) {
        anyhow::bail!("Repository URL must not contain whitespace: {url}");
    }
    Ok(())
}

fn shallow_clone(url: &str, target: &Path) -> Result<()> {
    tracing::info!("Cloning {} into {}", url, target.display());
    let mut fetch = git2::FetchOptions::new();
    fetch.depth(1);
    git2::build::RepoBuilder::new()
        .fetch_options(fetch)
        .clone(url, target)
        .with_context(|| format!("Failed to clone {url}"))?;
    tracing::info!("Clone complete: {}", target.display());
    Ok(())
}

/// A repository whose HEAD resolves to a commit. An interrupted clone has
/// an unborn HEAD or no repository at all.
fn has_checkout(target: &Path) -> bool {
    let Ok(repo) = git2::Repository::open(target) else {
        return false;
    };
    let checked_out = repo.head().and_then(|head| head.peel_to_commit()).is_ok();
    checked_out
}

fn cleanup(target: &Path) {
    if target.exists() {
        let _ = std::fs::remove_dir_all(target);
    }
}
