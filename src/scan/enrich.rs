//! Issue, pull request and contributor counts for a single repository.

use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::github::{ApiResponse, GitHubError, ItemState, SearchApi};
use crate::models::{BackfillReport, RateLimitSnapshot, RepoMetadata};
use crate::store::JobStore;

/// Most candidates handled by one backfill request.
pub const BACKFILL_BATCH: usize = 100;

/// Counts for one repository plus the last rate-limit headers seen.
#[derive(Debug, Clone, Default)]
pub struct Enrichment {
    pub metadata: RepoMetadata,
    pub rate_limit: Option<RateLimitSnapshot>,
}

/// Fetch the five counts concurrently. A count that fails for any reason
/// other than rate limiting is left unknown; rate limiting is returned as
/// the error since every other call will fail the same way.
pub async fn fetch_metadata(
    api: &dyn SearchApi,
    owner: &str,
    name: &str,
) -> Result<Enrichment, DateTime<Utc>> {
    let (open_issues, total_issues, open_prs, total_prs, contributors) = tokio::join!(
        api.count_issues(owner, name, ItemState::Open),
        api.count_issues(owner, name, ItemState::All),
        api.count_pull_requests(owner, name, ItemState::Open),
        api.count_pull_requests(owner, name, ItemState::All),
        api.count_contributors(owner, name),
    );

    let mut enrichment = Enrichment::default();
    let full_name = format!("{owner}/{name}");
    enrichment.metadata.open_issues = enrichment.take(&full_name, "open issues", open_issues)?;
    enrichment.metadata.total_issues = enrichment.take(&full_name, "issues", total_issues)?;
    enrichment.metadata.open_pull_requests =
        enrichment.take(&full_name, "open pull requests", open_prs)?;
    enrichment.metadata.total_pull_requests =
        enrichment.take(&full_name, "pull requests", total_prs)?;
    enrichment.metadata.contributors =
        enrichment.take(&full_name, "contributors", contributors)?;
    Ok(enrichment)
}

impl Enrichment {
    fn take(
        &mut self,
        full_name: &str,
        what: &str,
        result: Result<ApiResponse<u64>, GitHubError>,
    ) -> Result<Option<u64>, DateTime<Utc>> {
        match result {
            Ok(resp) => {
                self.rate_limit = Some(resp.rate_limit);
                Ok(Some(resp.data))
            }
            Err(GitHubError::RateLimited { reset_at }) => Err(reset_at),
            Err(e) => {
                tracing::warn!("Could not count {what} for {full_name}: {e}");
                Ok(None)
            }
        }
    }
}

/// Fill in repository details and counts for persisted candidates that lack
/// them, oldest first. Stops early on rate limiting.
pub async fn backfill_metadata(
    api: &dyn SearchApi,
    store: &dyn JobStore,
    delay: Duration,
) -> anyhow::Result<BackfillReport> {
    let pending = store.candidates_missing_metadata(BACKFILL_BATCH).await?;
    if pending.is_empty() {
        return Ok(BackfillReport {
            message: "No repositories need metadata backfilling".to_string(),
            processed: 0,
            errors: 0,
            total: 0,
            remaining: 0,
        });
    }

    let total = pending.len();
    let mut processed = 0;
    let mut errors = 0;

    for mut candidate in pending {
        let Some((owner, name)) = candidate
            .owner_and_name()
            .map(|(o, n)| (o.to_string(), n.to_string()))
        else {
            tracing::warn!("Skipping backfill for malformed name {}", candidate.full_name);
            errors += 1;
            continue;
        };

        let details = match api.get_repo_details(&owner, &name).await {
            Ok(resp) => resp.data,
            Err(GitHubError::RateLimited { reset_at }) => {
                tracing::info!("Rate limit hit during backfill, resets at {reset_at}");
                break;
            }
            Err(e) => {
                tracing::error!("Error backfilling metadata for {}: {e}", candidate.full_name);
                errors += 1;
                continue;
            }
        };

        let enrichment = match fetch_metadata(api, &owner, &name).await {
            Ok(enrichment) => enrichment,
            Err(reset_at) => {
                tracing::info!("Rate limit hit during backfill, resets at {reset_at}");
                break;
            }
        };

        candidate.forks = Some(details.forks_count);
        candidate.language = details.language.filter(|l| !l.is_empty());
        candidate.description = details.description.filter(|d| !d.is_empty());
        candidate.metadata = enrichment.metadata;

        match store.upsert_candidate(candidate).await {
            Ok(_) => processed += 1,
            Err(e) => {
                tracing::error!("Error saving backfilled metadata: {e}");
                errors += 1;
            }
        }

        tokio::time::sleep(delay).await;
    }

    let remaining = total - processed - errors;
    let message = if remaining > 0 {
        format!(
            "Backfilled metadata for {processed} repositories. {remaining} remaining. Run again to continue."
        )
    } else {
        format!("Backfilled metadata for {processed} repositories.")
    };

    Ok(BackfillReport {
        message,
        processed,
        errors,
        total,
        remaining,
    })
}
