use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use super::store_error;
use crate::git::validate_clone_url;
use crate::models::{
    split_full_name, CloneBatchRequest, CloneBatchResponse, CloneOutcome, CloneRequest,
    CloneResponse,
};
use crate::state::AppState;
use crate::store::StoreError;

/// POST /api/repos/clone - Shallow clone one repository
pub async fn clone_repo(
    State(state): State<AppState>,
    Json(req): Json<CloneRequest>,
) -> Result<Json<CloneResponse>, (StatusCode, String)> {
    let repo_url = req.repo_url.trim().to_string();
    let full_name = req.full_name.trim().to_string();
    if repo_url.is_empty() || full_name.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "repoUrl and fullName are required".to_string(),
        ));
    }
    if split_full_name(&full_name).is_none() {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("fullName must look like owner/name: {full_name}"),
        ));
    }
    validate_clone_url(&repo_url).map_err(|e| (StatusCode::BAD_REQUEST, format!("{e:#}")))?;

    let cloned = state.cloner.clone_repo(&repo_url, &full_name).await.map_err(|e| {
        tracing::error!("Failed to clone {repo_url}: {e:#}");
        (StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}"))
    })?;
    let path = cloned.path.to_string_lossy().to_string();

    record_if_known(&state, &repo_url, &path).await?;

    Ok(Json(CloneResponse {
        success: true,
        message: "Repository cloned successfully".to_string(),
        path,
    }))
}

/// POST /api/repos/clone-batch - Clone persisted candidates one after another
pub async fn clone_batch(
    State(state): State<AppState>,
    Json(req): Json<CloneBatchRequest>,
) -> Result<Json<CloneBatchResponse>, (StatusCode, String)> {
    if req.repo_urls.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "repoUrls array is required".to_string(),
        ));
    }

    // Unknown URLs are skipped
    let mut repos = Vec::with_capacity(req.repo_urls.len());
    for url in &req.repo_urls {
        if let Some(candidate) = state.store.get_candidate(url).await.map_err(store_error)? {
            repos.push(candidate);
        }
    }

    let total = repos.len();
    let mut results = Vec::with_capacity(total);
    for (i, repo) in repos.iter().enumerate() {
        tracing::info!("Cloning progress: {}/{total}", i + 1);
        let outcome = match state.cloner.clone_repo(&repo.repo_url, &repo.full_name).await {
            Ok(cloned) => {
                let path = cloned.path.to_string_lossy().to_string();
                state
                    .store
                    .record_clone(&repo.repo_url, &path)
                    .await
                    .map_err(store_error)?;
                CloneOutcome {
                    repo: repo.full_name.clone(),
                    success: true,
                    path: Some(path),
                    error: None,
                }
            }
            Err(e) => {
                tracing::warn!("Failed to clone {}: {e:#}", repo.full_name);
                CloneOutcome {
                    repo: repo.full_name.clone(),
                    success: false,
                    path: None,
                    error: Some(format!("{e:#}")),
                }
            }
        };
        results.push(outcome);

        if i + 1 < total {
            tokio::time::sleep(state.config.pacing.clone_delay()).await;
        }
    }

    let succeeded = results.iter().filter(|r| r.success).count();
    Ok(Json(CloneBatchResponse {
        success: true,
        message: format!("Cloned {succeeded}/{total} repositories"),
        results,
    }))
}

/// Clones of repositories that were never persisted are not recorded.
async fn record_if_known(
    state: &AppState,
    repo_url: &str,
    path: &str,
) -> Result<(), (StatusCode, String)> {
    match state.store.record_clone(repo_url, path).await {
        Ok(()) | Err(StoreError::CandidateNotFound(_)) => Ok(()),
        Err(e) => Err(store_error(e)),
    }
}
