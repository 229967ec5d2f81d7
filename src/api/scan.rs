use axum::extract::State;
use axum::http::{header::AUTHORIZATION, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;

use super::store_error;
use crate::models::{
    CronScanResponse, ScanConflict, ScanParams, ScanStatusResponse, StartScanResponse,
    StopScanRequest, StopScanResponse, DEFAULT_MIN_SCORE, LOW_MIN_SCORE,
};
use crate::state::AppState;
use crate::store::StoreError;

/// POST /api/scan/start - Start a scan in the background
///
/// Interactive scans default to the low threshold so a single tool mention
/// is enough to persist a repository.
pub async fn start_scan(
    State(state): State<AppState>,
    Json(mut params): Json<ScanParams>,
) -> Result<Json<StartScanResponse>, Response> {
    params.min_score = params.min_score.or(Some(LOW_MIN_SCORE));
    let params = params.resolve();

    match state.scanner.start(&state.registry, params).await {
        Ok(job) => Ok(Json(StartScanResponse {
            job_id: job.id,
            params: job.params,
        })),
        Err(StoreError::AlreadyRunning { job_id }) => Err((
            StatusCode::CONFLICT,
            Json(ScanConflict {
                error: "A scan is already running".to_string(),
                job_id,
            }),
        )
            .into_response()),
        Err(e) => Err(store_error(e).into_response()),
    }
}

/// POST /api/scan/stop - Request cancellation of a scan
pub async fn stop_scan(
    State(state): State<AppState>,
    Json(req): Json<StopScanRequest>,
) -> Result<Json<StopScanResponse>, (StatusCode, String)> {
    let job_id = match req.job_id {
        Some(id) => id,
        None => state
            .store
            .find_running_job()
            .await
            .map_err(store_error)?
            .map(|job| job.id)
            .ok_or((StatusCode::NOT_FOUND, "No running scan found".to_string()))?,
    };

    state.scanner.stop(job_id).await.map_err(store_error)?;
    Ok(Json(StopScanResponse {
        success: true,
        job_id,
    }))
}

/// GET /api/scan/status - Latest job, or `idle` before the first scan
pub async fn scan_status(
    State(state): State<AppState>,
) -> Result<Json<ScanStatusResponse>, (StatusCode, String)> {
    let latest = state.store.latest_job().await.map_err(store_error)?;
    let total_count = state.store.count_candidates().await.map_err(store_error)?;
    let has_token = state.has_token();

    let response = match latest {
        None => ScanStatusResponse {
            status: "idle".to_string(),
            progress: 0,
            message: Some("No scans run yet".to_string()),
            job_id: None,
            started_at: None,
            finished_at: None,
            rate_limit_reset_at: None,
            rate_limit: None,
            total_count,
            has_token,
        },
        Some(job) => ScanStatusResponse {
            status: job.status.as_str().to_string(),
            progress: job.progress,
            message: job.message,
            job_id: Some(job.id),
            started_at: Some(job.started_at),
            finished_at: job.finished_at,
            rate_limit_reset_at: job.rate_limit_reset_at,
            rate_limit: job.rate_limit,
            total_count,
            has_token,
        },
    };
    Ok(Json(response))
}

/// POST /api/cron/scan - Scheduled trigger with the default parameters
pub async fn cron_scan(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<CronScanResponse>, (StatusCode, String)> {
    if let Some(secret) = &state.config.cron_secret {
        let token = headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        if token != Some(secret.as_str()) {
            return Err((StatusCode::UNAUTHORIZED, "Unauthorized".to_string()));
        }
    }

    let params = ScanParams {
        min_score: Some(DEFAULT_MIN_SCORE),
        ..ScanParams::default()
    }
    .resolve();

    match state.scanner.start(&state.registry, params).await {
        Ok(job) => Ok(Json(CronScanResponse {
            message: "Scan started".to_string(),
            job_id: job.id,
        })),
        Err(StoreError::AlreadyRunning { job_id }) => Ok(Json(CronScanResponse {
            message: "Scan already running".to_string(),
            job_id,
        })),
        Err(e) => Err(store_error(e)),
    }
}
