use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, NaiveDate, Utc};

use super::store_error;
use crate::export::{candidates_to_csv, export_filename};
use crate::models::{BackfillReport, Pagination, RepoCandidateView, ResultsQuery, ResultsResponse};
use crate::scan::backfill_metadata;
use crate::state::AppState;
use crate::store::{CandidateFilter, PageRequest};

const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 500;

/// GET /api/results - Persisted candidates, best first, paged
pub async fn list_results(
    State(state): State<AppState>,
    Query(query): Query<ResultsQuery>,
) -> Result<Json<ResultsResponse>, (StatusCode, String)> {
    let filter = build_filter(&query, true)?;
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);

    let (results, total) = state
        .store
        .list_candidates(&filter, Some(PageRequest { page, limit }))
        .await
        .map_err(store_error)?;

    Ok(Json(ResultsResponse {
        results: results.into_iter().map(RepoCandidateView::from).collect(),
        pagination: Pagination {
            page,
            limit,
            total,
            total_pages: total.div_ceil(limit),
        },
    }))
}

/// GET /api/results/export - Every matching candidate as a CSV download
pub async fn export_results(
    State(state): State<AppState>,
    Query(query): Query<ResultsQuery>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let filter = build_filter(&query, false)?;
    let (results, _) = state
        .store
        .list_candidates(&filter, None)
        .await
        .map_err(store_error)?;

    let disposition = format!(
        "attachment; filename=\"{}\"",
        export_filename(Utc::now().date_naive())
    );
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        candidates_to_csv(&results),
    ))
}

/// POST /api/results/backfill-metadata - Fill in counts for older candidates
pub async fn backfill(
    State(state): State<AppState>,
) -> Result<Json<BackfillReport>, (StatusCode, String)> {
    let report = backfill_metadata(
        state.api.as_ref(),
        state.store.as_ref(),
        state.config.pacing.backfill_delay(),
    )
    .await
    .map_err(|e| {
        tracing::error!("Metadata backfill failed: {e:#}");
        (StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}"))
    })?;
    tracing::info!("{}", report.message);
    Ok(Json(report))
}

/// The export ignores the language filter.
fn build_filter(
    query: &ResultsQuery,
    with_language: bool,
) -> Result<CandidateFilter, (StatusCode, String)> {
    let pushed_after = match query.pushed_after.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() => Some(parse_pushed_after(raw).ok_or((
            StatusCode::BAD_REQUEST,
            format!("Invalid pushedAfter date: {raw}"),
        ))?),
        _ => None,
    };
    let language = if with_language {
        query
            .language
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
    } else {
        None
    };

    Ok(CandidateFilter {
        min_score: query.min_score,
        stars_min: query.stars_min,
        pushed_after,
        language,
    })
}

/// Accepts RFC 3339 timestamps or plain `YYYY-MM-DD` dates (midnight UTC).
pub fn parse_pushed_after(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}
