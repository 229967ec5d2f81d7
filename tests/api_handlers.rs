//! HTTP handlers called directly with extracted arguments.

mod common;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;

use common::{git_checkout, repo, url, FakeApi, Harness};
use vibe_radar::api;
use vibe_radar::models::{
    CloneRequest, JobStatus, RepoCandidate, RepoMetadata, ResultsQuery, ScanParams,
    StopScanRequest,
};
use vibe_radar::state::AppState;
use vibe_radar::store::JobStore;

const WINDSURF: &str = "Windsurf in:readme";

fn app_state(h: &Harness, cron_secret: Option<&str>) -> AppState {
    let mut config = h.config();
    config.cron_secret = cron_secret.map(str::to_string);
    AppState::with_parts(config, h.api.clone(), h.store.clone(), h.registry.clone())
}

fn candidate(full_name: &str, score: u32, stars: u64, language: &str) -> RepoCandidate {
    let now = Utc::now();
    RepoCandidate {
        id: uuid::Uuid::new_v4(),
        repo_url: url(full_name),
        full_name: full_name.to_string(),
        score,
        stars,
        forks: None,
        language: Some(language.to_string()),
        description: None,
        pushed_at: Some(now),
        evidence_summary: vec!["tool_mention:Windsurf".to_string()],
        metadata: RepoMetadata::default(),
        cloned_at: None,
        clone_path: None,
        created_at: now,
        updated_at: now,
    }
}

#[tokio::test]
async fn test_status_is_idle_before_first_scan() {
    let h = Harness::new(FakeApi::new());
    let state = app_state(&h, None);

    let Json(status) = api::scan::scan_status(State(state)).await.unwrap();
    assert_eq!(status.status, "idle");
    assert_eq!(status.progress, 0);
    assert_eq!(status.total_count, 0);
    assert!(!status.has_token);
    assert!(status.job_id.is_none());
}

#[tokio::test]
async fn test_start_defaults_to_low_threshold_and_reports_status() {
    let api = FakeApi::new().repo_page(WINDSURF, 1, vec![repo("a/solo", 3)]);
    let h = Harness::new(api);
    let state = app_state(&h, None);

    let params = ScanParams {
        custom_repo_queries: Some(vec![WINDSURF.to_string()]),
        code_pages: Some(0),
        ..ScanParams::default()
    };
    let Json(started) = api::scan::start_scan(State(state.clone()), Json(params))
        .await
        .unwrap();
    assert_eq!(started.params.min_score, 2);

    assert!(h.registry.wait(started.job_id).await);
    let Json(status) = api::scan::scan_status(State(state)).await.unwrap();
    assert_eq!(status.status, "completed");
    assert_eq!(status.job_id, Some(started.job_id));
    assert_eq!(status.total_count, 1);
}

#[tokio::test]
async fn test_start_conflicts_while_running() {
    let (api, gate) = FakeApi::new().gate_on(WINDSURF);
    let h = Harness::new(api);
    let state = app_state(&h, None);
    let params = || ScanParams {
        custom_repo_queries: Some(vec![WINDSURF.to_string()]),
        ..ScanParams::default()
    };

    let Json(first) = api::scan::start_scan(State(state.clone()), Json(params()))
        .await
        .unwrap();
    gate.entered.notified().await;

    let conflict = api::scan::start_scan(State(state.clone()), Json(params()))
        .await
        .unwrap_err();
    assert_eq!(conflict.status(), StatusCode::CONFLICT);

    // Stop without an id targets the running job
    let Json(stopped) = api::scan::stop_scan(
        State(state.clone()),
        Json(StopScanRequest::default()),
    )
    .await
    .unwrap();
    assert_eq!(stopped.job_id, first.job_id);

    gate.release.notify_one();
    assert!(h.registry.wait(first.job_id).await);
    assert_eq!(h.job(first.job_id).await.status, JobStatus::Canceled);
}

#[tokio::test]
async fn test_stop_without_running_job_is_not_found() {
    let h = Harness::new(FakeApi::new());
    let err = api::scan::stop_scan(
        State(app_state(&h, None)),
        Json(StopScanRequest::default()),
    )
    .await
    .unwrap_err();
    assert_eq!(err.0, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_cron_requires_bearer_secret() {
    let h = Harness::new(FakeApi::new());
    let state = app_state(&h, Some("s3cret"));

    let err = api::scan::cron_scan(State(state.clone()), HeaderMap::new())
        .await
        .unwrap_err();
    assert_eq!(err.0, StatusCode::UNAUTHORIZED);

    let mut headers = HeaderMap::new();
    headers.insert("authorization", HeaderValue::from_static("Bearer s3cret"));
    let Json(started) = api::scan::cron_scan(State(state), headers).await.unwrap();
    assert_eq!(started.message, "Scan started");

    assert!(h.registry.wait(started.job_id).await);
    let job = h.job(started.job_id).await;
    assert_eq!(job.params.min_score, 4);
}

#[tokio::test]
async fn test_results_filter_and_paginate() {
    let h = Harness::new(FakeApi::new());
    for c in [
        candidate("r/low", 2, 500, "Python"),
        candidate("r/mid", 4, 10, "TypeScript"),
        candidate("r/top", 7, 1, "Rust"),
        candidate("r/tie", 4, 90, "typescript"),
    ] {
        h.store.upsert_candidate(c).await.unwrap();
    }
    let state = app_state(&h, None);

    let Json(page) = api::results::list_results(
        State(state.clone()),
        Query(ResultsQuery {
            min_score: Some(4),
            limit: Some(2),
            ..ResultsQuery::default()
        }),
    )
    .await
    .unwrap();
    let names: Vec<&str> = page
        .results
        .iter()
        .map(|r| r.candidate.full_name.as_str())
        .collect();
    assert_eq!(names, ["r/top", "r/tie"]);
    assert_eq!(page.pagination.total, 3);
    assert_eq!(page.pagination.total_pages, 2);
    assert_eq!(page.results[0].evidence_count, 1);

    let Json(ts) = api::results::list_results(
        State(state),
        Query(ResultsQuery {
            language: Some("TYPESCRIPT".to_string()),
            ..ResultsQuery::default()
        }),
    )
    .await
    .unwrap();
    assert_eq!(ts.pagination.total, 2);
    assert_eq!(ts.pagination.limit, 50);
}

#[tokio::test]
async fn test_export_is_csv_attachment() {
    let h = Harness::new(FakeApi::new());
    h.store
        .upsert_candidate(candidate("r/top", 7, 1, "Rust"))
        .await
        .unwrap();
    let state = app_state(&h, None);

    let response = api::results::export_results(State(state), Query(ResultsQuery::default()))
        .await
        .unwrap()
        .into_response();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "text/csv");
    let disposition = response.headers()["content-disposition"].to_str().unwrap();
    assert!(disposition.starts_with("attachment; filename=\"vibe-repos-"));
    assert!(disposition.ends_with(".csv\""));
}

#[tokio::test]
async fn test_clone_rejects_bad_input() {
    let h = Harness::new(FakeApi::new());
    let state = app_state(&h, None);

    let err = api::repos::clone_repo(
        State(state.clone()),
        Json(CloneRequest {
            repo_url: "file:///etc/passwd".to_string(),
            full_name: "a/b".to_string(),
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(err.0, StatusCode::BAD_REQUEST);

    let err = api::repos::clone_repo(
        State(state),
        Json(CloneRequest {
            repo_url: "https://github.com/a/b".to_string(),
            full_name: "../../b".to_string(),
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(err.0, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_clone_records_existing_checkout_on_candidate() {
    let h = Harness::new(FakeApi::new());
    h.store
        .upsert_candidate(candidate("octo/app", 4, 1, "Rust"))
        .await
        .unwrap();
    let state = app_state(&h, None);
    // An existing checkout counts as already cloned
    git_checkout(&state.cloner.clone_path("octo/app"));

    let Json(resp) = api::repos::clone_repo(
        State(state),
        Json(CloneRequest {
            repo_url: url("octo/app"),
            full_name: "octo/app".to_string(),
        }),
    )
    .await
    .unwrap();
    assert!(resp.success);

    let stored = h.store.get_candidate(&url("octo/app")).await.unwrap().unwrap();
    assert_eq!(stored.clone_path.as_deref(), Some(resp.path.as_str()));
    assert!(stored.cloned_at.is_some());
}

#[tokio::test]
async fn test_backfill_handler_reports_progress() {
    let api = FakeApi::new().details("octo/app", 9, "Go");
    let h = Harness::new(api);
    h.store
        .upsert_candidate(candidate("octo/app", 4, 1, "Rust"))
        .await
        .unwrap();
    let state = app_state(&h, None);

    let Json(report) = api::results::backfill(State(state)).await.unwrap();
    assert_eq!(report.processed, 1);
    assert_eq!(report.remaining, 0);
}
