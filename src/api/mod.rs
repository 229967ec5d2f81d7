//! Axum HTTP handlers.

pub mod repos;
pub mod results;
pub mod scan;

use axum::http::StatusCode;

use crate::store::StoreError;

/// Map a store failure onto the handler error shape.
fn store_error(e: StoreError) -> (StatusCode, String) {
    let status = match &e {
        StoreError::AlreadyRunning { .. } | StoreError::JobFinished(_) => StatusCode::CONFLICT,
        StoreError::JobNotFound(_) | StoreError::CandidateNotFound(_) => StatusCode::NOT_FOUND,
        StoreError::Io(_) | StoreError::Serde(_) => {
            tracing::error!("Store failure: {e}");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, e.to_string())
}
