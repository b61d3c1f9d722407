//! Outbox operator routes.

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;

use herald_common::error::AppError;
use herald_outbox::store::OutboxStats;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/outbox/stats", get(outbox_stats))
        .route("/api/outbox/{id}/requeue", post(requeue_event))
}

/// GET /api/outbox/stats: Row counts per outbox status.
async fn outbox_stats(State(state): State<AppState>) -> Result<Json<OutboxStats>, AppError> {
    Ok(Json(state.store.stats().await?))
}

/// POST /api/outbox/:id/requeue: Move a parked event back to PENDING.
async fn requeue_event(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, AppError> {
    if state.store.requeue(id).await? {
        tracing::info!(outbox_id = id, "Outbox event requeued by operator");
        Ok(Json(json!({"id": id, "requeued": true})))
    } else {
        Err(AppError::NotFound(format!("Failed outbox event {} not found", id)))
    }
}
