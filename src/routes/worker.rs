//! Worker trigger and post management endpoints

use axum::Router;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Json;
use axum::routing::{get, post};
use serde_json::{Value, json};
use std::sync::Arc;
use uuid::Uuid;

use crate::AppState;
use crate::domain::posts;
use crate::services::error::LogErr;
use crate::worker::{RunSummary, process_due_posts};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health))
        .route("/publish/worker", get(trigger_worker))
        .route("/publish/posts/{post_id}/retry", post(retry_post))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Run one dispatch cycle on demand and return its summary. Requires the
/// shared bearer token when one is configured; external schedulers call
/// this between cron ticks.
async fn trigger_worker(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<RunSummary>, StatusCode> {
    if let Some(expected) = &state.trigger_token {
        let provided = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or(StatusCode::UNAUTHORIZED)?;

        if provided != expected {
            return Err(StatusCode::UNAUTHORIZED);
        }
    }

    println!("[routes] Manual worker trigger");
    let summary = process_due_posts(&state).await;
    Ok(Json(summary))
}

/// Requeue a failed post so the next cycle picks it up again
async fn retry_post(
    State(state): State<Arc<AppState>>,
    Path(post_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<Value>, StatusCode> {
    let user_id: Uuid = headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let requeued = posts::requeue_failed(&state.db, post_id, user_id)
        .await
        .log_500("Failed to requeue post")?;

    if !requeued {
        return Err(StatusCode::NOT_FOUND);
    }

    println!("[routes] Post {} requeued by user {}", post_id, user_id);

    // Kick off a cycle so the retried post publishes now rather than on
    // the next cron tick
    let state = state.clone();
    tokio::spawn(async move {
        let summary = process_due_posts(&state).await;
        if !summary.errors.is_empty() {
            eprintln!(
                "[routes] Retry-triggered cycle finished with {} errors",
                summary.errors.len()
            );
        }
    });

    Ok(Json(json!({ "id": post_id, "status": "pending" })))
}
