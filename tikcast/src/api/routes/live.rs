//! Live snapshot route.
//!
//! The single polling entry point. Transport errors (malformed request) are
//! HTTP 4xx; domain conditions (streamer offline, upstream unreachable) ride
//! the `error` field of a 200 so clients know to just keep polling.

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;

use crate::api::models::LiveSnapshotResponse;
use crate::api::server::AppState;

/// Create the live router.
pub fn router() -> Router<AppState> {
    Router::new().route("/live", get(live_snapshot))
}

/// Query parameters for the live snapshot endpoint.
#[derive(Debug, Deserialize)]
struct LiveQuery {
    #[serde(default)]
    username: Option<String>,
}

/// Serve one poll: ensure ingestion is running for the handle and return the
/// buffered snapshot.
async fn live_snapshot(
    State(state): State<AppState>,
    Query(query): Query<LiveQuery>,
) -> Response {
    let Some(handle) = clean_handle(query.username.as_deref()) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(LiveSnapshotResponse::error_only("username required")),
        )
            .into_response();
    };

    match state.ingest.poll(&handle).await {
        Ok(outcome) => (
            StatusCode::OK,
            Json(LiveSnapshotResponse::new(outcome.snapshot, outcome.error)),
        )
            .into_response(),
        Err(e) => {
            tracing::error!(handle = %handle, error = %e, "Live snapshot failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(LiveSnapshotResponse::error_only(
                    "Failed to fetch live data",
                )),
            )
                .into_response()
        }
    }
}

/// Normalize a raw username: trim whitespace and strip one leading `@`.
fn clean_handle(raw: Option<&str>) -> Option<String> {
    let trimmed = raw?.trim();
    let trimmed = trimmed.strip_prefix('@').unwrap_or(trimmed).trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
