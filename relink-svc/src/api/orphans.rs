//! Orphan listing for the pairing UI

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use relink_engine::OrphanSuggestion;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::error;

use crate::AppState;

const DEFAULT_LIMIT: u32 = 50;
const MAX_LIMIT: u32 = 500;

#[derive(Debug, Deserialize)]
pub struct OrphanQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    DEFAULT_LIMIT
}

#[derive(Debug, Serialize)]
pub struct OrphanListResponse {
    pub count: usize,
    pub orphans: Vec<OrphanSuggestion>,
}

/// GET /api/orphans?limit=N
///
/// Oldest orphans first, each with its suggested order.
pub async fn list_orphans(
    State(state): State<AppState>,
    Query(query): Query<OrphanQuery>,
) -> Result<Json<OrphanListResponse>, (StatusCode, Json<Value>)> {
    let limit = query.limit.clamp(1, MAX_LIMIT);
    let orphans = state
        .engine
        .list_orphans_with_suggestions(limit)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to list orphaned subscriptions");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Failed to list orphans" })),
            )
        })?;

    Ok(Json(OrphanListResponse {
        count: orphans.len(),
        orphans,
    }))
}
