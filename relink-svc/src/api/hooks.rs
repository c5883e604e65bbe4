//! Hook endpoints called by the order-processing system
//!
//! Hooks never fail the caller's workflow: once the request parses they
//! answer 200 (or 202 for raw events) whatever the engine did.

use axum::{extract::State, http::StatusCode, Json};
use relink_common::LinkEvent;
use relink_engine::backstop::SweepReport;
use relink_engine::model::{OrderStatus, RecurringSchedule, RepairOutcome};
use relink_engine::payload::{CandidateRecord, SaveContext, WritePayload};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct BeforeWriteRequest {
    pub payload: WritePayload,
    pub candidate: CandidateRecord,
    pub context: SaveContext,
}

/// POST /hooks/before-write
///
/// Runs the interceptor chain and returns the payload to commit.
pub async fn before_write(
    State(state): State<AppState>,
    Json(request): Json<BeforeWriteRequest>,
) -> Json<WritePayload> {
    let payload = state
        .engine
        .before_write(request.payload, &request.candidate, request.context)
        .await;
    Json(payload)
}

#[derive(Debug, Deserialize)]
pub struct SubscriptionCreatedRequest {
    pub subscription_id: i64,
    pub order_id: i64,
    #[serde(default)]
    pub schedule: RecurringSchedule,
}

/// POST /hooks/subscription-created
pub async fn subscription_created(
    State(state): State<AppState>,
    Json(request): Json<SubscriptionCreatedRequest>,
) -> Json<RepairOutcome> {
    let outcome = state
        .engine
        .verify_created(request.subscription_id, request.order_id, &request.schedule)
        .await;
    Json(outcome)
}

#[derive(Debug, Deserialize)]
pub struct OrderStatusRequest {
    pub order_id: i64,
    /// Status slug, `wc-` prefix accepted
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct OrderStatusResponse {
    pub swept: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<SweepReport>,
}

/// POST /hooks/order-status
pub async fn order_status(
    State(state): State<AppState>,
    Json(request): Json<OrderStatusRequest>,
) -> Json<OrderStatusResponse> {
    let status = OrderStatus::from_slug(&request.status);
    let report = state
        .engine
        .on_order_status_changed(request.order_id, &status)
        .await;
    Json(OrderStatusResponse {
        swept: report.is_some(),
        report,
    })
}

/// POST /hooks/event
///
/// Accepts a tagged [`LinkEvent`].
pub async fn event(State(state): State<AppState>, Json(event): Json<LinkEvent>) -> StatusCode {
    debug!(event_type = event.event_type(), "Dispatching link event");
    state.engine.handle_event(&event).await;
    StatusCode::ACCEPTED
}
