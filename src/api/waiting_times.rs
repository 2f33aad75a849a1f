//! Queue wait estimate endpoint

use axum::{extract::State, Json};

use crate::{
    models::crowd::{QueueWaitEstimate, WaitEstimateRequest},
    services::crowd::estimate_queue_wait_for,
    AppState,
};

use super::ApiResponse;

/// Estimate the queue wait from visitor count and throughput
#[utoipa::path(
    post,
    path = "/waiting-times/estimate",
    tag = "waiting-times",
    request_body = WaitEstimateRequest,
    responses(
        (status = 200, description = "Estimate; minutes absent when unknown", body = QueueWaitEstimate)
    )
)]
pub async fn estimate(
    State(state): State<AppState>,
    Json(request): Json<WaitEstimateRequest>,
) -> Json<ApiResponse<QueueWaitEstimate>> {
    let defaults = &state.config.simulation;
    ApiResponse::ok(estimate_queue_wait_for(
        &request,
        defaults.default_slot_duration_minutes,
        defaults.default_lanes,
    ))
}
