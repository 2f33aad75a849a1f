//! Crowd simulation endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use crate::{
    error::AppResult,
    models::crowd::{
        Alert, Heatmap, HeatmapQuery, NewAlert, SimulationQuery, SimulationUpdate,
        SimulationUpdateResult, SimulationView,
    },
    AppState,
};

use super::{ApiResponse, AuthenticatedUser};

/// Crowd simulation of a temple-day, generated on first access
#[utoipa::path(
    get,
    path = "/simulation/{temple_id}",
    tag = "simulation",
    params(
        ("temple_id" = i32, Path, description = "Temple ID"),
        SimulationQuery
    ),
    responses(
        (status = 200, description = "Simulation day", body = SimulationView),
        (status = 404, description = "Temple not found")
    )
)]
pub async fn get_simulation(
    State(state): State<AppState>,
    Path(temple_id): Path<i32>,
    Query(query): Query<SimulationQuery>,
) -> AppResult<Json<ApiResponse<SimulationView>>> {
    let view = state
        .services
        .simulation
        .get_day(temple_id, query.date.as_deref())
        .await?;
    Ok(ApiResponse::ok(view))
}

/// Per-area occupancy of an hour of today
#[utoipa::path(
    get,
    path = "/simulation/{temple_id}/heatmap",
    tag = "simulation",
    params(
        ("temple_id" = i32, Path, description = "Temple ID"),
        HeatmapQuery
    ),
    responses(
        (status = 200, description = "Heatmap", body = Heatmap),
        (status = 404, description = "Temple not found")
    )
)]
pub async fn get_heatmap(
    State(state): State<AppState>,
    Path(temple_id): Path<i32>,
    Query(query): Query<HeatmapQuery>,
) -> AppResult<Json<ApiResponse<Heatmap>>> {
    let heatmap = state.services.simulation.heatmap(temple_id, query.hour).await?;
    Ok(ApiResponse::ok(heatmap))
}

/// Ingest an hourly occupancy reading (admin)
#[utoipa::path(
    post,
    path = "/simulation/{temple_id}/update",
    tag = "simulation",
    security(("bearer_auth" = [])),
    params(("temple_id" = i32, Path, description = "Temple ID")),
    request_body = SimulationUpdate,
    responses(
        (status = 200, description = "Reading applied", body = SimulationUpdateResult),
        (status = 400, description = "Invalid reading"),
        (status = 403, description = "Administrator privileges required"),
        (status = 404, description = "Temple not found")
    )
)]
pub async fn update_simulation(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(temple_id): Path<i32>,
    Json(update): Json<SimulationUpdate>,
) -> AppResult<Json<ApiResponse<SimulationUpdateResult>>> {
    claims.require_admin()?;

    let result = state.services.simulation.update(temple_id, update).await?;
    Ok(ApiResponse::with_message("Crowd data updated successfully", result))
}

/// Raise a manual alert on today's simulation (admin)
#[utoipa::path(
    post,
    path = "/simulation/{temple_id}/alert",
    tag = "simulation",
    security(("bearer_auth" = [])),
    params(("temple_id" = i32, Path, description = "Temple ID")),
    request_body = NewAlert,
    responses(
        (status = 201, description = "Alert created", body = Alert),
        (status = 400, description = "Invalid alert"),
        (status = 403, description = "Administrator privileges required"),
        (status = 404, description = "Temple not found")
    )
)]
pub async fn add_alert(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(temple_id): Path<i32>,
    Json(alert): Json<NewAlert>,
) -> AppResult<(StatusCode, Json<ApiResponse<Alert>>)> {
    claims.require_admin()?;

    let alert = state.services.simulation.add_alert(temple_id, alert).await?;
    Ok((
        StatusCode::CREATED,
        ApiResponse::with_message("Alert added successfully", alert),
    ))
}

/// Resolve an alert (admin); resolving twice keeps the first resolution time
#[utoipa::path(
    put,
    path = "/simulation/{temple_id}/alert/{alert_id}/resolve",
    tag = "simulation",
    security(("bearer_auth" = [])),
    params(
        ("temple_id" = i32, Path, description = "Temple ID"),
        ("alert_id" = i32, Path, description = "Alert ID")
    ),
    responses(
        (status = 200, description = "Alert resolved", body = Alert),
        (status = 403, description = "Administrator privileges required"),
        (status = 404, description = "Alert not found")
    )
)]
pub async fn resolve_alert(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path((temple_id, alert_id)): Path<(i32, i32)>,
) -> AppResult<Json<ApiResponse<Alert>>> {
    claims.require_admin()?;

    let alert = state
        .services
        .simulation
        .resolve_alert(temple_id, alert_id)
        .await?;
    Ok(ApiResponse::with_message("Alert resolved successfully", alert))
}
