//! Slot endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    error::AppResult,
    models::slot::{
        AvailabilityQuery, BulkCreateSlots, CreateSlot, Slot, SlotAvailability, SlotListing,
        SlotQuery, UpdateSlot,
    },
    AppState,
};

use super::{ApiResponse, AuthenticatedUser};

/// Bulk creation result
#[derive(Serialize, ToSchema)]
pub struct BulkCreated {
    /// Number of slots created
    pub count: usize,
}

/// List active slots of a temple grouped by date
#[utoipa::path(
    get,
    path = "/slots",
    tag = "slots",
    params(SlotQuery),
    responses(
        (status = 200, description = "Slots grouped by date", body = SlotListing),
        (status = 400, description = "Missing temple or invalid date")
    )
)]
pub async fn list_slots(
    State(state): State<AppState>,
    Query(query): Query<SlotQuery>,
) -> AppResult<Json<ApiResponse<SlotListing>>> {
    let listing = state.services.slots.list(&query).await?;
    Ok(ApiResponse::ok(listing))
}

/// Get slot by ID
#[utoipa::path(
    get,
    path = "/slots/{id}",
    tag = "slots",
    params(("id" = i32, Path, description = "Slot ID")),
    responses(
        (status = 200, description = "Slot details", body = Slot),
        (status = 404, description = "Slot not found")
    )
)]
pub async fn get_slot(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> AppResult<Json<ApiResponse<Slot>>> {
    let slot = state.services.slots.get(id).await?;
    Ok(ApiResponse::ok(slot))
}

/// Check whether a number of visitors can book the slot
#[utoipa::path(
    get,
    path = "/slots/{id}/availability",
    tag = "slots",
    params(
        ("id" = i32, Path, description = "Slot ID"),
        AvailabilityQuery
    ),
    responses(
        (status = 200, description = "Availability", body = SlotAvailability),
        (status = 404, description = "Slot not found")
    )
)]
pub async fn check_availability(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Query(query): Query<AvailabilityQuery>,
) -> AppResult<Json<ApiResponse<SlotAvailability>>> {
    let availability = state.services.slots.availability(id, query.visitors).await?;
    Ok(ApiResponse::ok(availability))
}

/// Create a slot (admin)
#[utoipa::path(
    post,
    path = "/slots",
    tag = "slots",
    security(("bearer_auth" = [])),
    request_body = CreateSlot,
    responses(
        (status = 201, description = "Slot created", body = Slot),
        (status = 400, description = "Invalid times or overlap"),
        (status = 403, description = "Administrator privileges required"),
        (status = 404, description = "Temple not found")
    )
)]
pub async fn create_slot(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(request): Json<CreateSlot>,
) -> AppResult<(StatusCode, Json<ApiResponse<Slot>>)> {
    claims.require_admin()?;

    let slot = state.services.slots.create(request).await?;
    Ok((
        StatusCode::CREATED,
        ApiResponse::with_message("Slot created successfully", slot),
    ))
}

/// Generate slots for a date range (admin)
#[utoipa::path(
    post,
    path = "/slots/bulk",
    tag = "slots",
    security(("bearer_auth" = [])),
    request_body = BulkCreateSlots,
    responses(
        (status = 201, description = "Slots created", body = BulkCreated),
        (status = 400, description = "Invalid range or overlap"),
        (status = 403, description = "Administrator privileges required")
    )
)]
pub async fn bulk_create_slots(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(request): Json<BulkCreateSlots>,
) -> AppResult<(StatusCode, Json<ApiResponse<BulkCreated>>)> {
    claims.require_admin()?;

    let created = state.services.slots.bulk_create(request).await?;
    let count = created.len();
    Ok((
        StatusCode::CREATED,
        ApiResponse::with_message(format!("{} slots created successfully", count), BulkCreated { count }),
    ))
}

/// Update a slot (admin)
#[utoipa::path(
    put,
    path = "/slots/{id}",
    tag = "slots",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Slot ID")),
    request_body = UpdateSlot,
    responses(
        (status = 200, description = "Slot updated", body = Slot),
        (status = 400, description = "Invalid capacity or status"),
        (status = 403, description = "Administrator privileges required"),
        (status = 404, description = "Slot not found")
    )
)]
pub async fn update_slot(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
    Json(request): Json<UpdateSlot>,
) -> AppResult<Json<ApiResponse<Slot>>> {
    claims.require_admin()?;

    let slot = state.services.slots.update(id, request).await?;
    Ok(ApiResponse::with_message("Slot updated successfully", slot))
}

/// Deactivate a slot (admin)
#[utoipa::path(
    delete,
    path = "/slots/{id}",
    tag = "slots",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Slot ID")),
    responses(
        (status = 204, description = "Slot deactivated"),
        (status = 403, description = "Administrator privileges required"),
        (status = 404, description = "Slot not found")
    )
)]
pub async fn delete_slot(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<StatusCode> {
    claims.require_admin()?;

    state.services.slots.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
