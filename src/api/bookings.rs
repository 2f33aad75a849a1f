//! Booking endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use crate::{
    error::AppResult,
    models::booking::{
        Booking, BookingPage, BookingQr, BookingQuery, CheckInRequest, CheckOutRequest,
        CreateBooking,
    },
    AppState,
};

use super::{ApiResponse, AuthenticatedUser};

/// Book visitors into a slot
#[utoipa::path(
    post,
    path = "/bookings",
    tag = "bookings",
    security(("bearer_auth" = [])),
    request_body = CreateBooking,
    responses(
        (status = 201, description = "Booking created", body = Booking),
        (status = 400, description = "Invalid request or slot unavailable"),
        (status = 403, description = "Only pilgrims can book"),
        (status = 404, description = "Slot not found"),
        (status = 500, description = "Temporary failure, retry")
    )
)]
pub async fn create_booking(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(request): Json<CreateBooking>,
) -> AppResult<(StatusCode, Json<ApiResponse<Booking>>)> {
    claims.require_pilgrim()?;

    let booking = state.services.bookings.create(&claims, request).await?;
    Ok((
        StatusCode::CREATED,
        ApiResponse::with_message("Booking created successfully", booking),
    ))
}

/// List the caller's bookings
#[utoipa::path(
    get,
    path = "/bookings",
    tag = "bookings",
    security(("bearer_auth" = [])),
    params(BookingQuery),
    responses(
        (status = 200, description = "Page of bookings", body = BookingPage)
    )
)]
pub async fn list_bookings(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(query): Query<BookingQuery>,
) -> AppResult<Json<ApiResponse<BookingPage>>> {
    let page = state.services.bookings.list(&claims, &query).await?;
    Ok(ApiResponse::ok(page))
}

/// Get booking by ID
#[utoipa::path(
    get,
    path = "/bookings/{id}",
    tag = "bookings",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Booking ID")),
    responses(
        (status = 200, description = "Booking details", body = Booking),
        (status = 404, description = "Booking not found")
    )
)]
pub async fn get_booking(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<ApiResponse<Booking>>> {
    let booking = state.services.bookings.get(id, &claims).await?;
    Ok(ApiResponse::ok(booking))
}

/// Cancel a booking and release its seats
#[utoipa::path(
    put,
    path = "/bookings/{id}/cancel",
    tag = "bookings",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Booking ID")),
    responses(
        (status = 200, description = "Booking cancelled", body = Booking),
        (status = 400, description = "Past the cancellation cutoff or not confirmed"),
        (status = 404, description = "Booking not found")
    )
)]
pub async fn cancel_booking(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<ApiResponse<Booking>>> {
    let booking = state.services.bookings.cancel(id, &claims).await?;
    Ok(ApiResponse::with_message("Booking cancelled successfully", booking))
}

/// Record gate entry (admin)
#[utoipa::path(
    put,
    path = "/bookings/{id}/checkin",
    tag = "bookings",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Booking ID")),
    request_body = CheckInRequest,
    responses(
        (status = 200, description = "Checked in", body = Booking),
        (status = 400, description = "Not confirmed or already checked in"),
        (status = 403, description = "Administrator privileges required")
    )
)]
pub async fn check_in(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
    request: Option<Json<CheckInRequest>>,
) -> AppResult<Json<ApiResponse<Booking>>> {
    let request = request.map(|Json(r)| r).unwrap_or_default();
    let booking = state.services.bookings.check_in(id, request, &claims).await?;
    Ok(ApiResponse::with_message("Check-in successful", booking))
}

/// Record gate exit with optional feedback (admin)
#[utoipa::path(
    put,
    path = "/bookings/{id}/checkout",
    tag = "bookings",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Booking ID")),
    request_body = CheckOutRequest,
    responses(
        (status = 200, description = "Checked out", body = Booking),
        (status = 400, description = "Not checked in or invalid feedback"),
        (status = 403, description = "Administrator privileges required")
    )
)]
pub async fn check_out(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
    request: Option<Json<CheckOutRequest>>,
) -> AppResult<Json<ApiResponse<Booking>>> {
    let request = request.map(|Json(r)| r).unwrap_or_default();
    let booking = state.services.bookings.check_out(id, request, &claims).await?;
    Ok(ApiResponse::with_message("Check-out successful", booking))
}

/// Entry QR code of a booking
#[utoipa::path(
    get,
    path = "/bookings/qr/{booking_id}",
    tag = "bookings",
    security(("bearer_auth" = [])),
    params(("booking_id" = String, Path, description = "Booking identifier")),
    responses(
        (status = 200, description = "QR code", body = BookingQr),
        (status = 404, description = "Booking not found")
    )
)]
pub async fn get_qr(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(booking_ref): Path<String>,
) -> AppResult<Json<ApiResponse<BookingQr>>> {
    let qr = state.services.bookings.get_qr(&booking_ref, &claims).await?;
    Ok(ApiResponse::ok(qr))
}
