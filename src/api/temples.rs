//! Temple live status endpoints

use std::{convert::Infallible, time::Duration};

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use tokio_stream::{wrappers::BroadcastStream, Stream, StreamExt};

use crate::{error::AppResult, models::temple::TempleStatus, AppState};

use super::ApiResponse;

const KEEP_ALIVE_SECS: u64 = 15;

/// Current occupancy and crowd level of a temple
#[utoipa::path(
    get,
    path = "/temples/{id}/status",
    tag = "temples",
    params(("id" = i32, Path, description = "Temple ID")),
    responses(
        (status = 200, description = "Temple status", body = TempleStatus),
        (status = 404, description = "Temple not found")
    )
)]
pub async fn get_status(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> AppResult<Json<ApiResponse<TempleStatus>>> {
    let status = state.services.simulation.temple_status(id).await?;
    Ok(ApiResponse::ok(status))
}

/// Server-sent events: `status`, `alert` and `slot` updates of a temple
#[utoipa::path(
    get,
    path = "/temples/{id}/stream",
    tag = "temples",
    params(("id" = i32, Path, description = "Temple ID")),
    responses(
        (status = 200, description = "Event stream (text/event-stream)"),
        (status = 404, description = "Temple not found")
    )
)]
pub async fn stream(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let receiver = state.services.simulation.subscribe(id).await?;
    tracing::debug!(temple_id = id, "Live stream subscriber connected");

    let events = BroadcastStream::new(receiver).filter_map(move |item| match item {
        Ok(event) => match event.to_json() {
            Ok(data) => Some(Ok(Event::default().event(event.name()).data(data))),
            Err(e) => {
                tracing::warn!(temple_id = id, "Failed to encode live event: {}", e);
                None
            }
        },
        // Lagged subscriber: skip what was missed
        Err(e) => {
            tracing::debug!(temple_id = id, "Live stream lagged: {}", e);
            None
        }
    });

    Ok(Sse::new(events).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(KEEP_ALIVE_SECS))
            .text("ping"),
    ))
}
