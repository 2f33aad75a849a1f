//! OpenAPI documentation

use axum::Router;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{bookings, health, simulation, slots, temples, waiting_times};

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Darshan API",
        version = "1.0.0",
        description = "Temple visit slot booking and crowd monitoring REST API",
        license(name = "AGPL-3.0", url = "https://www.gnu.org/licenses/agpl-3.0.html")
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    modifiers(&BearerAuth),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Temples
        temples::get_status,
        temples::stream,
        // Slots
        slots::list_slots,
        slots::get_slot,
        slots::check_availability,
        slots::create_slot,
        slots::bulk_create_slots,
        slots::update_slot,
        slots::delete_slot,
        // Bookings
        bookings::create_booking,
        bookings::list_bookings,
        bookings::get_booking,
        bookings::cancel_booking,
        bookings::check_in,
        bookings::check_out,
        bookings::get_qr,
        // Simulation
        simulation::get_simulation,
        simulation::get_heatmap,
        simulation::update_simulation,
        simulation::add_alert,
        simulation::resolve_alert,
        // Waiting times
        waiting_times::estimate,
    ),
    components(
        schemas(
            // Temples
            crate::models::temple::TempleStatus,
            crate::models::temple::CrowdLevel,
            // Slots
            crate::models::slot::Slot,
            crate::models::slot::SpecialEvent,
            crate::models::slot::SlotView,
            crate::models::slot::SlotListing,
            crate::models::slot::CreateSlot,
            crate::models::slot::TimeWindow,
            crate::models::slot::BulkCreateSlots,
            crate::models::slot::UpdateSlot,
            crate::models::slot::SlotQuery,
            crate::models::slot::AvailabilityQuery,
            crate::models::slot::SlotAvailability,
            slots::BulkCreated,
            // Bookings
            crate::models::booking::Booking,
            crate::models::booking::BookingStatus,
            crate::models::booking::PaymentStatus,
            crate::models::booking::Visitor,
            crate::models::booking::Gender,
            crate::models::booking::IdType,
            crate::models::booking::GeoPoint,
            crate::models::booking::CheckIn,
            crate::models::booking::CheckOut,
            crate::models::booking::Feedback,
            crate::models::booking::CreateBooking,
            crate::models::booking::CheckInRequest,
            crate::models::booking::CheckOutRequest,
            crate::models::booking::BookingQuery,
            crate::models::booking::BookingPage,
            crate::models::booking::BookingQr,
            // Simulation
            crate::models::crowd::Density,
            crate::models::crowd::Severity,
            crate::models::crowd::AlertType,
            crate::models::crowd::Alert,
            crate::models::crowd::NewAlert,
            crate::models::crowd::AreaOccupancy,
            crate::models::crowd::HourlyCrowdRecord,
            crate::models::crowd::PeakHour,
            crate::models::crowd::WeatherCondition,
            crate::models::crowd::ImpactLevel,
            crate::models::crowd::WeatherImpact,
            crate::models::crowd::AreaReading,
            crate::models::crowd::SimulationUpdate,
            crate::models::crowd::CurrentCrowdStatus,
            crate::models::crowd::SimulationView,
            crate::models::crowd::SimulationUpdateResult,
            crate::models::crowd::HeatmapArea,
            crate::models::crowd::Heatmap,
            crate::models::crowd::SimulationQuery,
            crate::models::crowd::HeatmapQuery,
            // Waiting times
            crate::models::crowd::WaitEstimateRequest,
            crate::models::crowd::QueueLevel,
            crate::models::crowd::QueueWaitEstimate,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
            crate::error::ErrorKind,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "temples", description = "Live temple status"),
        (name = "slots", description = "Visit slot management"),
        (name = "bookings", description = "Booking lifecycle"),
        (name = "simulation", description = "Crowd simulation and alerts"),
        (name = "waiting-times", description = "Queue wait estimates")
    )
)]
pub struct ApiDoc;

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_lists_booking_paths() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/bookings/{id}/cancel"));
        assert!(doc.paths.paths.contains_key("/simulation/{temple_id}/alert/{alert_id}/resolve"));
        assert!(doc
            .components
            .as_ref()
            .map_or(false, |c| c.security_schemes.contains_key("bearer_auth")));
    }
}
